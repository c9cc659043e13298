//! Build the named targets if they are out of date, and record them
//! as dependencies of the `.do` script that invoked us.

fn main() {
    let fl = redo::build::flags::ifchange_args();
    std::process::exit(redo::build::redo_ifchange(&fl));
}

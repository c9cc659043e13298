//! Record that the invoking `.do`'s target must be rebuilt once any
//! of the named paths comes into existence.

fn main() {
    let targets = redo::build::flags::ifcreate_args();
    std::process::exit(redo::build::redo_ifcreate(&targets));
}

//! Record that the invoking `.do`'s target must be rebuilt on every
//! invocation.

fn main() {
    redo::build::flags::always_args();
    std::process::exit(redo::build::redo_always());
}

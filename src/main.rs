//! Redo is a file-oriented incremental build system.

#![cfg_attr(feature = "strict", deny(warnings))]
#![cfg_attr(feature = "strict", deny(missing_docs))]

fn main() {
    let fl = redo::build::flags::redo_args();
    if fl.clean_locks {
        match redo::build::lock::clean_stale() {
            Ok(n) => {
                println!("removed {} stale lock files", n);
                std::process::exit(0);
            }
            Err(e) => {
                redo::printer::error(&format!("{}", e));
                std::process::exit(1);
            }
        }
    }
    std::process::exit(redo::build::redo(&fl));
}

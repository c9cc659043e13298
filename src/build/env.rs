//! The `REDO_*` environment contract.  Session identity, recursion
//! depth, and the paths a running `.do` needs in order to declare
//! dependencies into its parent's metadata all travel through the
//! child environment rather than in-process state, so every helper
//! invocation can reconstruct its place in the build.

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use metrohash::MetroHash64;

/// Nonempty `REDO_KEEP_GOING` means keep building sibling targets
/// after one of them fails.
pub fn keep_going() -> bool {
    match std::env::var_os("REDO_KEEP_GOING") {
        Some(v) => !v.is_empty(),
        None => false,
    }
}

/// How many `.do` invocations deep we are.
pub fn depth() -> u64 {
    match std::env::var("REDO_DEPTH") {
        Ok(d) => d.parse().unwrap_or(0),
        Err(_) => 0,
    }
}

/// Extra single-letter options for `sh`, accumulated from `-x`/`-v`
/// flags up the invocation tree.
pub fn shell_args() -> String {
    std::env::var("REDO_SHELL_ARGS").unwrap_or_default()
}

/// The target whose `.do` is currently running, if we were invoked
/// from inside one.
pub fn parent_target() -> Option<PathBuf> {
    std::env::var_os("REDO_TARGET").map(PathBuf::from)
}

/// The directory the currently running `.do` was invoked in.
pub fn parent_path() -> Option<PathBuf> {
    std::env::var_os("REDO_PATH").map(PathBuf::from)
}

/// The session id.  The outermost invocation mints one and records
/// where it ran; every child inherits both.  Clean and dirty marks
/// from other sessions are ignored, so a fresh id makes the next
/// invocation re-derive everything once.
pub fn session() -> String {
    if let Ok(s) = std::env::var("REDO_SESSION") {
        if !s.is_empty() {
            return s;
        }
    }
    let mut h = MetroHash64::new();
    h.write_u32(std::process::id());
    if let Ok(d) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        h.write_u128(d.as_nanos());
    }
    let s = format!("{:016x}", h.finish());
    std::env::set_var("REDO_SESSION", &s);
    if std::env::var_os("REDO_INIT_PATH").is_none() {
        if let Ok(d) = std::env::current_dir() {
            std::env::set_var("REDO_INIT_PATH", d);
        }
    }
    s
}

/// Compose the environment for a spawned `.do`.  `REDO_TARGET` is
/// overwritten, never appended; everything else not named here
/// (`REDO_KEEP_GOING`, `REDO_SHUFFLE`, ...) is simply inherited.
pub fn child_env(
    cmd: &mut std::process::Command,
    target: &Path,
    do_dir: &Path,
    session: &str,
    shell_args: &str,
) {
    cmd.env("REDO_SESSION", session);
    cmd.env("REDO_TARGET", target);
    cmd.env("REDO_PATH", do_dir);
    cmd.env("REDO_DEPTH", format!("{}", depth() + 1));
    cmd.env("REDO_SHELL_ARGS", shell_args);
    cmd.env("PATH", path_with_cwd());
}

/// `PATH` with `.` appended, so a `.do` can invoke helpers that live
/// in the directory it runs in.
fn path_with_cwd() -> std::ffi::OsString {
    let path = std::env::var_os("PATH").unwrap_or_default();
    let mut parts: Vec<PathBuf> = std::env::split_paths(&path).collect();
    if !parts.iter().any(|p| p == Path::new(".")) {
        parts.push(PathBuf::from("."));
    }
    std::env::join_paths(parts).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_is_minted_once() {
        let a = session();
        let b = session();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }
}

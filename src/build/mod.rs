//! The build orchestrator: locking, running `.do` scripts, installing
//! their output, and writing dependency records on behalf of the
//! helper commands.

use std::io;
use std::io::BufRead;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::printer;

pub mod dofile;
pub mod env;
pub mod flags;
pub mod lock;
pub mod stamp;
pub mod store;
pub mod uptodate;

/// VERBOSITY is used to enable our vprintln macro to know the
/// verbosity.  This is a bit ugly, but is needed due to rust macros
/// being hygienic.
static mut VERBOSITY: u64 = 0;

/// The `vprintln!` macro does a println! only if the --verbose flag
/// is specified.  It is written as a macro because if it were a
/// method or function then the arguments would be always evaluated
/// regardless of the verbosity (thus slowing things down).
macro_rules! vprintln {
    () => {{ if unsafe { VERBOSITY > 0 } { println!() } }};
    ($fmt:expr) => {{ if unsafe { VERBOSITY > 0 } { println!($fmt) } }};
    ($fmt:expr, $($arg:tt)*) => {{ if unsafe { VERBOSITY > 0 } { println!($fmt, $($arg)*) } }};
}

macro_rules! vvprintln {
    () => {{ if unsafe { VERBOSITY > 1 } { println!() } }};
    ($fmt:expr) => {{ if unsafe { VERBOSITY > 1 } { println!($fmt) } }};
    ($fmt:expr, $($arg:tt)*) => {{ if unsafe { VERBOSITY > 1 } { println!($fmt, $($arg)*) } }};
}

/// Resolve a path to an absolute, normalized form without requiring
/// that anything exist on disk yet.
pub fn canonicalize(p: &Path) -> PathBuf {
    let abs = if p.is_absolute() {
        PathBuf::from(p)
    } else {
        match std::env::current_dir() {
            Ok(d) => d.join(p),
            Err(_) => PathBuf::from(p),
        }
    };
    let mut out = PathBuf::new();
    for element in abs.iter() {
        if element == ".." {
            out.pop();
        } else if element != "." {
            out.push(element);
        }
    }
    out
}

/// Express `path` relative to `base`.  Both must already be absolute,
/// normalized paths.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let pcomp: Vec<&OsStr> = path.iter().collect();
    let bcomp: Vec<&OsStr> = base.iter().collect();
    let mut common = 0;
    while common < pcomp.len() && common < bcomp.len() && pcomp[common] == bcomp[common] {
        common += 1;
    }
    let mut out = PathBuf::new();
    for _ in common..bcomp.len() {
        out.push("..");
    }
    for c in &pcomp[common..] {
        out.push(c);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(unix)]
/// Convert bytes to an OsStr
pub fn bytes_to_osstr(b: &[u8]) -> &OsStr {
    use std::os::unix::ffi::OsStrExt;
    OsStr::from_bytes(b)
}

#[cfg(not(unix))]
/// Convert bytes to an OsStr
pub fn bytes_to_osstr(b: &[u8]) -> &OsStr {
    Path::new(std::str::from_utf8(b).unwrap()).as_os_str()
}

/// Build every requested target unconditionally.
pub fn redo(fl: &flags::Flags) -> i32 {
    unsafe {
        VERBOSITY = fl.verbosity;
    }
    let session = env::session();
    run_targets(fl, &session, false)
}

/// Build the requested targets only if they are out of date, and
/// record each of them as an ifchange dependency of the `.do` we were
/// invoked from, if any.
pub fn redo_ifchange(fl: &flags::Flags) -> i32 {
    unsafe {
        VERBOSITY = fl.verbosity;
    }
    let session = env::session();
    run_targets(fl, &session, true)
}

/// Process targets in argument order, in two passes: first everything
/// whose lock is free, then a blocking pass over the targets some
/// other process was already building.
fn run_targets(fl: &flags::Flags, session: &str, only_if_changed: bool) -> i32 {
    let mut code = 0;
    let mut deferred = Vec::new();
    for t in fl.targets.iter() {
        let target = canonicalize(Path::new(t));
        match lock::Lock::try_acquire(&target) {
            Ok(Some(held)) => {
                let c = run_one(t, &target, session, only_if_changed, fl, held);
                if c != 0 {
                    if !env::keep_going() {
                        return c;
                    }
                    code = c;
                }
            }
            Ok(None) => {
                vvprintln!("{} is locked, deferring", t);
                deferred.push(t.clone());
            }
            Err(e) => {
                printer::error(&format!("unable to lock {}: {}", t, e));
                if !env::keep_going() {
                    return 1;
                }
                code = 1;
            }
        }
    }
    for t in deferred.iter() {
        let target = canonicalize(Path::new(t));
        let c = match lock::Lock::acquire(&target) {
            Ok(held) => run_one(t, &target, session, only_if_changed, fl, held),
            Err(e) => {
                printer::error(&format!("unable to lock {}: {}", t, e));
                1
            }
        };
        if c != 0 {
            if !env::keep_going() {
                return c;
            }
            code = c;
        }
    }
    code
}

fn run_one(
    arg: &str,
    target: &Path,
    session: &str,
    only_if_changed: bool,
    fl: &flags::Flags,
    held: lock::Lock,
) -> i32 {
    let result = process_target(arg, target, session, only_if_changed, fl);
    drop(held);
    match result {
        Ok(c) => c,
        Err(e) => {
            printer::error(&format!("{}", e));
            1
        }
    }
}

fn process_target(
    arg: &str,
    target: &Path,
    session: &str,
    only_if_changed: bool,
    fl: &flags::Flags,
) -> io::Result<i32> {
    if only_if_changed {
        if uptodate::up_to_date(target, session)? {
            vvprintln!("{} is up to date", arg);
            let md = store::MetaDir::for_target(target);
            if md.exists() {
                md.mark_clean(session)?;
            }
            record_parent_ifchange(target)?;
            return Ok(0);
        }
    }
    let script = match dofile::find(target) {
        Some(d) => d,
        None => {
            if only_if_changed && store::is_source(target) {
                record_parent_ifchange(target)?;
                return Ok(0);
            }
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("no .do file found for {}", arg),
            ));
        }
    };
    let code = build(arg, target, &script, session, fl)?;
    if code == 0 && only_if_changed {
        record_parent_ifchange(target)?;
    }
    Ok(code)
}

/// When invoked from inside a running `.do`, add an ifchange record
/// for `target` to that parent target's metadata, named relative to
/// the directory the parent's `.do` runs in.
fn record_parent_ifchange(target: &Path) -> io::Result<()> {
    let parent = match env::parent_target() {
        Some(p) => p,
        None => return Ok(()),
    };
    let base = match env::parent_path() {
        Some(p) => canonicalize(&p),
        None => return Ok(()),
    };
    let rel = relative_to(target, &base);
    let md = store::MetaDir::for_target(&canonicalize(&parent));
    md.store_ifchange(&rel.to_string_lossy(), target)
}

struct Cwd(PathBuf);

impl Cwd {
    fn change(to: &Path) -> io::Result<Cwd> {
        let old = std::env::current_dir()?;
        std::env::set_current_dir(to)?;
        Ok(Cwd(old))
    }
}

impl Drop for Cwd {
    fn drop(&mut self) {
        std::env::set_current_dir(&self.0).ok();
    }
}

struct TempFiles(Vec<PathBuf>);

impl Drop for TempFiles {
    fn drop(&mut self) {
        for f in self.0.iter() {
            remove_artifact(f);
        }
    }
}

/// Run one `.do` and install whatever it produced.  Returns the
/// child's exit code; engine failures come back as errors.
fn build(
    arg: &str,
    target: &Path,
    script: &dofile::DoFile,
    session: &str,
    fl: &flags::Flags,
) -> io::Result<i32> {
    let md = store::MetaDir::for_target(target);
    let pre = stamp::stamp(target);
    if let Some(built) = md.built_timestamp() {
        if !pre.is_absent() && pre != built {
            printer::warning(&format!(
                "{} was modified outside of redo; skipping the build to keep your changes",
                arg
            ));
            return Ok(0);
        }
        if let Some(prev) = md.cached_do() {
            if prev != script.path {
                vprintln!(
                    "{} now builds with {:?} (previously {:?})",
                    arg,
                    script.path,
                    prev
                );
            }
        }
    }
    let do_dir = PathBuf::from(script.dir());
    let one = relative_to(target, &do_dir).to_string_lossy().into_owned();
    let two = script.base_arg(&one);
    let tmp3 = format!("{}.redo1.temp", one);
    let stdout_name = format!(
        "{}.redo2.temp",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let tmp3_abs = do_dir.join(&tmp3);
    let stdout_abs = do_dir.join(&stdout_name);

    let cwd = Cwd::change(&do_dir)?;
    let temps = TempFiles(vec![tmp3_abs.clone(), stdout_abs.clone()]);
    md.init(&script.path)?;

    let shell_args = format!("{}{}", env::shell_args(), fl.shell_args);
    let mut cmd = command_for(&script.path, &shell_args)?;
    cmd.arg(&one).arg(&two).arg(&tmp3);
    cmd.stdout(std::fs::File::create(&stdout_abs)?);
    env::child_env(&mut cmd, target, &do_dir, session, &shell_args);
    vprintln!("redo {} ({:?})", arg, script.path);
    let status = cmd.status()?;

    let code = if status.success() {
        match install_output(target, &pre, &tmp3_abs, &stdout_abs, &md, &one) {
            Ok(()) => {
                md.mark_clean(session)?;
                if target.exists() {
                    md.mark_built()?;
                }
                Ok(0)
            }
            Err(e) => {
                md.mark_dirty(session)?;
                Err(e)
            }
        }
    } else {
        md.mark_dirty(session)?;
        Ok(status.code().unwrap_or(1))
    };
    drop(temps);
    drop(cwd);
    code
}

/// The interpreter invocation for a `.do`: its shebang line if it has
/// one, otherwise `sh -e` plus any accumulated single-letter shell
/// arguments.
fn command_for(do_path: &Path, shell_args: &str) -> io::Result<std::process::Command> {
    let mut first = String::new();
    {
        let f = std::fs::File::open(do_path)?;
        let mut r = io::BufReader::new(f);
        r.read_line(&mut first)?;
    }
    if first.starts_with("#!") {
        let mut words = first[2..].trim().split_whitespace();
        if let Some(interp) = words.next() {
            let mut cmd = std::process::Command::new(interp);
            for w in words {
                cmd.arg(w);
            }
            cmd.arg(do_path);
            return Ok(cmd);
        }
    }
    let mut cmd = std::process::Command::new("sh");
    cmd.arg(format!("-e{}", shell_args));
    cmd.arg(do_path);
    Ok(cmd)
}

/// Classify what the `.do` produced and move it into place.  The
/// target itself must not have been touched while the script ran;
/// scripts write to `$3` or stdout, never to `$1`.
fn install_output(
    target: &Path,
    pre: &stamp::Stamp,
    tmp3: &Path,
    tmp_stdout: &Path,
    md: &store::MetaDir,
    one: &str,
) -> io::Result<()> {
    let now = stamp::stamp(target);
    if !now.is_absent() && now != *pre {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{}.do modified {} directly; it must write to $3 or stdout",
                one, one
            ),
        ));
    }
    let stdout_len = std::fs::metadata(tmp_stdout).map(|m| m.len()).unwrap_or(0);
    if tmp3.exists() {
        if !install_artifact(tmp3, target) {
            md.store_phony()?;
        }
        if stdout_len > 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{}.do wrote to stdout and created $3", one),
            ));
        }
        Ok(())
    } else if stdout_len > 0 {
        if !install_artifact(tmp_stdout, target) {
            md.store_phony()?;
        }
        Ok(())
    } else {
        // No artifact at all: the target is phony.
        remove_artifact(target);
        md.store_phony()
    }
}

/// Move a finished artifact into place.  A plain rename first; if an
/// old artifact of a different kind is squatting on the target, clear
/// it and try once more.  Failing both is not fatal, the target just
/// becomes phony.
fn install_artifact(from: &Path, to: &Path) -> bool {
    if std::fs::rename(from, to).is_ok() {
        return true;
    }
    remove_artifact(to);
    std::fs::rename(from, to).is_ok()
}

fn remove_artifact(p: &Path) {
    if std::fs::remove_file(p).is_err() {
        std::fs::remove_dir_all(p).ok();
    }
}

/// Record ifcreate dependencies in the metadata of the target whose
/// `.do` invoked us.  Every named path must not exist yet.
pub fn redo_ifcreate(targets: &[String]) -> i32 {
    let (parent, base) = match (env::parent_target(), env::parent_path()) {
        (Some(t), Some(p)) => (canonicalize(&t), canonicalize(&p)),
        _ => {
            printer::error("redo-ifcreate must be invoked from within a .do script");
            return 1;
        }
    };
    for t in targets {
        if canonicalize(Path::new(t)).exists() {
            printer::error(&format!("redo-ifcreate: {} already exists", t));
            return 1;
        }
    }
    let md = store::MetaDir::for_target(&parent);
    for t in targets {
        let dep = canonicalize(Path::new(t));
        let rel = relative_to(&dep, &base);
        if let Err(e) = md.store_ifcreate(&rel.to_string_lossy(), &dep) {
            printer::error(&format!("{}", e));
            return 1;
        }
    }
    0
}

/// Record an always dependency in the metadata of the target whose
/// `.do` invoked us.
pub fn redo_always() -> i32 {
    let parent = match env::parent_target() {
        Some(t) => canonicalize(&t),
        None => {
            printer::error("redo-always must be invoked from within a .do script");
            return 1;
        }
    };
    match store::MetaDir::for_target(&parent).store_always() {
        Ok(()) => 0,
        Err(e) => {
            printer::error(&format!("{}", e));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_to(Path::new("/a/b/c"), Path::new("/a/b")),
            PathBuf::from("c")
        );
        assert_eq!(
            relative_to(Path::new("/a/x"), Path::new("/a/b")),
            PathBuf::from("../x")
        );
        assert_eq!(
            relative_to(Path::new("/a/b"), Path::new("/a/b")),
            PathBuf::from(".")
        );
        assert_eq!(
            relative_to(Path::new("/x/y"), Path::new("/a/b")),
            PathBuf::from("../../x/y")
        );
    }

    #[test]
    fn canonicalize_normalizes_dot_components() {
        assert_eq!(
            canonicalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(canonicalize(Path::new("/a/b/..")), PathBuf::from("/a"));
    }
}

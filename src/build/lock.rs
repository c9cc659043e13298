//! Advisory per-target build locks.  Only one process may hold a
//! target's lock at a time; the holder keeps it for the whole span of
//! up-to-date check, build, artifact install, and metadata
//! finalization.

use std::io;
use std::path::{Path, PathBuf};

use crate::build::stamp;
use crate::build::store;

/// An exclusive lock on one target, released on drop.
#[derive(Debug)]
pub struct Lock {
    #[allow(dead_code)]
    file: std::fs::File,
}

fn lock_path(target: &Path) -> PathBuf {
    store::meta_root().join(format!(".lck.{}.lck.", stamp::hash_target_id(target)))
}

fn open_lock_file(target: &Path) -> io::Result<std::fs::File> {
    std::fs::create_dir_all(store::meta_root())?;
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(lock_path(target))
}

#[cfg(unix)]
fn flock_exclusive(f: &std::fs::File, block: bool) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let mut op = libc::LOCK_EX;
    if !block {
        op |= libc::LOCK_NB;
    }
    if unsafe { libc::flock(f.as_raw_fd(), op) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn flock_exclusive(_f: &std::fs::File, _block: bool) -> io::Result<bool> {
    Ok(true)
}

impl Lock {
    /// Try to take the lock without waiting.  `None` means another
    /// process currently holds it.
    pub fn try_acquire(target: &Path) -> io::Result<Option<Lock>> {
        let f = open_lock_file(target)?;
        if flock_exclusive(&f, false)? {
            Ok(Some(Lock { file: f }))
        } else {
            Ok(None)
        }
    }

    /// Take the lock, waiting for the current holder to release it.
    pub fn acquire(target: &Path) -> io::Result<Lock> {
        let f = open_lock_file(target)?;
        flock_exclusive(&f, true)?;
        Ok(Lock { file: f })
    }
}

#[cfg(unix)]
impl Drop for Lock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}

/// Remove lock files no process holds.  Runs only when explicitly
/// requested (`redo --clean-locks`), never during a normal build.
pub fn clean_stale() -> io::Result<usize> {
    let root = store::meta_root();
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !(name.starts_with(".lck.") && name.ends_with(".lck.")) {
            continue;
        }
        let f = match std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(entry.path())
        {
            Ok(f) => f,
            Err(_) => continue,
        };
        if flock_exclusive(&f, false)? {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

//! The recursive decision procedure over a target's metadata: is
//! there any recorded reason this target must be rebuilt?

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::build::canonicalize;
use crate::build::dofile;
use crate::build::stamp;
use crate::build::store;

/// Decide whether `target` can be skipped.  Clean and dirty marks
/// from the current session short-circuit the traversal, and a repeat
/// visit within one call is treated as up-to-date, which bounds
/// recursion through cycles of generated `.do` files.
pub fn up_to_date(target: &Path, session: &str) -> io::Result<bool> {
    let mut visiting = HashSet::new();
    check(canonicalize(target), session, &mut visiting)
}

fn check(target: PathBuf, session: &str, visiting: &mut HashSet<PathBuf>) -> io::Result<bool> {
    if !visiting.insert(target.clone()) {
        return Ok(true);
    }
    let md = store::MetaDir::for_target(&target);
    if !target.exists() && !md.phony() {
        // Never been built.
        return Ok(false);
    }
    if md.exists() {
        if md.is_clean(session) {
            return Ok(true);
        }
        if md.is_dirty(session) {
            return Ok(false);
        }
    }
    let script = match dofile::find(&target) {
        Some(d) => d,
        None => return Ok(true), // a source file
    };
    if !md.exists() {
        // On disk but never recorded: also a source.
        return Ok(true);
    }
    if let Some(built) = md.built_timestamp() {
        if stamp::stamp(&target) != built {
            // Modified outside the build system; the orchestrator
            // warns and refuses to clobber it.
            return Ok(false);
        }
    }
    if md.has_always() {
        return Ok(false);
    }
    let dir = PathBuf::from(script.dir());
    for dep in md.ifcreate_records()? {
        if canonicalize(&dir.join(&dep)).exists() {
            return Ok(false);
        }
    }
    for (dep, recorded) in md.ifchange_records()? {
        let dep_abs = canonicalize(&dir.join(&dep));
        let current = match store::built_target_path(&dep_abs) {
            Some(p) => stamp::stamp(&p),
            None => return Ok(false),
        };
        if current != recorded {
            return Ok(false);
        }
        if !check(dep_abs, session, visiting)? {
            return Ok(false);
        }
    }
    Ok(true)
}

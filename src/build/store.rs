//! The per-target metadata store.  Each target owns a directory under
//! the user-scoped metadata root holding its dependency records and
//! build-status flags.  Every record is a single file whose name says
//! what it is, so two processes cooperating on one target never need
//! more than whole-file writes.

use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::build::stamp;
use crate::build::stamp::Stamp;

lazy_static! {
    static ref META_ROOT: PathBuf = {
        match std::env::var_os("REDO_HOME") {
            Some(ref d) if !d.is_empty() => PathBuf::from(d),
            _ => match directories::BaseDirs::new() {
                Some(b) => b.home_dir().join(".redo"),
                None => PathBuf::from(".redo"),
            },
        }
    };
}

/// The user-scoped directory holding all metadata and lock files.
/// `$REDO_HOME` overrides the default of `~/.redo`.
pub fn meta_root() -> &'static Path {
    &META_ROOT
}

const ALWAYS_RECORD: &str = ".~redo-always~.";
const PHONY_RECORD: &str = ".phony-target.";
const DO_RECORD: &str = ".do.do.";
const BUILT_RECORD: &str = ".blt.blt.";

/// Drop trailing separators and redundant `./` prefixes.  The result
/// is what the escape codec round-trips through.
pub fn sanitize(p: &str) -> String {
    let mut s = String::from(p);
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    while s.starts_with("./") && s.len() > 2 {
        s.drain(..2);
        while s.starts_with('/') && s.len() > 1 {
            s.remove(0);
        }
    }
    s
}

/// Encode a path as a single filename component.  `/` becomes `^`,
/// and literal `^` or `@` hide behind an `@` escape so the encoding
/// stays invertible.
pub fn escape(p: &str) -> String {
    let mut out = String::with_capacity(p.len());
    for c in sanitize(p).chars() {
        match c {
            '/' => out.push('^'),
            '^' => out.push_str("@^"),
            '@' => out.push_str("@@"),
            _ => out.push(c),
        }
    }
    out
}

/// Invert `escape`: `unescape(escape(p))` equals `sanitize(p)` for
/// every path.
pub fn unescape(p: &str) -> String {
    let mut out = String::with_capacity(p.len());
    let mut it = p.chars();
    while let Some(c) = it.next() {
        match c {
            '^' => out.push('/'),
            '@' => {
                if let Some(e) = it.next() {
                    out.push(e);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn ifchange_record(dep: &str) -> String {
    format!(".@{}@.", escape(dep))
}

fn ifcreate_record(dep: &str) -> String {
    format!(".%{}%.", escape(dep))
}

/// Handle on one target's metadata directory.
#[derive(Debug, Clone)]
pub struct MetaDir {
    target: PathBuf,
    dir: PathBuf,
}

impl MetaDir {
    /// Address the metadata directory for a canonical target path.
    /// The first two digest characters become a subdirectory so the
    /// metadata root never grows into one enormous flat directory.
    pub fn for_target(target: &Path) -> MetaDir {
        let h = stamp::hash_target_id(target);
        MetaDir {
            target: PathBuf::from(target),
            dir: meta_root().join(&h[..2]).join(&h[2..]),
        }
    }

    /// Does any metadata exist for this target?
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    fn write_record(&self, name: &str, payload: &[u8]) -> io::Result<()> {
        let mut f = std::fs::File::create(self.dir.join(name))?;
        f.write_all(payload)
    }

    fn read_record(&self, name: &str) -> Option<Vec<u8>> {
        let mut f = match std::fs::File::open(self.dir.join(name)) {
            Ok(f) => f,
            Err(_) => return None,
        };
        let mut v = Vec::new();
        match f.read_to_end(&mut v) {
            Ok(_) => Some(v),
            Err(_) => None,
        }
    }

    /// Start a fresh build of this target: wipe all prior records,
    /// remember the `.do` being used, and record a dependency on the
    /// `.do` itself.
    pub fn init(&self, do_path: &Path) -> io::Result<()> {
        if self.dir.is_dir() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        self.write_record(DO_RECORD, stamp::osstr_to_bytes(do_path.as_os_str()))?;
        let name = match do_path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("unusable .do path {:?}", do_path),
                ))
            }
        };
        self.store_ifchange(&name, do_path)
    }

    /// Record that this target depends on `dep` keeping its current
    /// contents.  `rel` is the path as the target's `.do` will later
    /// resolve it; `dep` is its canonical location.  A phony
    /// dependency is stamped through its phony marker, so the record
    /// stays comparable with what the up-to-date check computes.
    pub fn store_ifchange(&self, rel: &str, dep: &Path) -> io::Result<()> {
        let st = match built_target_path(dep) {
            Some(p) => stamp::stamp(&p),
            None => Stamp::absent(),
        };
        self.write_record(&ifchange_record(rel), st.as_bytes())
    }

    /// Record that this target must be rebuilt once `dep` comes into
    /// existence.  Fails if `dep` already exists.
    pub fn store_ifcreate(&self, rel: &str, dep: &Path) -> io::Result<()> {
        if dep.exists() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("redo-ifcreate: {:?} already exists", dep),
            ));
        }
        self.write_record(&ifcreate_record(rel), &[stamp::ABSENT])
    }

    /// Record that this target must be rebuilt on every invocation.
    pub fn store_always(&self) -> io::Result<()> {
        self.write_record(ALWAYS_RECORD, &[stamp::ABSENT])
    }

    /// Record that the last build produced no artifact.
    pub fn store_phony(&self) -> io::Result<()> {
        self.write_record(PHONY_RECORD, &[stamp::ABSENT])
    }

    /// Where the phony marker lives.  It stands in for the artifact
    /// when a phony target needs stamping.
    pub fn phony_marker(&self) -> PathBuf {
        self.dir.join(PHONY_RECORD)
    }

    /// Did the last build produce no artifact?
    pub fn phony(&self) -> bool {
        self.phony_marker().is_file()
    }

    fn purge_marks(&self) -> io::Result<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if (name.starts_with(".cln.") && name.ends_with(".cln."))
                || (name.starts_with(".drt.") && name.ends_with(".drt."))
            {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Mark this target proven clean for `session`, clearing any
    /// older clean or dirty marks.
    pub fn mark_clean(&self, session: &str) -> io::Result<()> {
        self.purge_marks()?;
        self.write_record(&format!(".cln.{}.cln.", session), &[])
    }

    /// Mark this target failed for `session`, clearing any older
    /// clean or dirty marks.
    pub fn mark_dirty(&self, session: &str) -> io::Result<()> {
        self.purge_marks()?;
        self.write_record(&format!(".drt.{}.drt.", session), &[])
    }

    /// Was this target proven clean during `session`?
    pub fn is_clean(&self, session: &str) -> bool {
        self.dir.join(format!(".cln.{}.cln.", session)).is_file()
    }

    /// Did this target fail during `session`?
    pub fn is_dirty(&self, session: &str) -> bool {
        self.dir.join(format!(".drt.{}.drt.", session)).is_file()
    }

    /// Record the target's stamp right after a successful install.
    pub fn mark_built(&self) -> io::Result<()> {
        self.write_record(BUILT_RECORD, stamp::stamp(&self.target).as_bytes())
    }

    /// The stamp of the target at the end of its last successful
    /// build.  Divergence from the current stamp means someone edited
    /// the target behind redo's back.
    pub fn built_timestamp(&self) -> Option<Stamp> {
        self.read_record(BUILT_RECORD).map(|v| Stamp::from_bytes(&v))
    }

    /// The `.do` used for the last build of this target.
    pub fn cached_do(&self) -> Option<PathBuf> {
        self.read_record(DO_RECORD)
            .map(|v| PathBuf::from(crate::build::bytes_to_osstr(&v)))
    }

    /// All recorded ifchange dependencies, as (path, recorded stamp).
    pub fn ifchange_records(&self) -> io::Result<Vec<(String, Stamp)>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() >= 4 && name.starts_with(".@") && name.ends_with("@.") {
                if let Some(v) = self.read_record(&name) {
                    out.push((unescape(&name[2..name.len() - 2]), Stamp::from_bytes(&v)));
                }
            }
        }
        Ok(out)
    }

    /// All recorded ifcreate dependencies.
    pub fn ifcreate_records(&self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() >= 4 && name.starts_with(".%") && name.ends_with("%.") {
                out.push(unescape(&name[2..name.len() - 2]));
            }
        }
        Ok(out)
    }

    /// Is there an always record?
    pub fn has_always(&self) -> bool {
        self.dir.join(ALWAYS_RECORD).is_file()
    }
}

/// Does this path exist with no metadata?  Then it is a source file,
/// not something redo builds.
pub fn is_source(target: &Path) -> bool {
    target.exists() && !MetaDir::for_target(target).exists()
}

/// The path that stands for a built target when stamping it: the
/// target itself if it exists on disk, else its phony marker if the
/// last build was phony, else nothing.
pub fn built_target_path(target: &Path) -> Option<PathBuf> {
    if target.exists() {
        return Some(PathBuf::from(target));
    }
    let md = MetaDir::for_target(target);
    if md.phony() {
        return Some(md.phony_marker());
    }
    None
}

#[cfg(test)]
quickcheck::quickcheck! {
    fn prop_escape_roundtrip(p: String) -> bool {
        unescape(&escape(&p)) == sanitize(&p)
    }

    fn prop_sanitize_idempotent(p: String) -> bool {
        sanitize(&sanitize(&p)) == sanitize(&p)
    }

    fn prop_escape_has_no_separator(p: String) -> bool {
        !escape(&p).contains('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_trailing_separators() {
        assert_eq!(sanitize("a/b/"), "a/b");
        assert_eq!(sanitize("a//"), "a");
        assert_eq!(sanitize("/"), "/");
        assert_eq!(sanitize("./a"), "a");
        assert_eq!(sanitize("."), ".");
    }

    #[test]
    fn escape_is_invertible_on_awkward_paths() {
        for p in &["a/b", "a^b", "a@b", "a/@b", "a^@b", "sub/dir/x.c"] {
            assert_eq!(unescape(&escape(p)), sanitize(p));
        }
    }

    #[test]
    fn record_names_follow_the_convention() {
        assert_eq!(ifchange_record("sub/dir/a"), ".@sub^dir^a@.");
        assert_eq!(ifcreate_record("x"), ".%x%.");
        assert_eq!(ifchange_record("odd^name"), ".@odd@^name@.");
    }
}

//! Stamps summarize the state of a file on disk.  This is what redo
//! uses to determine whether a dependency has changed since it was
//! recorded.

use std::hash::Hasher;
use std::io::Read;
use std::path::Path;

use metrohash::MetroHash64;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// The sentinel byte recorded for a dependency that yields no
/// artifact.  A single byte can never collide with a concrete stamp.
pub const ABSENT: u8 = b'!';

/// An opaque summary of a filesystem object at a point in time.
///
/// Regular files are summarized by a content hash, directories by
/// their modification time.  Something that does not exist is
/// summarized by a distinguished single-byte sentinel.  Comparison is
/// byte equality on the payload; nothing else may be assumed about
/// its shape.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Stamp(Vec<u8>);

impl Stamp {
    /// The stamp of something that does not exist.
    pub fn absent() -> Stamp {
        Stamp(vec![ABSENT])
    }
    /// Does this stamp denote a missing file?
    pub fn is_absent(&self) -> bool {
        self.0 == [ABSENT]
    }
    /// The raw payload, as persisted in a metadata record.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    /// Reconstruct a stamp from a persisted record payload.
    pub fn from_bytes(b: &[u8]) -> Stamp {
        Stamp(b.to_vec())
    }
}

fn hex(i: u64) -> [u8; 16] {
    let mut out = [0; 16];
    for x in 0..16 {
        let hexit = ((i >> (x * 4)) & 15) as u8;
        if hexit < 10 {
            out[x] = b'0' + hexit;
        } else {
            out[x] = b'a' + (hexit - 10);
        }
    }
    out
}

#[cfg(test)]
fn unhex(i: &[u8]) -> u64 {
    let mut out = 0;
    for x in 0..16 {
        let hexit = if i[x] < b'a' {
            i[x] - b'0'
        } else {
            10 + i[x] - b'a'
        };
        out += (hexit as u64) << (x * 4);
    }
    out
}

#[cfg(test)]
quickcheck::quickcheck! {
    fn prop_hex_roundtrip(i: u64) -> bool {
        unhex(&hex(i)) == i
    }
}

fn hex_string(i: u64) -> String {
    String::from_utf8_lossy(&hex(i)).into_owned()
}

/// Stamp a path.  Returns the absent stamp if the path does not
/// exist.
pub fn stamp(f: &Path) -> Stamp {
    let m = match std::fs::metadata(f) {
        Ok(m) => m,
        Err(_) => return Stamp::absent(),
    };
    if m.is_dir() {
        Stamp(mtime_of(&m).into_bytes())
    } else {
        match hash_contents(f) {
            Ok(h) => Stamp(hex(h).to_vec()),
            Err(_) => Stamp::absent(),
        }
    }
}

#[cfg(unix)]
fn mtime_of(m: &std::fs::Metadata) -> String {
    format!("{}.{}", m.mtime(), m.mtime_nsec())
}

#[cfg(not(unix))]
fn mtime_of(m: &std::fs::Metadata) -> String {
    match m.modified() {
        Ok(t) => match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => format!("{}.{}", d.as_secs(), d.subsec_nanos()),
            Err(_) => String::from("0.0"),
        },
        Err(_) => String::from("0.0"),
    }
}

fn hash_contents(f: &Path) -> std::io::Result<u64> {
    let mut file = std::fs::File::open(f)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    let mut h = MetroHash64::new();
    h.write(&contents);
    Ok(h.finish())
}

/// A stable digest of a target's canonical path, used to name its
/// metadata directory and lock file.
pub fn hash_target_id(path: &Path) -> String {
    let mut h = MetroHash64::new();
    h.write(osstr_to_bytes(path.as_os_str()));
    hex_string(h.finish())
}

use std::ffi::OsStr;
#[cfg(unix)]
use std::os::unix::ffi::OsStrExt;
/// Convert OsStr to bytes
#[cfg(unix)]
pub fn osstr_to_bytes(b: &OsStr) -> &[u8] {
    OsStr::as_bytes(b)
}

/// Convert OsStr to bytes
#[cfg(not(unix))]
pub fn osstr_to_bytes(b: &OsStr) -> &[u8] {
    b.to_str().unwrap().as_bytes()
}

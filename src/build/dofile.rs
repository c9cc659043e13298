//! Locating the `.do` script that builds a target.

use std::path::{Path, PathBuf};

/// A build script for some target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoFile {
    /// Absolute path of the script.
    pub path: PathBuf,
    /// For a `default*.do`, the extension suffix the script matched
    /// (possibly empty); `None` for a target-specific script.
    pub suffix: Option<String>,
}

impl DoFile {
    /// The directory the script runs in.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// The `$2` argument for a given `$1`: the target with the
    /// matched default suffix stripped, or `$1` itself for a
    /// target-specific script.
    pub fn base_arg(&self, one: &str) -> String {
        match self.suffix {
            None => String::from(one),
            Some(ref s) => {
                if !s.is_empty() && one.ends_with(s.as_str()) {
                    String::from(&one[..one.len() - s.len()])
                } else {
                    String::from(one)
                }
            }
        }
    }
}

/// The `default*.do` names that could build a file called `name`,
/// most specific first, each paired with the extension suffix it
/// strips.
fn default_candidates(name: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(i) = name[pos..].find('.') {
        let suffix = &name[pos + i..];
        out.push((format!("default{}.do", suffix), String::from(suffix)));
        pos = pos + i + 1;
    }
    out.push((String::from("default.do"), String::new()));
    out
}

/// Locate the `.do` script for `target` (a canonical absolute path):
/// first `<name>.do` next to the target, then `default<.exts>.do`
/// with successively shorter extension suffixes, in the target's
/// directory and then each ancestor up to the filesystem root.  The
/// target-specific name is never looked for in ancestors.
pub fn find(target: &Path) -> Option<DoFile> {
    let name = match target.file_name() {
        Some(n) => n.to_string_lossy().into_owned(),
        None => return None,
    };
    let dir = match target.parent() {
        Some(d) => PathBuf::from(d),
        None => return None,
    };
    let specific = dir.join(format!("{}.do", name));
    if specific.is_file() {
        return Some(DoFile {
            path: specific,
            suffix: None,
        });
    }
    let candidates = default_candidates(&name);
    let mut search = Some(dir.as_path());
    while let Some(d) = search {
        for &(ref cand, ref suffix) in candidates.iter() {
            let p = d.join(cand);
            if p.is_file() {
                return Some(DoFile {
                    path: p,
                    suffix: Some(suffix.clone()),
                });
            }
        }
        search = d.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_candidates_strip_successive_extensions() {
        assert_eq!(
            default_candidates("a.tar.gz"),
            vec![
                (String::from("default.tar.gz.do"), String::from(".tar.gz")),
                (String::from("default.gz.do"), String::from(".gz")),
                (String::from("default.do"), String::new()),
            ]
        );
    }

    #[test]
    fn extensionless_names_only_match_plain_default() {
        assert_eq!(
            default_candidates("all"),
            vec![(String::from("default.do"), String::new())]
        );
    }

    #[test]
    fn base_arg_strips_the_matched_suffix() {
        let d = DoFile {
            path: PathBuf::from("/top/default.ext.do"),
            suffix: Some(String::from(".ext")),
        };
        assert_eq!(d.base_arg("sub/thing.ext"), "sub/thing");
        let plain = DoFile {
            path: PathBuf::from("/top/default.do"),
            suffix: Some(String::new()),
        };
        assert_eq!(plain.base_arg("all"), "all");
        let specific = DoFile {
            path: PathBuf::from("/top/t.do"),
            suffix: None,
        };
        assert_eq!(specific.base_arg("t"), "t");
    }
}

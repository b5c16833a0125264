//! Path resolution for rule matching.
//!
//! Candidates and pattern prefixes are both resolved to absolute,
//! symlink-resolved paths before comparison, so `../` segments and symlinks
//! pointing out of an allowed tree cannot be used to bypass a rule.

use std::path::{Component, Path, PathBuf};

/// Resolves `candidate` against `base` into an absolute path.
///
/// `~` and `~/...` expand to the home directory. The longest existing
/// ancestor is canonicalized (resolving symlinks); the remaining,
/// not-yet-existing components are folded lexically.
///
/// Returns `None` for empty input, embedded NUL bytes, or when the home
/// directory is needed but unknown.
pub fn resolve(candidate: &str, base: &Path) -> Option<PathBuf> {
    if candidate.is_empty() || candidate.contains('\0') {
        return None;
    }

    let expanded = expand_home(candidate)?;
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    if !joined.is_absolute() {
        return None;
    }

    Some(canonicalize_existing(&joined))
}

/// Returns `true` if `path` is `dir` or lies underneath it.
///
/// Both paths are expected to be resolved already.
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

fn expand_home(path: &str) -> Option<PathBuf> {
    if path == "~" {
        return dirs::home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return dirs::home_dir().map(|home| home.join(rest));
    }
    Some(PathBuf::from(path))
}

fn canonicalize_existing(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            let rest = path.strip_prefix(ancestor).unwrap_or_else(|_| Path::new(""));
            return normalize(&canonical.join(rest));
        }
    }
    normalize(path)
}

/// Folds `.` and `..` components without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_candidate_is_unresolvable() {
        assert_eq!(resolve("", Path::new("/tmp")), None);
        assert_eq!(resolve("a\0b", Path::new("/tmp")), None);
    }

    #[test]
    fn test_normalize_folds_parent_segments() {
        assert_eq!(
            normalize(Path::new("/project/src/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(normalize(Path::new("/../..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_relative_candidate_joins_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let resolved = resolve("./src/index.ts", &base).unwrap();
        assert_eq!(resolved, base.join("src/index.ts"));
    }

    #[test]
    fn test_traversal_escapes_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let resolved = resolve("src/../../outside.txt", &base).unwrap();
        assert!(!is_within(&resolved, &base));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let project = base.join("project");
        let outside = base.join("outside");
        fs::create_dir_all(&project).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, project.join("sneaky_link")).unwrap();

        let resolved = resolve("sneaky_link/secret.txt", &project).unwrap();
        assert_eq!(resolved, outside.join("secret.txt"));
        assert!(!is_within(&resolved, &project));
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            let resolved = resolve("~/notes.txt", Path::new("/")).unwrap();
            let home = home.canonicalize().unwrap_or(home);
            assert!(resolved.starts_with(&home));
        }
    }
}

//! Repository-relative path resolution
//!
//! Every caller-supplied path crosses through [`to_relative`] before any
//! backend touches it. This is the sandboxing boundary: paths that escape
//! the repository root are rejected here, never executed against.

use std::path::{Component, Path, PathBuf};

use crate::error::{GitError, GitResult};

/// Convert `path` to repository-root-relative form.
///
/// Relative inputs are lexically cleaned (collapsing `.` and `..` segments);
/// absolute inputs are stripped of the root prefix first. Either way, a
/// result that would climb above the root is rejected with
/// [`GitError::PathEscapesRoot`].
pub fn to_relative(root: &Path, path: &Path) -> GitResult<PathBuf> {
    let candidate = if path.is_absolute() {
        match clean(path).strip_prefix(clean(root)) {
            Ok(stripped) => stripped.to_path_buf(),
            Err(_) => return Err(GitError::PathEscapesRoot(path.to_path_buf())),
        }
    } else {
        clean(path)
    };

    if candidate.components().next() == Some(Component::ParentDir) {
        return Err(GitError::PathEscapesRoot(path.to_path_buf()));
    }

    Ok(candidate)
}

/// Lexically clean a path: drop `.` segments and fold `..` into the
/// preceding segment where one exists. Leading `..` segments are kept so
/// the caller can detect escapes.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if popped {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn root() -> PathBuf {
        PathBuf::from("/repo")
    }

    #[test]
    fn test_relative_passthrough() {
        let rel = to_relative(&root(), Path::new("docs/plans/feature.md")).unwrap();
        assert_eq!(rel, PathBuf::from("docs/plans/feature.md"));
    }

    #[test]
    fn test_relative_cleans_dot_segments() {
        let rel = to_relative(&root(), Path::new("./docs/./plans/../plans/a.md")).unwrap();
        assert_eq!(rel, PathBuf::from("docs/plans/a.md"));
    }

    #[test]
    fn test_relative_escape_rejected() {
        let err = to_relative(&root(), Path::new("../outside.md")).unwrap_err();
        assert!(matches!(err, GitError::PathEscapesRoot(_)));

        let err = to_relative(&root(), Path::new("docs/../../outside.md")).unwrap_err();
        assert!(matches!(err, GitError::PathEscapesRoot(_)));
    }

    #[test]
    fn test_absolute_inside_root() {
        let rel = to_relative(&root(), Path::new("/repo/docs/plan.md")).unwrap();
        assert_eq!(rel, PathBuf::from("docs/plan.md"));
    }

    #[test]
    fn test_absolute_outside_root_rejected() {
        let err = to_relative(&root(), Path::new("/elsewhere/plan.md")).unwrap_err();
        assert!(matches!(err, GitError::PathEscapesRoot(_)));
    }

    #[test]
    fn test_root_itself_is_empty_relative() {
        let rel = to_relative(&root(), Path::new("/repo")).unwrap();
        assert_eq!(rel, PathBuf::new());
    }
}

//! Path normalization and symlink resolution.

mod resolver;

pub use resolver::resolve_path;

use std::path::{Component, Path, PathBuf};

/// Lexically collapse `.` and `..` without touching the filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::RootDir) | Some(Component::Prefix(_))
                    )
                {
                    components.pop();
                }
            }
            Component::CurDir => {}
            c => components.push(c),
        }
    }

    if components.is_empty() {
        PathBuf::from(".")
    } else {
        components.iter().collect()
    }
}

/// Equal to `root` or located beneath it. Both sides must already be resolved.
pub(crate) fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_path(Path::new("/a/./b")), PathBuf::from("/a/b"));
        assert_eq!(
            normalize_path(Path::new("/a/b/../../c")),
            PathBuf::from("/c")
        );
        assert_eq!(normalize_path(Path::new("/../..")), PathBuf::from("/"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(Path::new("/w"), Path::new("/w")));
        assert!(is_within(Path::new("/w/a/b.py"), Path::new("/w")));
        assert!(!is_within(Path::new("/workspace"), Path::new("/w")));
        assert!(!is_within(Path::new("/"), Path::new("/w")));
    }
}

//! Symlink-free absolute path resolution for paths that may not exist yet.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::security::PathCheckError;

/// Resolve `path` (relative paths are taken against `base`) to an absolute,
/// symlink-free form.
///
/// Existing prefixes are resolved through the filesystem one component at a
/// time, so `..` always applies to the real parent. Once a component does not
/// exist, the remainder is appended lexically: a write target usually does
/// not exist yet. Symlink loops, dangling symlinks and I/O failures are
/// errors, never a best-effort answer.
pub fn resolve_path(path: &Path, base: &Path) -> Result<PathBuf, PathCheckError> {
    if path.as_os_str().is_empty() {
        return Err(PathCheckError::EmptyPath);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut resolved = PathBuf::new();
    let mut missing = false;

    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                resolved.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
                if missing {
                    missing = std::fs::symlink_metadata(&resolved).is_err();
                }
            }
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                if missing {
                    resolved = candidate;
                    continue;
                }

                match std::fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        resolved = match std::fs::canonicalize(&candidate) {
                            Ok(target) => target,
                            Err(e) if e.kind() == ErrorKind::NotFound => {
                                return Err(PathCheckError::DanglingSymlink(candidate));
                            }
                            Err(e) => return Err(PathCheckError::io(candidate, e)),
                        };
                    }
                    Ok(_) => resolved = candidate,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        missing = true;
                        resolved = candidate;
                    }
                    Err(e) => return Err(PathCheckError::io(candidate, e)),
                }
            }
        }
    }

    Ok(resolved)
}

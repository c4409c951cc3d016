//! Path resolution error types.

use std::path::PathBuf;
use thiserror::Error;

#[cfg(target_os = "linux")]
const ELOOP: i32 = 40;
#[cfg(not(target_os = "linux"))]
const ELOOP: i32 = 62;

#[derive(Debug, Error)]
pub enum PathCheckError {
    #[error("empty path")]
    EmptyPath,

    #[error("symlink loop while resolving {0}")]
    SymlinkLoop(PathBuf),

    #[error("dangling symlink: {0}")]
    DanglingSymlink(PathBuf),

    #[error("cannot resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PathCheckError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.raw_os_error() == Some(ELOOP) {
            return Self::SymlinkLoop(path);
        }
        Self::Io { path, source }
    }
}

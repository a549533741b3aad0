use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HplTuneError>;

#[derive(Error, Debug)]
pub enum HplTuneError {
    /// non-positive cluster dimensions, unusable paths. Fatal, aborts planning.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("i/o error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// directory already exists. Recovered locally during materialization,
    /// never propagated out of it.
    #[error("directory already exists: {0}")]
    FilesystemConflict(PathBuf),

    /// one run log could not be parsed. Recovered per file, excluded from
    /// ranking, listed at the end of the report.
    #[error("malformed result in '{path}': {reason}")]
    MalformedResult { path: PathBuf, reason: String },

    /// a configuration directory produced no parsable results
    #[error("no parsable results for configuration '{0}'")]
    EmptyGroup(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("plan codec error: {0}")]
    PlanCodec(#[from] bincode::Error),
}

impl HplTuneError {
    /// classify a filesystem error against the path it occurred at, keeping
    /// conflict and permission outcomes distinguishable from generic i/o
    pub fn from_fs(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::AlreadyExists => Self::FilesystemConflict(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

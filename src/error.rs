use std::{
    fmt,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub type Result<T, E = IndexError> = std::result::Result<T, E>;

/// Various error types for the indexing pipeline.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Io(#[from] IndexIoError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// libclang could not be loaded or initialized.
    #[error("clang frontend unavailable: {0}")]
    FrontendUnavailable(String),
    /// A translation unit failed to parse after all retries.
    #[error("failed to parse \"{}\": {reason}", file.display())]
    Parse { file: PathBuf, reason: String },
    /// The pattern was rejected by the safety validator before compilation.
    #[error("unsafe search pattern: {0}")]
    UnsafePattern(String),
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("{0}")]
    Message(String),
}

impl IndexError {
    pub fn io(err: io::Error, path: impl Into<PathBuf>) -> Self {
        IndexIoError::new(err, path).into()
    }

    pub fn msg(msg: impl fmt::Display) -> Self {
        IndexError::Message(msg.to_string())
    }

    pub fn parse(file: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        IndexError::Parse { file: file.into(), reason: reason.to_string() }
    }
}

/// A wrapper for IO errors that also carries the path that produced them.
#[derive(Debug, Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct IndexIoError {
    io: io::Error,
    path: PathBuf,
}

impl IndexIoError {
    pub fn new(io: io::Error, path: impl Into<PathBuf>) -> Self {
        Self { io, path: path.into() }
    }

    /// The path at which the error occurred.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying `io::Error`.
    pub fn source(&self) -> &io::Error {
        &self.io
    }
}

impl From<IndexIoError> for io::Error {
    fn from(err: IndexIoError) -> Self {
        err.io
    }
}

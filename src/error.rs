use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating, deriving, comparing or drawing fields.
#[derive(Error, Debug)]
pub enum TaylorError {
    /// A source store, a variable inside a store, or a mask could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A code path that is deliberately not implemented (unknown derived
    /// variable, split component files, unknown image format).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A field does not have the shape or axes an operation needs.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or undecodable Zarr metadata or chunk data.
    #[error("store error: {0}")]
    Store(String),

    #[error("render error: {0}")]
    Render(String),
}

impl TaylorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, TaylorError>;

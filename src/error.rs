use std::io;

use thiserror::Error;

/// The error type for cabinet-set construction.
#[derive(Debug, Error)]
pub enum CabError {
    /// The builder was configured with an illegal option (volume limit
    /// too small, reserve area out of range, bad compression selector).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An operation was attempted in the wrong order, such as adding a
    /// file before any folder exists or flushing an empty archive.
    #[error("invalid archive state: {0}")]
    State(String),

    /// A read from a source file or a write to a volume failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for cabinet-set construction.
pub type Result<T> = std::result::Result<T, CabError>;

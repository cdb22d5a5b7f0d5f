//! Error types for inbox file I/O

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or rewriting an inbox file
#[derive(Error, Debug)]
pub enum InboxError {
    /// Failed to acquire the advisory lock after multiple retries
    #[error("failed to acquire lock on {path} after {retries} retries")]
    LockTimeout { path: PathBuf, retries: u32 },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid inbox path (e.g. empty recipient handle)
    #[error("invalid inbox path: {path}")]
    InvalidPath { path: PathBuf },
}

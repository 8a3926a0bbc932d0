use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaChunkError {
    #[error("Duration probe failed: {0}")]
    ProbeError(String),

    #[error("Duration probe of {} timed out after {}s", path.display(), timeout.as_secs())]
    ProbeTimeout { path: PathBuf, timeout: Duration },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cutting chunk {index} failed: {stderr_tail}")]
    CutFailed { index: usize, stderr_tail: String },

    #[error("Slicing incomplete: planned {expected} chunks, produced {produced}")]
    SliceIncomplete { expected: usize, produced: usize },

    #[error("Unrecognized embedding response shape: {0}")]
    UnrecognizedResponseShape(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MediaChunkError>;

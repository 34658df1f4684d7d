use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("probe error: {0}")]
    Probe(String),

    #[error("detector error: {0}")]
    Detector(String),

    #[error("{tool} timed out after {}s", timeout.as_secs_f64())]
    Timeout { tool: String, timeout: Duration },
}

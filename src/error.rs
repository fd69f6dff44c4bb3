//! Error types for Cradle Fusion

use thiserror::Error;

/// Errors that can occur while loading models or deciding on a reading
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Failed to load model artifact: {0}")]
    ModelLoad(String),

    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid sensor reading: {0}")]
    InvalidReading(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

use std::path::PathBuf;

/// Result type for captioning operations
pub type Result<T> = std::result::Result<T, CaptionError>;

/// Error types for everything that can go wrong while captioning one video
#[derive(thiserror::Error, Debug)]
pub enum CaptionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Model returned no output: {0}")]
    EmptyResponse(String),

    #[error("Video error for {path}: {message}")]
    Video { path: PathBuf, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptionError {
    pub fn video(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Video {
            path: path.into(),
            message: message.into(),
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("HTTP error: {message}")]
    Http { status: Option<u16>, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("background task failed: {0}")]
    Background(String),
}

impl From<tokio::task::JoinError> for InfraError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Background(error.to_string())
    }
}

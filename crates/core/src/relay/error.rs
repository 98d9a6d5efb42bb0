use thiserror::Error;

/// Errors from persisting log entries.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log sink unavailable: {0}")]
    Unavailable(String),
}

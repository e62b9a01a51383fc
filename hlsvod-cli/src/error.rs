use hlsvod_engine::{ErrorKind, VodError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Engine(#[from] VodError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration file error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// The download job itself failed
    #[error("{kind}: {message}")]
    Job { kind: ErrorKind, message: String },
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Status check failed: {message}")]
    Status { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}

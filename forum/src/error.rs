use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForumError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("User cookie is required but not found in request headers")]
    MissingToken,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Method not allowed: {method}")]
    MethodNotAllowed { method: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Malformed stored document: {message}")]
    Document { message: String },
}

pub type ForumResult<T> = Result<T, ForumError>;

impl ForumError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// HTTP status the endpoint layer answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::MissingToken => 400,
            Self::Unauthorized { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Conflict { .. } => 409,
            Self::Config { .. } | Self::Store(_) | Self::Document { .. } => 500,
        }
    }

    /// Human-readable text for the `error` field of a failed response.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message }
            | Self::Unauthorized { message }
            | Self::NotFound { message }
            | Self::Config { message } => message.clone(),
            Self::MissingToken => self.to_string(),
            Self::Conflict { .. } => {
                "Another change landed while yours was being saved. Please submit again."
                    .to_string()
            }
            Self::MethodNotAllowed { .. } => {
                "Method not allowed. Only POST requests are accepted.".to_string()
            }
            Self::Store(err) => err.to_string(),
            Self::Document { .. } => "Stored content could not be read.".to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ForumError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Document {
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ForumError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { branch } => Self::Conflict {
                message: format!("branch {} moved during the write", branch),
            },
            StoreError::Validation { message } => Self::Validation { message },
            other => Self::Store(other),
        }
    }
}

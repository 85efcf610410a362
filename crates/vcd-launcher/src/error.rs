//! Error types for application launches

use thiserror::Error;

/// Result type for launch operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Launch errors
///
/// Every variant terminates only the request that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid user: {0}")]
    InvalidUser(String),

    #[error("Unknown application: {0}")]
    InvalidApplication(String),

    #[error("Failed to load security profile: {0}")]
    ProfileLoad(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LaunchError {
    /// Whether the caller is at fault (as opposed to this service or the runtime)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LaunchError::BadRequest(_)
                | LaunchError::InvalidUser(_)
                | LaunchError::InvalidApplication(_)
        )
    }
}

impl From<bollard::errors::Error> for LaunchError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError { message, .. } => {
                LaunchError::Runtime(message)
            }
            other => LaunchError::Runtime(other.to_string()),
        }
    }
}

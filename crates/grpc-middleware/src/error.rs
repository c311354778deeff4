//! Error types for the middleware crate.

use thiserror::Error;
use tonic::Status;

use crate::config::ConfigError;
use crate::ratelimit::LimitError;

/// Result type for middleware setup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling or running the middleware.
#[derive(Debug, Error)]
pub enum Error {
    /// A logging interceptor was built without a logger.
    #[error("a logger is required to build the logging interceptor")]
    MissingLogger,

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The gRPC transport failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The rate limiter could not be built, or rejected a call.
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] LimitError),
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::MissingLogger => Status::internal(err.to_string()),
            Error::Config(e) => Status::failed_precondition(format!("Configuration error: {}", e)),
            Error::Transport(e) => Status::unavailable(format!("Transport error: {}", e)),
            Error::RateLimit(e @ LimitError::Exhausted) => Status::resource_exhausted(e.to_string()),
            Error::RateLimit(e) => Status::failed_precondition(format!("Rate limit error: {}", e)),
        }
    }
}

//! Unified error handling for Flight authentication

use thiserror::Error;
use tonic::Status;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("handshake stream closed by peer")]
    StreamClosed,

    #[error("transport error: {0}")]
    Transport(#[from] Status),

    #[error("must authenticate first")]
    MissingCredentials,

    #[error("unsupported authorization scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid basic auth encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("invalid binary auth token")]
    InvalidBinaryToken,

    #[error("malformed credentials")]
    MalformedCredentials,

    #[error("issued token cannot be sent as metadata")]
    InvalidTokenValue,

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Transport(status) => status,
            AuthError::StreamClosed => Status::aborted(err.to_string()),
            AuthError::MissingCredentials
            | AuthError::UnsupportedScheme(_)
            | AuthError::InvalidEncoding(_)
            | AuthError::InvalidBinaryToken
            | AuthError::MalformedCredentials => Status::unauthenticated(err.to_string()),
            AuthError::InvalidTokenValue => {
                tracing::error!("Validator issued a token that is not a valid metadata value");
                Status::internal("failed to attach issued token")
            }
            AuthError::Config(msg) => {
                tracing::error!("Authentication misconfigured: {}", msg);
                Status::failed_precondition("authentication is not configured")
            }
        }
    }
}

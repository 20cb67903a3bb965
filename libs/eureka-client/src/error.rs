use thiserror::Error;

use crate::binding::BindingError;
use crate::codec::CodecError;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Connection, TLS, timeout or deadline failure after retries and
    /// endpoint failover were exhausted.
    #[error(transparent)]
    Transport(#[from] eureka_http::HttpError),

    /// The registry answered with a non-2xx status on the final attempt.
    #[error("Unexpected response code {code}")]
    UnexpectedStatus { code: u16 },

    /// The response body is not a valid registry document. Never retried.
    #[error("invalid registry response: {0}")]
    Decode(#[source] CodecError),

    #[error("cannot encode request body: {0}")]
    Encode(#[source] CodecError),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("registry authentication failed: {0}")]
    Auth(#[from] eureka_auth::TokenError),

    #[error(transparent)]
    Binding(#[from] BindingError),
}

impl RegistryError {
    /// Status code of an [`UnexpectedStatus`](Self::UnexpectedStatus) error.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { code } => Some(*code),
            _ => None,
        }
    }
}

//! Error types for the resource client.

use std::sync::Arc;

use thiserror::Error;

/// Failure of a client load. The local cache is left untouched on every variant.
///
/// `Clone` so one result can be shared by every caller of a collapsed request.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    /// The origin answered with a status other than 2xx or 304.
    #[error("origin returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {message}")]
    Decode { message: String },

    #[error("invalid resource url: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

use studycache_api_types::CacheType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid input: {message}")]
    Validation { message: String },
    #[error("invalid key pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error("payload does not match cache type {cache_type}: {source}")]
    Payload {
        cache_type: CacheType,
        #[source]
        source: serde_json::Error,
    },
    #[error("confirmation rejected: {reason}")]
    InvalidConfirmation { reason: &'static str },
    #[error("unsupported cache action `{action}`")]
    Unsupported { action: String },
}

impl CacheError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unsupported(action: impl Into<String>) -> Self {
        Self::Unsupported {
            action: action.into(),
        }
    }
}

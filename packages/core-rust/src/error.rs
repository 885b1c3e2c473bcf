//! Errors produced by the short-link service and its storage engines.

use crate::codec::CodecError;

/// Caller-facing message for a short code with no record.
pub const NOT_FOUND_MESSAGE: &str = "This URL does not exist yet";

/// Caller-facing message for an unparseable short code or long URL.
pub const MALFORMED_MESSAGE: &str = "This URL is not valid";

#[derive(Debug, thiserror::Error)]
pub enum ShortenerError {
    /// Bad short code or invalid long URL. Never retried.
    #[error("{msg}: {reason}", msg = MALFORMED_MESSAGE)]
    MalformedInput { reason: String },
    /// No record matches. Never retried.
    #[error("{}", NOT_FOUND_MESSAGE)]
    NotFound,
    /// Backing store failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ShortenerError {
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            reason: reason.into(),
        }
    }

    /// Whether this error is the caller's fault rather than the system's.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedInput { .. } | Self::NotFound)
    }
}

impl From<CodecError> for ShortenerError {
    fn from(err: CodecError) -> Self {
        Self::malformed(err.to_string())
    }
}

//! Failure taxonomy for the dispatch layer.

use std::time::Duration;

use linkgate_core::ShortenerError;

/// Text that marks a total absence of live endpoints, including when it is
/// reported by a downstream hop inside an opaque upstream error.
pub const NO_ENDPOINTS_TEXT: &str = "no endpoints available";

/// Body a gateway answers with when an action has no backend instance.
/// Seen from a downstream hop, it means the same as [`NO_ENDPOINTS_TEXT`].
pub const UNAVAILABLE_MESSAGE: &str = "Service unavailable, try again later";

/// Errors produced while dispatching a call to a backend role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Bad short code or long URL. Terminal.
    #[error("{0}")]
    MalformedInput(String),
    /// No record for the short code. Terminal.
    #[error("{0}")]
    NotFound(String),
    /// Discovery currently reports no instance for the action. Retryable.
    #[error("{}", NO_ENDPOINTS_TEXT)]
    NoEndpointsAvailable,
    /// Connection, protocol, or body-decoding failure. Retryable.
    #[error("transport failure: {0}")]
    Transport(String),
    /// A single attempt exceeded its deadline. Retryable.
    #[error("attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// The attempt budget ran out; `last` is the final attempt's error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<DispatchError>,
    },
    /// The command's breaker is open; no attempt was made.
    #[error("circuit open for command {command}")]
    CircuitOpen { command: &'static str },
    /// Opaque failure reported by a downstream instance. Retryable.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Discovery produced an address that cannot be turned into an endpoint.
    #[error("invalid endpoint address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    /// A call was routed to an endpoint built for another action.
    #[error("internal dispatch error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Builds a `Timeout` from the elapsed budget.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = after.as_millis() as u64;
        Self::Timeout { timeout_ms }
    }

    /// Whether another attempt might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoEndpointsAvailable
                | Self::Transport(_)
                | Self::Timeout { .. }
                | Self::Upstream(_)
        )
    }

    /// Whether the error is the caller's fault (a business outcome, not a failure).
    #[must_use]
    pub fn is_business(&self) -> bool {
        matches!(self, Self::MalformedInput(_) | Self::NotFound(_))
    }

    /// Whether the error means no live endpoint exists for the action.
    ///
    /// Looks through `RetriesExhausted` and inside upstream error text.
    #[must_use]
    pub fn indicates_no_endpoints(&self) -> bool {
        match self {
            Self::NoEndpointsAvailable => true,
            Self::RetriesExhausted { last, .. } => last.indicates_no_endpoints(),
            Self::Upstream(text) | Self::Transport(text) => {
                text.to_ascii_lowercase().contains(NO_ENDPOINTS_TEXT)
            }
            _ => false,
        }
    }
}

impl From<ShortenerError> for DispatchError {
    fn from(err: ShortenerError) -> Self {
        match err {
            ShortenerError::MalformedInput { .. } => Self::MalformedInput(err.to_string()),
            ShortenerError::NotFound => Self::NotFound(err.to_string()),
            ShortenerError::Storage(e) => Self::Upstream(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(DispatchError::NoEndpointsAvailable.is_retryable());
        assert!(DispatchError::Transport("reset".into()).is_retryable());
        assert!(DispatchError::Timeout { timeout_ms: 5 }.is_retryable());
        assert!(DispatchError::Upstream("500".into()).is_retryable());

        assert!(!DispatchError::MalformedInput("x".into()).is_retryable());
        assert!(!DispatchError::NotFound("x".into()).is_retryable());
        assert!(!DispatchError::CircuitOpen { command: "info" }.is_retryable());
        assert!(!DispatchError::InvalidAddress {
            address: "a:b:c".into(),
            reason: "too many colons".into()
        }
        .is_retryable());
    }

    #[test]
    fn business_errors() {
        assert!(DispatchError::MalformedInput("x".into()).is_business());
        assert!(DispatchError::NotFound("x".into()).is_business());
        assert!(!DispatchError::NoEndpointsAvailable.is_business());
    }

    #[test]
    fn no_endpoints_is_detected_through_wrappers() {
        let exhausted = DispatchError::RetriesExhausted {
            attempts: 3,
            last: Box::new(DispatchError::NoEndpointsAvailable),
        };
        assert!(exhausted.indicates_no_endpoints());

        let upstream = DispatchError::Upstream("503: No endpoints available".into());
        assert!(upstream.indicates_no_endpoints());

        let other = DispatchError::RetriesExhausted {
            attempts: 3,
            last: Box::new(DispatchError::Transport("connection refused".into())),
        };
        assert!(!other.indicates_no_endpoints());
    }

    #[test]
    fn shortener_errors_map_to_business_errors() {
        let err: DispatchError = ShortenerError::NotFound.into();
        assert_eq!(err, DispatchError::NotFound("This URL does not exist yet".into()));

        let err: DispatchError = ShortenerError::malformed("bad").into();
        assert!(matches!(err, DispatchError::MalformedInput(_)));
    }

    #[test]
    fn timeout_from_duration() {
        assert_eq!(
            DispatchError::timeout(Duration::from_millis(1500)),
            DispatchError::Timeout { timeout_ms: 1500 }
        );
    }
}

use std::time::Duration;

use tokio::time::Instant;

/// Per-request context threaded from the HTTP edge through dispatch.
///
/// Carries the externally visible base URL (sent downstream as
/// `X-Forwarded-Host`), the trace identifier (sent as `X-Request-Id`), and an
/// optional caller deadline that bounds every outbound attempt. The deadline
/// is measured on the tokio clock, the same one the retrier and breaker use.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Base URL as seen by the original caller, e.g. `http://sho.rt/`.
    pub forwarded_base: String,
    /// Distributed trace identifier for observability.
    pub trace_id: String,
    /// Point in time after which no further work should be started.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    #[must_use]
    pub fn new(forwarded_base: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            forwarded_base: forwarded_base.into(),
            trace_id: trace_id.into(),
            deadline: None,
        }
    }

    /// Sets the deadline to `budget` from now.
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    /// Time left before the deadline. `None` means unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

//! Request and response values flowing through the dispatch pipeline.

use linkgate_core::{
    Action, FallbackResponse, InfoResponse, RedirectResponse, RequestContext, ShortenResponse,
};

/// A decoded inbound call, one variant per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve { short_code: String },
    Info { short_code: String },
    Shorten { long_url: String },
}

impl Call {
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Call::Resolve { .. } => Action::Resolve,
            Call::Info { .. } => Action::Info,
            Call::Shorten { .. } => Action::Shorten,
        }
    }
}

/// A call plus the context it runs under.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub call: Call,
    pub ctx: RequestContext,
}

impl DispatchRequest {
    #[must_use]
    pub fn new(call: Call, ctx: RequestContext) -> Self {
        Self { call, ctx }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.call.action()
    }
}

/// Successful (or gracefully degraded) outcome of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResponse {
    /// Resolve succeeded; `url` is also the redirect target.
    Resolved(RedirectResponse),
    Info(InfoResponse),
    Shortened(ShortenResponse),
    /// The command could not reach a healthy backend and degraded.
    Fallback(FallbackResponse),
}

impl DispatchResponse {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchResponse::Fallback(_) => "fallback",
            _ => "ok",
        }
    }

    /// Redirect target, for resolved calls.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            DispatchResponse::Resolved(r) => Some(&r.url),
            _ => None,
        }
    }
}

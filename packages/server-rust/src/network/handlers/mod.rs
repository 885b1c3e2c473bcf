//! HTTP handler definitions for every role.
//!
//! Defines the shared axum states and re-exports all handler functions for
//! building the routers.

pub mod backend;
pub mod error;
pub mod gateway;
pub mod health;

pub use backend::{backend_info_handler, backend_resolve_handler, backend_shorten_handler};
pub use error::ApiError;
pub use gateway::{
    breakers_handler, gateway_info_handler, gateway_resolve_handler, gateway_shorten_handler,
};
pub use health::{
    backend_healthz_handler, gateway_healthz_handler, health_handler, liveness_handler,
    readiness_handler,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use linkgate_core::RequestContext;

use super::{NetworkConfig, Role, ShutdownController};
use crate::dispatch::endpoint::{FORWARDED_HOST_HEADER, REQUEST_ID_HEADER};
use crate::dispatch::Gateway;
use crate::service::{DispatchPipeline, ShortenerService};

/// State shared by every role. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub role: Role,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Process start, for uptime.
    pub start_time: Instant,
}

/// State of the resolver, shortener, and all-in-one roles.
#[derive(Clone)]
pub struct BackendState {
    pub app: AppState,
    pub shortener: ShortenerService,
}

impl FromRef<BackendState> for AppState {
    fn from_ref(state: &BackendState) -> Self {
        state.app.clone()
    }
}

/// State of the gateway role.
#[derive(Clone)]
pub struct GatewayState {
    pub app: AppState,
    /// Breaker snapshots and shutdown.
    pub gateway: Gateway,
    /// The gateway wrapped in dispatch middleware; every call goes through it.
    pub pipeline: DispatchPipeline,
}

impl FromRef<GatewayState> for AppState {
    fn from_ref(state: &GatewayState) -> Self {
        state.app.clone()
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Base URL the caller reached us on: `http://{Host}/`.
#[must_use]
pub fn own_base(headers: &HeaderMap) -> String {
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}/")
}

/// Base for short URLs built by backend roles: the gateway's forwarded base
/// when present, otherwise our own.
#[must_use]
pub fn backend_base(headers: &HeaderMap) -> String {
    forwarded_base(headers).unwrap_or_else(|| own_base(headers))
}

/// Non-empty `X-Forwarded-Host` value, if any.
#[must_use]
pub fn forwarded_base(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_HOST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Request id assigned by the HTTP layer, or a fresh one.
#[must_use]
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string)
}

/// Longest slack kept between the dispatch deadline and the HTTP timeout.
const MAX_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

/// Dispatch budget for a request allowed `request_timeout` at the HTTP layer.
///
/// Strictly shorter than `request_timeout` (by a tenth, at most one second),
/// so the command settles its own deadline and records the outcome before
/// the HTTP layer gives up on the request.
#[must_use]
pub fn dispatch_budget(request_timeout: Duration) -> Duration {
    request_timeout.saturating_sub((request_timeout / 10).min(MAX_DEADLINE_MARGIN))
}

/// Dispatch context for a gateway request, bounded inside the HTTP timeout.
#[must_use]
pub fn gateway_context(headers: &HeaderMap, config: &NetworkConfig) -> RequestContext {
    RequestContext::new(own_base(headers), request_id(headers))
        .with_budget(dispatch_budget(config.request_timeout))
}

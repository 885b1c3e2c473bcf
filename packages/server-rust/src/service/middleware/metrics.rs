//! Metrics middleware for dispatch requests.
//!
//! Wraps every call in a `dispatch` span, then records the outcome counter
//! and duration histogram through the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::dispatch::{DispatchError, DispatchRequest, DispatchResponse};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatch calls with timing and outcome.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// Outcome label for a finished dispatch.
fn outcome_of(result: &Result<DispatchResponse, DispatchError>) -> &'static str {
    match result {
        Ok(response) => response.outcome(),
        Err(e) if e.is_business() => "rejected",
        Err(e) if e.indicates_no_endpoints() => "unavailable",
        Err(_) => "error",
    }
}

impl<S> Service<DispatchRequest> for MetricsService<S>
where
    S: Service<DispatchRequest, Response = DispatchResponse, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = DispatchResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let action = req.action().as_str();

        let span = info_span!(
            "dispatch",
            action = action,
            request_id = %req.ctx.trace_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = outcome_of(&result);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    "linkgate_dispatch_total",
                    "action" => action,
                    "outcome" => outcome
                )
                .increment(1);
                metrics::histogram!("linkgate_dispatch_duration_seconds", "action" => action)
                    .record(elapsed.as_secs_f64());

                match &result {
                    Err(e) if !e.is_business() => tracing::warn!(
                        action,
                        duration_ms,
                        outcome,
                        error = %e,
                        "dispatch failed"
                    ),
                    _ => tracing::info!(action, duration_ms, outcome, "dispatch complete"),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use linkgate_core::{FallbackResponse, InfoResponse, RequestContext};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::Call;

    /// Answers from a canned result.
    struct CannedService(Result<DispatchResponse, DispatchError>);

    impl Service<DispatchRequest> for CannedService {
        type Response = DispatchResponse;
        type Error = DispatchError;
        type Future =
            Pin<Box<dyn Future<Output = Result<DispatchResponse, DispatchError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: DispatchRequest) -> Self::Future {
            let result = self.0.clone();
            Box::pin(async move { result })
        }
    }

    fn info_request() -> DispatchRequest {
        DispatchRequest::new(
            Call::Info {
                short_code: "1".into(),
            },
            RequestContext::new("http://sho.rt/", "req-1"),
        )
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_response() {
        let info = DispatchResponse::Info(InfoResponse {
            url: "https://example.com".into(),
            short_url: "http://sho.rt/1".into(),
            visits_count: 2,
        });
        let svc = MetricsLayer.layer(CannedService(Ok(info.clone())));
        assert_eq!(svc.oneshot(info_request()).await.unwrap(), info);
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_error() {
        let svc = MetricsLayer.layer(CannedService(Err(DispatchError::NoEndpointsAvailable)));
        let err = svc.oneshot(info_request()).await.unwrap_err();
        assert_eq!(err, DispatchError::NoEndpointsAvailable);
    }

    #[test]
    fn outcome_labels() {
        let fallback = Ok(DispatchResponse::Fallback(FallbackResponse {
            fallback: "down".into(),
            upstream_error: "boom".into(),
        }));
        assert_eq!(outcome_of(&fallback), "fallback");
        assert_eq!(
            outcome_of(&Err(DispatchError::NotFound("x".into()))),
            "rejected"
        );
        assert_eq!(
            outcome_of(&Err(DispatchError::NoEndpointsAvailable)),
            "unavailable"
        );
        assert_eq!(outcome_of(&Err(DispatchError::Internal("x".into()))), "error");
    }
}

//! Pipeline composition: wraps the gateway in the dispatch middleware.

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::dispatch::Gateway;

/// Concrete stack returned by [`build_dispatch_pipeline`]. Named so it can
/// live in shared HTTP state; every layer is `Clone + Send + Sync`.
pub type DispatchPipeline = TimeoutService<MetricsService<Gateway>>;

/// Wraps the gateway with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `TimeoutLayer` -- enforce the caller's deadline
/// 2. `MetricsLayer` -- record timing and outcome
#[must_use]
pub fn build_dispatch_pipeline(gateway: Gateway) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(gateway)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use linkgate_core::{Action, RequestContext, ShortenResponse};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::{
        Call, DispatchError, DispatchRequest, DispatchResponse, Endpoint, EndpointFactory,
        GatewayConfig, Invoker,
    };

    struct EchoInvoker;

    #[async_trait]
    impl Invoker for EchoInvoker {
        async fn invoke(
            &self,
            call: &Call,
            ctx: &RequestContext,
        ) -> Result<DispatchResponse, DispatchError> {
            match call {
                Call::Shorten { long_url } => Ok(DispatchResponse::Shortened(ShortenResponse {
                    short_url: format!("{}1", ctx.forwarded_base),
                    url: long_url.clone(),
                })),
                _ => Err(DispatchError::Internal("unexpected call".into())),
            }
        }
    }

    struct EchoFactory;

    impl EndpointFactory for EchoFactory {
        fn make(&self, address: &str, action: Action) -> Result<Endpoint, DispatchError> {
            Ok(Endpoint::new(address, action, Arc::new(EchoInvoker)))
        }
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let factory: Arc<dyn EndpointFactory> = Arc::new(EchoFactory);
        let gateway = Gateway::new(&GatewayConfig::default(), &factory);
        gateway
            .endpoints(Action::Shorten)
            .update(&["10.0.0.1:8080".to_string()]);

        let svc = build_dispatch_pipeline(gateway);
        let req = DispatchRequest::new(
            Call::Shorten {
                long_url: "https://example.com".into(),
            },
            RequestContext::new("http://sho.rt/", "t"),
        );
        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(
            resp,
            DispatchResponse::Shortened(ShortenResponse {
                short_url: "http://sho.rt/1".into(),
                url: "https://example.com".into(),
            })
        );
    }
}

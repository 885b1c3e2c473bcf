//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared resources, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown. Between `start()` and
//! `serve()` the caller can finish wiring role services (e.g. wait for
//! storage or discovery).

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, Role};
use super::handlers::{
    backend_healthz_handler, backend_info_handler, backend_resolve_handler,
    backend_shorten_handler, breakers_handler, gateway_healthz_handler, gateway_info_handler,
    gateway_resolve_handler, gateway_shorten_handler, health_handler, liveness_handler,
    readiness_handler, AppState, BackendState, GatewayState,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;
use crate::dispatch::Gateway;
use crate::service::{build_dispatch_pipeline, ShortenerService};

/// What a process serves.
#[derive(Clone)]
pub enum RoleServices {
    /// Dispatches every call to backend roles.
    Gateway(Gateway),
    /// Answers from local storage. `Role::Gateway` here is treated as all-in-one.
    Backend {
        role: Role,
        shortener: ShortenerService,
    },
}

impl RoleServices {
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            RoleServices::Gateway(_) => Role::Gateway,
            RoleServices::Backend { role, .. } => *role,
        }
    }
}

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `start()` -- binds the listener
/// 3. `serve()` -- accepts connections until the shutdown future resolves
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared shutdown controller, for health checks or triggering shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router for `services` with every middleware layer.
    ///
    /// Every role serves `GET /health`, `/health/live`, `/health/ready`.
    /// - gateway: `POST /`, `GET /{code}`, `GET /info/{code}`, `GET /healthz`,
    ///   `GET /debug/breakers`
    /// - resolver: `GET /{code}`, `GET /info/{code}`, `GET /healthz`
    /// - shortener: `POST /`, `GET /healthz`
    /// - all-in-one: every backend route
    pub fn build_router(&self, services: &RoleServices) -> Router {
        build_router(&self.config, &self.shutdown, services)
    }

    /// Binds the listener. Returns the bound port, which differs from the
    /// configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    ///
    /// After the signal the state moves to Draining (new requests get 503),
    /// and once in-flight requests finish (or `drain_timeout` passes) to
    /// Stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        self,
        services: RoleServices,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = build_router(&self.config, &self.shutdown, &services);

        self.shutdown.set_ready();
        info!(role = %services.role(), "serving HTTP");

        let ctrl = Arc::clone(&self.shutdown);
        let signal = async move {
            shutdown.await;
            ctrl.trigger_shutdown();
            info!("shutdown signalled, draining");
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}

fn build_router(
    config: &NetworkConfig,
    shutdown: &Arc<ShutdownController>,
    services: &RoleServices,
) -> Router {
    let app = AppState {
        role: services.role(),
        shutdown: Arc::clone(shutdown),
        config: Arc::new(config.clone()),
        start_time: Instant::now(),
    };

    let routes = match services {
        RoleServices::Gateway(gateway) => {
            let state = GatewayState {
                app,
                gateway: gateway.clone(),
                pipeline: build_dispatch_pipeline(gateway.clone()),
            };
            Router::new()
                .route("/", post(gateway_shorten_handler))
                .route("/healthz", get(gateway_healthz_handler))
                .route("/{short_code}", get(gateway_resolve_handler))
                .route("/info/{short_code}", get(gateway_info_handler))
                .route("/debug/breakers", get(breakers_handler))
                .merge(probe_routes())
                .with_state(state)
        }
        RoleServices::Backend { role, shortener } => {
            let state = BackendState {
                app,
                shortener: shortener.clone(),
            };
            let mut router: Router<BackendState> = Router::new()
                .route("/healthz", get(backend_healthz_handler))
                .merge(probe_routes());
            if matches!(role, Role::Shortener | Role::AllInOne | Role::Gateway) {
                router = router.route("/", post(backend_shorten_handler));
            }
            if matches!(role, Role::Resolver | Role::AllInOne | Role::Gateway) {
                router = router
                    .route("/{short_code}", get(backend_resolve_handler))
                    .route("/info/{short_code}", get(backend_info_handler));
            }
            router.with_state(state)
        }
    };

    routes
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(shutdown),
            track_in_flight,
        ))
        .layer(build_http_layers(config))
}

/// Orchestrator probes, generic over any state that yields an [`AppState`].
fn probe_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AppState: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
}

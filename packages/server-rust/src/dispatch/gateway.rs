//! The gateway: one [`Command`] per action behind a tower `Service`.
//!
//! The gateway owns its discovery workers and endpoint followers; both are
//! created by [`Gateway::start`] and torn down by [`Gateway::shutdown`].
//! Resolve and info read the same backend name and share one subscriber.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use linkgate_core::Action;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::Service;

use super::breaker::BreakerSnapshot;
use super::command::Command;
use super::config::GatewayConfig;
use super::discovery::{AddressList, AddressResolver, DiscoverySubscriber};
use super::endpoint::EndpointFactory;
use super::endpoint_set::EndpointSet;
use super::error::DispatchError;
use super::request::{DispatchRequest, DispatchResponse};
use crate::service::worker::BackgroundWorker;

struct GatewayInner {
    resolve: Command,
    info: Command,
    shorten: Command,
    workers: Mutex<Vec<BackgroundWorker<DiscoverySubscriber>>>,
    followers: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheaply cloneable handle to the dispatch layer.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Builds a gateway with empty endpoint sets and no discovery attached.
    /// Feed the sets through [`endpoints`](Self::endpoints).
    #[must_use]
    pub fn new(config: &GatewayConfig, factory: &Arc<dyn EndpointFactory>) -> Self {
        let command = |action: Action| {
            Command::new(
                action,
                config.command(action).clone(),
                config.retry,
                config.breaker.clone(),
                Arc::new(EndpointSet::new(action, Arc::clone(factory))),
            )
        };
        Self {
            inner: Arc::new(GatewayInner {
                resolve: command(Action::Resolve),
                info: command(Action::Info),
                shorten: command(Action::Shorten),
                workers: Mutex::new(Vec::new()),
                followers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Builds a gateway and wires every endpoint set to a discovery
    /// subscriber polling `resolver`.
    pub async fn start(
        config: &GatewayConfig,
        resolver: Arc<dyn AddressResolver>,
        factory: Arc<dyn EndpointFactory>,
    ) -> Self {
        let gateway = Self::new(config, &factory);
        let mut receivers: HashMap<String, watch::Receiver<AddressList>> = HashMap::new();
        let mut workers = Vec::new();
        let mut followers = Vec::new();

        for action in Action::ALL {
            let name = config.discovery.name_for(action);
            let rx = if let Some(rx) = receivers.get(name) {
                rx.clone()
            } else {
                let (worker, rx) = DiscoverySubscriber::spawn(
                    name,
                    Arc::clone(&resolver),
                    config.discovery.poll_interval,
                )
                .await;
                workers.push(worker);
                receivers.insert(name.to_string(), rx.clone());
                rx
            };
            followers.push(gateway.endpoints(action).follow(rx));
        }

        tracing::info!(
            resolver_name = %config.discovery.resolver_name,
            shortener_name = %config.discovery.shortener_name,
            subscribers = workers.len(),
            "gateway discovery started"
        );

        gateway.inner.workers.lock().extend(workers);
        gateway.inner.followers.lock().extend(followers);
        gateway
    }

    #[must_use]
    pub fn command(&self, action: Action) -> &Command {
        match action {
            Action::Resolve => &self.inner.resolve,
            Action::Info => &self.inner.info,
            Action::Shorten => &self.inner.shorten,
        }
    }

    #[must_use]
    pub fn endpoints(&self, action: Action) -> &Arc<EndpointSet> {
        self.command(action).endpoints()
    }

    /// Runs one request through its command.
    ///
    /// # Errors
    ///
    /// See [`Command::execute`].
    pub async fn dispatch(&self, req: DispatchRequest) -> Result<DispatchResponse, DispatchError> {
        self.command(req.action()).execute(&req.call, &req.ctx).await
    }

    /// Breaker state for every command, in `Action::ALL` order.
    #[must_use]
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        Action::ALL
            .iter()
            .map(|&action| self.command(action).snapshot())
            .collect()
    }

    /// Stops discovery and endpoint followers. Endpoint sets keep their last
    /// snapshot. Safe to call more than once.
    pub async fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.inner.workers.lock());
        let followers = std::mem::take(&mut *self.inner.followers.lock());

        for mut worker in workers {
            worker.stop().await;
        }
        for follower in followers {
            follower.abort();
        }
        tracing::info!("gateway discovery stopped");
    }
}

impl Service<DispatchRequest> for Gateway {
    type Response = DispatchResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<DispatchResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let gateway = self.clone();
        Box::pin(async move { gateway.dispatch(req).await })
    }
}

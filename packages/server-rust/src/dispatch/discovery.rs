//! Discovery subscriber: polls a name-resolution source for one logical
//! backend name and republishes the address list whenever membership changes.
//!
//! Subscribers never block the caller on the first resolution. A freshly
//! spawned subscriber publishes an empty list, which consumers must treat as
//! "no endpoints yet". Resolution failures are logged and retried on the next
//! tick; the last good list stays published until a later resolution
//! succeeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

/// Immutable, sorted, deduplicated address list.
pub type AddressList = Arc<Vec<String>>;

/// Port appended to names that carry none, so the system resolver accepts them.
const PLACEHOLDER_PORT: u16 = 0;

// ---------------------------------------------------------------------------
// AddressResolver
// ---------------------------------------------------------------------------

/// A source of network addresses for a logical name.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolves `name` to `host` or `host:port` strings. Order is irrelevant.
    async fn resolve(&self, name: &str) -> anyhow::Result<Vec<String>>;
}

/// Resolves names through the system resolver (`getaddrinfo`).
///
/// The port reported back is whatever the name carried (or 0); endpoint
/// construction replaces it with the exposed port regardless. A lookup that
/// outlasts `lookup_timeout` fails, so a stuck resolver costs one poll tick
/// rather than stalling the subscriber.
#[derive(Debug, Clone, Copy)]
pub struct DnsResolver {
    lookup_timeout: Duration,
}

impl DnsResolver {
    #[must_use]
    pub fn new(lookup_timeout: Duration) -> Self {
        Self { lookup_timeout }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl AddressResolver for DnsResolver {
    async fn resolve(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let target = if has_port(name) {
            name.to_string()
        } else {
            format!("{name}:{PLACEHOLDER_PORT}")
        };
        let addrs = tokio::time::timeout(self.lookup_timeout, tokio::net::lookup_host(target))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "lookup of {name} timed out after {}ms",
                    self.lookup_timeout.as_millis()
                )
            })??;
        Ok(addrs.map(|addr| addr.to_string()).collect())
    }
}

fn has_port(name: &str) -> bool {
    if let Some(rest) = name.strip_prefix('[') {
        return rest.split_once(']').is_some_and(|(_, tail)| tail.starts_with(':'));
    }
    name.rsplit_once(':')
        .is_some_and(|(host, port)| !host.contains(':') && port.parse::<u16>().is_ok())
}

/// Resolver with a fixed, swappable address list. Used for static
/// deployments and tests.
#[derive(Debug)]
pub struct StaticResolver {
    addresses: parking_lot::RwLock<Result<Vec<String>, String>>,
}

impl StaticResolver {
    #[must_use]
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses: parking_lot::RwLock::new(Ok(addresses)),
        }
    }

    /// Replaces the list returned by subsequent resolutions.
    pub fn set(&self, addresses: Vec<String>) {
        *self.addresses.write() = Ok(addresses);
    }

    /// Makes subsequent resolutions fail with `reason`.
    pub fn fail(&self, reason: impl Into<String>) {
        *self.addresses.write() = Err(reason.into());
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, _name: &str) -> anyhow::Result<Vec<String>> {
        self.addresses.read().clone().map_err(anyhow::Error::msg)
    }
}

// ---------------------------------------------------------------------------
// DiscoverySubscriber
// ---------------------------------------------------------------------------

/// On-demand requests accepted by a running subscriber.
#[derive(Debug)]
pub enum DiscoveryTask {
    /// Resolve now instead of waiting for the next tick.
    Refresh,
}

/// Polls one name and publishes changes through a `watch` channel.
pub struct DiscoverySubscriber {
    name: String,
    resolver: Arc<dyn AddressResolver>,
    tx: watch::Sender<AddressList>,
}

impl DiscoverySubscriber {
    /// Builds a subscriber and the receiver consumers follow. Nothing runs
    /// until [`spawn`](Self::spawn).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        resolver: Arc<dyn AddressResolver>,
    ) -> (Self, watch::Receiver<AddressList>) {
        let (tx, rx) = watch::channel(Arc::new(Vec::new()));
        let subscriber = Self {
            name: name.into(),
            resolver,
            tx,
        };
        (subscriber, rx)
    }

    /// Starts polling every `interval`, with one resolution right away.
    ///
    /// Returns the worker handle (stop it at shutdown) and the receiver.
    pub async fn spawn(
        name: impl Into<String>,
        resolver: Arc<dyn AddressResolver>,
        interval: Duration,
    ) -> (BackgroundWorker<Self>, watch::Receiver<AddressList>) {
        let (subscriber, rx) = Self::new(name, resolver);
        let worker = BackgroundWorker::start("discovery", subscriber, interval);
        if let Err(e) = worker.submit(DiscoveryTask::Refresh).await {
            tracing::warn!(error = %e, "could not schedule initial discovery refresh");
        }
        (worker, rx)
    }

    /// Resolves once and publishes the result if membership changed.
    ///
    /// Returns whether a new list was published.
    pub async fn refresh(&mut self) -> bool {
        match self.resolver.resolve(&self.name).await {
            Ok(raw) => {
                let addresses = normalize(raw);
                let changed = self.tx.send_if_modified(|current| {
                    if **current == addresses {
                        false
                    } else {
                        *current = Arc::new(addresses.clone());
                        true
                    }
                });
                if changed {
                    tracing::info!(
                        name = %self.name,
                        count = addresses.len(),
                        addresses = ?addresses,
                        "discovery membership changed"
                    );
                }
                metrics::counter!(
                    "linkgate_discovery_refresh_total",
                    "name" => self.name.clone(),
                    "result" => "ok"
                )
                .increment(1);
                changed
            }
            Err(e) => {
                tracing::warn!(name = %self.name, error = %e, "discovery resolution failed");
                metrics::counter!(
                    "linkgate_discovery_refresh_total",
                    "name" => self.name.clone(),
                    "result" => "error"
                )
                .increment(1);
                false
            }
        }
    }
}

fn normalize(mut addresses: Vec<String>) -> Vec<String> {
    addresses.retain(|a| !a.trim().is_empty());
    addresses.sort();
    addresses.dedup();
    addresses
}

#[async_trait]
impl BackgroundRunnable for DiscoverySubscriber {
    type Task = DiscoveryTask;

    async fn run(&mut self, task: DiscoveryTask) {
        match task {
            DiscoveryTask::Refresh => {
                self.refresh().await;
            }
        }
    }

    async fn on_tick(&mut self) {
        self.refresh().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Dynamic endpoint set: the live view of `factory(address)` for every
//! currently discovered address of one action.
//!
//! Snapshots are immutable `Arc<Vec<Endpoint>>` values swapped in whole via
//! `ArcSwap`, so `current()` never takes a lock and never observes a
//! half-built list.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use linkgate_core::Action;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::discovery::AddressList;
use super::endpoint::{Endpoint, EndpointFactory};

/// One action's endpoints, rebuilt on every discovery change.
pub struct EndpointSet {
    action: Action,
    factory: Arc<dyn EndpointFactory>,
    snapshot: ArcSwap<Vec<Endpoint>>,
}

impl EndpointSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new(action: Action, factory: Arc<dyn EndpointFactory>) -> Self {
        Self {
            action,
            factory,
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<Vec<Endpoint>> {
        self.snapshot.load_full()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Rebuilds the snapshot from `addresses` and swaps it in.
    ///
    /// Endpoints for addresses already present are reused. Malformed
    /// addresses are logged and left out. Duplicates keep their first
    /// position. Returns the number of endpoints published.
    pub fn update(&self, addresses: &[String]) -> usize {
        let previous = self.snapshot.load();
        let mut reusable: HashMap<&str, &Endpoint> =
            previous.iter().map(|e| (e.address(), e)).collect();

        let mut next = Vec::with_capacity(addresses.len());
        for address in addresses {
            if next.iter().any(|e: &Endpoint| e.address() == address) {
                continue;
            }
            if let Some(existing) = reusable.remove(address.as_str()) {
                next.push(existing.clone());
                continue;
            }
            match self.factory.make(address, self.action) {
                Ok(endpoint) => next.push(endpoint),
                Err(e) => {
                    tracing::warn!(
                        action = %self.action,
                        address = %address,
                        error = %e,
                        "skipping malformed discovered address"
                    );
                }
            }
        }

        let count = next.len();
        self.snapshot.store(Arc::new(next));
        tracing::debug!(action = %self.action, count, "endpoint snapshot replaced");
        count
    }

    /// Keeps the set in sync with a discovery channel until the channel
    /// closes. Applies the current value immediately.
    pub fn follow(self: &Arc<Self>, mut rx: watch::Receiver<AddressList>) -> JoinHandle<()> {
        let set = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let addresses = rx.borrow_and_update().clone();
                set.update(&addresses);
                if rx.changed().await.is_err() {
                    break;
                }
            }
            tracing::debug!(action = %set.action, "discovery channel closed, endpoint set frozen");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use linkgate_core::RequestContext;

    use super::*;
    use crate::dispatch::error::DispatchError;
    use crate::dispatch::endpoint::Invoker;
    use crate::dispatch::request::{Call, DispatchResponse};

    struct NoopInvoker;

    #[async_trait]
    impl Invoker for NoopInvoker {
        async fn invoke(
            &self,
            _call: &Call,
            _ctx: &RequestContext,
        ) -> Result<DispatchResponse, DispatchError> {
            Err(DispatchError::Transport("noop".into()))
        }
    }

    /// Factory that rejects addresses containing "bad" and counts builds.
    #[derive(Default)]
    struct CountingFactory {
        built: AtomicUsize,
    }

    impl EndpointFactory for CountingFactory {
        fn make(&self, address: &str, action: Action) -> Result<Endpoint, DispatchError> {
            if address.contains("bad") {
                return Err(DispatchError::InvalidAddress {
                    address: address.into(),
                    reason: "bad".into(),
                });
            }
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Endpoint::new(address, action, Arc::new(NoopInvoker)))
        }
    }

    fn addrs(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn addresses_of(set: &EndpointSet) -> Vec<String> {
        set.current().iter().map(|e| e.address().to_string()).collect()
    }

    #[test]
    fn starts_empty() {
        let set = EndpointSet::new(Action::Info, Arc::new(CountingFactory::default()));
        assert!(set.is_empty());
        assert!(set.current().is_empty());
        assert_eq!(set.action(), Action::Info);
    }

    #[test]
    fn update_skips_malformed_and_duplicates() {
        let set = EndpointSet::new(Action::Info, Arc::new(CountingFactory::default()));
        let count = set.update(&addrs(&["a:1", "bad:1", "b:1", "a:1"]));
        assert_eq!(count, 2);
        assert_eq!(addresses_of(&set), addrs(&["a:1", "b:1"]));
        assert!(set.current().iter().all(|e| e.action() == Action::Info));
    }

    #[test]
    fn update_reuses_existing_endpoints() {
        let factory = Arc::new(CountingFactory::default());
        let set = EndpointSet::new(Action::Resolve, factory.clone());

        set.update(&addrs(&["a:1", "b:1"]));
        set.update(&addrs(&["a:1", "b:1", "c:1"]));
        assert_eq!(factory.built.load(Ordering::SeqCst), 3);

        set.update(&addrs(&["c:1"]));
        assert_eq!(addresses_of(&set), addrs(&["c:1"]));
        assert_eq!(factory.built.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn old_snapshots_stay_intact_after_replacement() {
        let set = EndpointSet::new(Action::Info, Arc::new(CountingFactory::default()));
        set.update(&addrs(&["a:1", "b:1"]));
        let held = set.current();

        set.update(&[]);
        assert_eq!(held.len(), 2);
        assert!(set.current().is_empty());
    }

    #[tokio::test]
    async fn follow_applies_discovery_changes() {
        let set = Arc::new(EndpointSet::new(
            Action::Info,
            Arc::new(CountingFactory::default()),
        ));
        let (tx, rx) = watch::channel::<AddressList>(Arc::new(addrs(&["a:1"])));
        let handle = set.follow(rx);

        tokio::task::yield_now().await;
        for _ in 0..50 {
            if !set.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(addresses_of(&set), addrs(&["a:1"]));

        tx.send(Arc::new(addrs(&["b:1", "c:1"]))).unwrap();
        for _ in 0..50 {
            if set.current().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(addresses_of(&set), addrs(&["b:1", "c:1"]));

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_see_whole_snapshots() {
        let set = Arc::new(EndpointSet::new(
            Action::Info,
            Arc::new(CountingFactory::default()),
        ));
        let small = addrs(&["a:1"]);
        let large = addrs(&["a:1", "b:1", "c:1", "d:1"]);

        let writer = {
            let set = Arc::clone(&set);
            tokio::spawn(async move {
                for i in 0..500 {
                    set.update(if i % 2 == 0 { &small } else { &large });
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let set = Arc::clone(&set);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let len = set.current().len();
                        assert!(len == 0 || len == 1 || len == 4, "torn snapshot of {len}");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
    }
}

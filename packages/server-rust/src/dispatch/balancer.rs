//! Round-robin selection over an endpoint set's current snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::endpoint::Endpoint;
use super::endpoint_set::EndpointSet;
use super::error::DispatchError;

/// Round-robin balancer.
///
/// The cursor is a shared atomic counter taken modulo the snapshot length at
/// selection time, so it survives snapshot replacement and can never index
/// out of range when the set shrinks. Under contention two callers may land
/// on the same endpoint; each caller still advances the cursor.
pub struct RoundRobin {
    set: Arc<EndpointSet>,
    cursor: AtomicU64,
}

impl RoundRobin {
    #[must_use]
    pub fn new(set: Arc<EndpointSet>) -> Self {
        Self {
            set,
            cursor: AtomicU64::new(0),
        }
    }

    /// Picks the next endpoint.
    ///
    /// # Errors
    ///
    /// `NoEndpointsAvailable` when the current snapshot is empty.
    pub fn select(&self) -> Result<Endpoint, DispatchError> {
        let snapshot = self.set.current();
        if snapshot.is_empty() {
            return Err(DispatchError::NoEndpointsAvailable);
        }
        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        // The remainder is below `snapshot.len()`, so it fits in usize.
        #[allow(clippy::cast_possible_truncation)]
        let index = (turn % snapshot.len() as u64) as usize;
        Ok(snapshot[index].clone())
    }

    /// Whether there is currently nothing to select.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    #[must_use]
    pub fn endpoint_set(&self) -> &Arc<EndpointSet> {
        &self.set
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use linkgate_core::{Action, RequestContext};

    use super::*;
    use crate::dispatch::endpoint::{EndpointFactory, Invoker};
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

    struct NoopFactory;

    impl EndpointFactory for NoopFactory {
        fn make(&self, address: &str, action: Action) -> Result<Endpoint, DispatchError> {
            Ok(Endpoint::new(address, action, Arc::new(NoopInvoker)))
        }
    }

    fn balancer_over(addresses: &[&str]) -> RoundRobin {
        let set = Arc::new(EndpointSet::new(Action::Resolve, Arc::new(NoopFactory)));
        let list: Vec<String> = addresses.iter().map(ToString::to_string).collect();
        set.update(&list);
        RoundRobin::new(set)
    }

    #[test]
    fn empty_set_fails_distinctly() {
        let rr = balancer_over(&[]);
        assert!(rr.is_empty());
        assert_eq!(rr.select().unwrap_err(), DispatchError::NoEndpointsAvailable);
    }

    #[test]
    fn k_selections_visit_each_endpoint_once() {
        let rr = balancer_over(&["a:1", "b:1", "c:1"]);
        for _round in 0..4 {
            let picked: Vec<String> = (0..3)
                .map(|_| rr.select().unwrap().address().to_string())
                .collect();
            assert_eq!(picked, vec!["a:1", "b:1", "c:1"]);
        }
    }

    #[test]
    fn shrinking_snapshot_never_goes_out_of_range() {
        let rr = balancer_over(&["a:1", "b:1", "c:1", "d:1"]);
        for _ in 0..3 {
            rr.select().unwrap();
        }
        rr.endpoint_set().update(&["z:1".to_string()]);
        for _ in 0..5 {
            assert_eq!(rr.select().unwrap().address(), "z:1");
        }

        rr.endpoint_set().update(&[]);
        assert_eq!(rr.select().unwrap_err(), DispatchError::NoEndpointsAvailable);
    }

    #[test]
    fn growing_snapshot_includes_new_endpoints() {
        let rr = balancer_over(&["a:1"]);
        rr.select().unwrap();
        rr.endpoint_set()
            .update(&["a:1".to_string(), "b:1".to_string()]);

        let picked: Vec<String> = (0..4)
            .map(|_| rr.select().unwrap().address().to_string())
            .collect();
        assert!(picked.contains(&"a:1".to_string()));
        assert!(picked.contains(&"b:1".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_selection_is_fair_overall() {
        let rr = Arc::new(balancer_over(&["a:1", "b:1", "c:1", "d:1"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rr = Arc::clone(&rr);
                tokio::spawn(async move {
                    let mut seen = Vec::with_capacity(100);
                    for _ in 0..100 {
                        seen.push(rr.select().unwrap().address().to_string());
                    }
                    seen
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for h in handles {
            for address in h.await.unwrap() {
                *counts.entry(address).or_default() += 1;
            }
        }
        // 800 selections over 4 endpoints with a shared cursor: exactly 200 each.
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 200));
    }
}

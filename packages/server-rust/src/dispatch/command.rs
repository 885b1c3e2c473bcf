//! One breaker-guarded command per action.
//!
//! `execute` is the whole resilience stack for a call: breaker admission,
//! retried round-robin attempts, outcome accounting, and fallback shaping.

use std::sync::Arc;

use linkgate_core::{Action, FallbackResponse, RequestContext};

use super::balancer::RoundRobin;
use super::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, Outcome};
use super::config::CommandConfig;
use super::endpoint_set::EndpointSet;
use super::error::DispatchError;
use super::request::{Call, DispatchResponse};
use super::retry::{Retrier, RetryPolicy};

pub struct Command {
    action: Action,
    config: CommandConfig,
    breaker: CircuitBreaker,
    retrier: Retrier,
    balancer: RoundRobin,
}

impl Command {
    #[must_use]
    pub fn new(
        action: Action,
        config: CommandConfig,
        retry: RetryPolicy,
        breaker: BreakerConfig,
        endpoints: Arc<EndpointSet>,
    ) -> Self {
        Self {
            action,
            config,
            breaker: CircuitBreaker::new(action.as_str(), breaker),
            retrier: Retrier::new(retry),
            balancer: RoundRobin::new(endpoints),
        }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn endpoints(&self) -> &Arc<EndpointSet> {
        self.balancer.endpoint_set()
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Runs `call` through the breaker and retrier.
    ///
    /// Returns `Ok(DispatchResponse::Fallback)` for degraded outcomes.
    ///
    /// # Errors
    ///
    /// Business errors (`MalformedInput`, `NotFound`) pass through untouched.
    /// A total absence of endpoints is returned as an error whose
    /// `indicates_no_endpoints()` is true, so the caller can answer with a
    /// hard unavailable status.
    pub async fn execute(
        &self,
        call: &Call,
        ctx: &RequestContext,
    ) -> Result<DispatchResponse, DispatchError> {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit.with_deadline(ctx.deadline),
            Err(open) => return self.fallback(open),
        };

        let balancer = &self.balancer;
        let result = self
            .retrier
            .invoke(self.config.timeout, ctx, |_attempt| async move {
                balancer.select()?.invoke(call, ctx).await
            })
            .await;

        // Expired before the first attempt: nothing reached a backend.
        if matches!(result, Err(DispatchError::RetriesExhausted { attempts: 0, .. })) {
            permit.release();
        } else {
            permit.record(Outcome::of(&result));
        }

        match result {
            Ok(response) => Ok(response),
            Err(e) if e.is_business() => Err(e),
            Err(e) => self.fallback(e),
        }
    }

    fn fallback(&self, err: DispatchError) -> Result<DispatchResponse, DispatchError> {
        if err.indicates_no_endpoints() {
            tracing::warn!(command = %self.action, error = %err, "no live endpoints");
            return Err(err);
        }
        // An open breaker over an empty set is still a total outage.
        if matches!(err, DispatchError::CircuitOpen { .. }) && self.balancer.is_empty() {
            tracing::warn!(command = %self.action, "circuit open and no live endpoints");
            return Err(DispatchError::NoEndpointsAvailable);
        }

        tracing::warn!(command = %self.action, error = %err, "serving fallback");
        Ok(DispatchResponse::Fallback(FallbackResponse {
            fallback: self.config.fallback_message.clone(),
            upstream_error: err.to_string(),
        }))
    }
}

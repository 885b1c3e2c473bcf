//! Resilient dispatch layer.
//!
//! Discovery feeds endpoint sets, a round-robin balancer draws from them,
//! and every call runs under a per-command circuit breaker and bounded
//! retry. [`Gateway`] ties it together as a tower `Service`.

pub mod balancer;
pub mod breaker;
pub mod command;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod endpoint_set;
pub mod error;
pub mod gateway;
pub mod request;
pub mod retry;

pub use balancer::RoundRobin;
pub use breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState, Outcome, Permit};
pub use command::Command;
pub use config::{CommandConfig, DiscoveryConfig, GatewayConfig};
pub use discovery::{AddressList, AddressResolver, DiscoverySubscriber, DnsResolver, StaticResolver};
pub use endpoint::{Endpoint, EndpointFactory, HttpEndpointFactory, Invoker};
pub use endpoint_set::EndpointSet;
pub use error::DispatchError;
pub use gateway::Gateway;
pub use request::{Call, DispatchRequest, DispatchResponse};
pub use retry::{Retrier, RetryPolicy};

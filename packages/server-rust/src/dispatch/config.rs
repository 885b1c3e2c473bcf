use std::time::Duration;

use linkgate_core::Action;

use super::breaker::BreakerConfig;
use super::retry::RetryPolicy;

/// Per-command settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Reason reported in soft fallbacks.
    pub fallback_message: String,
}

/// Where and how often to look up backend instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Logical name serving resolve and info.
    pub resolver_name: String,
    /// Logical name serving shorten.
    pub shortener_name: String,
    pub poll_interval: Duration,
    /// Port every discovered instance listens on.
    pub exposed_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            resolver_name: "resolver".to_string(),
            shortener_name: "shortener".to_string(),
            poll_interval: Duration::from_millis(200),
            exposed_port: 8080,
        }
    }
}

impl DiscoveryConfig {
    /// Backend name for an action.
    #[must_use]
    pub fn name_for(&self, action: Action) -> &str {
        match action {
            Action::Resolve | Action::Info => &self.resolver_name,
            Action::Shorten => &self.shortener_name,
        }
    }
}

/// Everything the dispatch layer needs from its environment.
///
/// Read paths fail fast; the write path gets a much longer budget.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub resolve: CommandConfig,
    pub info: CommandConfig,
    pub shorten: CommandConfig,
    pub retry: RetryPolicy,
    /// Shared tuning; each command still gets its own breaker.
    pub breaker: BreakerConfig,
    pub discovery: DiscoveryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            resolve: CommandConfig {
                timeout: Duration::from_millis(1_000),
                fallback_message: "Resolver service currently unavailable".to_string(),
            },
            info: CommandConfig {
                timeout: Duration::from_millis(1_000),
                fallback_message: "Info service currently unavailable".to_string(),
            },
            shorten: CommandConfig {
                timeout: Duration::from_millis(100_000),
                fallback_message: "Shortener service currently unavailable".to_string(),
            },
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn command(&self, action: Action) -> &CommandConfig {
        match action {
            Action::Resolve => &self.resolve,
            Action::Info => &self.info,
            Action::Shorten => &self.shorten,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.resolve.timeout, Duration::from_secs(1));
        assert_eq!(config.info.timeout, Duration::from_secs(1));
        assert_eq!(config.shorten.timeout, Duration::from_secs(100));
        assert!(config.shorten.timeout > config.resolve.timeout);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.discovery.poll_interval, Duration::from_millis(200));
        assert_eq!(config.discovery.exposed_port, 8080);
    }

    #[test]
    fn command_lookup_by_action() {
        let config = GatewayConfig::default();
        assert_eq!(
            config.command(Action::Info).fallback_message,
            "Info service currently unavailable"
        );
        assert_eq!(
            config.command(Action::Shorten).fallback_message,
            "Shortener service currently unavailable"
        );
    }

    #[test]
    fn resolve_and_info_share_a_backend_name() {
        let discovery = DiscoveryConfig::default();
        assert_eq!(
            discovery.name_for(Action::Resolve),
            discovery.name_for(Action::Info)
        );
        assert_eq!(discovery.name_for(Action::Shorten), "shortener");
    }
}

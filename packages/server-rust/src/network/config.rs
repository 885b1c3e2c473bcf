//! Network configuration types for the linkgate server.

use std::time::Duration;

/// Which routes a process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Public entry point dispatching to backend roles.
    #[default]
    Gateway,
    /// Serves resolve and info from local storage.
    Resolver,
    /// Serves shorten from local storage.
    Shortener,
    /// Every backend route from local storage, no dispatch.
    AllInOne,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Gateway => "gateway",
            Role::Resolver => "resolver",
            Role::Shortener => "shortener",
            Role::AllInOne => "all-in-one",
        }
    }

    /// Whether this role answers from local storage.
    #[must_use]
    pub fn is_backend(self) -> bool {
        !matches!(self, Role::Gateway)
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gateway" => Ok(Role::Gateway),
            "resolver" => Ok(Role::Resolver),
            "shortener" => Ok(Role::Shortener),
            "all-in-one" | "allinone" | "standalone" => Ok(Role::AllInOne),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete. Gateway requests
    /// dispatch under a slightly shorter deadline derived from it.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(120),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn role_names() {
        assert_eq!(Role::default(), Role::Gateway);
        assert_eq!(Role::AllInOne.to_string(), "all-in-one");
        assert!(Role::Resolver.is_backend());
        assert!(!Role::Gateway.is_backend());
    }

    #[test]
    fn role_parses_case_insensitively() {
        for role in [Role::Gateway, Role::Resolver, Role::Shortener, Role::AllInOne] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("Resolver".parse::<Role>().unwrap(), Role::Resolver);
        assert!("proxy".parse::<Role>().is_err());
    }
}

//! linkgate server binary.
//!
//! Runs one role per process: the public gateway, or one of the backend
//! roles answering from storage.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use linkgate_server::dispatch::{
    BreakerConfig, CommandConfig, DiscoveryConfig, DnsResolver, EndpointFactory, Gateway,
    GatewayConfig, HttpEndpointFactory, RetryPolicy,
};
use linkgate_server::network::{os_signal, NetworkConfig, NetworkModule, Role, RoleServices};
use linkgate_server::service::ShortenerService;
use linkgate_server::storage::{build_storage, StorageConfig, StorageKind};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "linkgate")]
#[command(about = "Resilient URL-shortener gateway and backend roles", long_about = None)]
struct Cli {
    /// gateway, resolver, shortener, or all-in-one
    #[arg(long, env = "LINKGATE_ROLE", default_value = "gateway")]
    role: Role,

    #[arg(long, env = "LINKGATE_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: SocketAddr,

    /// Port every discovered backend instance listens on
    #[arg(long, env = "LINKGATE_EXPOSED_PORT", default_value = "8080")]
    exposed_port: u16,

    #[arg(long, env = "LINKGATE_RESOLVER_NAME", default_value = "resolver")]
    resolver_name: String,

    #[arg(long, env = "LINKGATE_SHORTENER_NAME", default_value = "shortener")]
    shortener_name: String,

    #[arg(long, env = "LINKGATE_DISCOVERY_POLL_MS", default_value = "200")]
    discovery_poll_ms: u64,

    /// inmemory or postgres
    #[arg(long, env = "LINKGATE_STORAGE", default_value = "inmemory")]
    storage: StorageKind,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "LINKGATE_DB_MAX_CONNECTIONS")]
    db_max_connections: Option<u32>,

    /// Attempts per call, including the first
    #[arg(long, env = "LINKGATE_RETRY_ATTEMPTS", default_value = "3")]
    retry_attempts: u32,

    #[arg(long, env = "LINKGATE_RETRY_DELAY_MS", default_value = "500")]
    retry_delay_ms: u64,

    #[arg(long, env = "LINKGATE_BREAKER_FAILURE_RATIO", default_value = "0.5")]
    breaker_failure_ratio: f64,

    #[arg(long, env = "LINKGATE_BREAKER_MIN_REQUESTS", default_value = "20")]
    breaker_min_requests: u32,

    #[arg(long, env = "LINKGATE_BREAKER_WINDOW_SECS", default_value = "10")]
    breaker_window_secs: u64,

    #[arg(long, env = "LINKGATE_BREAKER_COOL_DOWN_SECS", default_value = "5")]
    breaker_cool_down_secs: u64,

    #[arg(long, env = "LINKGATE_RESOLVE_TIMEOUT_MS", default_value = "1000")]
    resolve_timeout_ms: u64,

    #[arg(long, env = "LINKGATE_INFO_TIMEOUT_MS", default_value = "1000")]
    info_timeout_ms: u64,

    #[arg(long, env = "LINKGATE_SHORTEN_TIMEOUT_MS", default_value = "100000")]
    shorten_timeout_ms: u64,

    /// Whole-request budget; gateway dispatch runs under a slightly shorter deadline
    #[arg(long, env = "LINKGATE_REQUEST_TIMEOUT_SECS", default_value = "120")]
    request_timeout_secs: u64,

    #[arg(long, env = "LINKGATE_DRAIN_TIMEOUT_SECS", default_value = "30")]
    drain_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "LINKGATE_LOG_JSON")]
    log_json: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "LINKGATE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.http_addr.ip().to_string(),
            port: self.http_addr.port(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    fn gateway_config(&self) -> GatewayConfig {
        let defaults = GatewayConfig::default();
        let command = |base: CommandConfig, ms: u64| CommandConfig {
            timeout: Duration::from_millis(ms),
            ..base
        };
        GatewayConfig {
            resolve: command(defaults.resolve, self.resolve_timeout_ms),
            info: command(defaults.info, self.info_timeout_ms),
            shorten: command(defaults.shorten, self.shorten_timeout_ms),
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                delay: Duration::from_millis(self.retry_delay_ms),
            },
            breaker: BreakerConfig {
                failure_ratio_threshold: self.breaker_failure_ratio,
                min_requests: self.breaker_min_requests,
                window: Duration::from_secs(self.breaker_window_secs),
                cool_down: Duration::from_secs(self.breaker_cool_down_secs),
                ..defaults.breaker
            },
            discovery: DiscoveryConfig {
                resolver_name: self.resolver_name.clone(),
                shortener_name: self.shortener_name.clone(),
                poll_interval: Duration::from_millis(self.discovery_poll_ms),
                exposed_port: self.exposed_port,
            },
        }
    }

    fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            kind: self.storage,
            database_url: self.database_url.clone(),
            max_connections: self.db_max_connections,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "Prometheus exporter listening");
    }

    let mut module = NetworkModule::new(cli.network_config());
    let port = module.start().await?;

    let (services, gateway) = if cli.role.is_backend() {
        let storage = build_storage(&cli.storage_config()).await?;
        let services = RoleServices::Backend {
            role: cli.role,
            shortener: ShortenerService::new(storage),
        };
        (services, None)
    } else {
        let config = cli.gateway_config();
        let factory: Arc<dyn EndpointFactory> =
            Arc::new(HttpEndpointFactory::new(config.discovery.exposed_port, config.resolve.timeout)?);
        let resolver = Arc::new(DnsResolver::new(config.discovery.poll_interval));
        let gateway = Gateway::start(&config, resolver, factory).await;
        (RoleServices::Gateway(gateway.clone()), Some(gateway))
    };

    info!(role = %cli.role, port, "linkgate starting");
    module.serve(services, os_signal()).await?;

    if let Some(gateway) = gateway {
        gateway.shutdown().await;
    }
    info!("linkgate stopped");
    Ok(())
}

//! Storage selection: builds the configured engine behind a shared trait object.

use std::str::FromStr;
use std::sync::Arc;

use crate::storage::engines::InMemoryStorage;
use crate::traits::ShortUrlStorage;

/// Which engine backs the shortener roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    InMemory,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inmemory" | "in-memory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(anyhow::anyhow!("unknown storage type: {other}")),
        }
    }
}

/// Storage settings resolved from the command line.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Connection string, required for `Postgres`.
    pub database_url: Option<String>,
    pub max_connections: Option<u32>,
}

/// Builds the configured storage engine.
///
/// # Errors
///
/// Returns an error if `Postgres` is selected without a database URL, without
/// the `postgres` feature compiled in, or if connecting fails.
pub async fn build_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn ShortUrlStorage>> {
    match config.kind {
        StorageKind::InMemory => {
            tracing::info!("using in-memory storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageKind::Postgres => connect_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &StorageConfig) -> anyhow::Result<Arc<dyn ShortUrlStorage>> {
    use crate::storage::engines::{PostgresConfig, PostgresStorage};

    let url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("postgres storage requires a database url"))?;
    let defaults = PostgresConfig::default();
    let pg = PostgresConfig {
        url,
        max_connections: config.max_connections.unwrap_or(defaults.max_connections),
    };
    let storage = PostgresStorage::connect(&pg).await?;
    tracing::info!("connected to postgres storage");
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &StorageConfig) -> anyhow::Result<Arc<dyn ShortUrlStorage>> {
    Err(anyhow::anyhow!(
        "postgres storage requested but the `postgres` feature is not enabled"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_kind_parses_aliases() {
        assert_eq!("inmemory".parse::<StorageKind>().unwrap(), StorageKind::InMemory);
        assert_eq!("InMemory".parse::<StorageKind>().unwrap(), StorageKind::InMemory);
        assert_eq!("postgres".parse::<StorageKind>().unwrap(), StorageKind::Postgres);
        assert!("redis".parse::<StorageKind>().is_err());
    }

    #[tokio::test]
    async fn default_config_builds_in_memory() {
        let storage = build_storage(&StorageConfig::default()).await.unwrap();
        assert!(storage.is_healthy().await);
        assert_eq!(storage.save("https://example.com").await.unwrap().id, 1);
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn postgres_without_feature_is_an_error() {
        let config = StorageConfig {
            kind: StorageKind::Postgres,
            database_url: Some("postgres://localhost/db".to_string()),
            max_connections: None,
        };
        assert!(build_storage(&config).await.is_err());
    }
}

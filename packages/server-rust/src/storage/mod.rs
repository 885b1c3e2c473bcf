//! Short-link persistence.
//!
//! - [`engines`]: concrete [`ShortUrlStorage`](crate::traits::ShortUrlStorage) implementations
//! - [`factory`]: selects and builds the configured engine

pub mod engines;
pub mod factory;

pub use engines::InMemoryStorage;
pub use factory::{build_storage, StorageConfig, StorageKind};

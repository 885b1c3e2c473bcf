//! Concrete [`ShortUrlStorage`](crate::traits::ShortUrlStorage) engines.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresStorage};

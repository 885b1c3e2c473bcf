//! Networking: HTTP configuration, role routers, middleware, and shutdown control.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use module::{NetworkModule, RoleServices};
pub use shutdown::*;

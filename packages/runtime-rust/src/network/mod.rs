//! HTTP hosting: configuration, bearer auth, handlers, and shutdown control.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use auth::{Claims, JwtVerifier};
pub use config::NetworkConfig;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};

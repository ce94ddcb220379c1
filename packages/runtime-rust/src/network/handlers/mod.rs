//! HTTP handler definitions.
//!
//! `AppState` is the shared state carried through axum extractors; the
//! handler functions are re-exported for building the router.

pub mod health;
pub mod remote;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use remote::remote_handler;

use std::sync::Arc;
use std::time::Instant;

use super::auth::JwtVerifier;
use super::{NetworkConfig, ShutdownController};
use crate::events::EventTracker;
use crate::remote::RemoteEndpoint;

/// Shared application state passed to all axum handlers.
///
/// Cloning is cheap: every field is shared.
#[derive(Clone)]
pub struct AppState {
    pub endpoint: Arc<RemoteEndpoint>,
    /// Reported by the health endpoint; `None` on nodes without events.
    pub events: Option<EventTracker>,
    pub shutdown: Arc<ShutdownController>,
    /// Present when bearer tokens are verified; otherwise callers are anonymous.
    pub verifier: Option<Arc<JwtVerifier>>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

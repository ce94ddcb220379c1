//! Tandem runtime: dispatch core, remote invocation, event tracking, and the
//! axum hosting adapter.

pub mod compose;
pub mod config;
pub mod demo;
pub mod dispatch;
pub mod events;
pub mod network;
pub mod remote;
pub mod services;

pub use compose::{forwarding_core, LocalRuntime};
pub use config::RuntimeConfig;
pub use dispatch::{DispatchCore, Executor, HandlerRegistry, Invocation, LocalExecutor, OperationHandler, Reply};
pub use events::{DrainReport, EventHandle, EventId, EventState, EventStats, EventTracker};
pub use network::{NetworkConfig, NetworkModule, ShutdownController};
pub use remote::{HttpTransport, LoopbackTransport, RemoteEndpoint, RemoteInvoker, Transport};
pub use services::{Scope, ServiceRegistry};

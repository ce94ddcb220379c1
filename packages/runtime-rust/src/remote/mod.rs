//! Remote invocation: envelope transport between a forwarding core and the
//! node that executes.
//!
//! - [`invoker`]: client half, used by [`Executor::Remote`](crate::dispatch::Executor)
//! - [`transport`]: HTTP and in-process loopback transports
//! - [`endpoint`]: server half, decodes envelopes and drives the pipeline
//! - [`handler`]: innermost service, hands requests to the local dispatch core
//! - [`middleware`]: load shedding, timeout, metrics

pub mod endpoint;
pub mod handler;
pub mod invoker;
pub mod middleware;
pub mod transport;

pub use endpoint::RemoteEndpoint;
pub use handler::{RemoteRequest, RemoteRequestHandler};
pub use invoker::RemoteInvoker;
pub use middleware::{build_remote_pipeline, RemotePipeline};
pub use transport::{
    HttpTransport, LoopbackTransport, Transport, TransportError, TransportRequest, TransportResponse,
    CORRELATION_HEADER, MSGPACK_CONTENT_TYPE, REMOTE_PATH,
};

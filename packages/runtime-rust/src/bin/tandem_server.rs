//! Tandem demo server.
//!
//! Hosts the demo `Person` domain behind `POST /api/remote` so a forwarding
//! client can call it. All options can also be given as `TANDEM_*`
//! environment variables.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tandem_core::PayloadFormat;
use tandem_runtime::demo::{self, AuditLog, InMemoryPersonStore, PersonStore};
use tandem_runtime::{LocalRuntime, NetworkConfig, NetworkModule, RuntimeConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tandem-server")]
#[command(about = "Serves the Tandem demo domain over HTTP")]
struct Args {
    /// Address to bind
    #[arg(long, env = "TANDEM_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind; 0 picks a free one
    #[arg(long, env = "TANDEM_PORT", default_value_t = 8080)]
    port: u16,

    /// Payload format shared with every client: ordinal or named
    #[arg(long, env = "TANDEM_FORMAT", default_value = "ordinal")]
    format: PayloadFormat,

    /// Node identifier stamped on every request context
    #[arg(long, env = "TANDEM_NODE_ID", default_value = "tandem-server")]
    node_id: String,

    /// HS256 secret; when set, callers must present a bearer token
    #[arg(long, env = "TANDEM_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Default per-operation timeout in milliseconds
    #[arg(long, env = "TANDEM_OPERATION_TIMEOUT_MS", default_value_t = 30_000)]
    operation_timeout_ms: u64,

    /// Concurrent remote operations before load shedding
    #[arg(long, env = "TANDEM_MAX_CONCURRENT", default_value_t = 1000)]
    max_concurrent: u32,

    /// How long shutdown waits for events and requests, in seconds
    #[arg(long, env = "TANDEM_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "TANDEM_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, env = "TANDEM_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_tracing(args.log_json);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install the Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let drain_timeout = Duration::from_secs(args.drain_timeout_secs);
    let runtime_config = RuntimeConfig {
        node_id: args.node_id,
        format: args.format,
        default_operation_timeout_ms: args.operation_timeout_ms,
        max_concurrent_operations: args.max_concurrent,
        event_drain_timeout_ms: u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
    };
    let network_config = NetworkConfig {
        host: args.host,
        port: args.port,
        jwt_secret: args.jwt_secret,
        drain_timeout,
        ..NetworkConfig::default()
    };

    let mut network = NetworkModule::new(network_config);
    let shutdown = network.shutdown_controller();

    let store: Arc<dyn PersonStore> = Arc::new(InMemoryPersonStore::new());
    let services = Arc::new(demo::services(store, Arc::new(AuditLog::new())));
    let runtime = LocalRuntime::build(
        &runtime_config,
        Arc::new(demo::operation_table()?),
        demo::gate(),
        demo::handlers(),
        services,
        shutdown.token(),
    )?;

    network.attach(runtime.endpoint);
    network.attach_events(runtime.events, drain_timeout);
    let port = network.start().await?;
    info!(port, node_id = %runtime_config.node_id, format = %runtime_config.format, "tandem-server ready");

    network
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(%err, "failed to listen for ctrl-c");
            }
        })
        .await
}

fn setup_tracing(json: bool) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tandem_runtime=debug,info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

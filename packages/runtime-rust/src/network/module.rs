//! Network module with deferred startup lifecycle.
//!
//! `new()` creates shared resources, `start()` binds the TCP listener, and
//! `serve()` accepts connections. Between `new()` and `serve()` the rest of
//! the application composes its runtime against the shutdown controller and
//! attaches the resulting endpoint.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::auth::JwtVerifier;
use super::config::NetworkConfig;
use super::handlers::{health_handler, liveness_handler, readiness_handler, remote_handler, AppState};
use super::middleware::with_http_layers;
use super::shutdown::ShutdownController;
use crate::events::EventTracker;
use crate::remote::{RemoteEndpoint, REMOTE_PATH};

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller
/// 2. `attach()` -- mounts the remote endpoint (and event tracker)
/// 3. `start()` -- binds the TCP listener
/// 4. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    endpoint: Option<Arc<RemoteEndpoint>>,
    events: Option<EventTracker>,
    event_drain_timeout: Duration,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            endpoint: None,
            events: None,
            event_drain_timeout: Duration::from_secs(30),
        }
    }

    /// Shared shutdown controller. Compose the runtime against its token so
    /// shutdown reaches in-flight operations and events.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Mounts the endpoint served at `POST /api/remote`.
    pub fn attach(&mut self, endpoint: Arc<RemoteEndpoint>) {
        self.endpoint = Some(endpoint);
    }

    /// Events drained on shutdown, for at most `drain_timeout`.
    pub fn attach_events(&mut self, events: EventTracker, drain_timeout: Duration) {
        self.events = Some(events);
        self.event_drain_timeout = drain_timeout;
    }

    /// Assembles the router.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - `POST /api/remote` -- remote operation endpoint (`MsgPack`)
    ///
    /// # Errors
    ///
    /// Fails if no endpoint has been attached.
    pub fn build_router(&self) -> anyhow::Result<Router> {
        let endpoint = self
            .endpoint
            .clone()
            .context("attach() must be called before the router is built")?;
        let state = AppState {
            endpoint,
            events: self.events.clone(),
            shutdown: Arc::clone(&self.shutdown),
            verifier: self
                .config
                .jwt_secret
                .as_deref()
                .map(|secret| Arc::new(JwtVerifier::new(secret))),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        let router = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route(REMOTE_PATH, post(remote_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes));
        Ok(with_http_layers(router, &self.config).with_state(state))
    }

    /// Binds the TCP listener and returns the bound port (OS-assigned when
    /// the configured port is 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains.
    ///
    /// After the signal:
    /// 1. Health state moves to Draining; new requests are rejected
    /// 2. Pending events are drained (bounded by the event drain timeout)
    /// 3. The shutdown token is cancelled and the listener stops
    /// 4. In-flight requests are awaited (bounded by the network drain timeout)
    /// 5. Health state moves to Stopped
    ///
    /// # Errors
    ///
    /// Fails if `start()` or `attach()` was not called, or on a fatal I/O
    /// error.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.build_router()?;
        let listener = self
            .listener
            .context("start() must be called before serve()")?;
        let controller = self.shutdown;

        controller.set_ready();
        info!("serving remote operations");

        let signal = {
            let controller = Arc::clone(&controller);
            let events = self.events.clone();
            let event_drain_timeout = self.event_drain_timeout;
            async move {
                shutdown.await;
                info!("shutdown signal received");
                drain_events(&controller, events.as_ref(), event_drain_timeout).await;
            }
        };
        axum::serve(listener, router).with_graceful_shutdown(signal).await?;

        drain_events(&controller, self.events.as_ref(), self.event_drain_timeout).await;
        drain_requests(&controller, self.config.drain_timeout).await;
        Ok(())
    }
}

/// Moves to Draining, waits for pending events, then cancels the shutdown
/// token so whatever is still running can stop. A no-op once the token is
/// cancelled.
async fn drain_events(controller: &ShutdownController, events: Option<&EventTracker>, timeout: Duration) {
    if controller.token().is_cancelled() {
        return;
    }
    controller.begin_drain();

    if let Some(events) = events {
        let report = events.drain(timeout).await;
        if report.is_complete() {
            info!(events = report.waited_for, "events drained");
        } else {
            warn!(outstanding = report.outstanding.len(), "event drain timeout expired");
        }
    }

    controller.trigger_shutdown();
}

async fn drain_requests(controller: &ShutdownController, timeout: Duration) {
    if controller.wait_for_drain(timeout).await {
        info!("all requests drained");
    } else {
        warn!(in_flight = controller.in_flight_count(), "drain timeout expired with requests in flight");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tandem_core::OperationError;

    use super::*;
    use crate::events::EventState;
    use crate::network::handlers::tests::test_state;
    use crate::network::HealthState;

    fn attached() -> NetworkModule {
        let state = test_state();
        let mut module = NetworkModule::new(NetworkConfig::default());
        module.attach(state.endpoint);
        module
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = NetworkModule::new(NetworkConfig::default());
        assert!(module.listener.is_none());
        assert!(module.endpoint.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = NetworkModule::new(NetworkConfig::default());
        assert!(Arc::ptr_eq(&module.shutdown_controller(), &module.shutdown_controller()));
    }

    #[test]
    fn build_router_requires_an_endpoint() {
        let module = NetworkModule::new(NetworkConfig::default());
        assert!(module.build_router().is_err());
        assert!(attached().build_router().is_ok());
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = attached();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = attached().serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn pending_events_finish_before_shutdown_cancels() {
        let state = test_state();
        let events = state.events.clone().unwrap();
        let controller = state.shutdown;
        controller.set_ready();

        let finished = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&finished);
        let token = controller.token().clone();
        let mut handle = events.track("audit.flush", move |cancel| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if cancel.is_cancelled() {
                return Err(OperationError::Cancelled);
            }
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        drain_events(&controller, Some(&events), Duration::from_secs(5)).await;
        assert_eq!(handle.finished().await, EventState::Completed);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(token.is_cancelled());
        assert_eq!(controller.health_state(), HealthState::Draining);

        drain_requests(&controller, Duration::MAX).await;
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn serve_drains_a_fired_event_before_stopping() {
        let state = test_state();
        let events = state.events.clone().unwrap();
        let mut module = NetworkModule::new(NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..NetworkConfig::default()
        });
        module.attach(state.endpoint);
        module.attach_events(events.clone(), Duration::from_secs(5));
        module.start().await.unwrap();

        let finished = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&finished);
        let _handle = events.track("audit.flush", move |cancel| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if cancel.is_cancelled() {
                return Err(OperationError::Cancelled);
            }
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        module.serve(async {}).await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(events.pending_count(), 0);
    }

    #[tokio::test]
    async fn serve_stops_on_signal() {
        let mut module = attached();
        module.start().await.unwrap();
        let controller = module.shutdown_controller();
        module.serve(async {}).await.unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
        assert!(controller.token().is_cancelled());
    }
}

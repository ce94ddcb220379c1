//! Graceful shutdown controller with in-flight request tracking.
//!
//! Health state lives in an `ArcSwap` for lock-free reads; in-flight requests
//! are counted by RAII guards. Shutdown is a single `CancellationToken`:
//! operations and events derive child tokens from it. Draining starts before
//! the token is cancelled, so pending events can finish first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Server health state, transitioned by the shutdown controller.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Initializing, not yet accepting requests.
    Starting,
    /// Fully operational.
    Ready,
    /// Shutdown triggered; new requests are rejected.
    Draining,
    /// All in-flight requests completed.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Coordinates graceful shutdown across the host.
///
/// 1. Health probes read `health_state()` to report readiness
/// 2. Handlers reject new requests unless the state is `Ready`
/// 3. `begin_drain()` moves to Draining; the token stays live
/// 4. `trigger_shutdown()` cancels the shutdown token
/// 5. `wait_for_drain()` waits until in-flight requests complete
#[derive(Debug)]
pub struct ShutdownController {
    token: CancellationToken,
    in_flight: Arc<InFlight>,
    health_state: Arc<ArcSwap<HealthState>>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            in_flight: Arc::new(InFlight::default()),
            health_state: Arc::new(ArcSwap::from_pointee(HealthState::Starting)),
        }
    }

    pub fn set_ready(&self) {
        self.health_state.store(Arc::new(HealthState::Ready));
    }

    /// The host's shutdown token. Derive child tokens from it; never cancel
    /// it directly, use [`trigger_shutdown`](Self::trigger_shutdown).
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Moves to `Draining` without cancelling anything. New requests are
    /// rejected from here on.
    pub fn begin_drain(&self) {
        if self.health_state() != HealthState::Stopped {
            self.health_state.store(Arc::new(HealthState::Draining));
        }
    }

    /// Moves to `Draining` and cancels every token derived from the
    /// shutdown token.
    pub fn trigger_shutdown(&self) {
        self.begin_drain();
        self.token.cancel();
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.health_state.load()
    }

    /// Shared handle to the health state for handlers.
    #[must_use]
    pub fn health_state_handle(&self) -> Arc<ArcSwap<HealthState>> {
        Arc::clone(&self.health_state)
    }

    /// Creates an RAII guard that tracks an in-flight request.
    ///
    /// The counter is decremented when the guard drops, even during a panic.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits for all in-flight requests to complete, up to `timeout`.
    ///
    /// Returns `true` and moves to `Stopped` if everything drained. Returns
    /// `false` on timeout; the state remains `Draining`. A timeout too large
    /// to add to the current instant waits without limit.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now().checked_add(timeout);

        loop {
            let idle = self.in_flight.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.in_flight.count.load(Ordering::Acquire) == 0 {
                self.health_state.store(Arc::new(HealthState::Stopped));
                return true;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, idle).await.is_err() {
                        return false;
                    }
                }
                None => idle.await,
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_starting() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);
        assert_eq!(controller.in_flight_count(), 0);
        assert!(!controller.token().is_cancelled());
    }

    #[test]
    fn health_state_transitions_starting_ready_draining() {
        let controller = ShutdownController::new();
        assert_eq!(controller.health_state(), HealthState::Starting);

        controller.set_ready();
        assert_eq!(controller.health_state(), HealthState::Ready);

        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert_eq!(controller.health_state().as_str(), "draining");
    }

    #[test]
    fn begin_drain_leaves_the_token_live() {
        let controller = ShutdownController::new();
        controller.set_ready();
        let child = controller.token().child_token();
        controller.begin_drain();
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert!(!child.is_cancelled());
    }

    #[test]
    fn trigger_shutdown_cancels_child_tokens() {
        let controller = ShutdownController::new();
        let child = controller.token().child_token();
        let grandchild = child.child_token();
        controller.trigger_shutdown();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn in_flight_guard_increments_and_decrements() {
        let controller = ShutdownController::new();

        let guard1 = controller.in_flight_guard();
        let guard2 = controller.in_flight_guard();
        assert_eq!(controller.in_flight_count(), 2);

        drop(guard1);
        assert_eq!(controller.in_flight_count(), 1);

        drop(guard2);
        assert_eq!(controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn wait_for_drain_immediate_success() {
        let controller = ShutdownController::new();
        controller.set_ready();
        controller.trigger_shutdown();

        assert!(controller.wait_for_drain(Duration::from_secs(1)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn wait_for_drain_with_active_requests() {
        let controller = ShutdownController::new();
        controller.set_ready();

        let guard = controller.in_flight_guard();
        controller.trigger_shutdown();

        let guard_handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(controller.wait_for_drain(Duration::from_secs(2)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);

        guard_handle.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_drain_timeout() {
        let controller = ShutdownController::new();
        controller.set_ready();

        let _guard = controller.in_flight_guard();
        controller.trigger_shutdown();

        assert!(!controller.wait_for_drain(Duration::from_millis(50)).await);
        assert_eq!(controller.health_state(), HealthState::Draining);
    }

    #[tokio::test]
    async fn wait_for_drain_accepts_an_unbounded_timeout() {
        let controller = ShutdownController::new();
        controller.trigger_shutdown();
        assert!(controller.wait_for_drain(Duration::MAX).await);

        let guard = controller.in_flight_guard();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(controller.wait_for_drain(Duration::from_secs(u64::MAX)).await);
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[test]
    fn health_state_handle_shares_state() {
        let controller = ShutdownController::new();
        let handle = controller.health_state_handle();
        assert_eq!(**handle.load(), HealthState::Starting);

        controller.set_ready();
        assert_eq!(**handle.load(), HealthState::Ready);
    }
}

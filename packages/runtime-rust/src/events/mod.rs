//! Fire-and-forget event tracking with a shutdown barrier.
//!
//! Every fired event runs in its own spawned task under a child of the host's
//! shutdown token, with a fresh collaborator scope. The tracker keeps each
//! event in a concurrent map until it reaches a terminal state; [`drain`]
//! waits on that map without polling.
//!
//! [`drain`]: EventTracker::drain

mod state;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tandem_core::{Args, OperationDescriptor, OperationError, OperationKind, OperationTable, RequestContext};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

pub use state::{DrainReport, EventHandle, EventId, EventState, EventStats};

use crate::dispatch::{args_payload, Invocation, LocalExecutor, Payload};

#[derive(Debug)]
struct TrackedEvent {
    key: String,
    state: EventState,
    started: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    fired: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug)]
struct Inner {
    pending: DashMap<EventId, TrackedEvent>,
    next_id: AtomicU64,
    changed: Notify,
    shutdown: CancellationToken,
    counters: Counters,
    table: Arc<OperationTable>,
    executor: Option<LocalExecutor>,
    node_id: String,
}

/// Runs and tracks fired events. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventTracker {
    inner: Arc<Inner>,
}

impl EventTracker {
    /// Creates a tracker that runs fired events on `executor`. Events see
    /// `shutdown` fire through their token.
    #[must_use]
    pub fn new(
        table: Arc<OperationTable>,
        executor: LocalExecutor,
        shutdown: CancellationToken,
        node_id: impl Into<String>,
    ) -> Self {
        Self::build(table, Some(executor), shutdown, node_id.into())
    }

    /// Creates a tracker for a forwarding node: it only
    /// [`track`](Self::track)s work handed to it, and [`fire`](Self::fire)
    /// fails with a configuration error.
    #[must_use]
    pub fn forwarding(table: Arc<OperationTable>, shutdown: CancellationToken, node_id: impl Into<String>) -> Self {
        Self::build(table, None, shutdown, node_id.into())
    }

    fn build(
        table: Arc<OperationTable>,
        executor: Option<LocalExecutor>,
        shutdown: CancellationToken,
        node_id: String,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                next_id: AtomicU64::new(1),
                changed: Notify::new(),
                shutdown,
                counters: Counters::default(),
                table,
                executor,
                node_id,
            }),
        }
    }

    /// Fires the event operation `key` locally and returns immediately.
    ///
    /// # Errors
    ///
    /// Fails only for unknown keys, non-event operations, or a tracker with
    /// no executor. Failures of the event itself are logged and counted.
    pub fn fire<A>(&self, key: &str, args: A) -> Result<EventHandle, OperationError>
    where
        A: Args + Send + Sync + 'static,
    {
        let descriptor = self
            .inner
            .table
            .get(key)
            .cloned()
            .ok_or_else(|| OperationError::UnknownOperation { key: key.to_string() })?;
        let args = args_payload(&descriptor, args)?;
        self.fire_invocation(descriptor, args)
    }

    /// Erased form of [`fire`](Self::fire), used by the dispatch core and the
    /// remote request handler.
    ///
    /// # Errors
    ///
    /// See [`fire`](Self::fire).
    pub fn fire_invocation(
        &self,
        descriptor: Arc<OperationDescriptor>,
        args: Box<dyn Payload>,
    ) -> Result<EventHandle, OperationError> {
        if descriptor.kind != OperationKind::Event {
            return Err(OperationError::configuration(format!(
                "{} is a {} operation, fired as an event",
                descriptor.key, descriptor.kind
            )));
        }
        let executor = self
            .inner
            .executor
            .clone()
            .ok_or_else(|| OperationError::configuration("event tracker has no local executor"))?;

        // Never the caller's context: the event outlives the request.
        let invocation = Invocation {
            descriptor: Arc::clone(&descriptor),
            target: None,
            args,
            context: RequestContext::new(self.inner.node_id.clone()),
        };
        Ok(self.track(descriptor.key.clone(), move |cancel| async move {
            executor.execute(invocation, cancel).await.map(|_| ())
        }))
    }

    /// Spawns `work` and tracks it until it finishes.
    ///
    /// `work` gets a child of the shutdown token. It is never aborted from
    /// outside, so [`drain`](Self::drain) waits for it to wind down.
    pub fn track<F, Fut>(&self, key: impl Into<String>, work: F) -> EventHandle
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        let key = key.into();
        let id = EventId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (state_tx, state_rx) = watch::channel(EventState::Created);

        self.inner.pending.insert(
            id,
            TrackedEvent {
                key: key.clone(),
                state: EventState::Created,
                started: Instant::now(),
            },
        );
        self.inner.counters.fired.fetch_add(1, Ordering::Relaxed);

        let fut = work(self.inner.shutdown.child_token());
        let mut guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            id,
            state: state_tx,
            outcome: EventState::Failed,
        };
        let span = info_span!("event", event_id = id.0, operation = %key);

        tokio::spawn(
            async move {
                guard.transition(EventState::Running);
                guard.outcome = match fut.await {
                    Ok(()) => EventState::Completed,
                    Err(err) if err.is_cancelled() => {
                        debug!("event cancelled");
                        EventState::Cancelled
                    }
                    Err(err) => {
                        warn!(error = %err, "event failed");
                        EventState::Failed
                    }
                };
            }
            .instrument(span),
        );

        EventHandle {
            id,
            key,
            state: state_rx,
        }
    }

    /// Number of events not yet in a terminal state.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// State of a pending event; `None` once it is terminal (or unknown).
    #[must_use]
    pub fn status(&self, id: EventId) -> Option<EventState> {
        self.inner.pending.get(&id).map(|entry| entry.state)
    }

    #[must_use]
    pub fn stats(&self) -> EventStats {
        let counters = &self.inner.counters;
        EventStats {
            fired: counters.fired.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Waits until every event pending at call time is terminal, or until
    /// `timeout` elapses. Events fired after the call are not waited for.
    /// A timeout too large to add to the current instant waits without limit.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        let snapshot: Vec<EventId> = self.inner.pending.iter().map(|entry| *entry.key()).collect();
        let waited_for = snapshot.len();
        if waited_for > 0 {
            info!(pending = waited_for, "draining events");
        }

        loop {
            // Register interest before checking, so a completion between the
            // check and the await still wakes us.
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let remaining: Vec<EventId> = snapshot
                .iter()
                .copied()
                .filter(|id| self.inner.pending.contains_key(id))
                .collect();
            if remaining.is_empty() {
                return DrainReport {
                    waited_for,
                    outstanding: Vec::new(),
                };
            }

            let Some(deadline) = deadline else {
                notified.await;
                continue;
            };
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let outstanding: Vec<(EventId, String)> = remaining
                    .into_iter()
                    .filter_map(|id| {
                        self.inner.pending.get(&id).map(|entry| {
                            warn!(
                                event_id = id.0,
                                operation = %entry.key,
                                age_ms = u64::try_from(entry.started.elapsed().as_millis()).unwrap_or(u64::MAX),
                                "event still running after drain timeout"
                            );
                            (id, entry.key.clone())
                        })
                    })
                    .collect();
                return DrainReport {
                    waited_for,
                    outstanding,
                };
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PendingGuard
// ---------------------------------------------------------------------------

/// Removes the event from the pending set when its task ends, however it
/// ends. A task that panics or is aborted is recorded as failed.
struct PendingGuard {
    inner: Arc<Inner>,
    id: EventId,
    state: watch::Sender<EventState>,
    outcome: EventState,
}

impl PendingGuard {
    fn transition(&self, state: EventState) {
        if let Some(mut entry) = self.inner.pending.get_mut(&self.id) {
            entry.state = state;
        }
        self.state.send_replace(state);
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.pending.remove(&self.id);
        let counter = match self.outcome {
            EventState::Completed => &self.inner.counters.completed,
            EventState::Cancelled => &self.inner.counters.cancelled,
            _ => &self.inner.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tandem_events_total", "outcome" => self.outcome.as_str()).increment(1);
        self.state.send_replace(self.outcome);
        self.inner.changed.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

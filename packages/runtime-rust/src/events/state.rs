//! Event identity, lifecycle state, and the handles returned to callers.

use std::fmt;

use tokio::sync::watch;

/// Process-unique id of a fired event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// Lifecycle of a tracked event.
///
/// Created -> Running -> {Completed | Failed | Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl EventState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by `fire`; observing it is optional.
#[derive(Debug, Clone)]
pub struct EventHandle {
    pub(super) id: EventId,
    pub(super) key: String,
    pub(super) state: watch::Receiver<EventState>,
}

impl EventHandle {
    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state without waiting.
    #[must_use]
    pub fn state(&self) -> EventState {
        *self.state.borrow()
    }

    /// Waits until the event reaches a terminal state and returns it.
    pub async fn finished(&mut self) -> EventState {
        let reached = self
            .state
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state);
        reached.unwrap_or_else(|_closed| *self.state.borrow())
    }
}

/// Counters over the tracker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub fired: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Result of [`EventTracker::drain`](super::EventTracker::drain).
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Events that were pending when the drain started.
    pub waited_for: usize,
    /// Events still pending when the timeout elapsed.
    pub outstanding: Vec<(EventId, String)>,
}

impl DrainReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outstanding.is_empty()
    }
}

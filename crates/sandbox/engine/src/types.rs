//! Core value types shared by every part of the engine.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a synthesized event.
///
/// Ids increase monotonically for the lifetime of the [`EventIdGenerator`]
/// that issued them and are never reused across sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide monotonic source of [`EventId`]s.
///
/// One generator is normally shared (behind an `Arc`) by every session in
/// the process. Restarting or resetting a session does not touch it.
#[derive(Debug)]
pub struct EventIdGenerator {
    next: AtomicU64,
}

impl EventIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> EventId {
        EventId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`next_id`](Self::next_id) will return.
    pub fn peek(&self) -> EventId {
        EventId(self.next.load(Ordering::Relaxed))
    }

    /// Rewind the generator to 1.
    ///
    /// This is the only way ids are ever reused, and it must only be called
    /// when no session holding older ids is still alive (process restart,
    /// test fixtures).
    pub fn reset(&self) {
        self.next.store(1, Ordering::Relaxed);
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One synthesized unit. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event<P> {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: P,
}

impl<P> Event<P> {
    pub fn new(id: EventId, payload: P) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Finalizing,
    Stopped,
    Finished,
}

impl SessionState {
    /// Whether `start()` is accepted from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Finished)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Stopped => write!(f, "stopped"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// How a finished session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The session-timeout timer fired.
    Timeout,
    /// `finish()` was called before the timeout.
    Manual,
}

/// The simulation variant driving a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    /// Denial-of-service traffic simulation.
    Flood,
    /// Man-in-the-middle interception simulation.
    Intercept,
}

impl SimulationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flood => "flood",
            Self::Intercept => "intercept",
        }
    }
}

impl std::fmt::Display for SimulationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tick sample kept for charts, severity and export.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// 1-based tick number within the session.
    pub tick: u64,
    /// Milliseconds since the session started.
    pub elapsed_ms: u64,
    /// Events synthesized by this tick, before any display cap.
    pub synthesized: u64,
    /// Events flagged by this tick (errors or alerts).
    pub flagged: u64,
}

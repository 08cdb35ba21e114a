//! Error types for the sandbox engine.

use thiserror::Error;
use uuid::Uuid;

use crate::types::SessionState;

/// Errors raised by session commands.
///
/// None of these are fatal; every one leaves the session untouched and the
/// command can be retried.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already running for this instance.
    #[error("a session is already running")]
    AlreadyRunning,

    /// The supplied configuration was rejected.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// The command is not valid from the current state.
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    /// The simulation variant does not offer this command.
    #[error("{action} is not supported by the {kind} simulation")]
    Unsupported {
        action: &'static str,
        kind: &'static str,
    },

    /// The session already produced its summary.
    #[error("session already finalized with summary {0}")]
    AlreadyFinalized(Uuid),

    /// Timers need a tokio runtime to be spawned on.
    #[error("no tokio runtime available to schedule session timers")]
    NoRuntime,
}

/// Result type alias for session commands.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors raised while exporting session data.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Nothing has been synthesized yet.
    #[error("no session data to export")]
    NoData,

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the CSV buffer failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;

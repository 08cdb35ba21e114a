//! # VulnSight Sandbox - Simulated Attack Sessions
//!
//! This crate drives the two interactive sandbox widgets of VulnSight: a
//! denial-of-service flood and a man-in-the-middle interception. Nothing here
//! touches the network; every request, response and alert is synthesized.
//!
//! ## Overview
//!
//! A [`SimulationSession`] runs one time-boxed session at a time:
//!
//! - **Generation timer**: synthesizes one tick of events per interval
//! - **Progress sampler**: publishes elapsed/duration as a percentage
//! - **Timeout**: ends the session and produces its [`Summary`]
//!
//! Events land in a bounded [`RollingLog`] for display, while the
//! [`CounterAggregator`] counts every synthesized event, shown or not.
//!
//! ## Key Components
//!
//! - [`SimulationSession`]: Session scheduler and command surface
//! - [`synth`]: Flood and intercept synthesizers
//! - [`Finalizer`]: Once-per-session summary production
//! - [`export`]: JSON and CSV export of a snapshot
//!
//! ## Example
//!
//! ```rust,no_run
//! use vulnsight_sandbox::{FloodSession, SessionConfig, synth::FloodParams};
//!
//! # async fn example() {
//! let session = FloodSession::with_defaults();
//! let config = SessionConfig::new(FloodParams::default())
//!     .with_interval_ms(1000)
//!     .with_duration_s(5);
//!
//! session.start(config).unwrap();
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod counters;
pub mod error;
pub mod export;
pub mod finalizer;
pub mod render;
pub mod rolling_log;
pub mod session;
pub mod severity;
pub mod synth;
pub mod types;

// Re-export main types
pub use config::SessionConfig;
pub use counters::{CounterAggregator, CounterDelta, CounterSnapshot};
pub use error::{ExportError, ExportResult, SessionError, SessionResult};
pub use export::SessionExport;
pub use finalizer::{Finalizer, Summary};
pub use rolling_log::RollingLog;
pub use session::{
    progress_percent, FloodSession, InterceptSession, SessionEvent, SessionView,
    SimulationSession,
};
pub use severity::{Severity, SeverityThresholds};
pub use synth::{FloodSynthesizer, InterceptSynthesizer, Payload, Synthesizer, Tick};
pub use types::{
    Completion, DataPoint, Event, EventId, EventIdGenerator, SessionState, SimulationKind,
};

//! Event synthesis.
//!
//! A [`Synthesizer`] turns a parameter set and a random source into the
//! events of one generation tick. The session scheduler is generic over it,
//! so the flood and intercept front ends share one engine.

pub mod flood;
pub mod intercept;

use std::fmt::Debug;

use rand::Rng;
use serde::Serialize;

use crate::counters::CounterDelta;
use crate::severity::Severity;
use crate::types::{Event, EventIdGenerator, SimulationKind};

pub use flood::{ErrorCurve, ErrorTier, FloodParams, FloodRequest, FloodSynthesizer, Outcome};
pub use intercept::{
    Header, HttpMessage, InterceptParams, InterceptPreset, InterceptSynthesizer, Interception,
};

/// Payload carried by a synthesized event.
pub trait Payload: Clone + Debug + Serialize + Send + Sync + 'static {
    /// CSV column names for the payload, excluding `id` and `timestamp`.
    fn csv_header() -> &'static [&'static str];

    /// CSV fields in the order of [`csv_header`](Self::csv_header).
    fn csv_row(&self) -> Vec<String>;
}

/// Output of one generation tick.
#[derive(Debug, Clone)]
pub struct Tick<P> {
    /// Events to show, oldest first. May be shorter than `delta.synthesized`.
    pub events: Vec<Event<P>>,
    /// Uncapped counter increments for the tick.
    pub delta: CounterDelta,
}

/// Capability interface implemented by each simulation variant.
pub trait Synthesizer: Send + 'static {
    type Params: Clone + Debug + Serialize + Send + Sync + 'static;
    type Payload: Payload;

    const KIND: SimulationKind;

    /// Counters this variant maintains, registered at zero on start.
    const COUNTERS: &'static [&'static str];

    /// Counter whose per-tick increment is recorded as a data point's
    /// `flagged` value.
    const FLAG_COUNTER: &'static str;

    /// Whether `finish()` may end a session early with a summary.
    const MANUAL_FINISH: bool = false;

    /// Reject parameters the variant cannot run with.
    fn validate(params: &Self::Params) -> Result<(), String>;

    /// Produce the events of one tick.
    ///
    /// Must not perform I/O and must keep each payload bounded.
    fn synthesize<R: Rng + ?Sized>(
        &self,
        params: &Self::Params,
        tick: u64,
        ids: &EventIdGenerator,
        rng: &mut R,
    ) -> Tick<Self::Payload>;

    /// Severity for the mean per-tick synthesized count, if the variant
    /// classifies one.
    fn severity(_params: &Self::Params, _mean_rate: Option<f64>) -> Option<Severity> {
        None
    }
}

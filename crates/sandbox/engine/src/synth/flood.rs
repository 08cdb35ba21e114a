//! Denial-of-service traffic synthesis.
//!
//! Each tick stands for one simulated second. The observed rate for that
//! second is drawn around the configured target, every request of that
//! second gets an outcome, but only the first `display_cap` requests become
//! log rows.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Payload, Synthesizer, Tick};
use crate::config::MAX_LOG_CAPACITY;
use crate::counters::CounterDelta;
use crate::severity::{Severity, SeverityThresholds};
use crate::types::{Event, EventIdGenerator, SimulationKind};

pub const SENT: &str = "sent";
pub const SUCCESS: &str = "success";
pub const ERROR: &str = "error";

/// Highest accepted target rate.
pub const MAX_TARGET_RATE: u64 = 100_000;

const ERROR_STATUSES: [u16; 4] = [429, 500, 503, 504];

/// One step of the error-probability curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorTier {
    /// The tier applies when the observed rate is strictly above this.
    pub above_rate: u64,
    pub probability: f64,
}

/// Error probability as a step function of a tick's observed rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorCurve {
    /// Probability when no tier applies.
    pub base: f64,
    pub tiers: Vec<ErrorTier>,
}

impl Default for ErrorCurve {
    fn default() -> Self {
        Self {
            base: 0.02,
            tiers: vec![
                ErrorTier {
                    above_rate: 600,
                    probability: 0.08,
                },
                ErrorTier {
                    above_rate: 1200,
                    probability: 0.20,
                },
                ErrorTier {
                    above_rate: 2000,
                    probability: 0.35,
                },
            ],
        }
    }
}

impl ErrorCurve {
    /// Error probability for a tick that observed `rate` requests.
    ///
    /// Takes the highest probability among the base and every exceeded tier,
    /// so the result never decreases as the rate grows.
    pub fn probability_for(&self, rate: u64) -> f64 {
        self.tiers
            .iter()
            .filter(|tier| rate > tier.above_rate)
            .map(|tier| tier.probability)
            .fold(self.base, f64::max)
    }

    pub fn validate(&self) -> Result<(), String> {
        let in_range = |p: f64| (0.0..=1.0).contains(&p);
        if !in_range(self.base) {
            return Err(format!("base error probability {} not in [0, 1]", self.base));
        }
        if let Some(tier) = self.tiers.iter().find(|t| !in_range(t.probability)) {
            return Err(format!(
                "error probability {} above rate {} not in [0, 1]",
                tier.probability, tier.above_rate
            ));
        }
        Ok(())
    }
}

/// Parameters of a flood session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FloodParams {
    /// Label of the simulated target. Nothing is ever sent to it.
    #[serde(default = "default_target")]
    pub target: String,

    /// Nominal requests per simulated second.
    #[serde(default = "default_target_rate")]
    pub target_rate: u64,

    /// Relative spread of the observed rate around the target.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Maximum log rows emitted per tick.
    #[serde(default = "default_display_cap")]
    pub display_cap: usize,

    #[serde(default)]
    pub error_curve: ErrorCurve,

    #[serde(default)]
    pub severity: SeverityThresholds,
}

impl Default for FloodParams {
    fn default() -> Self {
        Self {
            target: default_target(),
            target_rate: default_target_rate(),
            jitter: default_jitter(),
            display_cap: default_display_cap(),
            error_curve: ErrorCurve::default(),
            severity: SeverityThresholds::default(),
        }
    }
}

fn default_target() -> String {
    "https://target.example".to_string()
}

fn default_target_rate() -> u64 {
    500
}

fn default_jitter() -> f64 {
    0.2
}

fn default_display_cap() -> usize {
    200
}

/// Outcome of a synthetic request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One displayed request of a flood tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloodRequest {
    pub tick: u64,
    /// Position within the tick's batch.
    pub seq: u32,
    /// Requests observed in the tick this row belongs to.
    pub observed_rate: u64,
    pub status: u16,
    pub outcome: Outcome,
    pub latency_ms: u32,
}

impl Payload for FloodRequest {
    fn csv_header() -> &'static [&'static str] {
        &["tick", "seq", "observed_rate", "status", "outcome", "latency_ms"]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.tick.to_string(),
            self.seq.to_string(),
            self.observed_rate.to_string(),
            self.status.to_string(),
            self.outcome.to_string(),
            self.latency_ms.to_string(),
        ]
    }
}

/// Synthesizer for the denial-of-service sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloodSynthesizer;

impl FloodSynthesizer {
    /// Draw the observed rate for one tick.
    pub fn sample_rate<R: Rng + ?Sized>(params: &FloodParams, rng: &mut R) -> u64 {
        let target = params.target_rate as f64;
        let low = (target * (1.0 - params.jitter)) as u64;
        let high = ((target * (1.0 + params.jitter)) as u64).max(low);
        rng.gen_range(low..=high)
    }

    fn latency<R: Rng + ?Sized>(rate: u64, status: u16, rng: &mut R) -> u32 {
        if status == 504 {
            return rng.gen_range(3000..5000);
        }
        let load = 1.0 + rate as f64 / 1000.0;
        (rng.gen_range(20.0..80.0) * load).min(10_000.0) as u32
    }
}

impl Synthesizer for FloodSynthesizer {
    type Params = FloodParams;
    type Payload = FloodRequest;

    const KIND: SimulationKind = SimulationKind::Flood;
    const COUNTERS: &'static [&'static str] = &[SENT, SUCCESS, ERROR];
    const FLAG_COUNTER: &'static str = ERROR;
    const MANUAL_FINISH: bool = true;

    fn validate(params: &FloodParams) -> Result<(), String> {
        if params.target_rate == 0 || params.target_rate > MAX_TARGET_RATE {
            return Err(format!(
                "target_rate must be in 1..={}, got {}",
                MAX_TARGET_RATE, params.target_rate
            ));
        }
        if !(0.0..1.0).contains(&params.jitter) {
            return Err(format!("jitter must be in [0, 1), got {}", params.jitter));
        }
        if params.display_cap == 0 || params.display_cap > MAX_LOG_CAPACITY {
            return Err(format!(
                "display_cap must be in 1..={}, got {}",
                MAX_LOG_CAPACITY, params.display_cap
            ));
        }
        params.error_curve.validate()?;
        params.severity.validate()
    }

    fn synthesize<R: Rng + ?Sized>(
        &self,
        params: &FloodParams,
        tick: u64,
        ids: &EventIdGenerator,
        rng: &mut R,
    ) -> Tick<FloodRequest> {
        let rate = Self::sample_rate(params, rng);
        let p_error = params.error_curve.probability_for(rate);
        let shown = rate.min(params.display_cap as u64);

        let mut events = Vec::with_capacity(shown as usize);
        let mut errors = 0u64;
        for seq in 0..rate {
            let failed = rng.gen_bool(p_error);
            if failed {
                errors += 1;
            }
            if seq < shown {
                let (status, outcome) = if failed {
                    let status = ERROR_STATUSES[rng.gen_range(0..ERROR_STATUSES.len())];
                    (status, Outcome::Error)
                } else {
                    (200, Outcome::Success)
                };
                let request = FloodRequest {
                    tick,
                    seq: seq as u32,
                    observed_rate: rate,
                    status,
                    outcome,
                    latency_ms: Self::latency(rate, status, rng),
                };
                events.push(Event::new(ids.next_id(), request));
            }
        }

        let delta = CounterDelta::new(rate)
            .with(SENT, rate)
            .with(SUCCESS, rate - errors)
            .with(ERROR, errors);

        Tick { events, delta }
    }

    fn severity(params: &FloodParams, mean_rate: Option<f64>) -> Option<Severity> {
        Some(params.severity.classify(mean_rate))
    }
}

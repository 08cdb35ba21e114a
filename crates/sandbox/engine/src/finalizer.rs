//! Once-per-session summary production.
//!
//! The session scheduler cancels the generation timer before calling
//! [`Finalizer::finalize`], so the counter read here is the final one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::counters::{CounterAggregator, CounterSnapshot};
use crate::error::{SessionError, SessionResult};
use crate::rolling_log::RollingLog;
use crate::severity::{mean, Severity};
use crate::synth::Synthesizer;
use crate::types::{Completion, DataPoint, EventId, SimulationKind};

/// Immutable record of a completed session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Fresh for every session, even when counters coincide.
    pub id: Uuid,
    pub kind: SimulationKind,
    pub completion: Completion,
    pub duration_s: f64,
    pub ticks: u64,
    pub counters: CounterSnapshot,
    pub severity: Option<Severity>,
    /// Mean synthesized events per tick.
    pub mean_rate: Option<f64>,
    pub peak_rate: Option<u64>,
    pub last_event_id: Option<EventId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Everything the finalizer needs besides counters, log and config.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeContext<'a> {
    pub completion: Completion,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    pub data_points: &'a [DataPoint],
}

/// Holds the summary slot for one session.
#[derive(Debug, Default)]
pub struct Finalizer {
    summary: Option<Arc<Summary>>,
}

impl Finalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the session summary.
    ///
    /// A second call is rejected without reading the counters again, and the
    /// existing summary is left as it is.
    pub fn finalize<S: Synthesizer>(
        &mut self,
        counters: &CounterAggregator,
        log: &RollingLog<S::Payload>,
        config: &SessionConfig<S::Params>,
        ctx: FinalizeContext<'_>,
    ) -> SessionResult<Arc<Summary>> {
        if let Some(existing) = &self.summary {
            return Err(SessionError::AlreadyFinalized(existing.id));
        }

        let rates: Vec<u64> = ctx.data_points.iter().map(|p| p.synthesized).collect();
        let mean_rate = mean(&rates);
        let duration_s = match ctx.completion {
            Completion::Timeout => config.duration_s as f64,
            Completion::Manual => ctx.elapsed.as_secs_f64().min(config.duration_s as f64),
        };

        let summary = Arc::new(Summary {
            id: Uuid::new_v4(),
            kind: S::KIND,
            completion: ctx.completion,
            duration_s,
            ticks: ctx.data_points.len() as u64,
            counters: counters.snapshot(),
            severity: S::severity(&config.params, mean_rate),
            mean_rate,
            peak_rate: rates.iter().copied().max(),
            last_event_id: log.latest().map(|e| e.id),
            started_at: ctx.started_at,
            completed_at: Utc::now(),
        });

        self.summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn summary(&self) -> Option<Arc<Summary>> {
        self.summary.clone()
    }

    /// Discard the summary ahead of a new session.
    pub fn clear(&mut self) {
        self.summary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterDelta;
    use crate::synth::flood::{FloodParams, FloodSynthesizer, SENT};
    use crate::types::Event;

    fn point(tick: u64, synthesized: u64) -> DataPoint {
        DataPoint {
            tick,
            elapsed_ms: tick * 1000,
            synthesized,
            flagged: 0,
        }
    }

    fn ctx(points: &[DataPoint], completion: Completion) -> FinalizeContext<'_> {
        FinalizeContext {
            completion,
            elapsed: Duration::from_millis(1500),
            started_at: Utc::now(),
            data_points: points,
        }
    }

    #[test]
    fn summary_reflects_counters() {
        let mut counters = CounterAggregator::new(FloodSynthesizer::COUNTERS);
        counters.record(&CounterDelta::new(700).with(SENT, 700));
        counters.record(&CounterDelta::new(900).with(SENT, 900));
        let log = RollingLog::new(4);
        let config = SessionConfig::new(FloodParams::default()).with_duration_s(3);
        let points = [point(1, 700), point(2, 900)];

        let mut finalizer = Finalizer::new();
        let summary = finalizer
            .finalize::<FloodSynthesizer>(&counters, &log, &config, ctx(&points, Completion::Timeout))
            .unwrap();

        assert_eq!(summary.counters.get(SENT), 1600);
        assert_eq!(summary.duration_s, 3.0);
        assert_eq!(summary.severity, Some(Severity::Medium));
        assert_eq!(summary.peak_rate, Some(900));
        assert_eq!(summary.ticks, 2);
    }

    #[test]
    fn second_finalize_is_rejected_and_summary_kept() {
        let mut counters = CounterAggregator::new(FloodSynthesizer::COUNTERS);
        counters.record(&CounterDelta::new(10).with(SENT, 10));
        let log: RollingLog<_> = RollingLog::new(4);
        let config = SessionConfig::new(FloodParams::default());
        let points = [point(1, 10)];

        let mut finalizer = Finalizer::new();
        let first = finalizer
            .finalize::<FloodSynthesizer>(&counters, &log, &config, ctx(&points, Completion::Timeout))
            .unwrap();

        counters.record(&CounterDelta::new(99).with(SENT, 99));
        let again = finalizer.finalize::<FloodSynthesizer>(
            &counters,
            &log,
            &config,
            ctx(&points, Completion::Timeout),
        );

        assert!(matches!(again, Err(SessionError::AlreadyFinalized(id)) if id == first.id));
        let kept = finalizer.summary().unwrap();
        assert_eq!(kept.counters.get(SENT), 10);
        assert_eq!(kept.id, first.id);
    }

    #[test]
    fn manual_completion_uses_elapsed() {
        let counters = CounterAggregator::new(FloodSynthesizer::COUNTERS);
        let mut log = RollingLog::new(2);
        log.append(Event::new(
            EventId(41),
            crate::synth::FloodRequest {
                tick: 1,
                seq: 0,
                observed_rate: 1,
                status: 200,
                outcome: crate::synth::Outcome::Success,
                latency_ms: 5,
            },
        ));
        let config = SessionConfig::new(FloodParams::default()).with_duration_s(10);

        let mut finalizer = Finalizer::new();
        let summary = finalizer
            .finalize::<FloodSynthesizer>(&counters, &log, &config, ctx(&[], Completion::Manual))
            .unwrap();
        assert_eq!(summary.duration_s, 1.5);
        assert_eq!(summary.severity, Some(Severity::Unknown));
        assert_eq!(summary.last_event_id, Some(EventId(41)));
    }

    #[test]
    fn ids_differ_for_identical_sessions() {
        let counters = CounterAggregator::new(FloodSynthesizer::COUNTERS);
        let log: RollingLog<_> = RollingLog::new(1);
        let config = SessionConfig::new(FloodParams::default());

        let mut a = Finalizer::new();
        let mut b = Finalizer::new();
        let sa = a
            .finalize::<FloodSynthesizer>(&counters, &log, &config, ctx(&[], Completion::Timeout))
            .unwrap();
        let sb = b
            .finalize::<FloodSynthesizer>(&counters, &log, &config, ctx(&[], Completion::Timeout))
            .unwrap();
        assert_eq!(sa.counters, sb.counters);
        assert_ne!(sa.id, sb.id);
    }
}

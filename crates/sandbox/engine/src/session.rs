//! Session scheduler.
//!
//! A [`SimulationSession`] drives one session at a time through
//! `Idle -> Running -> Stopped | Finished` using three timers: a periodic
//! generation timer, a periodic progress sampler and a one-shot timeout.
//!
//! All authoritative state sits in a single mutex-guarded core. Every timer
//! callback runs its whole critical section under that lock without awaiting,
//! and first checks that its session epoch is current and the session is still
//! `Running`. This gives the ordering the engine relies on:
//!
//! - within a tick the log append happens before the counter update, which
//!   happens before the live view is published;
//! - the timeout path cancels the generation timer and reads the counters
//!   under the same lock, so no tick can land between the two;
//! - once `stop()` or `reset()` returns, no queued callback of that session
//!   can apply anything.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::counters::{CounterAggregator, CounterSnapshot};
use crate::error::{ExportResult, SessionError, SessionResult};
use crate::export::{self, SessionExport};
use crate::finalizer::{FinalizeContext, Finalizer, Summary};
use crate::rolling_log::RollingLog;
use crate::severity::{RunningMean, Severity};
use crate::synth::{FloodSynthesizer, InterceptSynthesizer, Synthesizer};
use crate::types::{
    Completion, DataPoint, Event, EventId, EventIdGenerator, SessionState, SimulationKind,
};

/// Most generation ticks a single session may schedule.
pub const MAX_TICKS_PER_SESSION: u64 = 36_000;

/// Flood (denial-of-service) session.
pub type FloodSession = SimulationSession<FloodSynthesizer>;

/// Interception (man-in-the-middle) session.
pub type InterceptSession = SimulationSession<InterceptSynthesizer>;

/// Notifications broadcast by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session started and ran its first tick.
    Started { epoch: u64, kind: SimulationKind },

    /// A generation tick was applied to the log and counters.
    TickCompleted {
        epoch: u64,
        tick: u64,
        synthesized: u64,
        latest_event_id: Option<EventId>,
    },

    /// Progress rose; reaches 100 when the session finishes.
    Progress { epoch: u64, percent: u8 },

    /// The session was stopped without a summary.
    Stopped { epoch: u64, ticks: u64 },

    /// Summary of a completed session. Sent exactly once per session.
    SummaryPublished(Arc<Summary>),

    /// All session data was discarded.
    Reset,
}

/// Display copy of a session.
///
/// Published after every tick and progress sample. It may lag the
/// authoritative counters and is never used to build a summary.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub epoch: u64,
    pub state: SessionState,
    pub progress: u8,
    pub ticks: u64,
    pub counters: CounterSnapshot,
    pub latest_event_id: Option<EventId>,
    pub log_len: usize,
    pub severity: Option<Severity>,
    pub summary_id: Option<Uuid>,
}

/// `min(100, round(elapsed / duration * 100))`.
pub fn progress_percent(elapsed: Duration, duration: Duration) -> u8 {
    if duration.is_zero() {
        return 100;
    }
    let percent = (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

struct TimerSet {
    generation: JoinHandle<()>,
    progress: JoinHandle<()>,
    timeout: JoinHandle<()>,
}

impl TimerSet {
    fn abort_all(self) {
        self.generation.abort();
        self.progress.abort();
        self.timeout.abort();
    }
}

struct TickReport {
    tick: u64,
    synthesized: u64,
    latest_event_id: Option<EventId>,
}

struct SessionCore<S: Synthesizer> {
    synthesizer: S,
    state: SessionState,
    epoch: u64,
    config: Option<Arc<SessionConfig<S::Params>>>,
    rng: StdRng,
    log: RollingLog<S::Payload>,
    counters: CounterAggregator,
    data_points: Vec<DataPoint>,
    rate_mean: RunningMean,
    progress: u8,
    live_severity: Option<Severity>,
    started_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    finalizer: Finalizer,
    timers: Option<TimerSet>,
}

impl<S: Synthesizer> SessionCore<S> {
    fn new(synthesizer: S) -> Self {
        Self {
            synthesizer,
            state: SessionState::Idle,
            epoch: 0,
            config: None,
            rng: StdRng::from_entropy(),
            log: RollingLog::new(1),
            counters: CounterAggregator::new(S::COUNTERS),
            data_points: Vec::new(),
            rate_mean: RunningMean::new(),
            progress: 0,
            live_severity: None,
            started_at: None,
            started_wall: None,
            finalizer: Finalizer::new(),
            timers: None,
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.state == SessionState::Running
    }

    fn cancel_timers(&mut self) {
        if let Some(timers) = self.timers.take() {
            timers.abort_all();
        }
    }

    fn clear_data(&mut self) {
        self.log.clear();
        self.counters.clear();
        self.data_points.clear();
        self.rate_mean.clear();
        self.progress = 0;
        self.live_severity = None;
        self.finalizer.clear();
    }

    fn begin(&mut self, config: Arc<SessionConfig<S::Params>>, now: Instant) {
        self.clear_data();
        self.epoch += 1;
        self.log = RollingLog::new(config.log_capacity);
        self.rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.started_at = Some(now);
        self.started_wall = Some(Utc::now());
        self.config = Some(config);
        self.state = SessionState::Running;
    }

    fn run_tick(
        &mut self,
        config: &SessionConfig<S::Params>,
        ids: &EventIdGenerator,
        now: Instant,
    ) -> TickReport {
        let tick_no = self.data_points.len() as u64 + 1;
        let tick = self
            .synthesizer
            .synthesize(&config.params, tick_no, ids, &mut self.rng);

        for event in tick.events {
            self.log.append(event);
        }
        let applied = self.counters.record(&tick.delta);

        let elapsed_ms = self
            .started_at
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0);
        self.data_points.push(DataPoint {
            tick: tick_no,
            elapsed_ms,
            synthesized: applied.synthesized,
            flagged: applied.get(S::FLAG_COUNTER),
        });
        self.rate_mean.push(applied.synthesized);
        self.live_severity = S::severity(&config.params, self.rate_mean.mean());

        TickReport {
            tick: tick_no,
            synthesized: applied.synthesized,
            latest_event_id: self.log.latest().map(|e| e.id),
        }
    }

    /// Move to `Finished` through `Finalizing`. Timers must already be
    /// cancelled.
    fn complete(&mut self, completion: Completion, now: Instant) -> SessionResult<Arc<Summary>> {
        let config = match self.config.clone() {
            Some(config) => config,
            None => {
                return Err(SessionError::InvalidTransition {
                    action: "finalize",
                    state: self.state,
                })
            }
        };

        self.state = SessionState::Finalizing;
        self.progress = 100;

        let elapsed = self
            .started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        let ctx = FinalizeContext {
            completion,
            elapsed,
            started_at: self.started_wall.unwrap_or_else(Utc::now),
            data_points: &self.data_points,
        };
        let result = self
            .finalizer
            .finalize::<S>(&self.counters, &self.log, &config, ctx);

        self.state = SessionState::Finished;
        result
    }

    fn view(&self) -> SessionView {
        SessionView {
            epoch: self.epoch,
            state: self.state,
            progress: self.progress,
            ticks: self.data_points.len() as u64,
            counters: self.counters.snapshot(),
            latest_event_id: self.log.latest().map(|e| e.id),
            log_len: self.log.len(),
            severity: self.live_severity,
            summary_id: self.finalizer.summary().map(|s| s.id),
        }
    }
}

struct Shared<S: Synthesizer> {
    core: Mutex<SessionCore<S>>,
    ids: Arc<EventIdGenerator>,
    events: broadcast::Sender<SessionEvent>,
    view: watch::Sender<SessionView>,
}

impl<S: Synthesizer> Shared<S> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn publish_view(&self, core: &SessionCore<S>) {
        self.view.send_replace(core.view());
    }

    fn generation_tick(&self, epoch: u64) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(epoch) {
            return false;
        }
        let config = match core.config.clone() {
            Some(config) => config,
            None => return false,
        };

        let report = core.run_tick(&config, &self.ids, Instant::now());
        debug!(
            session = epoch,
            tick = report.tick,
            synthesized = report.synthesized,
            "Generation tick"
        );
        self.emit(SessionEvent::TickCompleted {
            epoch,
            tick: report.tick,
            synthesized: report.synthesized,
            latest_event_id: report.latest_event_id,
        });
        self.publish_view(&core);
        true
    }

    fn sample_progress(&self, epoch: u64) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(epoch) {
            return false;
        }
        let (start, duration) = match (core.started_at, core.config.as_ref()) {
            (Some(start), Some(config)) => (start, config.duration()),
            _ => return false,
        };

        let percent = progress_percent(start.elapsed(), duration);
        if percent > core.progress {
            core.progress = percent;
            self.emit(SessionEvent::Progress { epoch, percent });
            self.publish_view(&core);
        }
        true
    }

    fn on_timeout(&self, epoch: u64) {
        let mut core = self.core.lock();
        if !core.is_current(epoch) {
            debug!(session = epoch, "Timeout ignored, session no longer running");
            return;
        }

        // This task is the timeout timer; only the other two need cancelling.
        if let Some(timers) = core.timers.take() {
            timers.generation.abort();
            timers.progress.abort();
        }

        let raised = core.progress < 100;
        let result = core.complete(Completion::Timeout, Instant::now());
        if raised {
            self.emit(SessionEvent::Progress {
                epoch,
                percent: 100,
            });
        }
        match result {
            Ok(summary) => {
                info!(
                    session = epoch,
                    summary_id = %summary.id,
                    total = summary.counters.total_synthesized,
                    "Session finished"
                );
                self.emit(SessionEvent::SummaryPublished(summary));
            }
            Err(e) => warn!(session = epoch, error = %e, "Finalization failed"),
        }
        self.publish_view(&core);
    }
}

async fn generation_loop<S: Synthesizer>(
    shared: Arc<Shared<S>>,
    epoch: u64,
    start: Instant,
    period: Duration,
    deadline: Instant,
) {
    let mut ticker = interval_at(start + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        let scheduled = ticker.tick().await;
        if scheduled >= deadline {
            break;
        }
        if !shared.generation_tick(epoch) {
            break;
        }
    }
}

async fn progress_loop<S: Synthesizer>(
    shared: Arc<Shared<S>>,
    epoch: u64,
    start: Instant,
    period: Duration,
) {
    let mut ticker = interval_at(start + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !shared.sample_progress(epoch) {
            break;
        }
    }
}

async fn timeout_task<S: Synthesizer>(shared: Arc<Shared<S>>, epoch: u64, deadline: Instant) {
    sleep_until(deadline).await;
    shared.on_timeout(epoch);
}

/// One simulation widget's engine.
///
/// Owns the counters and rolling log exclusively. Commands are synchronous and
/// safe to call from any thread; timers run on the tokio runtime that was
/// current when `start()` was called.
pub struct SimulationSession<S: Synthesizer> {
    shared: Arc<Shared<S>>,
}

impl<S: Synthesizer + Default> SimulationSession<S> {
    /// Session with a default synthesizer and its own id generator.
    pub fn with_defaults() -> Self {
        Self::new(S::default(), Arc::new(EventIdGenerator::new()))
    }
}

impl<S: Synthesizer> SimulationSession<S> {
    /// Create an idle session. Pass the same `ids` to every session in the
    /// process to keep event ids unique across them.
    pub fn new(synthesizer: S, ids: Arc<EventIdGenerator>) -> Self {
        let core = SessionCore::new(synthesizer);
        let (events, _) = broadcast::channel(1024);
        let (view, _) = watch::channel(core.view());
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                ids,
                events,
                view,
            }),
        }
    }

    /// Start a new session.
    ///
    /// Rejected without touching any state when a session is running or the
    /// configuration is invalid. Runs one tick before returning so the log is
    /// never empty right after a start.
    #[instrument(skip(self, config), fields(kind = %S::KIND))]
    pub fn start(&self, config: SessionConfig<S::Params>) -> SessionResult<()> {
        config.validate_timing()?;
        S::validate(&config.params).map_err(SessionError::InvalidConfig)?;
        let planned_ticks = config.duration_s * 1000 / config.interval_ms;
        if planned_ticks > MAX_TICKS_PER_SESSION {
            return Err(SessionError::InvalidConfig(format!(
                "session would schedule {} ticks, limit is {}",
                planned_ticks, MAX_TICKS_PER_SESSION
            )));
        }
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut core = self.shared.core.lock();
        match core.state {
            SessionState::Running => return Err(SessionError::AlreadyRunning),
            state if !state.can_start() => {
                return Err(SessionError::InvalidTransition {
                    action: "start",
                    state,
                })
            }
            _ => {}
        }

        core.cancel_timers();
        let config = Arc::new(config);
        let now = Instant::now();
        core.begin(config.clone(), now);
        let epoch = core.epoch;

        self.shared.emit(SessionEvent::Started {
            epoch,
            kind: S::KIND,
        });
        let report = core.run_tick(&config, &self.shared.ids, now);
        self.shared.emit(SessionEvent::TickCompleted {
            epoch,
            tick: report.tick,
            synthesized: report.synthesized,
            latest_event_id: report.latest_event_id,
        });

        let deadline = now + config.duration();
        core.timers = Some(TimerSet {
            generation: runtime.spawn(generation_loop(
                self.shared.clone(),
                epoch,
                now,
                config.interval(),
                deadline,
            )),
            progress: runtime.spawn(progress_loop(
                self.shared.clone(),
                epoch,
                now,
                config.progress_interval(),
            )),
            timeout: runtime.spawn(timeout_task(self.shared.clone(), epoch, deadline)),
        });

        info!(
            session = epoch,
            interval_ms = config.interval_ms,
            duration_s = config.duration_s,
            log_capacity = config.log_capacity,
            "Session started"
        );
        self.shared.publish_view(&core);
        Ok(())
    }

    /// Halt a running session without producing a summary.
    ///
    /// The log and counters are kept for inspection. Callers are expected to
    /// have confirmed the stop with the user.
    #[instrument(skip(self), fields(kind = %S::KIND))]
    pub fn stop(&self) -> SessionResult<()> {
        let mut core = self.shared.core.lock();
        if core.state != SessionState::Running {
            return Err(SessionError::InvalidTransition {
                action: "stop",
                state: core.state,
            });
        }

        core.cancel_timers();
        core.state = SessionState::Stopped;
        let ticks = core.data_points.len() as u64;
        info!(session = core.epoch, ticks, "Session stopped");

        self.shared.emit(SessionEvent::Stopped {
            epoch: core.epoch,
            ticks,
        });
        self.shared.publish_view(&core);
        Ok(())
    }

    /// End a running session early and publish its summary.
    ///
    /// Only offered by variants with `MANUAL_FINISH`.
    #[instrument(skip(self), fields(kind = %S::KIND))]
    pub fn finish(&self) -> SessionResult<Arc<Summary>> {
        if !S::MANUAL_FINISH {
            return Err(SessionError::Unsupported {
                action: "finish",
                kind: S::KIND.as_str(),
            });
        }

        let mut core = self.shared.core.lock();
        if core.state != SessionState::Running {
            return Err(SessionError::InvalidTransition {
                action: "finish",
                state: core.state,
            });
        }

        core.cancel_timers();
        let raised = core.progress < 100;
        let summary = core.complete(Completion::Manual, Instant::now())?;
        if raised {
            self.shared.emit(SessionEvent::Progress {
                epoch: core.epoch,
                percent: 100,
            });
        }
        info!(
            session = core.epoch,
            summary_id = %summary.id,
            total = summary.counters.total_synthesized,
            "Session finished early"
        );

        self.shared
            .emit(SessionEvent::SummaryPublished(summary.clone()));
        self.shared.publish_view(&core);
        Ok(summary)
    }

    /// Cancel any timers, discard all data and return to `Idle`.
    #[instrument(skip(self), fields(kind = %S::KIND))]
    pub fn reset(&self) {
        let mut core = self.shared.core.lock();
        core.cancel_timers();
        core.clear_data();
        // Bump the epoch so callbacks already waiting on the lock see a
        // stale session.
        core.epoch += 1;
        core.config = None;
        core.started_at = None;
        core.started_wall = None;
        core.state = SessionState::Idle;
        debug!(session = core.epoch, "Session reset");

        self.shared.emit(SessionEvent::Reset);
        self.shared.publish_view(&core);
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state
    }

    /// Current session epoch; increases on every start and reset.
    pub fn epoch(&self) -> u64 {
        self.shared.core.lock().epoch
    }

    pub fn progress(&self) -> u8 {
        self.shared.core.lock().progress
    }

    /// Authoritative counters, reflecting every completed tick.
    pub fn counters(&self) -> CounterSnapshot {
        self.shared.core.lock().counters.snapshot()
    }

    pub fn summary(&self) -> Option<Arc<Summary>> {
        self.shared.core.lock().finalizer.summary()
    }

    pub fn config(&self) -> Option<Arc<SessionConfig<S::Params>>> {
        self.shared.core.lock().config.clone()
    }

    /// Retained log entries, newest first.
    pub fn log(&self) -> Vec<Event<S::Payload>> {
        self.shared.core.lock().log.to_vec()
    }

    pub fn latest_event(&self) -> Option<Event<S::Payload>> {
        self.shared.core.lock().log.latest().cloned()
    }

    pub fn find_event(&self, id: EventId) -> Option<Event<S::Payload>> {
        self.shared.core.lock().log.find_by_id(id).cloned()
    }

    pub fn data_points(&self) -> Vec<DataPoint> {
        self.shared.core.lock().data_points.clone()
    }

    /// Severity of the samples so far, for live display.
    pub fn live_severity(&self) -> Option<Severity> {
        self.shared.core.lock().live_severity
    }

    pub fn ids(&self) -> &Arc<EventIdGenerator> {
        &self.shared.ids
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Receiver of the lagging display view.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.shared.view.subscribe()
    }

    /// Copy of everything an export needs, taken under the lock.
    pub fn snapshot(&self) -> SessionExport<S::Payload, S::Params> {
        let core = self.shared.core.lock();
        SessionExport {
            exported_at: Utc::now(),
            kind: S::KIND,
            state: core.state,
            parameters: core.config.as_deref().cloned(),
            counters: core.counters.snapshot(),
            data_points: core.data_points.clone(),
            logs: core.log.to_vec(),
            summary: core.finalizer.summary().map(|s| (*s).clone()),
        }
    }

    pub fn export_json(&self) -> ExportResult<String> {
        export::to_json(&self.snapshot())
    }

    /// CSV of the retained log.
    pub fn export_csv(&self) -> ExportResult<Vec<u8>> {
        export::logs_to_csv(&self.snapshot())
    }

    /// CSV of the per-tick data points.
    pub fn export_data_points_csv(&self) -> ExportResult<Vec<u8>> {
        export::data_points_to_csv(&self.snapshot())
    }
}

impl<S: Synthesizer> Drop for SimulationSession<S> {
    fn drop(&mut self) {
        self.shared.core.lock().cancel_timers();
    }
}

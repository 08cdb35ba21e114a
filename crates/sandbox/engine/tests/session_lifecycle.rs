//! End-to-end session lifecycle tests on a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::sleep;
use vulnsight_sandbox::synth::flood::{ERROR, SENT, SUCCESS};
use vulnsight_sandbox::synth::intercept::INTERCEPTED;
use vulnsight_sandbox::synth::{FloodParams, InterceptParams};
use vulnsight_sandbox::{
    Completion, EventId, EventIdGenerator, FloodSession, FloodSynthesizer, InterceptSession,
    InterceptSynthesizer, SessionConfig, SessionError, SessionEvent, SessionState,
    SimulationSession,
};

fn flood_config() -> SessionConfig<FloodParams> {
    SessionConfig::new(FloodParams::default())
        .with_interval_ms(1000)
        .with_duration_s(3)
        .with_seed(7)
}

fn intercept_config() -> SessionConfig<InterceptParams> {
    SessionConfig::new(InterceptParams::default())
        .with_interval_ms(125)
        .with_duration_s(1)
        .with_log_capacity(5)
        .with_seed(7)
}

#[tokio::test(start_paused = true)]
async fn test_flood_runs_to_timeout() {
    let session = FloodSession::with_defaults();
    session.start(flood_config()).unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.data_points().len(), 1, "first tick runs on start");

    sleep(Duration::from_millis(3500)).await;

    assert_eq!(session.state(), SessionState::Finished);
    assert_eq!(session.progress(), 100);

    let summary = session.summary().expect("summary after timeout");
    let points = session.data_points();
    assert_eq!(points.len(), 3);
    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.duration_s, 3.0);
    assert_eq!(summary.completion, Completion::Timeout);

    let total: u64 = points.iter().map(|p| p.synthesized).sum();
    assert_eq!(summary.counters.get(SENT), total);
    assert_eq!(summary.counters.total_synthesized, total);
    assert_eq!(
        summary.counters.get(SUCCESS) + summary.counters.get(ERROR),
        summary.counters.get(SENT)
    );
    assert_eq!(summary.counters, session.counters());
    assert_eq!(session.live_severity(), summary.severity);
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_data_without_summary() {
    let session = FloodSession::with_defaults();
    session.start(flood_config()).unwrap();

    sleep(Duration::from_millis(1500)).await;
    session.stop().unwrap();

    let ticks = session.data_points().len();
    let counters = session.counters();
    assert_eq!(ticks, 2);
    assert_eq!(session.state(), SessionState::Stopped);

    sleep(Duration::from_secs(5)).await;

    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.summary().is_none());
    assert_eq!(session.data_points().len(), ticks, "no tick after stop");
    assert_eq!(session.counters(), counters);
    assert!(!session.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_at_deadline_wins_over_timeout() {
    let session = FloodSession::with_defaults();
    let mut events = session.subscribe();
    session.start(flood_config().with_duration_s(1)).unwrap();

    tokio::time::advance(Duration::from_millis(1000)).await;
    session.stop().unwrap();

    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.summary().is_none());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.summary().is_none());

    loop {
        match events.try_recv() {
            Ok(SessionEvent::SummaryPublished(summary)) => {
                panic!("summary {} published after stop", summary.id)
            }
            Ok(_) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(n)) => panic!("lagged by {}", n),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_log_keeps_newest_entries() {
    let ids = Arc::new(EventIdGenerator::new());
    let session = SimulationSession::new(InterceptSynthesizer, ids);
    session.start(intercept_config()).unwrap();

    sleep(Duration::from_millis(1200)).await;

    assert_eq!(session.state(), SessionState::Finished);
    assert_eq!(session.data_points().len(), 8);
    assert_eq!(session.counters().get(INTERCEPTED), 8);

    let ids: Vec<u64> = session.log().iter().map(|e| e.id.0).collect();
    assert_eq!(ids, vec![8, 7, 6, 5, 4]);
    assert!(session.find_event(EventId(3)).is_none());
    assert_eq!(session.latest_event().unwrap().id, EventId(8));
}

#[tokio::test(start_paused = true)]
async fn test_finish_only_once() {
    let session = FloodSession::with_defaults();
    session.start(flood_config()).unwrap();
    sleep(Duration::from_millis(1200)).await;

    let summary = session.finish().unwrap();
    assert_eq!(summary.completion, Completion::Manual);
    assert_eq!(summary.ticks, 2);
    assert!(summary.duration_s > 1.0 && summary.duration_s < 1.5);

    let again = session.finish();
    assert!(matches!(
        again,
        Err(SessionError::InvalidTransition {
            action: "finish",
            ..
        })
    ));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(session.summary().unwrap().id, summary.id);
    assert_eq!(session.data_points().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_intercept_has_no_early_finish() {
    let session = InterceptSession::with_defaults();
    session.start(intercept_config()).unwrap();

    let result = session.finish();
    assert!(matches!(result, Err(SessionError::Unsupported { .. })));
    assert_eq!(session.state(), SessionState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_restart_gives_new_summary() {
    let session = FloodSession::with_defaults();

    session.start(flood_config()).unwrap();
    sleep(Duration::from_millis(3500)).await;
    let first = session.summary().unwrap();

    session.start(flood_config()).unwrap();
    assert!(session.summary().is_none(), "summary cleared on start");
    assert_eq!(session.data_points().len(), 1);

    sleep(Duration::from_millis(3500)).await;
    let second = session.summary().unwrap();

    assert_eq!(first.counters, second.counters, "same seed, same counts");
    assert_ne!(first.id, second.id);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_start_changes_nothing() {
    let session = FloodSession::with_defaults();
    session.start(flood_config()).unwrap();
    sleep(Duration::from_millis(3500)).await;
    let summary = session.summary().unwrap();
    let epoch = session.epoch();

    let bad = flood_config().with_interval_ms(0);
    assert!(matches!(
        session.start(bad),
        Err(SessionError::InvalidConfig(_))
    ));

    let mut params = FloodParams::default();
    params.target_rate = 0;
    let bad = SessionConfig::new(params);
    assert!(matches!(
        session.start(bad),
        Err(SessionError::InvalidConfig(_))
    ));

    let too_many_ticks = flood_config().with_interval_ms(10).with_duration_s(3600);
    assert!(session.start(too_many_ticks).is_err());

    assert_eq!(session.state(), SessionState::Finished);
    assert_eq!(session.epoch(), epoch);
    assert_eq!(session.summary().unwrap().id, summary.id);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_while_running() {
    let session = FloodSession::with_defaults();
    session.start(flood_config()).unwrap();
    let epoch = session.epoch();

    assert!(matches!(
        session.start(flood_config()),
        Err(SessionError::AlreadyRunning)
    ));
    assert_eq!(session.epoch(), epoch);
    assert_eq!(session.data_points().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_monotonic() {
    let session = FloodSession::with_defaults();
    let mut events = session.subscribe();
    session.start(flood_config()).unwrap();

    sleep(Duration::from_millis(3500)).await;

    let mut last = 0u8;
    let mut summaries = 0;
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Progress { percent, .. }) => {
                assert!(percent >= last, "{} after {}", percent, last);
                assert!(percent <= 100);
                last = percent;
            }
            Ok(SessionEvent::SummaryPublished(_)) => summaries += 1,
            Ok(_) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(n)) => panic!("lagged by {}", n),
        }
    }

    assert_eq!(last, 100);
    assert_eq!(summaries, 1);
    assert_eq!(session.progress(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_log_capacity_does_not_change_counts() {
    let small = SimulationSession::new(FloodSynthesizer, Arc::new(EventIdGenerator::new()));
    let large = SimulationSession::new(FloodSynthesizer, Arc::new(EventIdGenerator::new()));

    small.start(flood_config().with_log_capacity(10)).unwrap();
    large.start(flood_config().with_log_capacity(5000)).unwrap();
    sleep(Duration::from_millis(3500)).await;

    let a = small.summary().unwrap();
    let b = large.summary().unwrap();
    assert_eq!(a.counters, b.counters);
    assert_eq!(small.log().len(), 10);
    assert!(large.log().len() > 10);
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_idle() {
    let session = FloodSession::with_defaults();
    session.start(flood_config()).unwrap();
    sleep(Duration::from_millis(1200)).await;

    session.reset();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.log().is_empty());
    assert_eq!(session.counters().total_synthesized, 0);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.summary().is_none());
    assert!(session.data_points().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_watch_view_follows_session() {
    let session = FloodSession::with_defaults();
    let mut view = session.watch();
    session.start(flood_config()).unwrap();

    sleep(Duration::from_millis(3500)).await;
    assert!(view.has_changed().unwrap());

    let latest = view.borrow_and_update().clone();
    assert_eq!(latest.state, SessionState::Finished);
    assert_eq!(latest.ticks, 3);
    assert_eq!(latest.summary_id, session.summary().map(|s| s.id));
}

#[tokio::test(start_paused = true)]
async fn test_export_after_stop() {
    let session = InterceptSession::with_defaults();
    session.start(intercept_config()).unwrap();
    sleep(Duration::from_millis(300)).await;
    session.stop().unwrap();

    let json: serde_json::Value = serde_json::from_str(&session.export_json().unwrap()).unwrap();
    assert_eq!(json["state"], "stopped");
    assert!(json["summary"].is_null());
    assert_eq!(json["parameters"]["log_capacity"], 5);

    let csv = String::from_utf8(session.export_csv().unwrap()).unwrap();
    assert!(csv.starts_with("id,timestamp,"));

    let points = String::from_utf8(session.export_data_points_csv().unwrap()).unwrap();
    assert!(points.starts_with("tick,elapsed_ms,synthesized,flagged\n1,0,"));
}

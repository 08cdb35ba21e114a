//! VulnSight Sandbox - headless session driver
//!
//! Runs one flood or intercept session the way the dashboard widgets do:
//! - prints progress while the session runs
//! - stops or finishes early on request
//! - prints the summary and writes JSON/CSV exports

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vulnsight_sandbox::render::pretty_json;
use vulnsight_sandbox::synth::InterceptPreset;
use vulnsight_sandbox::{
    EventIdGenerator, FloodSynthesizer, InterceptSynthesizer, SessionConfig, SessionEvent,
    SimulationSession, Synthesizer,
};

mod config;

use config::SandboxConfig;

/// VulnSight sandbox CLI
#[derive(Parser)]
#[command(name = "vulnsight-sandbox")]
#[command(about = "VulnSight Sandbox - simulated attack sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VULNSIGHT_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "VULNSIGHT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "VULNSIGHT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a denial-of-service flood
    Flood {
        #[command(flatten)]
        run: RunArgs,

        /// Label of the simulated target
        #[arg(long)]
        target: Option<String>,

        /// Nominal requests per simulated second
        #[arg(long)]
        rate: Option<u64>,

        /// End the session early with a summary after this many milliseconds
        #[arg(long)]
        finish_after_ms: Option<u64>,
    },

    /// Simulate a man-in-the-middle interception
    Intercept {
        #[command(flatten)]
        run: RunArgs,

        /// Interception preset
        #[arg(long)]
        preset: Option<InterceptPreset>,

        /// Host shown in synthesized exchanges
        #[arg(long)]
        host: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Generation interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Session length in seconds
    #[arg(long)]
    duration_s: Option<u64>,

    /// Number of log entries retained
    #[arg(long)]
    log_capacity: Option<usize>,

    /// Seed for reproducible sessions
    #[arg(long)]
    seed: Option<u64>,

    /// Stop the session after this many milliseconds (no summary)
    #[arg(long)]
    stop_after_ms: Option<u64>,

    /// Write a JSON export to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the retained log as CSV to this path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the per-tick data points as CSV to this path
    #[arg(long)]
    data_points_csv: Option<PathBuf>,
}

impl RunArgs {
    fn apply<P>(&self, mut config: SessionConfig<P>) -> SessionConfig<P> {
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(duration_s) = self.duration_s {
            config.duration_s = duration_s;
        }
        if let Some(log_capacity) = self.log_capacity {
            config.log_capacity = log_capacity;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SandboxConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.log_json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let ids = Arc::new(EventIdGenerator::new());

    match cli.command {
        Commands::Flood {
            run,
            target,
            rate,
            finish_after_ms,
        } => {
            let mut session_config = run.apply(config.flood);
            if let Some(target) = target {
                session_config.params.target = target;
            }
            if let Some(rate) = rate {
                session_config.params.target_rate = rate;
            }
            let session = SimulationSession::new(FloodSynthesizer, ids);
            drive(&session, session_config, &run, finish_after_ms).await
        }
        Commands::Intercept { run, preset, host } => {
            let mut session_config = run.apply(config.intercept);
            if let Some(preset) = preset {
                session_config.params.preset = preset;
            }
            if let Some(host) = host {
                session_config.params.host = host;
            }
            let session = SimulationSession::new(InterceptSynthesizer, ids);
            drive(&session, session_config, &run, None).await
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run one session until it ends, then report and export it.
async fn drive<S: Synthesizer>(
    session: &SimulationSession<S>,
    config: SessionConfig<S::Params>,
    run: &RunArgs,
    finish_after_ms: Option<u64>,
) -> Result<()> {
    let mut events = session.subscribe();
    session
        .start(config)
        .with_context(|| format!("starting {} session", S::KIND))?;

    let started = Instant::now();
    let mut stop_at = run
        .stop_after_ms
        .map(|ms| started + Duration::from_millis(ms));
    let mut finish_at = finish_after_ms.map(|ms| started + Duration::from_millis(ms));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Progress { percent, .. }) => {
                    let counters = session.counters();
                    println!(
                        "[{:>3}%] {}",
                        percent,
                        serde_json::to_string(&counters).unwrap_or_default()
                    );
                }
                Ok(SessionEvent::Stopped { ticks, .. }) => {
                    println!("Session stopped after {} ticks; no summary produced", ticks);
                    break;
                }
                Ok(SessionEvent::SummaryPublished(summary)) => {
                    println!("{}", pretty_json(summary.as_ref()));
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = wait_until(stop_at) => {
                stop_at = None;
                if let Err(e) = session.stop() {
                    warn!(error = %e, "Stop rejected");
                }
            }
            _ = wait_until(finish_at) => {
                finish_at = None;
                if let Err(e) = session.finish() {
                    warn!(error = %e, "Finish rejected");
                }
            }
        }
    }

    export(session, run)
}

fn export<S: Synthesizer>(session: &SimulationSession<S>, run: &RunArgs) -> Result<()> {
    if let Some(path) = &run.json {
        let json = session.export_json().context("building JSON export")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "JSON export written");
    }
    if let Some(path) = &run.csv {
        let csv = session.export_csv().context("building CSV export")?;
        std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "CSV export written");
    }
    if let Some(path) = &run.data_points_csv {
        let csv = session
            .export_data_points_csv()
            .context("building data point export")?;
        std::fs::write(path, csv).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Data point export written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_flood() {
        let cli = Cli::try_parse_from([
            "vulnsight-sandbox",
            "flood",
            "--rate",
            "1500",
            "--duration-s",
            "5",
            "--finish-after-ms",
            "2000",
        ])
        .unwrap();
        match cli.command {
            Commands::Flood {
                run,
                rate,
                finish_after_ms,
                ..
            } => {
                assert_eq!(rate, Some(1500));
                assert_eq!(run.duration_s, Some(5));
                assert_eq!(finish_after_ms, Some(2000));
            }
            _ => panic!("expected flood"),
        }
    }

    #[test]
    fn test_cli_parses_preset() {
        let cli = Cli::try_parse_from([
            "vulnsight-sandbox",
            "intercept",
            "--preset",
            "ssl_strip",
        ])
        .unwrap();
        match cli.command {
            Commands::Intercept { preset, .. } => {
                assert_eq!(preset, Some(InterceptPreset::SslStrip));
            }
            _ => panic!("expected intercept"),
        }
    }

    #[test]
    fn test_run_args_override_config() {
        let run = RunArgs {
            interval_ms: Some(250),
            duration_s: None,
            log_capacity: Some(20),
            seed: Some(9),
            stop_after_ms: None,
            json: None,
            csv: None,
            data_points_csv: None,
        };
        let config = run.apply(SandboxConfig::default().flood);
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.duration_s, 10);
        assert_eq!(config.log_capacity, 20);
        assert_eq!(config.seed, Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_writes_exports() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunArgs {
            interval_ms: Some(100),
            duration_s: Some(1),
            log_capacity: Some(5),
            seed: Some(1),
            stop_after_ms: None,
            json: Some(dir.path().join("session.json")),
            csv: Some(dir.path().join("log.csv")),
            data_points_csv: Some(dir.path().join("points.csv")),
        };
        let config = run.apply(SandboxConfig::default().intercept);
        let session =
            SimulationSession::new(InterceptSynthesizer, Arc::new(EventIdGenerator::new()));

        drive(&session, config, &run, None).await.unwrap();

        assert!(session.summary().is_some());
        let json = std::fs::read_to_string(dir.path().join("session.json")).unwrap();
        assert!(json.contains("\"summary\""));
        let points = std::fs::read_to_string(dir.path().join("points.csv")).unwrap();
        assert_eq!(points.lines().count(), 11);
    }
}

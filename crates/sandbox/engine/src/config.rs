//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Smallest accepted generation or progress interval.
pub const MIN_INTERVAL_MS: u64 = 10;
/// Longest accepted session.
pub const MAX_DURATION_S: u64 = 3600;
/// Largest accepted rolling log.
pub const MAX_LOG_CAPACITY: usize = 10_000;

/// Immutable configuration of one session.
///
/// Supplied to `start()` and never changed while the session runs; a new
/// configuration needs a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig<P> {
    /// Generation timer period in milliseconds.
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Session length in seconds.
    #[serde(default = "default_duration")]
    pub duration_s: u64,

    /// Maximum number of events retained for display.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Progress sampling period in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Seed for reproducible synthesis. Entropy is used when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Synthesizer parameters.
    pub params: P,
}

impl<P> SessionConfig<P> {
    pub fn new(params: P) -> Self {
        Self {
            interval_ms: default_interval(),
            duration_s: default_duration(),
            log_capacity: default_log_capacity(),
            progress_interval_ms: default_progress_interval(),
            seed: None,
            params,
        }
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_duration_s(mut self, duration_s: u64) -> Self {
        self.duration_s = duration_s;
        self
    }

    pub fn with_log_capacity(mut self, log_capacity: usize) -> Self {
        self.log_capacity = log_capacity;
        self
    }

    pub fn with_progress_interval_ms(mut self, progress_interval_ms: u64) -> Self {
        self.progress_interval_ms = progress_interval_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_s)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Check the timing and sizing fields. Parameter checks belong to the
    /// synthesizer.
    pub fn validate_timing(&self) -> SessionResult<()> {
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(SessionError::InvalidConfig(format!(
                "interval_ms must be at least {}, got {}",
                MIN_INTERVAL_MS, self.interval_ms
            )));
        }
        if self.duration_s == 0 || self.duration_s > MAX_DURATION_S {
            return Err(SessionError::InvalidConfig(format!(
                "duration_s must be in 1..={}, got {}",
                MAX_DURATION_S, self.duration_s
            )));
        }
        if self.log_capacity == 0 || self.log_capacity > MAX_LOG_CAPACITY {
            return Err(SessionError::InvalidConfig(format!(
                "log_capacity must be in 1..={}, got {}",
                MAX_LOG_CAPACITY, self.log_capacity
            )));
        }
        if self.progress_interval_ms < MIN_INTERVAL_MS {
            return Err(SessionError::InvalidConfig(format!(
                "progress_interval_ms must be at least {}, got {}",
                MIN_INTERVAL_MS, self.progress_interval_ms
            )));
        }
        Ok(())
    }
}

impl<P: Default> Default for SessionConfig<P> {
    fn default() -> Self {
        Self::new(P::default())
    }
}

fn default_interval() -> u64 {
    1000
}

fn default_duration() -> u64 {
    10
}

fn default_log_capacity() -> usize {
    200
}

fn default_progress_interval() -> u64 {
    150
}

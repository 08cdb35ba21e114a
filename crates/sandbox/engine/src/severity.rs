//! Coarse severity derived from the sampled-rate series.

use serde::{Deserialize, Serialize};

/// Estimated impact of a flood session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No samples yet.
    Unknown,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Mean-rate thresholds. A mean strictly above `high` is High, strictly
/// above `medium` is Medium, anything else Low.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            medium: 600.0,
            high: 1200.0,
        }
    }
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<(), String> {
        if !self.medium.is_finite() || !self.high.is_finite() || self.medium < 0.0 {
            return Err("severity thresholds must be finite and non-negative".into());
        }
        if self.medium > self.high {
            return Err(format!(
                "medium threshold {} exceeds high threshold {}",
                self.medium, self.high
            ));
        }
        Ok(())
    }

    /// Classify by the mean per-tick rate, `None` meaning no samples.
    ///
    /// Used both for the live display and for the frozen summary value.
    pub fn classify(&self, mean_rate: Option<f64>) -> Severity {
        match mean_rate {
            None => Severity::Unknown,
            Some(avg) if avg > self.high => Severity::High,
            Some(avg) if avg > self.medium => Severity::Medium,
            Some(_) => Severity::Low,
        }
    }
}

/// Arithmetic mean, `None` for an empty series.
pub fn mean(samples: &[u64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| *s as f64).sum();
    Some(sum / samples.len() as f64)
}

/// Mean of a rate series maintained one sample at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningMean {
    sum: u128,
    count: u64,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: u64) {
        self.sum += u128::from(sample);
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum as f64 / self.count as f64)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

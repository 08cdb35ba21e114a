//! Running counters: the ledger of record for a session.
//!
//! Totals are accumulated from every synthesized event, including the ones a
//! display cap kept out of the rolling log. They only ever grow while a
//! session runs and are never corrected when the log evicts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counter increments produced by one generation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterDelta {
    /// Events synthesized by the tick, uncapped.
    pub synthesized: u64,
    /// Named increments, e.g. `success` or `alerts`.
    pub increments: BTreeMap<&'static str, u64>,
}

impl CounterDelta {
    pub fn new(synthesized: u64) -> Self {
        Self {
            synthesized,
            increments: BTreeMap::new(),
        }
    }

    /// Add `amount` to a named increment.
    pub fn add(&mut self, name: &'static str, amount: u64) {
        *self.increments.entry(name).or_insert(0) += amount;
    }

    pub fn with(mut self, name: &'static str, amount: u64) -> Self {
        self.add(name, amount);
        self
    }

    pub fn get(&self, name: &str) -> u64 {
        self.increments.get(name).copied().unwrap_or(0)
    }
}

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub total_synthesized: u64,
    #[serde(flatten)]
    pub counters: BTreeMap<String, u64>,
}

impl CounterSnapshot {
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Authoritative counter cell.
///
/// `record` updates synchronously, so any reader that holds the session lock
/// after a `record` call has returned sees its effect.
#[derive(Debug, Clone)]
pub struct CounterAggregator {
    total_synthesized: u64,
    counters: BTreeMap<&'static str, u64>,
}

impl CounterAggregator {
    /// Create an aggregator with every named counter at zero.
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            total_synthesized: 0,
            counters: names.iter().map(|name| (*name, 0)).collect(),
        }
    }

    /// Apply one tick's delta and return what was applied.
    pub fn record(&mut self, delta: &CounterDelta) -> CounterDelta {
        self.total_synthesized = self.total_synthesized.saturating_add(delta.synthesized);
        for (name, amount) in &delta.increments {
            let slot = self.counters.entry(*name).or_insert(0);
            *slot = slot.saturating_add(*amount);
        }
        delta.clone()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn total_synthesized(&self) -> u64 {
        self.total_synthesized
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_synthesized: self.total_synthesized,
            counters: self
                .counters
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }
    }

    /// Zero every counter, keeping the registered names.
    pub fn clear(&mut self) {
        self.total_synthesized = 0;
        for value in self.counters.values_mut() {
            *value = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let agg = CounterAggregator::new(&["sent", "error"]);
        let snap = agg.snapshot();
        assert_eq!(snap.total_synthesized, 0);
        assert_eq!(snap.get("sent"), 0);
        assert_eq!(snap.counters.len(), 2);
    }

    #[test]
    fn record_accumulates() {
        let mut agg = CounterAggregator::new(&["sent", "error"]);
        agg.record(&CounterDelta::new(5).with("sent", 5).with("error", 1));
        agg.record(&CounterDelta::new(3).with("sent", 3));
        assert_eq!(agg.total_synthesized(), 8);
        assert_eq!(agg.get("sent"), 8);
        assert_eq!(agg.get("error"), 1);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let mut agg = CounterAggregator::new(&["sent"]);
        agg.record(&CounterDelta::new(u64::MAX).with("sent", u64::MAX));
        agg.record(&CounterDelta::new(1).with("sent", 1));
        assert_eq!(agg.total_synthesized(), u64::MAX);
        assert_eq!(agg.get("sent"), u64::MAX);
    }

    #[test]
    fn clear_keeps_names() {
        let mut agg = CounterAggregator::new(&["intercepted"]);
        agg.record(&CounterDelta::new(2).with("intercepted", 2));
        agg.clear();
        let snap = agg.snapshot();
        assert_eq!(snap.get("intercepted"), 0);
        assert!(snap.counters.contains_key("intercepted"));
    }

    #[test]
    fn snapshot_serializes_flat() {
        let mut agg = CounterAggregator::new(&["sent"]);
        agg.record(&CounterDelta::new(4).with("sent", 4));
        let json = serde_json::to_value(agg.snapshot()).unwrap();
        assert_eq!(json["total_synthesized"], 4);
        assert_eq!(json["sent"], 4);
    }
}

//! Bounded newest-first event log.
//!
//! The log is a display view only. Evicting an entry never touches the
//! counters, which remain the ledger of record.

use std::collections::VecDeque;

use crate::types::{Event, EventId};

/// Capacity-bounded, newest-first sequence of events.
#[derive(Debug, Clone)]
pub struct RollingLog<P> {
    entries: VecDeque<Event<P>>,
    capacity: usize,
    evicted: u64,
}

impl<P> RollingLog<P> {
    /// Create an empty log. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Insert at the front, evicting from the back once over capacity.
    pub fn append(&mut self, event: Event<P>) {
        self.entries.push_front(event);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
            self.evicted += 1;
        }
    }

    /// The most recently appended event.
    pub fn latest(&self) -> Option<&Event<P>> {
        self.entries.front()
    }

    /// Retained events, newest first.
    pub fn all(&self) -> impl ExactSizeIterator<Item = &Event<P>> + '_ {
        self.entries.iter()
    }

    pub fn find_by_id(&self, id: EventId) -> Option<&Event<P>> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped off the back since the last clear.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.evicted = 0;
    }
}

impl<P: Clone> RollingLog<P> {
    /// Owned copy of the retained events, newest first.
    pub fn to_vec(&self) -> Vec<Event<P>> {
        self.entries.iter().cloned().collect()
    }
}

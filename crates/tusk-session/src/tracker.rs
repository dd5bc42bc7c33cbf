//! Load tracking for N+1 detection.
//!
//! Every relationship load and every lazy property load issues one query
//! for a whole batch of records. When the same member keeps being loaded
//! for the same entity, batching is not kicking in (records were fetched
//! one by one, or loaded outside any collection) and the tracker warns.
//!
//! ```ignore
//! // One query per user: warns on the third load of `group`.
//! for id in [1, 2, 3] {
//!     let user = session.get("User", &[id.into()])?.unwrap();
//!     user.one("group")?;
//! }
//!
//! // One query for every user: no warning.
//! for user in session.find("User")?.iter()? {
//!     user.one("group")?;
//! }
//! ```

use std::collections::HashMap;

/// Counts loads per (entity, member).
#[derive(Debug)]
pub struct LoadTracker {
    /// (entity, member) -> load count
    counts: HashMap<(String, String), usize>,
    /// Loads of one member that trigger a warning
    threshold: usize,
    enabled: bool,
    /// Recent loads, oldest first
    events: Vec<LoadEvent>,
}

impl Default for LoadTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded load.
#[derive(Debug, Clone)]
pub struct LoadEvent {
    pub entity: String,
    /// Relationship or lazy property name
    pub member: String,
    /// Records the load covered
    pub batch: usize,
}

/// Statistics about recorded loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Total number of loads recorded
    pub total_loads: usize,
    /// Number of distinct members loaded
    pub members_loaded: usize,
    /// Number of members that reached the threshold
    pub potential_n1: usize,
}

const MAX_EVENTS: usize = 64;

impl LoadTracker {
    /// Create a new tracker with default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one load of `member` covering `batch` records of `entity`.
    ///
    /// Warns when the count for the pair reaches the threshold.
    pub fn record_load(&mut self, entity: &str, member: &str, batch: usize) {
        if !self.enabled {
            return;
        }

        let count = self
            .counts
            .entry((entity.to_string(), member.to_string()))
            .or_insert(0);
        *count += 1;
        let count = *count;

        if self.events.len() == MAX_EVENTS {
            self.events.remove(0);
        }
        self.events.push(LoadEvent {
            entity: entity.to_string(),
            member: member.to_string(),
            batch,
        });

        if count == self.threshold {
            self.emit_warning(entity, member, count);
        }
    }

    fn emit_warning(&self, entity: &str, member: &str, count: usize) {
        tracing::warn!(
            target: "tusk::n1",
            entity,
            member,
            queries = count,
            threshold = self.threshold,
            "N+1 QUERY PATTERN DETECTED! Load records through a collection so members load in batches."
        );

        let batches: Vec<usize> = self
            .events
            .iter()
            .filter(|e| e.entity == entity && e.member == member)
            .map(|e| e.batch)
            .collect();
        tracing::debug!(target: "tusk::n1", entity, member, ?batches, "batch sizes so far");
    }

    /// Reset all counts and events.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.events.clear();
    }

    #[must_use]
    pub fn count_for(&self, entity: &str, member: &str) -> usize {
        self.counts
            .get(&(entity.to_string(), member.to_string()))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn events(&self) -> &[LoadEvent] {
        &self.events
    }

    #[must_use]
    pub fn stats(&self) -> LoadStats {
        LoadStats {
            total_loads: self.counts.values().sum(),
            members_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|&&c| c >= self.threshold)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_new_defaults() {
        let tracker = LoadTracker::new();
        assert_eq!(tracker.threshold(), 3);
        assert!(tracker.is_enabled());
        assert_eq!(tracker.stats(), LoadStats::default());
    }

    #[test]
    fn test_tracker_counts_per_member() {
        let mut tracker = LoadTracker::new();
        tracker.record_load("User", "group", 10);
        tracker.record_load("User", "group", 1);
        tracker.record_load("User", "biography", 10);
        assert_eq!(tracker.count_for("User", "group"), 2);
        assert_eq!(tracker.count_for("User", "biography"), 1);
        assert_eq!(tracker.count_for("Group", "users"), 0);

        let stats = tracker.stats();
        assert_eq!(stats.total_loads, 3);
        assert_eq!(stats.members_loaded, 2);
        assert_eq!(stats.potential_n1, 0);
    }

    #[test]
    fn test_tracker_threshold_and_reset() {
        let mut tracker = LoadTracker::new().with_threshold(2);
        tracker.record_load("User", "group", 1);
        tracker.record_load("User", "group", 1);
        assert_eq!(tracker.stats().potential_n1, 1);
        assert_eq!(tracker.events().len(), 2);

        tracker.reset();
        assert_eq!(tracker.count_for("User", "group"), 0);
        assert!(tracker.events().is_empty());
    }

    #[test]
    fn test_tracker_disabled() {
        let mut tracker = LoadTracker::new();
        tracker.disable();
        tracker.record_load("User", "group", 1);
        assert_eq!(tracker.count_for("User", "group"), 0);
        tracker.enable();
        tracker.record_load("User", "group", 1);
        assert_eq!(tracker.count_for("User", "group"), 1);
    }

    #[test]
    fn test_tracker_keeps_recent_events() {
        let mut tracker = LoadTracker::new();
        tracker.disable();
        tracker.enable();
        for i in 0..(MAX_EVENTS + 5) {
            tracker.record_load("User", "group", i);
        }
        assert_eq!(tracker.events().len(), MAX_EVENTS);
        assert_eq!(tracker.events()[0].batch, 5);
    }
}

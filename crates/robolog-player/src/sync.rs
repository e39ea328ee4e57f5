//! Synchronized Multi-Stream Buffer
//!
//! Rendering a consistent multi-sensor snapshot needs one item per topic,
//! all at the same timestamp. Streams arrive independently and at
//! different rates, so this buffer aligns a primary stream (typically one
//! message per timestamp) with N secondary per-topic streams to the
//! **newest fully-synchronized** timestamp.
//!
//! ## Algorithm
//!
//! Entries live in a `BTreeMap` keyed by timestamp. [`SyncBuffer::find_synchronized`]
//! scans newest → oldest; the first candidate that has a primary item and
//! every required secondary topic wins.
//!
//! - **On success** all strictly-older entries are deleted: nothing can
//!   ever need them again, which is what bounds memory.
//! - **On failure** nothing is pruned — a late-arriving secondary may
//!   still complete a match at an older timestamp.
//!
//! ## Lifecycle
//!
//! Changing the required topic set, disabling synchronization, or seeking
//! must [`clear`](SyncBuffer::clear) the buffer. Re-enabling
//! synchronization uses [`reseed`](SyncBuffer::reseed), which clears and
//! re-inserts the most recently known primary item so a match can form
//! without waiting for the next primary.
//!
//! Single-owner type: one logical control flow drives it, no internal
//! locking.

use std::collections::{BTreeMap, HashMap};

use robolog_core::Time;

/// One timestamp's worth of partially-arrived items.
#[derive(Debug, Clone)]
struct SyncEntry<P, S> {
    primary: Option<P>,
    secondary_by_topic: HashMap<String, S>,
}

impl<P, S> Default for SyncEntry<P, S> {
    fn default() -> Self {
        Self {
            primary: None,
            secondary_by_topic: HashMap::new(),
        }
    }
}

/// Result of a synchronization attempt.
#[derive(Debug)]
pub enum SyncResult<'a, P, S> {
    Found {
        time: Time,
        primary: &'a P,
        secondary_by_topic: &'a HashMap<String, S>,
    },
    NotFound {
        /// Required topics present at the newest candidate timestamp
        present_topics: Vec<String>,
        /// Required topics still missing there
        missing_topics: Vec<String>,
    },
}

impl<P, S> SyncResult<'_, P, S> {
    pub fn is_found(&self) -> bool {
        matches!(self, SyncResult::Found { .. })
    }
}

/// Aligns one primary stream with N secondary per-topic streams.
#[derive(Debug)]
pub struct SyncBuffer<P, S> {
    entries: BTreeMap<Time, SyncEntry<P, S>>,
    latest_primary: Option<(Time, P)>,
}

impl<P, S> Default for SyncBuffer<P, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, S> SyncBuffer<P, S> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            latest_primary: None,
        }
    }

    pub fn insert_secondary(&mut self, topic: impl Into<String>, time: Time, item: S) {
        self.entries
            .entry(time)
            .or_default()
            .secondary_by_topic
            .insert(topic.into(), item);
    }

    /// Newest fully-synchronized timestamp for `required_topics`.
    ///
    /// Prunes strictly-older entries on success; prunes nothing on failure.
    pub fn find_synchronized(&mut self, required_topics: &[String]) -> SyncResult<'_, P, S> {
        let mut matched_time = None;
        let mut newest_candidate = None;

        for (time, entry) in self.entries.iter().rev() {
            if entry.primary.is_none() {
                continue;
            }
            if newest_candidate.is_none() {
                newest_candidate = Some(*time);
            }

            let missing = required_topics
                .iter()
                .any(|topic| !entry.secondary_by_topic.contains_key(topic));
            if !missing {
                matched_time = Some(*time);
                break;
            }
        }

        if let Some(time) = matched_time {
            // Everything strictly older can never be needed again.
            self.entries = self.entries.split_off(&time);
            let entry = &self.entries[&time];
            let primary = entry
                .primary
                .as_ref()
                .expect("matched entry always has a primary item");
            return SyncResult::Found {
                time,
                primary,
                secondary_by_topic: &entry.secondary_by_topic,
            };
        }

        // Report the partition at the newest candidate with a primary, so
        // the caller can show what it is still waiting for.
        let (present_topics, missing_topics) = match newest_candidate {
            Some(time) => {
                let entry = &self.entries[&time];
                required_topics
                    .iter()
                    .cloned()
                    .partition(|topic| entry.secondary_by_topic.contains_key(topic))
            }
            None => (Vec::new(), required_topics.to_vec()),
        };

        SyncResult::NotFound {
            present_topics,
            missing_topics,
        }
    }

    /// Drop everything, including the remembered primary.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.latest_primary = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<P: Clone, S> SyncBuffer<P, S> {
    pub fn insert_primary(&mut self, time: Time, item: P) {
        let newer = self
            .latest_primary
            .as_ref()
            .map(|(latest, _)| time >= *latest)
            .unwrap_or(true);
        if newer {
            self.latest_primary = Some((time, item.clone()));
        }
        self.entries.entry(time).or_default().primary = Some(item);
    }

    /// Clear the buffer but re-seed it with the most recently known
    /// primary item, for re-enabling synchronization after a seek or
    /// config change.
    pub fn reseed(&mut self) {
        self.entries.clear();
        if let Some((time, item)) = self.latest_primary.clone() {
            self.entries.entry(time).or_default().primary = Some(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(nanos: u64) -> Time {
        Time::from_nanos(nanos)
    }

    fn required(topics: &[&str]) -> Vec<String> {
        topics.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_secondary_reports_partition() {
        let mut buffer: SyncBuffer<&str, &str> = SyncBuffer::new();
        buffer.insert_primary(t(5), "primary@5");
        buffer.insert_secondary("x", t(5), "x@5");

        match buffer.find_synchronized(&required(&["x", "y"])) {
            SyncResult::NotFound {
                present_topics,
                missing_topics,
            } => {
                assert_eq!(present_topics, vec!["x".to_string()]);
                assert_eq!(missing_topics, vec!["y".to_string()]);
            }
            SyncResult::Found { .. } => panic!("should not match yet"),
        }
        // Failure prunes nothing
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_late_secondary_completes_match_and_prunes_older() {
        let mut buffer: SyncBuffer<&str, &str> = SyncBuffer::new();
        buffer.insert_primary(t(3), "primary@3");
        buffer.insert_secondary("x", t(3), "x@3");
        buffer.insert_primary(t(5), "primary@5");
        buffer.insert_secondary("x", t(5), "x@5");

        assert!(!buffer.find_synchronized(&required(&["x", "y"])).is_found());
        assert_eq!(buffer.len(), 2);

        buffer.insert_secondary("y", t(5), "y@5");
        match buffer.find_synchronized(&required(&["x", "y"])) {
            SyncResult::Found {
                time,
                primary,
                secondary_by_topic,
            } => {
                assert_eq!(time, t(5));
                assert_eq!(*primary, "primary@5");
                assert_eq!(secondary_by_topic["x"], "x@5");
                assert_eq!(secondary_by_topic["y"], "y@5");
            }
            SyncResult::NotFound { .. } => panic!("should match at t=5"),
        }

        // Entries strictly older than t=5 were removed
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_newest_fully_synchronized_wins() {
        let mut buffer: SyncBuffer<u64, u64> = SyncBuffer::new();
        for nanos in [1, 2, 3] {
            buffer.insert_primary(t(nanos), nanos);
            buffer.insert_secondary("x", t(nanos), nanos * 10);
        }
        // Newer entry with a primary but missing the secondary
        buffer.insert_primary(t(4), 4);

        match buffer.find_synchronized(&required(&["x"])) {
            SyncResult::Found { time, primary, .. } => {
                assert_eq!(time, t(3));
                assert_eq!(*primary, 3);
            }
            SyncResult::NotFound { .. } => panic!("t=3 is fully synchronized"),
        }

        // t=4 is newer than the match and must survive the prune
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_secondary_without_primary_never_matches() {
        let mut buffer: SyncBuffer<&str, &str> = SyncBuffer::new();
        buffer.insert_secondary("x", t(5), "x@5");

        match buffer.find_synchronized(&required(&["x"])) {
            SyncResult::NotFound { missing_topics, .. } => {
                // No candidate with a primary at all
                assert_eq!(missing_topics, vec!["x".to_string()]);
            }
            SyncResult::Found { .. } => panic!("no primary present"),
        }
    }

    #[test]
    fn test_empty_required_matches_newest_primary() {
        let mut buffer: SyncBuffer<&str, &str> = SyncBuffer::new();
        buffer.insert_primary(t(1), "old");
        buffer.insert_primary(t(9), "new");

        match buffer.find_synchronized(&[]) {
            SyncResult::Found { time, primary, .. } => {
                assert_eq!(time, t(9));
                assert_eq!(*primary, "new");
            }
            SyncResult::NotFound { .. } => panic!("primary alone should match"),
        }
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clear_and_reseed() {
        let mut buffer: SyncBuffer<&str, &str> = SyncBuffer::new();
        buffer.insert_primary(t(5), "primary@5");
        buffer.insert_secondary("x", t(5), "x@5");
        buffer.insert_primary(t(7), "primary@7");

        buffer.reseed();
        assert_eq!(buffer.len(), 1);
        match buffer.find_synchronized(&[]) {
            SyncResult::Found { time, primary, .. } => {
                assert_eq!(time, t(7));
                assert_eq!(*primary, "primary@7");
            }
            SyncResult::NotFound { .. } => panic!("reseed keeps the latest primary"),
        }

        buffer.clear();
        assert!(buffer.is_empty());
        buffer.reseed();
        assert!(buffer.is_empty(), "clear drops the remembered primary too");
    }
}

//! Acceptance and rejection tracking, including self-quieting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Remembers rejected suggestions and mutes the gate after too many
/// consecutive rejections. An acceptance lifts the mute.
#[derive(Debug)]
pub struct RejectionTracker {
    quiet_after: u32,
    capacity: usize,
    record_ttl: Duration,
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    consecutive_rejections: u32,
    /// Rejected suggestion texts per document, oldest first.
    records: HashMap<String, VecDeque<RejectionRecord>>,
    total: usize,
}

#[derive(Debug)]
struct RejectionRecord {
    suggestion: String,
    at: Instant,
}

impl RejectionTracker {
    pub fn new(quiet_after: u32, capacity: usize, record_ttl: Duration) -> Self {
        Self {
            quiet_after,
            capacity,
            record_ttl,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Whether the gate should stay silent right now.
    pub fn is_quiet(&self) -> bool {
        self.lock().consecutive_rejections >= self.quiet_after
    }

    pub fn consecutive_rejections(&self) -> u32 {
        self.lock().consecutive_rejections
    }

    pub fn record_accepted(&self, _document: &str) {
        self.lock().consecutive_rejections = 0;
    }

    pub fn record_rejected(&self, document: &str, suggestion: &str) {
        let mut state = self.lock();
        state.consecutive_rejections = state.consecutive_rejections.saturating_add(1);
        self.prune_locked(&mut state);
        state
            .records
            .entry(document.to_string())
            .or_default()
            .push_back(RejectionRecord {
                suggestion: suggestion.to_string(),
                at: Instant::now(),
            });
        state.total += 1;
        while state.total > self.capacity {
            Self::drop_oldest_locked(&mut state);
        }
    }

    /// Whether this exact suggestion was recently rejected in this
    /// document.
    pub fn was_rejected(&self, document: &str, suggestion: &str) -> bool {
        let mut state = self.lock();
        self.prune_locked(&mut state);
        state
            .records
            .get(document)
            .map(|q| q.iter().any(|r| r.suggestion == suggestion))
            .unwrap_or(false)
    }

    fn prune_locked(&self, state: &mut TrackerState) {
        let now = Instant::now();
        state.records.retain(|_, queue| {
            while queue
                .front()
                .map(|r| now.duration_since(r.at) >= self.record_ttl)
                .unwrap_or(false)
            {
                queue.pop_front();
            }
            !queue.is_empty()
        });
        state.total = state.records.values().map(VecDeque::len).sum();
    }

    fn drop_oldest_locked(state: &mut TrackerState) {
        let oldest = state
            .records
            .iter()
            .filter_map(|(doc, queue)| queue.front().map(|r| (doc.clone(), r.at)))
            .min_by_key(|(_, at)| *at);
        if let Some((doc, _)) = oldest {
            if let Some(queue) = state.records.get_mut(&doc) {
                queue.pop_front();
                state.total -= 1;
                if queue.is_empty() {
                    state.records.remove(&doc);
                }
            }
        } else {
            state.total = 0;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(quiet_after: u32) -> RejectionTracker {
        RejectionTracker::new(quiet_after, 128, Duration::from_secs(600))
    }

    #[test]
    fn test_quiet_after_consecutive_rejections() {
        let tracker = tracker(3);
        assert!(!tracker.is_quiet());
        tracker.record_rejected("doc", "a");
        tracker.record_rejected("doc", "b");
        assert!(!tracker.is_quiet());
        tracker.record_rejected("doc", "c");
        assert!(tracker.is_quiet());
    }

    #[test]
    fn test_acceptance_lifts_the_mute() {
        let tracker = tracker(2);
        tracker.record_rejected("doc", "a");
        tracker.record_rejected("doc", "b");
        assert!(tracker.is_quiet());
        tracker.record_accepted("doc");
        assert!(!tracker.is_quiet());
        assert_eq!(tracker.consecutive_rejections(), 0);
    }

    #[test]
    fn test_rejected_suggestions_are_remembered_per_document() {
        let tracker = tracker(10);
        tracker.record_rejected("a.rs", "let x = 1;");
        assert!(tracker.was_rejected("a.rs", "let x = 1;"));
        assert!(!tracker.was_rejected("b.rs", "let x = 1;"));
        assert!(!tracker.was_rejected("a.rs", "let y = 2;"));
    }

    #[test]
    fn test_records_expire() {
        let tracker = RejectionTracker::new(10, 128, Duration::from_millis(20));
        tracker.record_rejected("doc", "stale");
        assert!(tracker.was_rejected("doc", "stale"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!tracker.was_rejected("doc", "stale"));
    }

    #[test]
    fn test_record_capacity_is_bounded() {
        let tracker = RejectionTracker::new(10, 3, Duration::from_secs(600));
        for i in 0..5 {
            tracker.record_rejected("doc", &format!("s{i}"));
        }
        assert!(!tracker.was_rejected("doc", "s0"));
        assert!(!tracker.was_rejected("doc", "s1"));
        assert!(tracker.was_rejected("doc", "s4"));
    }
}

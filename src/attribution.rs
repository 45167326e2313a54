//! Offer attribution
//!
//! Decides, per composite key, whether an offer completion is linked to an
//! earlier view of the same offer:
//! 1. Keep keys that were viewed at least once
//! 2. Keep completion events for those keys; the scan order is the completions
//!    stably sorted by user id
//! 3. For each surviving key, order its events by timestamp (stable) and
//!    compare the earliest view with the latest completion
//!
//! Events are bucketed by key in a single pass, so each key's scan only
//! touches that key's events.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::types::{AttributionRecord, CompositeKey, Event, EventKind};

/// Rule used to decide attribution for one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionPolicy {
    /// Latest completion no earlier than the earliest view. A completion
    /// sharing the view's timestamp counts, and earlier completions are
    /// credited as long as a later one exists.
    #[default]
    LatestCompletionAfterFirstView,
    /// Latest completion strictly after the earliest view, i.e. at least one
    /// completion is preceded by a view.
    Strict,
}

impl AttributionPolicy {
    pub fn accepts(&self, first_view_time: u64, last_completion_time: u64) -> bool {
        match self {
            AttributionPolicy::LatestCompletionAfterFirstView => {
                last_completion_time >= first_view_time
            }
            AttributionPolicy::Strict => last_completion_time > first_view_time,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionPolicy::LatestCompletionAfterFirstView => "latest_completion_after_first_view",
            AttributionPolicy::Strict => "strict",
        }
    }
}

/// Attribution engine over a normalized event log
#[derive(Debug, Clone, Default)]
pub struct AttributionEngine {
    policy: AttributionPolicy,
}

impl AttributionEngine {
    pub fn new(policy: AttributionPolicy) -> Self {
        Self { policy }
    }

    /// Attributed composite keys, in scan order
    pub fn attribute(&self, events: &[Event]) -> Vec<CompositeKey> {
        self.evaluate(events)
            .into_iter()
            .filter(|r| r.attributed)
            .map(|r| r.key)
            .collect()
    }

    /// Attribution records for every key that was both viewed and completed,
    /// in scan order
    pub fn evaluate(&self, events: &[Event]) -> Vec<AttributionRecord> {
        let viewed: HashSet<&CompositeKey> = events
            .iter()
            .filter(|e| e.kind == EventKind::Viewed)
            .map(|e| &e.key)
            .collect();

        let mut completions: Vec<&Event> = events
            .iter()
            .filter(|e| e.kind == EventKind::Completed && viewed.contains(&e.key))
            .collect();
        completions.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let mut scan_order: Vec<&CompositeKey> = Vec::new();
        let mut wanted: HashSet<&CompositeKey> = HashSet::new();
        for event in &completions {
            if wanted.insert(&event.key) {
                scan_order.push(&event.key);
            }
        }

        let mut timelines: HashMap<&CompositeKey, Vec<&Event>> =
            HashMap::with_capacity(wanted.len());
        for event in events {
            if wanted.contains(&event.key) {
                timelines.entry(&event.key).or_default().push(event);
            }
        }

        let mut records = Vec::with_capacity(scan_order.len());
        for key in scan_order {
            let Some(timeline) = timelines.get_mut(key) else {
                continue;
            };
            if let Some(record) = self.evaluate_key(key, timeline) {
                records.push(record);
            }
        }

        info!(
            viewed_keys = viewed.len(),
            candidate_keys = records.len(),
            attributed = records.iter().filter(|r| r.attributed).count(),
            policy = self.policy.as_str(),
            "evaluated offer attribution"
        );

        records
    }

    /// Decide one key from its events (log order on entry)
    fn evaluate_key(&self, key: &CompositeKey, timeline: &mut [&Event]) -> Option<AttributionRecord> {
        timeline.sort_by_key(|e| e.timestamp);

        let first_view_time = timeline
            .iter()
            .find(|e| e.kind == EventKind::Viewed)?
            .timestamp;
        let last_completion_time = timeline
            .iter()
            .rev()
            .find(|e| e.kind == EventKind::Completed)?
            .timestamp;
        let attributed = self.policy.accepts(first_view_time, last_completion_time);

        debug!(
            key = key.as_str(),
            first_view_time, last_completion_time, attributed, "attribution decision"
        );

        Some(AttributionRecord {
            key: key.clone(),
            user_id: key.user_id().to_string(),
            payload_id: key.payload_id().to_string(),
            first_view_time,
            last_completion_time,
            attributed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(user: &str, offer: &str, kind: EventKind, t: u64) -> Event {
        Event {
            user_id: user.to_string(),
            kind,
            payload_id: offer.to_string(),
            timestamp: t,
            key: CompositeKey::new(user, offer).unwrap(),
        }
    }

    fn keys(keys: &[CompositeKey]) -> Vec<&str> {
        keys.iter().map(|k| k.as_str()).collect()
    }

    #[test]
    fn test_view_then_completion_is_attributed() {
        let events = vec![
            event("u1", "o1", EventKind::Received, 0),
            event("u1", "o1", EventKind::Viewed, 6),
            event("u1", "o1", EventKind::Completed, 12),
        ];
        let attributed = AttributionEngine::default().attribute(&events);
        assert_eq!(keys(&attributed), vec!["u1|o1"]);
    }

    #[test]
    fn test_viewed_without_completion_is_excluded() {
        let events = vec![
            event("u1", "o1", EventKind::Received, 0),
            event("u1", "o1", EventKind::Viewed, 6),
        ];
        let engine = AttributionEngine::default();
        assert!(engine.attribute(&events).is_empty());
        assert!(engine.evaluate(&events).is_empty());
    }

    #[test]
    fn test_completion_without_view_is_excluded() {
        let events = vec![
            event("u1", "o1", EventKind::Received, 0),
            event("u1", "o1", EventKind::Completed, 6),
            event("u1", "o2", EventKind::Viewed, 6),
        ];
        let engine = AttributionEngine::default();
        assert!(engine.attribute(&events).is_empty());
        assert!(engine.evaluate(&events).is_empty());
    }

    #[test]
    fn test_latest_completion_after_view_credits_earlier_completion() {
        let events = vec![
            event("u1", "o1", EventKind::Completed, 3),
            event("u1", "o1", EventKind::Viewed, 5),
            event("u1", "o1", EventKind::Completed, 10),
        ];
        let records = AttributionEngine::default().evaluate(&events);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].first_view_time, 5);
        assert_eq!(records[0].last_completion_time, 10);
        assert!(records[0].attributed);
    }

    #[test]
    fn test_completion_before_view_is_not_attributed() {
        let events = vec![
            event("u1", "o1", EventKind::Completed, 5),
            event("u1", "o1", EventKind::Viewed, 10),
        ];
        let records = AttributionEngine::default().evaluate(&events);

        assert_eq!(records.len(), 1);
        assert!(!records[0].attributed);
        assert!(AttributionEngine::default().attribute(&events).is_empty());
    }

    #[test]
    fn test_same_timestamp_depends_on_policy() {
        let events = vec![
            event("u1", "o1", EventKind::Completed, 8),
            event("u1", "o1", EventKind::Viewed, 8),
        ];
        assert_eq!(AttributionEngine::default().attribute(&events).len(), 1);
        assert!(AttributionEngine::new(AttributionPolicy::Strict)
            .attribute(&events)
            .is_empty());
    }

    #[test]
    fn test_timelines_are_sorted_not_log_ordered() {
        // Per-user logs are monotonic but the global log is not
        let events = vec![
            event("u1", "o1", EventKind::Completed, 20),
            event("u1", "o1", EventKind::Viewed, 30),
            event("u1", "o1", EventKind::Viewed, 2),
        ];
        let records = AttributionEngine::default().evaluate(&events);
        assert_eq!(records[0].first_view_time, 2);
        assert!(records[0].attributed);
    }

    #[test]
    fn test_output_is_ordered_by_user() {
        let events = vec![
            event("carol", "o2", EventKind::Viewed, 0),
            event("carol", "o2", EventKind::Completed, 1),
            event("alice", "o9", EventKind::Viewed, 0),
            event("alice", "o9", EventKind::Completed, 4),
            event("bob", "o1", EventKind::Viewed, 0),
            event("alice", "o3", EventKind::Viewed, 5),
            event("alice", "o3", EventKind::Completed, 6),
            event("bob", "o1", EventKind::Completed, 2),
        ];
        let attributed = AttributionEngine::default().attribute(&events);
        assert_eq!(
            keys(&attributed),
            vec!["alice|o9", "alice|o3", "bob|o1", "carol|o2"]
        );
    }

    #[test]
    fn test_attribution_is_deterministic() {
        let mut events = Vec::new();
        for u in 0..50 {
            let user = format!("user{:03}", (u * 37) % 50);
            for o in 0..4 {
                let offer = format!("offer{o}");
                events.push(event(&user, &offer, EventKind::Viewed, (o * 3) as u64));
                events.push(event(&user, &offer, EventKind::Completed, (u % 7 + o) as u64));
            }
        }
        let engine = AttributionEngine::default();
        let first = engine.evaluate(&events);
        for _ in 0..5 {
            assert_eq!(engine.evaluate(&events), first);
        }
    }

    #[test]
    fn test_scales_to_large_logs() {
        let users = 50_000;
        let mut events = Vec::with_capacity(users * 5);
        for u in 0..users {
            let user = format!("user{u:06}");
            events.push(event(&user, "o1", EventKind::Received, 0));
            events.push(event(&user, "o1", EventKind::Viewed, 6));
            events.push(event(&user, "o1", EventKind::Completed, if u % 2 == 0 { 12 } else { 3 }));
            events.push(event(&user, "o2", EventKind::Received, 0));
            events.push(event(&user, "o2", EventKind::Completed, 18));
        }

        let start = std::time::Instant::now();
        let records = AttributionEngine::default().evaluate(&events);
        let elapsed = start.elapsed();

        assert_eq!(records.len(), users);
        assert_eq!(records.iter().filter(|r| r.attributed).count(), users / 2);
        assert!(elapsed.as_secs() < 30, "attribution took {elapsed:?}");
    }
}

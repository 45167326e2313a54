//! Event normalization
//!
//! This module turns the raw event log into normalized events:
//! - The single-entry payload mapping is flattened into one payload id
//! - Exact duplicate rows are collapsed
//! - Each event gets its (user, offer) composite key

use serde_json::Value;
use std::collections::HashSet;
use tracing::info;

use crate::error::PipelineError;
use crate::schema::RawEvent;
use crate::types::{CompositeKey, Event, EventKind};

/// Normalizer for converting raw events to keyed, deduplicated events
pub struct Normalizer;

impl Normalizer {
    /// Normalize a raw event log.
    ///
    /// Fails on the first event whose payload does not hold exactly one
    /// string or numeric value, or whose ids cannot form a composite key.
    pub fn normalize(raw_events: &[RawEvent]) -> Result<Vec<Event>, PipelineError> {
        let mut events = Vec::with_capacity(raw_events.len());
        for raw in raw_events {
            let payload_id = extract_payload_id(raw)?;
            let key = CompositeKey::new(&raw.user_id, &payload_id)?;
            events.push(Event {
                user_id: raw.user_id.clone(),
                kind: raw.kind,
                payload_id,
                timestamp: raw.timestamp,
                key,
            });
        }

        let extracted = events.len();
        let events = Self::deduplicate(events);
        info!(
            raw = extracted,
            kept = events.len(),
            duplicates = extracted - events.len(),
            "normalized event log"
        );

        Ok(events)
    }

    /// Run deduplication again over already-normalized events.
    ///
    /// Deduplication is a fixed point, so this returns normalized input unchanged.
    pub fn renormalize(events: Vec<Event>) -> Vec<Event> {
        Self::deduplicate(events)
    }

    /// Drop exact duplicate rows, keeping the first occurrence and log order
    fn deduplicate(events: Vec<Event>) -> Vec<Event> {
        let mut seen: HashSet<(String, EventKind, String, u64)> = HashSet::new();
        events
            .into_iter()
            .filter(|e| {
                seen.insert((
                    e.user_id.clone(),
                    e.kind,
                    e.payload_id.clone(),
                    e.timestamp,
                ))
            })
            .collect()
    }
}

/// Extract the sole value of the payload mapping as a string id
fn extract_payload_id(raw: &RawEvent) -> Result<String, PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedPayload {
        user_id: raw.user_id.clone(),
        timestamp: raw.timestamp,
        reason,
    };

    if raw.value.len() != 1 {
        return Err(malformed(format!(
            "expected exactly one entry, found {}",
            raw.value.len()
        )));
    }

    match raw.value.values().next() {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(malformed(format!(
            "unsupported value type {}",
            json_type_name(other)
        ))),
        None => Err(malformed("empty payload".to_string())),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

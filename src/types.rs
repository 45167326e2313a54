//! Core types for the Offer Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: reference data (offers, profiles), normalized events, per-key
//! attribution records, and the flat feature table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

/// Separator between the user id and payload id inside a composite key
pub const KEY_SEPARATOR: char = '|';

/// Kind of an event in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "offer received")]
    Received,
    #[serde(rename = "offer viewed")]
    Viewed,
    #[serde(rename = "offer completed")]
    Completed,
    #[serde(rename = "transaction")]
    Transaction,
}

/// Identifier for one (user, offer-instance) pairing in the event log
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompositeKey(String);

impl CompositeKey {
    /// Build a key from a user id and a payload id.
    ///
    /// Both parts must be non-empty and free of [`KEY_SEPARATOR`] so the key
    /// can always be split back into its two halves.
    pub fn new(user_id: &str, payload_id: &str) -> Result<Self, PipelineError> {
        check_identifier(user_id)?;
        check_identifier(payload_id)?;
        Ok(Self(format!("{user_id}{KEY_SEPARATOR}{payload_id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// User half of the key
    pub fn user_id(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map_or(self.0.as_str(), |(user, _)| user)
    }

    /// Payload half of the key
    pub fn payload_id(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map_or("", |(_, payload)| payload)
    }
}

impl TryFrom<String> for CompositeKey {
    type Error = PipelineError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.split_once(KEY_SEPARATOR) {
            Some((user_id, payload_id)) => Self::new(user_id, payload_id),
            None => Err(PipelineError::InvalidIdentifier(raw)),
        }
    }
}

impl From<CompositeKey> for String {
    fn from(key: CompositeKey) -> Self {
        key.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_identifier(id: &str) -> Result<(), PipelineError> {
    if id.is_empty() || id.contains(KEY_SEPARATOR) {
        return Err(PipelineError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}

/// Normalized event with a resolved payload id and composite key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub user_id: String,
    pub kind: EventKind,
    /// Offer id for offer events, rendered amount for transactions
    pub payload_id: String,
    pub timestamp: u64,
    pub key: CompositeKey,
}

/// Offer catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub offer_type: String,
    pub channels: Vec<String>,
    pub reward: f64,
    pub difficulty: f64,
    /// Validity window (days)
    pub duration: f64,
}

/// User profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub gender: Option<String>,
    pub age: u32,
    pub income: f64,
    pub member_since: NaiveDate,
}

/// Per-key attribution decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub key: CompositeKey,
    pub user_id: String,
    pub payload_id: String,
    /// Timestamp of the earliest view of the offer
    pub first_view_time: u64,
    /// Timestamp of the latest completion of the offer
    pub last_completion_time: u64,
    pub attributed: bool,
}

/// One row of the output feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub offer_name: String,
    pub age: Option<u32>,
    pub income: Option<f64>,
    pub tenure_days: Option<i64>,
    /// One flag per entry of [`FeatureTable::gender_columns`]
    pub gender_flags: Vec<bool>,
}

/// Flat feature table handed to a sink
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    /// One-hot gender column names (reference category dropped)
    pub gender_columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Full column header in output order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = ["offer_name", "age", "income", "tenure_days"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        columns.extend(self.gender_columns.iter().cloned());
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

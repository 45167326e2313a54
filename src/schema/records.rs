//! On-disk record shapes
//!
//! Every field is optional at the serde level: a record with a missing or
//! `null` field is incomplete and gets discarded by the loader instead of
//! failing the whole file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::types::{EventKind, Offer, Profile};

/// Record that may be missing fields on disk
pub trait CompleteRecord {
    type Output;

    /// Convert into the typed record, or `Ok(None)` if any field is missing
    fn complete(self) -> Result<Option<Self::Output>, PipelineError>;
}

/// Offer catalog line (`portfolio`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferRecord {
    pub id: Option<String>,
    pub offer_type: Option<String>,
    pub channels: Option<Vec<String>>,
    pub reward: Option<f64>,
    pub difficulty: Option<f64>,
    pub duration: Option<f64>,
}

impl CompleteRecord for OfferRecord {
    type Output = Offer;

    fn complete(self) -> Result<Option<Offer>, PipelineError> {
        let (
            Some(id),
            Some(offer_type),
            Some(channels),
            Some(reward),
            Some(difficulty),
            Some(duration),
        ) = (
            self.id,
            self.offer_type,
            self.channels,
            self.reward,
            self.difficulty,
            self.duration,
        )
        else {
            return Ok(None);
        };

        Ok(Some(Offer {
            id,
            offer_type,
            channels,
            reward,
            difficulty,
            duration,
        }))
    }
}

/// User profile line (`profile`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub income: Option<f64>,
    /// Membership start as an integer date `YYYYMMDD`
    pub became_member_on: Option<u32>,
}

impl CompleteRecord for ProfileRecord {
    type Output = Profile;

    fn complete(self) -> Result<Option<Profile>, PipelineError> {
        let (Some(id), Some(gender), Some(age), Some(income), Some(became_member_on)) = (
            self.id,
            self.gender,
            self.age,
            self.income,
            self.became_member_on,
        ) else {
            return Ok(None);
        };

        Ok(Some(Profile {
            id,
            gender: Some(gender),
            age,
            income,
            member_since: parse_member_date(became_member_on)?,
        }))
    }
}

/// Event log line (`transcript`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRecord {
    pub person: Option<String>,
    pub event: Option<EventKind>,
    /// Polymorphic payload, e.g. `{"offer id": "..."}` or `{"amount": 0.83}`
    pub value: Option<serde_json::Map<String, serde_json::Value>>,
    pub time: Option<u64>,
}

/// Complete event as logged, before payload extraction
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub user_id: String,
    pub kind: EventKind,
    pub value: serde_json::Map<String, serde_json::Value>,
    pub timestamp: u64,
}

impl RawEvent {
    /// Build an event from a JSON payload, which must be an object
    pub fn new(
        user_id: impl Into<String>,
        kind: EventKind,
        value: serde_json::Value,
        timestamp: u64,
    ) -> Result<Self, PipelineError> {
        let user_id = user_id.into();
        let value = match value {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(PipelineError::MalformedPayload {
                    user_id,
                    timestamp,
                    reason: format!("expected an object, found {}", json_type_name(&other)),
                })
            }
        };
        Ok(Self {
            user_id,
            kind,
            value,
            timestamp,
        })
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl CompleteRecord for EventRecord {
    type Output = RawEvent;

    fn complete(self) -> Result<Option<RawEvent>, PipelineError> {
        let (Some(user_id), Some(kind), Some(value), Some(timestamp)) =
            (self.person, self.event, self.value, self.time)
        else {
            return Ok(None);
        };

        Ok(Some(RawEvent {
            user_id,
            kind,
            value,
            timestamp,
        }))
    }
}

/// Parse an integer `YYYYMMDD` date
pub fn parse_member_date(raw: u32) -> Result<NaiveDate, PipelineError> {
    let digits = raw.to_string();
    if digits.len() != 8 {
        return Err(PipelineError::DateParseError(format!(
            "expected YYYYMMDD, got {raw}"
        )));
    }

    let year = (raw / 10_000) as i32;
    let month = (raw / 100) % 100;
    let day = raw % 100;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| PipelineError::DateParseError(format!("invalid calendar date {raw}")))
}

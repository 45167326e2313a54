//! NDJSON loader for the three input collections

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::schema::records::{CompleteRecord, EventRecord, OfferRecord, ProfileRecord, RawEvent};
use crate::types::{Offer, Profile};

/// Records kept from one collection, plus how many were discarded as incomplete
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

impl<T> Loaded<T> {
    pub fn total(&self) -> usize {
        self.records.len() + self.dropped
    }
}

/// Loader for offer catalog, profile and event log collections
pub struct RecordLoader;

impl RecordLoader {
    /// Parse NDJSON (newline-delimited JSON), discarding incomplete records
    pub fn parse_ndjson<R>(ndjson: &str) -> Result<Loaded<R::Output>, PipelineError>
    where
        R: CompleteRecord + DeserializeOwned,
    {
        let mut records = Vec::new();
        let mut dropped = 0;

        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = serde_json::from_str::<R>(trimmed).map_err(|e| {
                PipelineError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            match record.complete()? {
                Some(complete) => records.push(complete),
                None => {
                    debug!(line = line_num + 1, "discarding incomplete record");
                    dropped += 1;
                }
            }
        }

        Ok(Loaded { records, dropped })
    }

    pub fn load_offers(path: &Path) -> Result<Loaded<Offer>, PipelineError> {
        Self::load_file::<OfferRecord>(path, "offers")
    }

    pub fn load_profiles(path: &Path) -> Result<Loaded<Profile>, PipelineError> {
        Self::load_file::<ProfileRecord>(path, "profiles")
    }

    pub fn load_events(path: &Path) -> Result<Loaded<RawEvent>, PipelineError> {
        Self::load_file::<EventRecord>(path, "events")
    }

    fn load_file<R>(path: &Path, collection: &str) -> Result<Loaded<R::Output>, PipelineError>
    where
        R: CompleteRecord + DeserializeOwned,
    {
        let contents = fs::read_to_string(path)?;
        let loaded = Self::parse_ndjson::<R>(&contents).map_err(|e| match e {
            PipelineError::ParseError(msg) => {
                PipelineError::ParseError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        if loaded.dropped > 0 {
            warn!(
                collection,
                dropped = loaded.dropped,
                kept = loaded.records.len(),
                "discarded incomplete records"
            );
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use std::io::Write;

    fn sample_transcript() -> &'static str {
        r#"{"person": "u1", "event": "offer received", "value": {"offer id": "o1"}, "time": 0}
{"person": "u1", "event": "offer viewed", "value": {"offer id": "o1"}, "time": 6}

{"person": "u2", "event": "transaction", "value": {"amount": 12.5}, "time": 12}
{"person": null, "event": "transaction", "value": {"amount": 3.0}, "time": 18}
{"person": "u3", "event": "offer completed", "value": {"offer_id": "o1"}}
"#
    }

    #[test]
    fn test_parse_ndjson_drops_incomplete() {
        let loaded = RecordLoader::parse_ndjson::<EventRecord>(sample_transcript()).unwrap();

        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.dropped, 2);
        assert_eq!(loaded.total(), 5);
        assert_eq!(loaded.records[1].kind, EventKind::Viewed);
        assert_eq!(loaded.records[2].timestamp, 12);
    }

    #[test]
    fn test_parse_ndjson_reports_line_number() {
        let input = "{\"person\": \"u1\", \"event\": \"transaction\", \"value\": {}, \"time\": 1}\nnot json\n";
        let err = RecordLoader::parse_ndjson::<EventRecord>(input).unwrap_err();

        match err {
            PipelineError::ParseError(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_time_is_a_parse_error() {
        let input = r#"{"person": "u1", "event": "transaction", "value": {"amount": 1}, "time": -4}"#;
        assert!(RecordLoader::parse_ndjson::<EventRecord>(input).is_err());
    }

    #[test]
    fn test_load_events_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_transcript().as_bytes()).unwrap();

        let loaded = RecordLoader::load_events(file.path()).unwrap();
        assert_eq!(loaded.records.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = RecordLoader::load_offers(Path::new("/nonexistent/portfolio.json"));
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}

//! Pipeline orchestration
//!
//! This module provides the public API for Offer Flux.
//! It orchestrates the full pipeline from the three input collections to the
//! feature table.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::attribution::{AttributionEngine, AttributionPolicy};
use crate::encoder::FeatureSink;
use crate::error::PipelineError;
use crate::features::{FeatureBuilder, JoinPolicy, LabeledOffer, OfferLabels};
use crate::normalizer::Normalizer;
use crate::schema::{RawEvent, RecordLoader};
use crate::types::{AttributionRecord, CompositeKey, Event, FeatureTable, Offer, Profile};

/// The three input collections, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub offers: Vec<Offer>,
    pub profiles: Vec<Profile>,
    pub events: Vec<RawEvent>,
}

/// Everything produced by one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub events: Vec<Event>,
    pub records: Vec<AttributionRecord>,
    pub attributed: Vec<CompositeKey>,
    pub offers: Vec<LabeledOffer>,
    pub table: FeatureTable,
}

/// Input file locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub offers: PathBuf,
    pub profiles: PathBuf,
    pub events: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self::in_dir(Path::new("data"))
    }
}

impl InputPaths {
    /// `portfolio.json`, `profile.json` and `transcript.json` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            offers: dir.join("portfolio.json"),
            profiles: dir.join("profile.json"),
            events: dir.join("transcript.json"),
        }
    }
}

/// Counts reported after a file-to-file run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub offers: usize,
    pub offers_dropped: usize,
    pub profiles: usize,
    pub profiles_dropped: usize,
    pub raw_events: usize,
    pub events_dropped: usize,
    pub normalized_events: usize,
    pub candidate_keys: usize,
    pub attributed_keys: usize,
    pub rows: usize,
}

/// Attribution pipeline: normalize → attribute → build features.
///
/// # Example
/// ```ignore
/// let pipeline = AttributionPipeline::new().with_policy(AttributionPolicy::Strict);
/// let output = pipeline.run(&inputs)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttributionPipeline {
    policy: AttributionPolicy,
    labels: OfferLabels,
    join_policy: JoinPolicy,
}

impl AttributionPipeline {
    /// Create a pipeline with the default policy, labels and join behavior
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: AttributionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_labels(mut self, labels: OfferLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_join_policy(mut self, join_policy: JoinPolicy) -> Self {
        self.join_policy = join_policy;
        self
    }

    /// Run attribution only, returning normalized events and per-key records
    pub fn attribute(
        &self,
        raw_events: &[RawEvent],
    ) -> Result<(Vec<Event>, Vec<AttributionRecord>), PipelineError> {
        let events = Normalizer::normalize(raw_events)?;
        let records = AttributionEngine::new(self.policy).evaluate(&events);
        Ok((events, records))
    }

    /// Run the full pipeline over in-memory collections.
    ///
    /// Pipeline stages:
    /// 1. Normalizer - Extract payload ids, dedupe, build composite keys
    /// 2. AttributionEngine - Link completions to earlier views
    /// 3. FeatureBuilder - Rank offers, join profiles, encode features
    pub fn run(&self, inputs: &PipelineInputs) -> Result<PipelineOutput, PipelineError> {
        let (events, records) = self.attribute(&inputs.events)?;

        let attributed: Vec<CompositeKey> = records
            .iter()
            .filter(|r| r.attributed)
            .map(|r| r.key.clone())
            .collect();

        let features = FeatureBuilder::new(self.labels.clone(), self.join_policy).build(
            &events,
            &attributed,
            &inputs.offers,
            &inputs.profiles,
        )?;

        Ok(PipelineOutput {
            events,
            records,
            attributed,
            offers: features.offers,
            table: features.table,
        })
    }

    /// Load the three collections from disk, run, and hand the table to `sink`
    pub fn run_files(
        &self,
        paths: &InputPaths,
        sink: &mut dyn FeatureSink,
    ) -> Result<PipelineSummary, PipelineError> {
        let offers = RecordLoader::load_offers(&paths.offers)?;
        let profiles = RecordLoader::load_profiles(&paths.profiles)?;
        let events = RecordLoader::load_events(&paths.events)?;
        info!(
            offers = offers.records.len(),
            profiles = profiles.records.len(),
            events = events.records.len(),
            "loaded input collections"
        );

        let mut summary = PipelineSummary {
            offers: offers.records.len(),
            offers_dropped: offers.dropped,
            profiles: profiles.records.len(),
            profiles_dropped: profiles.dropped,
            raw_events: events.records.len(),
            events_dropped: events.dropped,
            ..Default::default()
        };

        let inputs = PipelineInputs {
            offers: offers.records,
            profiles: profiles.records,
            events: events.records,
        };
        let output = self.run(&inputs)?;
        sink.write_table(&output.table)?;

        summary.normalized_events = output.events.len();
        summary.candidate_keys = output.records.len();
        summary.attributed_keys = output.attributed.len();
        summary.rows = output.table.rows.len();

        Ok(summary)
    }
}

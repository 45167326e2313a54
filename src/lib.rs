//! Offer Flux - Offer-to-purchase attribution for promotional event logs
//!
//! Flux links offer completions to earlier views of the same offer and turns
//! the attributed completions into a flat feature table through a
//! deterministic pipeline: record loading → event normalization → offer
//! attribution → feature building → table encoding.
//!
//! ## Modules
//!
//! - **Attribution**: per (user, offer) decision on whether a completion followed a view
//! - **Features**: offer ranking and labeling, profile join, tenure, gender one-hot

pub mod attribution;
pub mod encoder;
pub mod error;
pub mod features;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod types;

pub use attribution::{AttributionEngine, AttributionPolicy};
pub use encoder::{CsvEncoder, CsvFileSink, FeatureSink};
pub use error::PipelineError;
pub use features::{FeatureBuilder, JoinPolicy, OfferLabels};
pub use pipeline::{AttributionPipeline, InputPaths, PipelineInputs, PipelineSummary};

// Schema exports
pub use schema::{RawEvent, RecordLoader};

/// Flux version reported by the CLI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "offer-flux";

//! Flux CLI - Command-line interface for Offer Flux
//!
//! Commands:
//! - transform: Run the full pipeline and write the feature table (batch mode)
//! - attribute: Print per-key attribution decisions for an event log
//! - validate: Check the input collections without writing anything

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use offer_flux::encoder::{CsvEncoder, CsvFileSink, MemorySink};
use offer_flux::normalizer::Normalizer;
use offer_flux::types::AttributionRecord;
use offer_flux::{
    AttributionPipeline, AttributionPolicy, InputPaths, JoinPolicy, OfferLabels,
    PipelineError, RecordLoader, FLUX_VERSION, PRODUCER_NAME,
};

/// Flux - Offer-to-purchase attribution and feature table builder
#[derive(Parser)]
#[command(name = "flux")]
#[command(version = FLUX_VERSION)]
#[command(about = "Attribute purchases to offers and build a feature table", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// Offer catalog (NDJSON)
    #[arg(long, default_value = "data/portfolio.json")]
    portfolio: PathBuf,

    /// User profiles (NDJSON)
    #[arg(long, default_value = "data/profile.json")]
    profile: PathBuf,

    /// Event log (NDJSON)
    #[arg(long, default_value = "data/transcript.json")]
    transcript: PathBuf,
}

impl InputArgs {
    fn paths(&self) -> InputPaths {
        InputPaths {
            offers: self.portfolio.clone(),
            profiles: self.profile.clone(),
            events: self.transcript.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the feature table
    Transform {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output CSV path (use - for stdout)
        #[arg(short, long, default_value = "data/clean_data.csv")]
        output: PathBuf,

        /// Attribution rule
        #[arg(long, value_enum, default_value = "latest")]
        policy: PolicyArg,

        /// Behavior when an attributed completion has no profile
        #[arg(long, value_enum, default_value = "null-fill")]
        join: JoinArg,

        /// Offer names by rank, comma-separated (defaults to the ten built-in names)
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,
    },

    /// Print per-key attribution decisions for an event log
    Attribute {
        /// Event log (NDJSON)
        #[arg(long, default_value = "data/transcript.json")]
        transcript: PathBuf,

        /// Attribution rule
        #[arg(long, value_enum, default_value = "latest")]
        policy: PolicyArg,

        /// Only print attributed keys
        #[arg(long)]
        attributed_only: bool,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Check the input collections without writing anything
    Validate {
        #[command(flatten)]
        inputs: InputArgs,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Latest completion no earlier than the first view
    Latest,
    /// Latest completion strictly after the first view
    Strict,
}

impl From<PolicyArg> for AttributionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Latest => AttributionPolicy::LatestCompletionAfterFirstView,
            PolicyArg::Strict => AttributionPolicy::Strict,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum JoinArg {
    /// Keep rows with empty profile fields
    NullFill,
    /// Fail the run
    Reject,
}

impl From<JoinArg> for JoinPolicy {
    fn from(arg: JoinArg) -> Self {
        match arg {
            JoinArg::NullFill => JoinPolicy::NullFill,
            JoinArg::Reject => JoinPolicy::Reject,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    match cli.command {
        Commands::Transform {
            inputs,
            output,
            policy,
            join,
            labels,
        } => cmd_transform(&inputs.paths(), &output, policy, join, labels),

        Commands::Attribute {
            transcript,
            policy,
            attributed_only,
            output_format,
        } => cmd_attribute(&transcript, policy, attributed_only, &output_format),

        Commands::Validate { inputs, json } => cmd_validate(&inputs.paths(), json),
    }
}

fn cmd_transform(
    paths: &InputPaths,
    output: &Path,
    policy: PolicyArg,
    join: JoinArg,
    labels: Option<Vec<String>>,
) -> Result<(), FluxCliError> {
    let mut pipeline = AttributionPipeline::new()
        .with_policy(policy.into())
        .with_join_policy(join.into());
    if let Some(names) = labels {
        pipeline = pipeline.with_labels(OfferLabels::new(names));
    }

    let to_stdout = output.to_string_lossy() == "-";
    let summary = if to_stdout {
        let mut sink = MemorySink::default();
        let summary = pipeline.run_files(paths, &mut sink)?;
        if let Some(table) = sink.table {
            print!("{}", CsvEncoder::new().encode(&table)?);
        }
        summary
    } else {
        let mut sink = CsvFileSink::new(output);
        pipeline.run_files(paths, &mut sink)?
    };

    let report = TransformReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        output: output.display().to_string(),
        summary,
    };
    if to_stdout {
        eprintln!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn cmd_attribute(
    transcript: &Path,
    policy: PolicyArg,
    attributed_only: bool,
    output_format: &OutputFormat,
) -> Result<(), FluxCliError> {
    let events = RecordLoader::load_events(transcript)?;
    if events.records.is_empty() {
        return Err(FluxCliError::NoEvents);
    }

    let (_, mut records) = AttributionPipeline::new()
        .with_policy(policy.into())
        .attribute(&events.records)?;
    if attributed_only {
        records.retain(|r| r.attributed);
    }

    let mut stdout = io::stdout();
    write!(stdout, "{}", format_records(&records, output_format)?)?;
    stdout.flush()?;

    Ok(())
}

fn cmd_validate(paths: &InputPaths, json: bool) -> Result<(), FluxCliError> {
    let mut report = ValidationReport::default();

    match RecordLoader::load_offers(&paths.offers) {
        Ok(loaded) => report.push("offers", loaded.records.len(), loaded.dropped, None),
        Err(e) => report.push("offers", 0, 0, Some(e.to_string())),
    }
    match RecordLoader::load_profiles(&paths.profiles) {
        Ok(loaded) => report.push("profiles", loaded.records.len(), loaded.dropped, None),
        Err(e) => report.push("profiles", 0, 0, Some(e.to_string())),
    }
    match RecordLoader::load_events(&paths.events) {
        Ok(loaded) => {
            let error = Normalizer::normalize(&loaded.records)
                .err()
                .map(|e| e.to_string());
            report.push("events", loaded.records.len(), loaded.dropped, error);
        }
        Err(e) => report.push("events", 0, 0, Some(e.to_string())),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        for check in &report.collections {
            let status_icon = if check.error.is_some() { "[ERR]" } else { "[OK]" };
            println!(
                "  {} {}: {} kept, {} dropped as incomplete",
                status_icon, check.name, check.records, check.dropped
            );
            if let Some(error) = &check.error {
                println!("      {}", error);
            }
        }
    }

    let failed = report
        .collections
        .iter()
        .filter(|c| c.error.is_some())
        .count();
    if failed > 0 {
        Err(FluxCliError::ValidationFailed(failed))
    } else {
        Ok(())
    }
}

// Helper functions

fn format_records(
    records: &[AttributionRecord],
    format: &OutputFormat,
) -> Result<String, FluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Pipeline(PipelineError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<PipelineError> for FluxCliError {
    fn from(e: PipelineError) -> Self {
        FluxCliError::Pipeline(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Pipeline(e) => {
                let (code, hint) = pipeline_error_code(&e);
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No complete events found in input".to_string(),
                hint: Some("Ensure the event log is not empty".to_string()),
            },
            FluxCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} collections failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

fn pipeline_error_code(e: &PipelineError) -> (&'static str, &'static str) {
    match e {
        PipelineError::ParseError(_) | PipelineError::JsonError(_) => {
            ("PARSE_ERROR", "Ensure each input line is one JSON record")
        }
        PipelineError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
        PipelineError::DateParseError(_) => {
            ("DATE_PARSE_ERROR", "became_member_on must be an integer YYYYMMDD date")
        }
        PipelineError::MalformedPayload { .. } => (
            "MALFORMED_PAYLOAD",
            "Each event value must hold exactly one string or numeric entry",
        ),
        PipelineError::InvalidIdentifier(_) => {
            ("INVALID_IDENTIFIER", "Ids must be non-empty and must not contain '|'")
        }
        PipelineError::RankingMismatch { .. } => (
            "RANKING_MISMATCH",
            "Pass --labels with one name per ranked offer",
        ),
        PipelineError::MissingJoinTarget { .. } => (
            "MISSING_JOIN_TARGET",
            "Add the missing profile or use --join null-fill",
        ),
        PipelineError::EncodingError(_) | PipelineError::Csv(_) => {
            ("ENCODING_ERROR", "Check the output table")
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct TransformReport {
    producer: String,
    version: String,
    output: String,
    summary: offer_flux::PipelineSummary,
}

#[derive(serde::Serialize, Default)]
struct ValidationReport {
    collections: Vec<CollectionCheck>,
}

impl ValidationReport {
    fn push(&mut self, name: &str, records: usize, dropped: usize, error: Option<String>) {
        self.collections.push(CollectionCheck {
            name: name.to_string(),
            records,
            dropped,
            error,
        });
    }
}

#[derive(serde::Serialize)]
struct CollectionCheck {
    name: String,
    records: usize,
    dropped: usize,
    error: Option<String>,
}

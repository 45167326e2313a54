//! Feature table encoding
//!
//! This module renders the feature table as delimited text and provides the
//! sinks that receive the finished table.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::PipelineError;
use crate::types::{FeatureRow, FeatureTable};

/// Destination for a finished feature table
pub trait FeatureSink {
    /// Accept the table. Called once per run.
    fn write_table(&mut self, table: &FeatureTable) -> Result<(), PipelineError>;
}

/// Delimited text encoder for feature tables
#[derive(Debug, Clone)]
pub struct CsvEncoder {
    delimiter: u8,
}

impl Default for CsvEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvEncoder {
    /// Create a comma-delimited encoder
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Create an encoder with a specific single-byte delimiter
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Encode the whole table, header first
    pub fn encode(&self, table: &FeatureTable) -> Result<String, PipelineError> {
        let mut buffer = Vec::new();
        self.encode_to_writer(table, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| PipelineError::EncodingError(e.to_string()))
    }

    /// Encode the table into any writer
    pub fn encode_to_writer<W: Write>(
        &self,
        table: &FeatureTable,
        writer: W,
    ) -> Result<(), PipelineError> {
        let width = table.gender_columns.len();
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(writer);
        wtr.write_record(table.columns())?;

        for (index, row) in table.rows.iter().enumerate() {
            if row.gender_flags.len() != width {
                return Err(PipelineError::EncodingError(format!(
                    "row {} has {} gender flags, table has {} gender columns",
                    index,
                    row.gender_flags.len(),
                    width
                )));
            }
            wtr.write_record(Self::fields(row))?;
        }

        wtr.flush()?;
        Ok(())
    }

    fn fields(row: &FeatureRow) -> Vec<String> {
        let mut fields = vec![
            row.offer_name.clone(),
            row.age.map(|a| a.to_string()).unwrap_or_default(),
            row.income.map(|i| i.to_string()).unwrap_or_default(),
            row.tenure_days.map(|t| t.to_string()).unwrap_or_default(),
        ];
        fields.extend(
            row.gender_flags
                .iter()
                .map(|flag| if *flag { "1" } else { "0" }.to_string()),
        );
        fields
    }
}

/// Sink writing the table to a file, replacing any previous contents
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
    encoder: CsvEncoder,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            encoder: CsvEncoder::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureSink for CsvFileSink {
    fn write_table(&mut self, table: &FeatureTable) -> Result<(), PipelineError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = fs::File::create(&self.path)?;
        self.encoder.encode_to_writer(table, BufWriter::new(file))?;

        info!(path = %self.path.display(), rows = table.rows.len(), "wrote feature table");
        Ok(())
    }
}

/// Sink keeping the table in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub table: Option<FeatureTable>,
}

impl FeatureSink for MemorySink {
    fn write_table(&mut self, table: &FeatureTable) -> Result<(), PipelineError> {
        self.table = Some(table.clone());
        Ok(())
    }
}

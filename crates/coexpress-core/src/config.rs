//! Component configuration
//!
//! Every struct deserializes from a TOML table with per-field defaults, so a config file
//! only needs to name what it changes. `validate()` rejects values the components cannot
//! run with before any file is opened.

use crate::error::{CoexprError, CoexprResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Dataset paths inside the backing array file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLayout {
    /// Group probed for the expression matrix.
    #[serde(default = "default_data_group")]
    pub data_group: String,
    /// Member names tried in order; the first present one is the expression matrix.
    #[serde(default = "default_expression_candidates")]
    pub expression_candidates: Vec<String>,
    #[serde(default = "default_genes_dataset")]
    pub genes: String,
    #[serde(default = "default_tissues_dataset")]
    pub tissues: String,
    #[serde(default = "default_sample_ids_dataset")]
    pub sample_ids: String,
    /// Optional; samples have no timestamps if absent.
    #[serde(default = "default_update_dates_dataset")]
    pub update_dates: String,
    /// chrono format of the update date strings, e.g. `Apr 21 2017`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            data_group: default_data_group(),
            expression_candidates: default_expression_candidates(),
            genes: default_genes_dataset(),
            tissues: default_tissues_dataset(),
            sample_ids: default_sample_ids_dataset(),
            update_dates: default_update_dates_dataset(),
            date_format: default_date_format(),
        }
    }
}

impl DatasetLayout {
    /// Full dataset path for a member of the data group.
    pub fn data_path(&self, member: &str) -> String {
        format!("{}/{}", self.data_group.trim_end_matches('/'), member)
    }

    pub fn validate(&self) -> CoexprResult<()> {
        if self.expression_candidates.is_empty() {
            return Err(CoexprError::configuration(
                "expression_candidates",
                "at least one dataset name",
                "[]",
                "no expression dataset names to probe",
            ));
        }
        Ok(())
    }
}

/// Scaling applied to vectors before a date-filtered correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    /// Subtract the mean, divide by the population standard deviation.
    #[default]
    ZScore,
    /// `ln(1 + x)`
    Log1p,
}

/// Settings for the correlation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Worker threads in the all-pairs pool.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Work units that may be queued but not yet picked up by a worker. The producer
    /// blocks once this many are outstanding.
    #[serde(default = "default_max_pending_tasks")]
    pub max_pending_tasks: usize,
    /// Consecutive columns of one matrix row computed by a single work unit.
    #[serde(default = "default_task_width")]
    pub task_width: usize,
    /// Log progress every this many computed pairs.
    #[serde(default = "default_pair_progress_interval")]
    pub progress_interval: u64,
    #[serde(default)]
    pub date_filter_normalization: Normalization,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_pending_tasks: default_max_pending_tasks(),
            task_width: default_task_width(),
            progress_interval: default_pair_progress_interval(),
            date_filter_normalization: Normalization::default(),
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> CoexprResult<()> {
        for (setting, value) in [
            ("worker_count", self.worker_count),
            ("max_pending_tasks", self.max_pending_tasks),
            ("task_width", self.task_width),
        ] {
            if value == 0 {
                return Err(CoexprError::configuration(setting, ">= 1", "0", "must be positive"));
            }
        }
        Ok(())
    }
}

/// Which cells of a data row are staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriangleMode {
    /// Data row `i` contributes only value columns `j >= i`. Row `i` must be header gene `i`.
    #[default]
    Upper,
    /// Every cell is staged; duplicates are left to the store's uniqueness constraint.
    Full,
}

/// Settings for the correlation-matrix ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Rows before the first data row.
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
    /// Leading non-value columns on every row.
    #[serde(default = "default_header_columns")]
    pub header_columns: usize,
    /// Header row whose value columns name the column genes.
    #[serde(default)]
    pub header_key_row: usize,
    /// Leading column that names the row gene.
    #[serde(default)]
    pub row_key_column: usize,
    /// Staged lines per bulk load.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_staging_path")]
    pub staging_path: PathBuf,
    #[serde(default)]
    pub triangle: TriangleMode,
    #[serde(default = "default_record_progress_interval")]
    pub progress_interval: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            header_rows: default_header_rows(),
            header_columns: default_header_columns(),
            header_key_row: 0,
            row_key_column: 0,
            chunk_size: default_chunk_size(),
            staging_path: default_staging_path(),
            triangle: TriangleMode::default(),
            progress_interval: default_record_progress_interval(),
        }
    }
}

impl IngestConfig {
    /// Comma-separated square matrix with one header row and one gene column.
    pub fn archs4() -> Self {
        Self { chunk_size: 1_000_000, ..Self::default() }
    }

    /// Tab-separated matrix with three header rows (symbols, UniProt accessions, gene ids)
    /// and three leading columns carrying the same identifiers for the row gene.
    pub fn harmonizome() -> Self {
        Self { delimiter: '\t', header_rows: 3, header_columns: 3, ..Self::default() }
    }

    /// Key rows and columns by UniProt accession instead of gene symbol.
    pub fn keyed_by_uniprot(mut self) -> Self {
        self.header_key_row = 1;
        self.row_key_column = 1;
        self
    }

    pub fn with_staging_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_path = path.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn delimiter_byte(&self) -> CoexprResult<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(CoexprError::configuration(
                "delimiter",
                "a single ASCII character",
                &self.delimiter.to_string(),
                "delimiter must be ASCII",
            ))
        }
    }

    pub fn validate(&self) -> CoexprResult<()> {
        self.delimiter_byte()?;
        if self.chunk_size == 0 {
            return Err(CoexprError::configuration("chunk_size", ">= 1", "0", "must be positive"));
        }
        if self.header_rows == 0 || self.header_columns == 0 {
            return Err(CoexprError::configuration(
                "header_rows/header_columns",
                ">= 1",
                "0",
                "the gene header row and gene column are required",
            ));
        }
        if self.header_key_row >= self.header_rows {
            return Err(CoexprError::configuration(
                "header_key_row",
                &format!("< {}", self.header_rows),
                &self.header_key_row.to_string(),
                "key row must be one of the header rows",
            ));
        }
        if self.row_key_column >= self.header_columns {
            return Err(CoexprError::configuration(
                "row_key_column",
                &format!("< {}", self.header_columns),
                &self.row_key_column.to_string(),
                "key column must be one of the leading columns",
            ));
        }
        Ok(())
    }
}

fn default_data_group() -> String {
    "/data".to_string()
}

fn default_expression_candidates() -> Vec<String> {
    vec!["expression".to_string(), "normalized_expression".to_string()]
}

fn default_genes_dataset() -> String {
    "/meta/genes".to_string()
}

fn default_tissues_dataset() -> String {
    "/meta/Sample_source_name_ch1".to_string()
}

fn default_sample_ids_dataset() -> String {
    "/meta/Sample_geo_accession".to_string()
}

fn default_update_dates_dataset() -> String {
    "/meta/Sample_last_update_date".to_string()
}

fn default_date_format() -> String {
    "%b %d %Y".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_pending_tasks() -> usize {
    5000
}

fn default_task_width() -> usize {
    64
}

fn default_pair_progress_interval() -> u64 {
    10_000_000
}

fn default_delimiter() -> char {
    ','
}

fn default_header_rows() -> usize {
    1
}

fn default_header_columns() -> usize {
    1
}

fn default_chunk_size() -> u64 {
    1_000_000
}

fn default_staging_path() -> PathBuf {
    std::env::temp_dir().join("coexpress_staging")
}

fn default_record_progress_interval() -> u64 {
    1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        IngestConfig::archs4().validate().unwrap();
        IngestConfig::harmonizome().validate().unwrap();
        IngestConfig::harmonizome().keyed_by_uniprot().validate().unwrap();
        CorrelationConfig::default().validate().unwrap();
        DatasetLayout::default().validate().unwrap();
    }

    #[test]
    fn test_key_row_outside_header_is_rejected() {
        let config = IngestConfig::archs4().keyed_by_uniprot();
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_zero_pending_tasks_is_rejected() {
        let config = CorrelationConfig { max_pending_tasks: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_data_path_joins_group() {
        let layout = DatasetLayout::default();
        assert_eq!(layout.data_path("expression"), "/data/expression");
    }
}

//! Error handling for the coexpress core
//!
//! Expected conditions (an identifier missing from an index, a date filter that leaves no
//! samples) and unrecoverable faults (a backing file without the expected dataset layout, a
//! misaligned correlation matrix) are separate variants so callers can match on them instead
//! of treating every failure alike. A block skipped during a partial selection is not an
//! error at all; it is reported on the materialized matrix.

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Error type for coexpress core operations
#[derive(Error, Debug, Clone)]
pub enum CoexprError {
    /// The backing array file does not have the expected dataset layout
    #[error("Layout error: {message}")]
    Layout { message: String, file: Option<String>, dataset: Option<String> },

    /// A gene symbol is not present in the gene index
    #[error("Unrecognized gene: {symbol}")]
    UnknownGene { symbol: String },

    /// A sample identifier is not present in the sample index
    #[error("Unrecognized sample: {sample_id}")]
    UnknownSample { sample_id: String, source_file: Option<String> },

    /// A tissue label has no samples in the tissue index
    #[error("Unrecognized tissue: {tissue}")]
    UnknownTissue { tissue: String },

    /// A computation was asked to run over an empty sample set
    #[error("No data: {message}")]
    NoData { message: String, operation: Option<String> },

    /// A correlation matrix row does not line up with the header
    #[error("Malformed row {row}, column {column}: {message}")]
    MalformedRow { message: String, row: u64, column: usize },

    /// Failure inside a store collaborator other than an expected duplicate
    #[error("Store error: {message}")]
    Store { message: String, operation: Option<String>, details: Option<String> },

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        setting: Option<String>,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// External dependency errors (I/O, CSV decoding, array-file library)
    #[error("External error: {message}")]
    External { message: String, service: Option<String>, source_details: Option<String> },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String, component: Option<String>, source_details: Option<String> },
}

impl CoexprError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CoexprError::Layout { .. } => "layout",
            CoexprError::UnknownGene { .. } => "unknown_gene",
            CoexprError::UnknownSample { .. } => "unknown_sample",
            CoexprError::UnknownTissue { .. } => "unknown_tissue",
            CoexprError::NoData { .. } => "no_data",
            CoexprError::MalformedRow { .. } => "malformed_row",
            CoexprError::Store { .. } => "store",
            CoexprError::Configuration { .. } => "configuration",
            CoexprError::External { .. } => "external",
            CoexprError::Internal { .. } => "internal",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CoexprError::Layout { .. } => ErrorSeverity::Critical,
            CoexprError::UnknownGene { .. } => ErrorSeverity::Low,
            CoexprError::UnknownSample { .. } => ErrorSeverity::Medium,
            CoexprError::UnknownTissue { .. } => ErrorSeverity::Low,
            CoexprError::NoData { .. } => ErrorSeverity::Low,
            CoexprError::MalformedRow { .. } => ErrorSeverity::High,
            CoexprError::Store { .. } => ErrorSeverity::High,
            CoexprError::Configuration { .. } => ErrorSeverity::Critical,
            CoexprError::External { .. } => ErrorSeverity::Medium,
            CoexprError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// Get structured context information for debugging
    pub fn context(&self) -> ErrorContext {
        match self {
            CoexprError::Layout { file, dataset, .. } => ErrorContext {
                file: file.clone(),
                dataset: dataset.clone(),
                ..Default::default()
            },
            CoexprError::UnknownGene { symbol } => {
                ErrorContext { identifier: Some(symbol.clone()), ..Default::default() }
            }
            CoexprError::UnknownSample { sample_id, source_file } => ErrorContext {
                identifier: Some(sample_id.clone()),
                file: source_file.clone(),
                ..Default::default()
            },
            CoexprError::UnknownTissue { tissue } => {
                ErrorContext { identifier: Some(tissue.clone()), ..Default::default() }
            }
            CoexprError::MalformedRow { row, column, .. } => {
                ErrorContext { row: Some(*row), column: Some(*column), ..Default::default() }
            }
            CoexprError::NoData { operation, .. } | CoexprError::Store { operation, .. } => {
                ErrorContext { operation: operation.clone(), ..Default::default() }
            }
            _ => ErrorContext::default(),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            CoexprError::Layout { .. } => false, // The file itself must change
            CoexprError::UnknownGene { .. } => true,
            CoexprError::UnknownSample { .. } => true,
            CoexprError::UnknownTissue { .. } => true,
            CoexprError::NoData { .. } => true,
            CoexprError::MalformedRow { .. } => false, // Column alignment cannot be trusted
            CoexprError::Store { .. } => false,
            CoexprError::Configuration { .. } => false,
            CoexprError::External { .. } => true,
            CoexprError::Internal { .. } => false,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Structured error context for debugging
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ErrorContext {
    pub identifier: Option<String>,
    pub file: Option<String>,
    pub dataset: Option<String>,
    pub row: Option<u64>,
    pub column: Option<usize>,
    pub operation: Option<String>,
}

/// Result type alias for core operations
pub type CoexprResult<T> = Result<T, CoexprError>;

/// Convenience constructors for common error scenarios
impl CoexprError {
    /// The file lacks a dataset (or its shape) the loader depends on
    pub fn layout(file: &Path, dataset: &str, message: impl Into<String>) -> Self {
        Self::Layout {
            message: message.into(),
            file: Some(file.display().to_string()),
            dataset: Some(dataset.to_string()),
        }
    }

    pub fn unknown_gene(symbol: impl Into<String>) -> Self {
        Self::UnknownGene { symbol: symbol.into() }
    }

    pub fn unknown_sample(sample_id: impl Into<String>, source_file: Option<&Path>) -> Self {
        Self::UnknownSample {
            sample_id: sample_id.into(),
            source_file: source_file.map(|p| p.display().to_string()),
        }
    }

    pub fn unknown_tissue(tissue: impl Into<String>) -> Self {
        Self::UnknownTissue { tissue: tissue.into() }
    }

    pub fn no_data(operation: &str, message: impl Into<String>) -> Self {
        Self::NoData { message: message.into(), operation: Some(operation.to_string()) }
    }

    pub fn malformed_row(row: u64, column: usize, message: impl Into<String>) -> Self {
        Self::MalformedRow { message: message.into(), row, column }
    }

    pub fn store(operation: &str, message: impl Into<String>) -> Self {
        Self::Store { message: message.into(), operation: Some(operation.to_string()), details: None }
    }

    pub fn configuration(
        setting: &str,
        expected: &str,
        actual: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            setting: Some(setting.to_string()),
            expected: Some(expected.to_string()),
            actual: Some(actual.to_string()),
        }
    }

    pub fn external_service(service: &str, message: impl Into<String>) -> Self {
        Self::External { message: message.into(), service: Some(service.to_string()), source_details: None }
    }

    pub fn internal_component(component: &str, message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            component: Some(component.to_string()),
            source_details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), component: None, source_details: None }
    }
}

/// Convert from anyhow::Error to CoexprError
impl From<anyhow::Error> for CoexprError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return CoexprError::External {
                message: format!("I/O operation failed: {io_err}"),
                service: Some("filesystem".to_string()),
                source_details: Some(format!("IO Error kind: {:?}", io_err.kind())),
            };
        }
        if let Some(coexpr_err) = err.downcast_ref::<CoexprError>() {
            return coexpr_err.clone();
        }
        CoexprError::internal(format!("Unhandled error: {err}"))
    }
}

impl From<std::io::Error> for CoexprError {
    fn from(err: std::io::Error) -> Self {
        CoexprError::External {
            message: format!("I/O error: {err}"),
            service: Some("filesystem".to_string()),
            source_details: Some(format!("IO Error kind: {:?}", err.kind())),
        }
    }
}

impl From<csv::Error> for CoexprError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line());
        CoexprError::External {
            message: format!("CSV error: {err}"),
            service: Some("csv".to_string()),
            source_details: line.map(|l| format!("line {l}")),
        }
    }
}

impl From<serde_json::Error> for CoexprError {
    fn from(err: serde_json::Error) -> Self {
        CoexprError::External {
            message: format!("JSON error: {err}"),
            service: Some("serde_json".to_string()),
            source_details: None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add operation context to an error
    fn with_operation_context(self, operation: &str) -> CoexprResult<T>;

    /// Attach the file a layout or sample failure came from
    fn with_file_context(self, file: &Path) -> CoexprResult<T>;
}

impl<T> ResultExt<T> for CoexprResult<T> {
    fn with_operation_context(self, operation: &str) -> CoexprResult<T> {
        self.map_err(|mut err| {
            match &mut err {
                CoexprError::NoData { operation: op, .. }
                | CoexprError::Store { operation: op, .. } => {
                    *op = Some(operation.to_string());
                }
                CoexprError::External { source_details, .. }
                | CoexprError::Internal { source_details, .. } => {
                    if source_details.is_none() {
                        *source_details = Some(format!("during {operation}"));
                    }
                }
                _ => {}
            }
            err
        })
    }

    fn with_file_context(self, file: &Path) -> CoexprResult<T> {
        self.map_err(|mut err| {
            match &mut err {
                CoexprError::Layout { file: f, .. }
                | CoexprError::UnknownSample { source_file: f, .. } => {
                    if f.is_none() {
                        *f = Some(file.display().to_string());
                    }
                }
                _ => {}
            }
            err
        })
    }
}

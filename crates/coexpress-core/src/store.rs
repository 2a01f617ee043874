//! Contracts onto the correlation store
//!
//! The ingestion pipeline does not talk to a database directly. It needs three things from
//! whatever holds the records, and each is a trait here:
//!
//! - [`ProvenanceResolver`]: turn four identity fields into the stored provenance, creating
//!   it on first sight and returning the existing one afterwards.
//! - [`BulkLoader`]: load one staging file in a single transaction and report how many rows
//!   went in. Duplicate pair+provenance rows are counted, not fatal.
//! - [`CorrelationLookup`]: read stored values back by gene pair.

use crate::error::CoexprResult;
use coexpress_types::{Provenance, ProvenanceId, ProvenanceSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Outcome of loading one staging file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Rows inserted.
    pub rows_loaded: u64,
    /// Rows rejected because the pair already had a value under the same provenance.
    pub duplicates: u64,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.rows_loaded += other.rows_loaded;
        self.duplicates += other.duplicates;
    }
}

pub trait ProvenanceResolver {
    /// The stored provenance whose four fields equal `spec`, created if absent.
    fn resolve_or_create(&mut self, spec: &ProvenanceSpec) -> CoexprResult<Provenance>;
}

pub trait BulkLoader {
    /// Load every line of the staging file at `path`.
    fn load_staging_file(&mut self, path: &Path) -> CoexprResult<LoadReport>;
}

pub trait CorrelationLookup {
    /// Every stored value for the pair, one per provenance. Argument order does not matter.
    fn correlations(&self, gene1: &str, gene2: &str) -> CoexprResult<Vec<(Provenance, f64)>>;

    /// The value for the pair under one provenance.
    fn correlation(
        &self,
        gene1: &str,
        gene2: &str,
        provenance_id: ProvenanceId,
    ) -> CoexprResult<Option<f64>>;
}

//! Spot checks of a published correlation matrix against recomputed values
//!
//! For a handful of gene pairs the cross-tissue correlation is recomputed from the backing
//! array file and set beside the value a correlation-matrix file holds for the same pair.
//! The matrix is streamed once; only the requested pairs are kept.

use crate::config::IngestConfig;
use crate::error::{CoexprError, CoexprResult};
use crate::ingest::{Cell, clean_symbol, matrix_reader, parse_cell, read_column_genes};
use crate::pair_correlation::GenePairCorrelator;
use ahash::AHashMap;
use coexpress_types::GenePairKey;
use serde::Serialize;
use std::io::{Read, Write};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationRow {
    pub gene1: String,
    pub gene2: String,
    /// `None` when a gene is missing from the array file.
    pub computed: Option<f64>,
    /// `None` when the matrix has no value for the pair.
    pub stored: Option<f64>,
}

impl VerificationRow {
    /// Absolute difference, when both sides are present.
    pub fn difference(&self) -> Option<f64> {
        Some((self.computed? - self.stored?).abs())
    }
}

/// Recompute each pair in `pairs` and look up its stored value in `matrix`.
///
/// Rows come back in the order of `pairs`. The matrix is read with the same header rules as
/// ingestion, so `config` should be the preset the file was published with.
#[instrument(skip_all, fields(pairs = pairs.len()))]
pub fn verify_against_matrix<R: Read>(
    correlator: &GenePairCorrelator,
    matrix: R,
    config: &IngestConfig,
    pairs: &[(String, String)],
) -> CoexprResult<Vec<VerificationRow>> {
    config.validate()?;
    let mut stored: AHashMap<GenePairKey, Option<f64>> = pairs
        .iter()
        .map(|(a, b)| (GenePairKey::new(a.as_str(), b.as_str()), None))
        .collect();

    let mut reader = matrix_reader(matrix, config)?;
    let mut records = reader.records();
    let column_genes = read_column_genes(&mut records, config)?;
    let mut remaining = stored.len();
    for record in records {
        if remaining == 0 {
            break;
        }
        let record = record?;
        let Some(row_gene) = record.get(config.row_key_column).map(clean_symbol) else {
            continue;
        };
        for (gene, raw) in column_genes.iter().zip(record.iter().skip(config.header_columns)) {
            let Some(slot) = stored.get_mut(&GenePairKey::new(row_gene, gene.as_str())) else {
                continue;
            };
            if slot.is_some() {
                continue;
            }
            if let Cell::Value(v) = parse_cell(raw) {
                *slot = Some(v);
                remaining -= 1;
            }
        }
    }

    let mut rows = Vec::with_capacity(pairs.len());
    for (gene1, gene2) in pairs {
        let computed = match correlator.correlate_across_tissues(gene1, gene2) {
            Ok(value) => Some(value),
            Err(CoexprError::UnknownGene { symbol }) => {
                warn!(%symbol, "Gene not in array file");
                None
            }
            Err(e) => return Err(e),
        };
        let stored = stored.get(&GenePairKey::new(gene1.as_str(), gene2.as_str())).copied().flatten();
        rows.push(VerificationRow { gene1: gene1.clone(), gene2: gene2.clone(), computed, stored });
    }
    info!(
        verified = rows.len(),
        missing_in_matrix = rows.iter().filter(|r| r.stored.is_none()).count(),
        "Verified correlations"
    );
    Ok(rows)
}

/// Write `rows` as a tab-separated report with a header line.
pub fn write_verification_tsv<W: Write>(rows: &[VerificationRow], out: W) -> CoexprResult<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    writer.write_record(["gene1", "gene2", "computed", "stored", "difference"])?;
    let cell = |v: Option<f64>| v.map_or_else(|| "NA".to_string(), |v| v.to_string());
    for row in rows {
        writer.write_record([
            row.gene1.clone(),
            row.gene2.clone(),
            cell(row.computed),
            cell(row.stored),
            cell(row.difference()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

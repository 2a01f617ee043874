//! Metadata index over a backing array file
//!
//! The expression matrix is addressed purely by integer position. Everything a caller names
//! (gene symbols, sample accessions, tissue labels, update dates) is translated through the
//! lookup tables built here, once, when a loader opens a file. The tables are immutable
//! afterwards.
//!
//! ## Layout
//!
//! ```text
//!   /data/expression            samples x genes, numeric
//!   /data/normalized_expression (alternative name, probed if the first is absent)
//!   /meta/genes                 one symbol per gene column
//!   /meta/Sample_geo_accession  one id per sample row
//!   /meta/Sample_source_name_ch1  one tissue label per sample row
//!   /meta/Sample_last_update_date optional, "Apr 21 2017"
//! ```

use crate::array_store::ArrayBackend;
use crate::config::DatasetLayout;
use crate::error::{CoexprError, CoexprResult};
use ahash::AHashMap;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Gene symbol ↔ gene column.
#[derive(Debug, Clone, Default)]
pub struct GeneIndex {
    names: Vec<String>,
    positions: AHashMap<String, usize>,
}

impl GeneIndex {
    /// Build from the gene-name dataset. A symbol that appears more than once resolves to
    /// its first column.
    pub fn from_names(names: Vec<String>) -> Self {
        let mut positions = AHashMap::with_capacity(names.len());
        let mut duplicates = 0usize;
        for (idx, name) in names.iter().enumerate() {
            if positions.contains_key(name) {
                duplicates += 1;
            } else {
                positions.insert(name.clone(), idx);
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "Gene symbols repeat in the gene dataset; first column wins");
        }
        Self { names, positions }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.positions.get(symbol).copied()
    }

    /// Column of `symbol`, or an error naming it.
    pub fn resolve(&self, symbol: &str) -> CoexprResult<usize> {
        self.index_of(symbol).ok_or_else(|| CoexprError::unknown_gene(symbol))
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Symbols for `indices`, skipping positions past the end.
    pub fn names_of(&self, indices: &[usize]) -> Vec<String> {
        indices.iter().filter_map(|&i| self.name(i)).map(str::to_string).collect()
    }

    pub fn symbols(&self) -> &[String] {
        &self.names
    }
}

/// Sample accession ↔ sample row, plus each sample's last-update timestamp.
#[derive(Debug, Clone, Default)]
pub struct SampleIndex {
    ids: Vec<String>,
    positions: AHashMap<String, usize>,
    updated: Vec<Option<NaiveDateTime>>,
}

impl SampleIndex {
    pub fn new(ids: Vec<String>, updated: Vec<Option<NaiveDateTime>>) -> Self {
        let mut updated = updated;
        updated.resize(ids.len(), None);
        let positions = ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).rev().collect();
        Self { ids, positions, updated }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, sample_id: &str) -> Option<usize> {
        self.positions.get(sample_id).copied()
    }

    pub fn resolve(&self, sample_id: &str) -> CoexprResult<usize> {
        self.index_of(sample_id).ok_or_else(|| CoexprError::unknown_sample(sample_id, None))
    }

    pub fn id(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    pub fn updated_at(&self, index: usize) -> Option<NaiveDateTime> {
        self.updated.get(index).copied().flatten()
    }

    pub fn has_update_dates(&self) -> bool {
        self.updated.iter().any(Option::is_some)
    }

    /// Rows whose last update is strictly before `cutoff`. Samples without a date never
    /// match.
    pub fn updated_before(&self, cutoff: NaiveDateTime) -> Vec<usize> {
        self.updated
            .iter()
            .enumerate()
            .filter_map(|(i, date)| date.filter(|d| *d < cutoff).map(|_| i))
            .collect()
    }

    /// Resolve a tissue side file: one sample id per line, blank lines ignored. Every id
    /// must be known; the result keeps file order.
    #[instrument(skip(self))]
    pub fn resolve_file(&self, path: &Path) -> CoexprResult<Vec<usize>> {
        let contents = fs::read_to_string(path)?;
        let indices = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|id| self.index_of(id).ok_or_else(|| CoexprError::unknown_sample(id, Some(path))))
            .collect::<CoexprResult<Vec<_>>>()?;
        debug!(samples = indices.len(), "Resolved tissue side file");
        Ok(indices)
    }
}

/// Tissue label → sample rows, labels in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct TissueIndex {
    labels: Vec<String>,
    members: Vec<Vec<usize>>,
    positions: AHashMap<String, usize>,
}

impl TissueIndex {
    /// Group sample rows by label. `labels[i]` is the tissue of sample row `i`.
    pub fn from_labels(labels: &[String]) -> Self {
        let mut index = Self::default();
        for (sample, label) in labels.iter().enumerate() {
            let slot = match index.positions.get(label) {
                Some(&slot) => slot,
                None => {
                    index.labels.push(label.clone());
                    index.members.push(Vec::new());
                    index.positions.insert(label.clone(), index.labels.len() - 1);
                    index.labels.len() - 1
                }
            };
            index.members[slot].push(sample);
        }
        index
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn samples(&self, label: &str) -> Option<&[usize]> {
        self.positions.get(label).map(|&slot| self.members[slot].as_slice())
    }

    pub fn resolve(&self, label: &str) -> CoexprResult<&[usize]> {
        self.samples(label).ok_or_else(|| CoexprError::unknown_tissue(label))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// All lookup tables for one backing file.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    pub genes: GeneIndex,
    pub samples: SampleIndex,
    pub tissues: TissueIndex,
}

/// Name of the expression dataset under the data group, or `None` if no candidate exists.
pub fn probe_expression_dataset(
    backend: &dyn ArrayBackend,
    layout: &DatasetLayout,
) -> Option<String> {
    let members = match backend.group_members(&layout.data_group) {
        Ok(members) => members,
        Err(e) => {
            debug!(group = %layout.data_group, error = %e, "Data group could not be listed");
            return None;
        }
    };
    layout
        .expression_candidates
        .iter()
        .find(|candidate| members.iter().any(|m| m == *candidate))
        .map(|name| layout.data_path(name))
}

impl MetadataIndex {
    /// Build directly from already-decoded columns.
    pub fn from_parts(
        genes: Vec<String>,
        sample_ids: Vec<String>,
        tissue_labels: &[String],
        update_dates: Vec<Option<NaiveDateTime>>,
    ) -> Self {
        Self {
            genes: GeneIndex::from_names(genes),
            samples: SampleIndex::new(sample_ids, update_dates),
            tissues: TissueIndex::from_labels(tissue_labels),
        }
    }

    /// Read the metadata datasets of `backend` in full.
    ///
    /// Fails with a layout error if the expression matrix cannot be found or its shape does
    /// not agree with the metadata lengths; nothing is retried.
    #[instrument(skip(backend, layout), fields(file = %backend.describe()))]
    pub fn load(backend: &dyn ArrayBackend, layout: &DatasetLayout) -> CoexprResult<Self> {
        let file = backend.describe();
        let layout_error = |dataset: &str, message: String| CoexprError::Layout {
            message,
            file: Some(file.clone()),
            dataset: Some(dataset.to_string()),
        };

        let dataset = probe_expression_dataset(backend, layout).ok_or_else(|| {
            layout_error(&layout.data_group, "no expression dataset to take dimensions from".into())
        })?;
        let dims = backend.shape(&dataset)?;
        let [sample_count, gene_count] = dims[..] else {
            return Err(layout_error(&dataset, format!("expected 2 dimensions, found {dims:?}")));
        };

        let genes = backend.read_strings(&layout.genes)?;
        if genes.len() != gene_count {
            return Err(layout_error(
                &layout.genes,
                format!("{} gene names for {gene_count} gene columns", genes.len()),
            ));
        }
        let sample_ids = backend.read_strings(&layout.sample_ids)?;
        let tissue_labels = backend.read_strings(&layout.tissues)?;
        for (name, len) in [(&layout.sample_ids, sample_ids.len()), (&layout.tissues, tissue_labels.len())] {
            if len != sample_count {
                return Err(layout_error(name, format!("{len} entries for {sample_count} samples")));
            }
        }

        let update_dates = if backend.contains(&layout.update_dates) {
            parse_update_dates(&backend.read_strings(&layout.update_dates)?, &layout.date_format)
        } else {
            debug!(dataset = %layout.update_dates, "No update dates in file");
            Vec::new()
        };

        let index = Self::from_parts(genes, sample_ids, &tissue_labels, update_dates);
        info!(
            genes = index.genes.len(),
            samples = index.samples.len(),
            tissues = index.tissues.len(),
            expression = %dataset,
            "Loaded metadata index"
        );
        Ok(index)
    }
}

/// Dates are taken at the start of their day. Unparseable entries become `None`.
fn parse_update_dates(raw: &[String], format: &str) -> Vec<Option<NaiveDateTime>> {
    let mut unparsed = 0usize;
    let dates = raw
        .iter()
        .map(|text| {
            let parsed = NaiveDate::parse_from_str(text.trim(), format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0));
            if parsed.is_none() {
                unparsed += 1;
            }
            parsed
        })
        .collect();
    if unparsed > 0 {
        warn!(unparsed, format, "Some sample update dates could not be parsed");
    }
    dates
}

//! Selective expression reads
//!
//! An [`ExpressionLoader`] owns one backing array file: its backend handle, its metadata
//! index and a cache of tissue sub-matrices. The full samples x genes matrix is never
//! materialized; callers ask for a set of sample rows (a tissue) or a single gene column,
//! and the loader coalesces the rows into runs, selects them as one composite selection and
//! reads them with a single call.
//!
//! Tissue sub-matrices are cached by tissue identity for the lifetime of the loader. The
//! cache is unbounded and nothing is evicted.

use crate::array_store::ArrayBackend;
use crate::config::DatasetLayout;
use crate::error::{CoexprError, CoexprResult, ResultExt};
use crate::metadata::{MetadataIndex, probe_expression_dataset};
use crate::selection::{SampleBlock, build_selection, coalesce_runs};
use dashmap::DashMap;
use ndarray::{Array2, ArrayView1};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

/// A named subset of samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tissue {
    /// Samples whose source label in the file equals this string.
    Label(String),
    /// Samples listed, one id per line, in a side file.
    SampleFile(PathBuf),
}

impl Tissue {
    pub fn label(label: impl Into<String>) -> Self {
        Tissue::Label(label.into())
    }

    pub fn sample_file(path: impl Into<PathBuf>) -> Self {
        Tissue::SampleFile(path.into())
    }
}

impl fmt::Display for Tissue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tissue::Label(label) => write!(f, "{label}"),
            Tissue::SampleFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Dense samples x genes block read from the backing file.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    values: Array2<f64>,
    sample_indices: Vec<usize>,
    genes: Range<usize>,
    skipped: Vec<SampleBlock>,
}

impl ExpressionMatrix {
    fn empty(genes: Range<usize>) -> Self {
        Self { values: Array2::zeros((0, genes.len())), sample_indices: Vec::new(), genes, skipped: Vec::new() }
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Sample row of each result row.
    pub fn sample_indices(&self) -> &[usize] {
        &self.sample_indices
    }

    pub fn sample_count(&self) -> usize {
        self.values.nrows()
    }

    pub fn gene_count(&self) -> usize {
        self.values.ncols()
    }

    /// File gene columns covered, in result-column order.
    pub fn genes(&self) -> Range<usize> {
        self.genes.clone()
    }

    /// Values of the gene at file column `gene`, one per sample row.
    pub fn gene_values(&self, gene: usize) -> Option<ArrayView1<'_, f64>> {
        if self.genes.contains(&gene) {
            Some(self.values.column(gene - self.genes.start))
        } else {
            None
        }
    }

    /// Blocks that failed selection. Non-empty means values are missing samples.
    pub fn skipped_blocks(&self) -> &[SampleBlock] {
        &self.skipped
    }

    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Owner of one backing array file.
pub struct ExpressionLoader {
    source: String,
    backend: Mutex<Box<dyn ArrayBackend>>,
    layout: DatasetLayout,
    expression_dataset: Option<String>,
    extent: [usize; 2],
    metadata: MetadataIndex,
    tissue_cache: DashMap<Tissue, Arc<ExpressionMatrix>>,
}

impl fmt::Debug for ExpressionLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionLoader")
            .field("source", &self.source)
            .field("expression_dataset", &self.expression_dataset)
            .field("extent", &self.extent)
            .field("cached_tissues", &self.tissue_cache.len())
            .finish()
    }
}

impl ExpressionLoader {
    /// Load the metadata of `backend` and take ownership of it.
    pub fn open(backend: Box<dyn ArrayBackend>, layout: DatasetLayout) -> CoexprResult<Self> {
        layout.validate()?;
        let metadata = MetadataIndex::load(backend.as_ref(), &layout)?;
        Self::with_metadata(backend, layout, metadata)
    }

    /// Serve `backend` with an index built elsewhere, for files that carry only the
    /// expression matrix. If no expression dataset can be found, reads return `Ok(None)`.
    pub fn with_metadata(
        backend: Box<dyn ArrayBackend>,
        layout: DatasetLayout,
        metadata: MetadataIndex,
    ) -> CoexprResult<Self> {
        let source = backend.describe();
        let expression_dataset = probe_expression_dataset(backend.as_ref(), &layout);
        let extent = match &expression_dataset {
            Some(dataset) => {
                let dims = backend.shape(dataset)?;
                match dims[..] {
                    [samples, genes] => [samples, genes],
                    _ => {
                        return Err(CoexprError::Layout {
                            message: format!("expected 2 dimensions, found {dims:?}"),
                            file: Some(source),
                            dataset: Some(dataset.clone()),
                        });
                    }
                }
            }
            None => {
                warn!(file = %source, "No expression dataset found; reads will return nothing");
                [metadata.samples.len(), metadata.genes.len()]
            }
        };
        debug!(file = %source, ?extent, dataset = ?expression_dataset, "Opened expression loader");
        Ok(Self {
            source,
            backend: Mutex::new(backend),
            layout,
            expression_dataset,
            extent,
            metadata,
            tissue_cache: DashMap::new(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn metadata(&self) -> &MetadataIndex {
        &self.metadata
    }

    /// Dataset the expression values are read from, if the file has one.
    pub fn expression_dataset(&self) -> Option<&str> {
        self.expression_dataset.as_deref()
    }

    /// Tissue labels in order of first appearance.
    pub fn tissue_types(&self) -> &[String] {
        self.metadata.tissues.labels()
    }

    pub fn sample_indices_for_tissue(&self, label: &str) -> CoexprResult<Vec<usize>> {
        self.metadata.tissues.resolve(label).map(<[usize]>::to_vec)
    }

    pub fn sample_indices_from_file(&self, path: &Path) -> CoexprResult<Vec<usize>> {
        self.metadata.samples.resolve_file(path).with_file_context(path)
    }

    /// Sample rows of `tissue`, ascending and without repeats.
    pub fn tissue_samples(&self, tissue: &Tissue) -> CoexprResult<Vec<usize>> {
        let mut indices = match tissue {
            Tissue::Label(label) => self.sample_indices_for_tissue(label)?,
            Tissue::SampleFile(path) => self.sample_indices_from_file(path)?,
        };
        let listed = indices.len();
        indices.sort_unstable();
        indices.dedup();
        if indices.len() != listed {
            debug!(tissue = %tissue, listed, unique = indices.len(), "Dropped repeated samples");
        }
        Ok(indices)
    }

    pub fn gene_names(&self, indices: &[usize]) -> Vec<String> {
        self.metadata.genes.names_of(indices)
    }

    pub fn sample_id(&self, index: usize) -> Option<&str> {
        self.metadata.samples.id(index)
    }

    fn lock_backend(&self) -> CoexprResult<MutexGuard<'_, Box<dyn ArrayBackend>>> {
        self.backend
            .lock()
            .map_err(|_| CoexprError::internal_component("expression_loader", "backend lock poisoned"))
    }

    /// Read `samples` x `genes` with one composite selection.
    ///
    /// Returns `Ok(None)` when the file has no expression dataset. Blocks the selection
    /// rejects are recorded on the result rather than failing the read.
    #[instrument(skip(self, samples), fields(file = %self.source, samples = samples.len()))]
    pub fn read_samples(
        &self,
        samples: &[usize],
        genes: Range<usize>,
    ) -> CoexprResult<Option<ExpressionMatrix>> {
        let Some(dataset) = &self.expression_dataset else {
            warn!("Unsupported file layout: no expression dataset");
            return Ok(None);
        };
        if samples.is_empty() || genes.is_empty() {
            return Ok(Some(ExpressionMatrix::empty(genes)));
        }

        let blocks = coalesce_runs(samples);
        let built = build_selection(self.extent, &blocks, genes.clone());
        if !built.skipped.is_empty() {
            warn!(
                skipped = built.skipped.len(),
                blocks = blocks.len(),
                "Partial selection; values derived from this read are missing samples"
            );
        }
        if built.selection.is_empty() {
            return Ok(Some(ExpressionMatrix { skipped: built.skipped, ..ExpressionMatrix::empty(genes) }));
        }

        let values = self.lock_backend()?.read_selection(dataset, &built.selection)?;
        debug!(blocks = built.selection.blocks().len(), rows = values.nrows(), "Read selection");
        Ok(Some(ExpressionMatrix {
            values,
            sample_indices: built.sample_indices,
            genes,
            skipped: built.skipped,
        }))
    }

    /// All genes for the samples of `tissue`, from the cache when already read.
    pub fn tissue_matrix(&self, tissue: &Tissue) -> CoexprResult<Option<Arc<ExpressionMatrix>>> {
        if let Some(hit) = self.tissue_cache.get(tissue) {
            return Ok(Some(Arc::clone(hit.value())));
        }
        let samples = self.tissue_samples(tissue)?;
        let Some(matrix) = self.read_samples(&samples, 0..self.extent[1])? else {
            return Ok(None);
        };
        info!(
            tissue = %tissue,
            samples = matrix.sample_count(),
            genes = matrix.gene_count(),
            "Cached tissue matrix"
        );
        let entry = self.tissue_cache.entry(tissue.clone()).or_insert_with(|| Arc::new(matrix));
        Ok(Some(Arc::clone(entry.value())))
    }

    pub fn cached_tissues(&self) -> usize {
        self.tissue_cache.len()
    }

    /// One gene across every sample in the file.
    pub fn expression_for_gene(&self, gene: usize) -> CoexprResult<Option<Vec<f64>>> {
        let all: Vec<usize> = (0..self.extent[0]).collect();
        self.gene_vector(gene, &all)
    }

    /// One gene across the given sample rows.
    pub fn gene_vector(&self, gene: usize, samples: &[usize]) -> CoexprResult<Option<Vec<f64>>> {
        let matrix = self.read_samples(samples, gene..gene + 1)?;
        Ok(matrix.map(|m| m.values.column(0).to_vec()))
    }

    /// One gene across the samples of `tissue`, served from the tissue cache.
    pub fn expression_for_gene_in_tissue(
        &self,
        gene: &str,
        tissue: &Tissue,
    ) -> CoexprResult<Option<Vec<f64>>> {
        let column = self.metadata.genes.resolve(gene)?;
        let matrix = self.tissue_matrix(tissue)?;
        Ok(matrix.and_then(|m| m.gene_values(column).map(|v| v.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{four_gene_backend, four_gene_loader};
    use ndarray::Array2;

    #[test]
    fn test_tissue_matrix_is_cached() {
        let loader = four_gene_loader();
        let liver = Tissue::label("liver");
        let first = loader.tissue_matrix(&liver).unwrap().unwrap();
        let second = loader.tissue_matrix(&liver).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.cached_tissues(), 1);
        assert_eq!(first.sample_indices(), &[0, 1, 3]);
        assert_eq!(first.gene_count(), 4);
    }

    #[test]
    fn test_gene_vector_follows_requested_rows() {
        let loader = four_gene_loader();
        let a1bg = loader.metadata().genes.resolve("A1BG").unwrap();
        let values = loader.gene_vector(a1bg, &[0, 1, 4]).unwrap().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 5.0]);
        let all = loader.expression_for_gene(a1bg).unwrap().unwrap();
        assert_eq!(all, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_out_of_range_block_is_skipped_not_fatal() {
        let loader = four_gene_loader();
        let matrix = loader.read_samples(&[0, 1, 40, 41], 0..4).unwrap().unwrap();
        assert!(matrix.is_partial());
        assert_eq!(matrix.skipped_blocks(), &[SampleBlock::new(40, 2)]);
        assert_eq!(matrix.sample_count(), 2);
    }

    #[test]
    fn test_missing_expression_dataset_reads_none() {
        let donor = ExpressionLoader::open(Box::new(four_gene_backend()), DatasetLayout::default()).unwrap();
        let bare = crate::array_store::MemoryArrayBackend::new("bare.h5")
            .with_matrix("/data/counts", Array2::zeros((6, 4)));
        let loader = ExpressionLoader::with_metadata(
            Box::new(bare),
            DatasetLayout::default(),
            donor.metadata().clone(),
        )
        .unwrap();
        assert!(loader.expression_dataset().is_none());
        assert!(loader.read_samples(&[0, 1], 0..4).unwrap().is_none());
        assert!(loader.tissue_matrix(&Tissue::label("liver")).unwrap().is_none());
    }

    #[test]
    fn test_empty_selection_has_no_rows() {
        let loader = four_gene_loader();
        let matrix = loader.read_samples(&[], 0..4).unwrap().unwrap();
        assert_eq!(matrix.sample_count(), 0);
        assert_eq!(matrix.gene_count(), 4);
    }

    #[test]
    fn test_unknown_tissue_is_named() {
        let loader = four_gene_loader();
        let err = loader.tissue_matrix(&Tissue::label("kidney")).unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized tissue: kidney");
    }
}

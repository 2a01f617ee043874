//! All-pairs correlation engine
//!
//! Correlates every gene with every other gene (and itself) over the samples of one tissue
//! and stores the results in a [`PairwiseMatrix`]. With tens of thousands of genes that is
//! hundreds of millions of pairs, so work generation is throttled: the producer pushes work
//! units into a bounded channel and blocks while `max_pending_tasks` units are waiting.
//! Memory held by pending work stays constant no matter how many pairs remain.
//!
//! ```text
//!   producer ──► [ bounded channel: max_pending_tasks ] ──► worker 0 ─┐
//!   (row, cols)                                          ──► worker 1 ─┼──► PairwiseMatrix
//!                                                        ──► worker N ─┘    (one writer per cell)
//! ```
//!
//! A work unit is one row of the upper triangle cut into runs of `task_width` columns. The
//! generator visits each `(row, col)` with `row <= col` exactly once, so each cell has a
//! single writer and the arena needs no lock.
//!
//! Diagonal cells are computed like any other pair; they come out as exactly `1.0` unless
//! the gene has zero variance over the tissue, in which case they are NaN.

use crate::config::CorrelationConfig;
use crate::error::{CoexprError, CoexprResult};
use crate::expression::{ExpressionLoader, Tissue};
use crate::pairwise_matrix::PairwiseMatrix;
use crate::pearson::pearson_unchecked;
use coexpress_types::{CorrelationRecord, ProvenanceId};
use crossbeam::channel;
use ndarray::ArrayView2;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Shared flag that asks a running computation to stop producing work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One unit of work: cells `(row, c)` for every `c` in `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PairTask {
    row: usize,
    columns: Range<usize>,
}

/// Output of an all-pairs run.
#[derive(Debug)]
pub struct AllPairsResult {
    pub matrix: PairwiseMatrix,
    /// Gene symbol of each matrix row, when the run was over a named tissue.
    pub genes: Vec<String>,
    pub completed_pairs: u64,
    pub total_pairs: u64,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl AllPairsResult {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.completed_pairs == self.total_pairs
    }

    /// Value for two genes by symbol.
    pub fn correlation(&self, gene1: &str, gene2: &str) -> Option<f64> {
        let a = self.genes.iter().position(|g| g == gene1)?;
        let b = self.genes.iter().position(|g| g == gene2)?;
        self.matrix.get(a, b)
    }

    /// Upper-triangle records stamped with `provenance_id`. NaN cells are left out.
    pub fn records(&self, provenance_id: ProvenanceId) -> impl Iterator<Item = CorrelationRecord> + '_ {
        self.matrix.upper_triangle().filter(|(_, _, v)| !v.is_nan()).filter_map(move |(r, c, v)| {
            Some(CorrelationRecord::new(
                self.genes.get(r)?.as_str(),
                self.genes.get(c)?.as_str(),
                v,
                provenance_id,
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct AllPairsEngine {
    config: CorrelationConfig,
}

impl AllPairsEngine {
    pub fn new(config: CorrelationConfig) -> CoexprResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Correlate every gene pair over the samples of `tissue`.
    #[instrument(skip(self, loader, cancel), fields(file = %loader.source()))]
    pub fn correlate_tissue(
        &self,
        loader: &ExpressionLoader,
        tissue: &Tissue,
        cancel: Option<&CancellationToken>,
    ) -> CoexprResult<AllPairsResult> {
        let matrix = loader.tissue_matrix(tissue)?.ok_or_else(|| CoexprError::Layout {
            message: "file has no expression dataset".to_string(),
            file: Some(loader.source().to_string()),
            dataset: None,
        })?;
        if matrix.is_partial() {
            warn!(
                skipped = matrix.skipped_blocks().len(),
                "All-pairs run over a partial tissue read; results are missing samples"
            );
        }
        let mut result = self.compute(matrix.values().t(), cancel)?;
        result.genes = loader.gene_names(&matrix.genes().collect::<Vec<_>>());
        Ok(result)
    }

    /// Correlate every pair of rows of `vectors` (one row per gene, one column per sample).
    pub fn compute(
        &self,
        vectors: ArrayView2<'_, f64>,
        cancel: Option<&CancellationToken>,
    ) -> CoexprResult<AllPairsResult> {
        let started = Instant::now();
        let (genes, samples) = vectors.dim();
        if samples == 0 {
            return Err(CoexprError::no_data("all-pairs correlation", "tissue has no samples"));
        }

        let contiguous = vectors.as_standard_layout();
        let flat = contiguous.as_slice().ok_or_else(|| {
            CoexprError::internal_component("all_pairs_engine", "gene vectors are not contiguous")
        })?;
        let rows: Vec<&[f64]> = flat.chunks(samples).collect();

        let matrix = PairwiseMatrix::new(genes);
        let total_pairs = PairwiseMatrix::cell_count(genes) as u64;
        let completed = AtomicU64::new(0);
        let worker_count = self.config.worker_count.min(genes.max(1));
        let progress_interval = self.config.progress_interval.max(1);

        info!(
            genes,
            samples,
            total_pairs,
            worker_count,
            max_pending_tasks = self.config.max_pending_tasks,
            "Starting all-pairs correlation"
        );

        let (sender, receiver) = channel::bounded::<PairTask>(self.config.max_pending_tasks);
        let cancelled = std::thread::scope(|scope| -> CoexprResult<bool> {
            let mut handles = Vec::with_capacity(worker_count);
            for worker_id in 0..worker_count {
                let receiver = receiver.clone();
                let (rows, matrix, completed) = (&rows, &matrix, &completed);
                handles.push(scope.spawn(move || {
                    let mut computed = 0u64;
                    for task in receiver.iter() {
                        if cancel.is_some_and(CancellationToken::is_cancelled) {
                            continue;
                        }
                        let row = rows[task.row];
                        let width = task.columns.len() as u64;
                        for col in task.columns {
                            matrix.set(task.row, col, pearson_unchecked(row, rows[col]));
                        }
                        computed += width;
                        let before = completed.fetch_add(width, Ordering::Relaxed);
                        if (before + width) / progress_interval > before / progress_interval {
                            info!(completed = before + width, total_pairs, "Correlation progress");
                        }
                    }
                    debug!(worker_id, computed, "Worker drained");
                }));
            }
            drop(receiver);

            let mut stopped = false;
            'produce: for row in 0..genes {
                let mut start = row;
                while start < genes {
                    if cancel.is_some_and(CancellationToken::is_cancelled) {
                        stopped = true;
                        break 'produce;
                    }
                    let end = (start + self.config.task_width).min(genes);
                    // blocks while max_pending_tasks units are queued
                    sender.send(PairTask { row, columns: start..end }).map_err(|_| {
                        CoexprError::internal_component("all_pairs_engine", "all workers exited early")
                    })?;
                    start = end;
                }
            }
            drop(sender);

            for handle in handles {
                handle.join().map_err(|e| {
                    CoexprError::internal_component(
                        "all_pairs_worker",
                        format!("Worker thread failed: {e:?}"),
                    )
                })?;
            }
            Ok(stopped || cancel.is_some_and(CancellationToken::is_cancelled))
        })?;

        let completed_pairs = completed.into_inner();
        let elapsed = started.elapsed();
        info!(
            completed_pairs,
            total_pairs,
            cancelled,
            duration_ms = elapsed.as_millis() as u64,
            "Completed all-pairs correlation"
        );
        Ok(AllPairsResult { matrix, genes: Vec::new(), completed_pairs, total_pairs, cancelled, elapsed })
    }
}

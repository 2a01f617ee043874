//! Single gene-pair correlation
//!
//! Three scopes are supported:
//!
//! - **tissue**: both genes over the samples of one tissue. The tissue sub-matrix is held
//!   in a single-entry "current tissue" slot, so a run of queries against the same tissue
//!   reads the file once; asking for another tissue replaces the slot.
//! - **cross-tissue**: both genes over every sample in the file.
//! - **updated before**: both genes over the samples last updated strictly before a cutoff,
//!   rescaled with the configured [`Normalization`](crate::config::Normalization) before
//!   correlating.

use crate::config::CorrelationConfig;
use crate::error::{CoexprError, CoexprResult, ResultExt};
use crate::expression::{ExpressionLoader, ExpressionMatrix, Tissue};
use crate::pearson::{normalize, pearson};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct GenePairCorrelator {
    loader: Arc<ExpressionLoader>,
    config: CorrelationConfig,
    current: Option<(Tissue, Arc<ExpressionMatrix>)>,
}

impl GenePairCorrelator {
    pub fn new(loader: Arc<ExpressionLoader>, config: CorrelationConfig) -> Self {
        Self { loader, config, current: None }
    }

    pub fn loader(&self) -> &Arc<ExpressionLoader> {
        &self.loader
    }

    /// Tissue held in the current-tissue slot, if any.
    pub fn current_tissue(&self) -> Option<&Tissue> {
        self.current.as_ref().map(|(tissue, _)| tissue)
    }

    /// Correlate two genes within `tissue`, or across all samples if `tissue` is `None`.
    pub fn correlate(
        &mut self,
        gene1: &str,
        gene2: &str,
        tissue: Option<&Tissue>,
    ) -> CoexprResult<f64> {
        match tissue {
            Some(tissue) => self.correlate_in_tissue(gene1, gene2, tissue),
            None => self.correlate_across_tissues(gene1, gene2),
        }
    }

    fn resolve_pair(&self, gene1: &str, gene2: &str) -> CoexprResult<(usize, usize)> {
        let genes = &self.loader.metadata().genes;
        Ok((genes.resolve(gene1)?, genes.resolve(gene2)?))
    }

    fn unsupported_layout(&self) -> CoexprError {
        CoexprError::Layout {
            message: "file has no expression dataset".to_string(),
            file: Some(self.loader.source().to_string()),
            dataset: Some(self.loader.layout().data_group.clone()),
        }
    }

    fn current_matrix(&mut self, tissue: &Tissue) -> CoexprResult<Arc<ExpressionMatrix>> {
        if let Some((held, matrix)) = &self.current {
            if held == tissue {
                return Ok(Arc::clone(matrix));
            }
        }
        let matrix = self.loader.tissue_matrix(tissue)?.ok_or_else(|| self.unsupported_layout())?;
        debug!(tissue = %tissue, "Switched current tissue");
        self.current = Some((tissue.clone(), Arc::clone(&matrix)));
        Ok(matrix)
    }

    #[instrument(skip(self))]
    pub fn correlate_in_tissue(
        &mut self,
        gene1: &str,
        gene2: &str,
        tissue: &Tissue,
    ) -> CoexprResult<f64> {
        let (g1, g2) = self.resolve_pair(gene1, gene2)?;
        let matrix = self.current_matrix(tissue)?;
        if matrix.is_partial() {
            warn!(skipped = matrix.skipped_blocks().len(), "Correlating over a partial tissue read");
        }
        let (Some(x), Some(y)) = (matrix.gene_values(g1), matrix.gene_values(g2)) else {
            return Err(CoexprError::internal_component(
                "gene_pair_correlator",
                "tissue matrix does not cover the requested genes",
            ));
        };
        pearson(&x.to_vec(), &y.to_vec()).with_operation_context("tissue correlation")
    }

    #[instrument(skip(self))]
    pub fn correlate_across_tissues(&self, gene1: &str, gene2: &str) -> CoexprResult<f64> {
        let (g1, g2) = self.resolve_pair(gene1, gene2)?;
        let x = self.loader.expression_for_gene(g1)?.ok_or_else(|| self.unsupported_layout())?;
        let y = self.loader.expression_for_gene(g2)?.ok_or_else(|| self.unsupported_layout())?;
        pearson(&x, &y).with_operation_context("cross-tissue correlation")
    }

    /// Correlate over samples last updated strictly before `cutoff`.
    #[instrument(skip(self))]
    pub fn correlate_updated_before(
        &self,
        gene1: &str,
        gene2: &str,
        cutoff: NaiveDateTime,
    ) -> CoexprResult<f64> {
        let (g1, g2) = self.resolve_pair(gene1, gene2)?;
        let samples = self.loader.metadata().samples.updated_before(cutoff);
        if samples.is_empty() {
            return Err(CoexprError::no_data(
                "date-filtered correlation",
                format!("no samples updated before {cutoff}"),
            ));
        }
        debug!(samples = samples.len(), "Samples pass the date filter");

        let mut x = self.loader.gene_vector(g1, &samples)?.ok_or_else(|| self.unsupported_layout())?;
        let mut y = self.loader.gene_vector(g2, &samples)?.ok_or_else(|| self.unsupported_layout())?;
        normalize(&mut x, self.config.date_filter_normalization);
        normalize(&mut y, self.config.date_filter_normalization);
        pearson(&x, &y).with_operation_context("date-filtered correlation")
    }
}

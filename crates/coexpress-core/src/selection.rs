//! Contiguous-run coalescing of sample indices
//!
//! A tissue is an arbitrary list of sample rows. Selecting each row separately costs one
//! selection call per sample; collapsing runs of consecutive indices into `(start, width)`
//! blocks costs one call per run instead:
//!
//! ```text
//!   [1, 2, 3, 7, 8, 10]  ──►  (1, 3) (7, 2) (10, 1)
//! ```

use crate::array_store::{Hyperslab, HyperslabSelection, SelectOp};
use std::ops::Range;
use tracing::warn;

/// `width` consecutive sample rows starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SampleBlock {
    pub start: usize,
    pub width: usize,
}

impl SampleBlock {
    pub fn new(start: usize, width: usize) -> Self {
        Self { start, width }
    }

    pub fn end(&self) -> usize {
        self.start + self.width
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// Collapse `indices` into maximal runs of values increasing by exactly one.
///
/// Input order is preserved; an unsorted list still produces correct (if more numerous)
/// blocks.
pub fn coalesce_runs(indices: &[usize]) -> Vec<SampleBlock> {
    let mut blocks: Vec<SampleBlock> = Vec::new();
    for &index in indices {
        match blocks.last_mut() {
            Some(block) if block.end() == index => block.width += 1,
            _ => blocks.push(SampleBlock::new(index, 1)),
        }
    }
    blocks
}

/// Union of the blocks that could be selected, and the ones that could not.
#[derive(Debug, Clone)]
pub struct CoalescedSelection {
    pub selection: HyperslabSelection,
    /// Sample rows covered by `selection`, in result-row order.
    pub sample_indices: Vec<usize>,
    pub skipped: Vec<SampleBlock>,
}

/// Build one composite selection over `genes` for every block. A block the selection
/// rejects is logged and left out; the rest are still read.
pub fn build_selection(
    extent: [usize; 2],
    blocks: &[SampleBlock],
    genes: Range<usize>,
) -> CoalescedSelection {
    let mut selection = HyperslabSelection::new(extent);
    let mut sample_indices = Vec::with_capacity(blocks.iter().map(|b| b.width).sum());
    let mut skipped = Vec::new();

    for block in blocks {
        let op = if selection.is_empty() { SelectOp::Set } else { SelectOp::Or };
        let slab = Hyperslab::new([block.start, genes.start], [block.width, genes.len()]);
        match selection.select(op, slab) {
            Ok(()) => sample_indices.extend(block.indices()),
            Err(e) => {
                warn!(
                    start = block.start,
                    width = block.width,
                    status = e.status,
                    error = %e,
                    "Skipping sample block that could not be selected"
                );
                skipped.push(*block);
            }
        }
    }
    CoalescedSelection { selection, sample_indices, skipped }
}

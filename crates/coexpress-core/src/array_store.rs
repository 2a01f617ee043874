//! Backing array file access
//!
//! The expression data lives in one large two-dimensional dataset inside a hierarchical
//! array file, next to a handful of one-dimensional string datasets describing its axes.
//! [`ArrayBackend`] is the narrow seam onto that file: group listing, dataset shapes, string
//! datasets and a single composite-selection read.
//!
//! A [`HyperslabSelection`] is assembled the way the native library does it: the first
//! block replaces the selection (`SelectOp::Set`), every later block is unioned in
//! (`SelectOp::Or`), and each `select` call reports a status. The whole union is then
//! materialized by one `read_selection` call.
//!
//! ```text
//!   dataset (rows x cols)          selection             dense result
//!   ┌──────────────────┐
//!   │ row 0            │
//!   │ row 1  ██████████│  Set (1, 3)  ──┐        ┌──────────────────┐
//!   │ row 2  ██████████│                ├──────► │ rows 1..4        │
//!   │ row 3  ██████████│                │        │ rows 7..9        │
//!   │ ...              │                │        └──────────────────┘
//!   │ row 7  ██████████│  Or  (7, 2)  ──┘
//!   │ row 8  ██████████│
//!   └──────────────────┘
//! ```

use crate::error::{CoexprError, CoexprResult};
use ndarray::{Array2, ArrayView2, s};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// One rectangular region of a 2-D dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hyperslab {
    pub start: [usize; 2],
    pub count: [usize; 2],
}

impl Hyperslab {
    pub fn new(start: [usize; 2], count: [usize; 2]) -> Self {
        Self { start, count }
    }

    pub fn rows(&self) -> Range<usize> {
        self.start[0]..self.start[0] + self.count[0]
    }

    pub fn columns(&self) -> Range<usize> {
        self.start[1]..self.start[1] + self.count[1]
    }
}

impl fmt::Display for Hyperslab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}, {}..{}]", self.start[0], self.rows().end, self.start[1], self.columns().end)
    }
}

/// How a block combines with the selection built so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOp {
    /// Replace the current selection.
    Set,
    /// Union with the current selection.
    Or,
}

/// Negative status returned by [`HyperslabSelection::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionError {
    pub block: Hyperslab,
    pub extent: [usize; 2],
    pub status: i32,
    pub reason: &'static str,
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "select {} on extent {}x{} failed with status {}: {}",
            self.block, self.extent[0], self.extent[1], self.status, self.reason
        )
    }
}

impl std::error::Error for SelectionError {}

/// Composite selection over a dataset of a known extent.
///
/// Every block must span the same column range, so the union materializes as a dense
/// matrix of `row_count() x column_count()`. Rows come back in the order the blocks were
/// added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperslabSelection {
    extent: [usize; 2],
    blocks: Vec<Hyperslab>,
}

impl HyperslabSelection {
    pub fn new(extent: [usize; 2]) -> Self {
        Self { extent, blocks: Vec::new() }
    }

    pub fn extent(&self) -> [usize; 2] {
        self.extent
    }

    /// Add `block` to the selection. On a negative status the selection is unchanged.
    pub fn select(&mut self, op: SelectOp, block: Hyperslab) -> Result<(), SelectionError> {
        let extent = self.extent;
        let fail = |status, reason| Err(SelectionError { block, extent, status, reason });

        if block.count[0] == 0 || block.count[1] == 0 {
            return fail(-1, "empty block");
        }
        if block.rows().end > extent[0] || block.columns().end > extent[1] {
            return fail(-1, "block exceeds dataset extent");
        }
        match op {
            SelectOp::Set => {
                self.blocks.clear();
                self.blocks.push(block);
            }
            SelectOp::Or => {
                if let Some(first) = self.blocks.first() {
                    if first.columns() != block.columns() {
                        return fail(-2, "block column range differs from the selection");
                    }
                }
                self.blocks.push(block);
            }
        }
        Ok(())
    }

    pub fn blocks(&self) -> &[Hyperslab] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(|b| b.count[0]).sum()
    }

    pub fn column_count(&self) -> usize {
        self.blocks.first().map_or(0, |b| b.count[1])
    }

    /// Smallest single block covering every row of the selection.
    pub fn bounding_block(&self) -> Option<Hyperslab> {
        let first = self.blocks.first()?;
        let start = self.blocks.iter().map(|b| b.start[0]).min()?;
        let end = self.blocks.iter().map(|b| b.rows().end).max()?;
        Some(Hyperslab::new([start, first.start[1]], [end - start, first.count[1]]))
    }

    /// Pick the selected rows, in block order, out of the rows read for [`Self::bounding_block`].
    pub fn gather(&self, bounding: ArrayView2<'_, f64>) -> CoexprResult<Array2<f64>> {
        let Some(bounds) = self.bounding_block() else {
            return Ok(Array2::zeros((0, 0)));
        };
        if bounding.dim() != (bounds.count[0], bounds.count[1]) {
            return Err(CoexprError::internal(format!(
                "bounding read returned {:?}, expected {:?} for {bounds}",
                bounding.dim(),
                (bounds.count[0], bounds.count[1])
            )));
        }
        let mut out = Array2::zeros((self.row_count(), self.column_count()));
        let mut offset = 0;
        for block in &self.blocks {
            let rows = block.count[0];
            let local = block.start[0] - bounds.start[0];
            out.slice_mut(s![offset..offset + rows, ..]).assign(&bounding.slice(s![local..local + rows, ..]));
            offset += rows;
        }
        Ok(out)
    }
}

/// Read access to a backing array file.
///
/// Implementations need not be thread-safe beyond `Send`; the loader that owns a backend
/// serializes every call.
pub trait ArrayBackend: Send {
    /// Human-readable identity of the file, used in logs and errors.
    fn describe(&self) -> String;

    /// Names (not paths) of the members of `group`.
    fn group_members(&self, group: &str) -> CoexprResult<Vec<String>>;

    /// Dimensions of `dataset`; a layout error if it does not exist.
    fn shape(&self, dataset: &str) -> CoexprResult<Vec<usize>>;

    /// Whole 1-D string dataset.
    fn read_strings(&self, dataset: &str) -> CoexprResult<Vec<String>>;

    /// Materialize `selection` of the 2-D numeric `dataset`.
    fn read_selection(
        &self,
        dataset: &str,
        selection: &HyperslabSelection,
    ) -> CoexprResult<Array2<f64>>;

    fn contains(&self, dataset: &str) -> bool {
        self.shape(dataset).is_ok()
    }
}

/// Array file held entirely in memory. Used for synthetic data and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryArrayBackend {
    name: String,
    matrices: BTreeMap<String, Array2<f64>>,
    strings: BTreeMap<String, Vec<String>>,
}

impl MemoryArrayBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_matrix(mut self, path: impl Into<String>, matrix: Array2<f64>) -> Self {
        self.matrices.insert(path.into(), matrix);
        self
    }

    pub fn with_strings<S: Into<String>>(
        mut self,
        path: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.strings.insert(path.into(), values.into_iter().map(Into::into).collect());
        self
    }

    fn missing(&self, dataset: &str) -> CoexprError {
        CoexprError::Layout {
            message: format!("dataset '{dataset}' not found"),
            file: Some(self.name.clone()),
            dataset: Some(dataset.to_string()),
        }
    }
}

fn parent_and_name(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}

impl ArrayBackend for MemoryArrayBackend {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn group_members(&self, group: &str) -> CoexprResult<Vec<String>> {
        let group = if group.len() > 1 { group.trim_end_matches('/') } else { group };
        let members: Vec<String> = self
            .matrices
            .keys()
            .chain(self.strings.keys())
            .map(|path| parent_and_name(path))
            .filter(|(parent, _)| *parent == group)
            .map(|(_, name)| name.to_string())
            .collect();
        if members.is_empty() {
            return Err(self.missing(group));
        }
        Ok(members)
    }

    fn shape(&self, dataset: &str) -> CoexprResult<Vec<usize>> {
        if let Some(matrix) = self.matrices.get(dataset) {
            return Ok(matrix.shape().to_vec());
        }
        self.strings.get(dataset).map(|v| vec![v.len()]).ok_or_else(|| self.missing(dataset))
    }

    fn read_strings(&self, dataset: &str) -> CoexprResult<Vec<String>> {
        self.strings.get(dataset).cloned().ok_or_else(|| self.missing(dataset))
    }

    fn read_selection(
        &self,
        dataset: &str,
        selection: &HyperslabSelection,
    ) -> CoexprResult<Array2<f64>> {
        let matrix = self.matrices.get(dataset).ok_or_else(|| self.missing(dataset))?;
        match selection.bounding_block() {
            Some(bounds) => selection.gather(matrix.slice(s![bounds.rows(), bounds.columns()])),
            None => Ok(Array2::zeros((0, 0))),
        }
    }
}

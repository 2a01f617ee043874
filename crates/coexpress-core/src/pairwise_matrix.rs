//! Symmetric correlation arena
//!
//! An `n x n` symmetric matrix stored as its upper triangle (diagonal included), one
//! `AtomicU64` per cell holding the bits of an `f64`. Worker threads write cells through a
//! shared reference without any lock: the all-pairs task generator hands every cell to
//! exactly one task, so no two writers ever meet on a cell. Relaxed stores suffice because
//! readers only look at the arena after the workers have been joined.
//!
//! ```text
//!   row 0: (0,0) (0,1) (0,2) (0,3)      offset(r, c) = r(2n - r + 1)/2 + (c - r)
//!   row 1:       (1,1) (1,2) (1,3)
//!   row 2:             (2,2) (2,3)
//!   row 3:                   (3,3)
//! ```

use ndarray::Array2;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct PairwiseMatrix {
    size: usize,
    cells: Vec<AtomicU64>,
}

impl std::fmt::Debug for PairwiseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairwiseMatrix").field("size", &self.size).finish()
    }
}

impl PairwiseMatrix {
    /// Every cell starts as NaN.
    pub fn new(size: usize) -> Self {
        let cells = (0..Self::cell_count(size)).map(|_| AtomicU64::new(f64::NAN.to_bits())).collect();
        Self { size, cells }
    }

    /// Cells in the upper triangle of an `size x size` matrix.
    pub fn cell_count(size: usize) -> usize {
        size * (size + 1) / 2
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn offset(&self, a: usize, b: usize) -> Option<usize> {
        let (row, col) = if a <= b { (a, b) } else { (b, a) };
        if col >= self.size {
            return None;
        }
        Some(row * (2 * self.size - row + 1) / 2 + (col - row))
    }

    /// Value at `(a, b)`; `(a, b)` and `(b, a)` are the same cell.
    pub fn get(&self, a: usize, b: usize) -> Option<f64> {
        self.offset(a, b).map(|i| f64::from_bits(self.cells[i].load(Ordering::Relaxed)))
    }

    /// Store a value. Callers guarantee no other thread writes the same cell concurrently.
    pub(crate) fn set(&self, a: usize, b: usize, value: f64) {
        if let Some(i) = self.offset(a, b) {
            self.cells[i].store(value.to_bits(), Ordering::Relaxed);
        }
    }

    /// Expand to a dense symmetric matrix.
    pub fn to_dense(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.size, self.size), |(r, c)| self.get(r, c).unwrap_or(f64::NAN))
    }

    /// `(row, col, value)` for every cell with `row <= col`, row-major.
    pub fn upper_triangle(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.size).flat_map(move |row| {
            (row..self.size).map(move |col| (row, col, self.get(row, col).unwrap_or(f64::NAN)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_cover_triangle_exactly_once() {
        let matrix = PairwiseMatrix::new(5);
        let mut seen = vec![false; PairwiseMatrix::cell_count(5)];
        for row in 0..5 {
            for col in row..5 {
                let i = matrix.offset(row, col).unwrap();
                assert!(!seen[i], "cell ({row}, {col}) collides");
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_symmetric_access() {
        let matrix = PairwiseMatrix::new(3);
        matrix.set(2, 0, 0.5);
        assert_eq!(matrix.get(0, 2), Some(0.5));
        assert_eq!(matrix.get(2, 0), Some(0.5));
        assert!(matrix.get(1, 1).unwrap().is_nan());
        assert_eq!(matrix.get(0, 3), None);
        let dense = matrix.to_dense();
        assert_eq!(dense[[0, 2]], dense[[2, 0]]);
        assert_eq!(matrix.upper_triangle().count(), 6);
    }
}

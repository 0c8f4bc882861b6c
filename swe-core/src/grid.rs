//! Padded storage for cell and face quantities.
//!
//! Every cell field carries a one-cell halo, so a grid with `rows x cols`
//! physical cells is stored as `(rows + 2) x (cols + 2)`. Interior cells use
//! indices `1..=rows` and `1..=cols`.
//!
//! Face fields sit between neighbouring padded cells. For axis 0 the face
//! `(i, j)` separates cells `(i - 1, j)` and `(i, j)`; for axis 1 the face
//! `(i, j)` separates cells `(i, j - 1)` and `(i, j)`. A cell `(i, j)` is
//! therefore bounded by x-faces `(i, j)`/`(i + 1, j)` and y-faces
//! `(i, j)`/`(i, j + 1)`. Positive face values point toward higher indices.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Dense row-major 2D array of `f64`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Field {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.cols + j
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }

    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] += value;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    /// Copies `other` into `self`; both must have the same extent.
    pub fn copy_from(&mut self, other: &Field) {
        debug_assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        self.data.copy_from_slice(&other.data);
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Number of spatial axes the scheme integrates along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    /// Axis 0 only; the grid has a single column and V is never touched.
    One,
    Two,
}

/// Logical extent of the physical domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    rows: usize,
    cols: usize,
    rank: Rank,
}

impl GridShape {
    pub fn new(rows: usize, cols: usize, rank: Rank) -> SimResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(SimError::InvalidGrid {
                rows,
                cols,
                reason: "grid must have at least one cell",
            });
        }
        if rank == Rank::One && cols != 1 {
            return Err(SimError::InvalidGrid {
                rows,
                cols,
                reason: "a rank-1 grid has exactly one column",
            });
        }
        Ok(Self { rows, cols, rank })
    }

    /// Rank-1 grid of `n` cells laid out along axis 0.
    pub fn line(n: usize) -> SimResult<Self> {
        Self::new(n, 1, Rank::One)
    }

    pub fn plane(rows: usize, cols: usize) -> SimResult<Self> {
        Self::new(rows, cols, Rank::Two)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    #[inline]
    pub fn is_two_dimensional(&self) -> bool {
        self.rank == Rank::Two
    }

    pub fn padded_rows(&self) -> usize {
        self.rows + 2
    }

    pub fn padded_cols(&self) -> usize {
        self.cols + 2
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Padded cell field, zero-filled.
    pub fn cells(&self) -> Field {
        Field::zeros(self.padded_rows(), self.padded_cols())
    }

    /// Faces normal to axis 0, zero-filled.
    pub fn faces_x(&self) -> Field {
        Field::zeros(self.padded_rows() + 1, self.padded_cols())
    }

    /// Faces normal to axis 1, zero-filled.
    pub fn faces_y(&self) -> Field {
        Field::zeros(self.padded_rows(), self.padded_cols() + 1)
    }

    /// Padded coordinates of every physical cell, row-major.
    pub fn interior(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let cols = self.cols;
        (1..=self.rows).flat_map(move |i| (1..=cols).map(move |j| (i, j)))
    }

    /// Sum of `field` over physical cells.
    pub fn interior_sum(&self, field: &Field) -> f64 {
        self.interior().map(|(i, j)| field.get(i, j)).sum()
    }

    /// Largest `|value|` over physical cells.
    pub fn interior_max_abs(&self, field: &Field) -> f64 {
        self.interior()
            .map(|(i, j)| field.get(i, j).abs())
            .fold(0.0, f64::max)
    }

    /// Row-major copy of the physical cells of `field`.
    pub fn interior_values(&self, field: &Field) -> Vec<f64> {
        self.interior().map(|(i, j)| field.get(i, j)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_extents() {
        let shape = GridShape::plane(3, 4).unwrap();
        let cells = shape.cells();
        assert_eq!((cells.rows(), cells.cols()), (5, 6));
        let fx = shape.faces_x();
        assert_eq!((fx.rows(), fx.cols()), (6, 6));
        let fy = shape.faces_y();
        assert_eq!((fy.rows(), fy.cols()), (5, 7));
        assert_eq!(shape.interior().count(), 12);
    }

    #[test]
    fn rejects_empty_and_wide_lines() {
        assert!(GridShape::plane(0, 3).is_err());
        assert!(GridShape::new(4, 2, Rank::One).is_err());
        assert!(GridShape::line(5).is_ok());
    }

    #[test]
    fn interior_sum_skips_halo() {
        let shape = GridShape::line(3).unwrap();
        let mut h = shape.cells();
        h.fill(1.0);
        assert_eq!(shape.interior_sum(&h), 3.0);
        h.set(0, 1, 100.0);
        assert_eq!(shape.interior_sum(&h), 3.0);
    }
}

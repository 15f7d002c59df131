//! Dense `f64` matrix shared by aggregation, normalization and windowing.
//!
//! Thin wrapper over [`ndarray::Array2`]: rows are buckets (or window steps),
//! columns are aggregation outputs.

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Matrix {
    data: Array2<f64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("matrix data has {found} values, expected {rows}x{cols}")]
    DataLength {
        rows: usize,
        cols: usize,
        found: usize,
    },
    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

impl Matrix {
    /// Builds a `rows x cols` matrix from row-major `data`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, MatrixError> {
        let found = data.len();
        Array2::from_shape_vec((rows, cols), data)
            .map(Self::from)
            .map_err(|_| MatrixError::DataLength { rows, cols, found })
    }

    pub fn empty(cols: usize) -> Self {
        Self::from(Array2::zeros((0, cols)))
    }

    /// Builds a matrix from row slices. An empty input yields a `0 x 0` matrix.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, MatrixError> {
        let cols = rows.first().map(|row| row.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(MatrixError::RaggedRow {
                    row: idx,
                    found: row.len(),
                    expected: cols,
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), cols, data)
    }

    /// Single-column matrix, one row per value.
    pub fn column_vector(values: &[f64]) -> Self {
        Self::from(Array1::from(values.to_vec()).insert_axis(Axis(1)))
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.data.get((row, col)).copied()
    }

    /// Panics if `row` is out of bounds, like slice indexing.
    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.data.row(row)
    }

    pub fn row_iter(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> + '_ {
        self.data.axis_iter(Axis(0))
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        self.data.column(col).to_vec()
    }

    /// Copies rows `start..end` into a new matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self::from(self.data.slice(s![start..end, ..]).to_owned())
    }

    /// All cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    /// Applies `f(col, value)` to every cell in place.
    pub fn map_in_place(&mut self, mut f: impl FnMut(usize, f64) -> f64) {
        for ((_, col), value) in self.data.indexed_iter_mut() {
            *value = f(col, *value);
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.row_iter().map(|row| row.to_vec()).collect()
    }
}

impl From<Array2<f64>> for Matrix {
    fn from(data: Array2<f64>) -> Self {
        Self { data }
    }
}

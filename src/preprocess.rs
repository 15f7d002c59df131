//! Normalize hooks applied between aggregation and windowing.
//!
//! A hook takes the aggregated matrix and returns a matrix of the same shape.
//! The reference pipeline fills missing cells with the column mean and then
//! scales every column into `[-1, 1]`.

use thiserror::Error;

use crate::matrix::Matrix;

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("invalid feature range: min {min} must be below max {max}")]
    InvalidRange { min: f64, max: f64 },
    #[error("normalize step failed: {0}")]
    Step(String),
}

pub trait Normalize: Send + Sync {
    fn normalize(&self, matrix: Matrix) -> Result<Matrix, PreprocessError>;
}

impl<F> Normalize for F
where
    F: Fn(Matrix) -> Result<Matrix, PreprocessError> + Send + Sync,
{
    fn normalize(&self, matrix: Matrix) -> Result<Matrix, PreprocessError> {
        self(matrix)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Normalize for Identity {
    fn normalize(&self, matrix: Matrix) -> Result<Matrix, PreprocessError> {
        Ok(matrix)
    }
}

/// Replaces NaN cells with the mean of the column's valid cells.
/// Columns with no valid cell are filled with 0.0 so the shape never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanImputer;

impl Normalize for MeanImputer {
    fn normalize(&self, mut matrix: Matrix) -> Result<Matrix, PreprocessError> {
        let fill: Vec<f64> = (0..matrix.cols())
            .map(|col| {
                let (sum, count) = matrix
                    .column(col)
                    .into_iter()
                    .filter(|value| !value.is_nan())
                    .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
                if count == 0 {
                    0.0
                } else {
                    sum / count as f64
                }
            })
            .collect();

        matrix.map_in_place(|col, value| if value.is_nan() { fill[col] } else { value });
        Ok(matrix)
    }
}

/// Per-column min-max scaling fitted on the matrix it transforms.
/// Constant columns map to `min`; NaN cells stay NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
        }
    }
}

impl MinMaxScaler {
    pub fn new(min: f64, max: f64) -> Result<Self, PreprocessError> {
        if !(min < max) {
            return Err(PreprocessError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }
}

impl Normalize for MinMaxScaler {
    fn normalize(&self, mut matrix: Matrix) -> Result<Matrix, PreprocessError> {
        if !(self.min < self.max) {
            return Err(PreprocessError::InvalidRange {
                min: self.min,
                max: self.max,
            });
        }

        let bounds: Vec<(f64, f64)> = (0..matrix.cols())
            .map(|col| {
                matrix
                    .column(col)
                    .into_iter()
                    .filter(|value| !value.is_nan())
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
                        (lo.min(value), hi.max(value))
                    })
            })
            .collect();

        let span = self.max - self.min;
        matrix.map_in_place(|col, value| {
            if value.is_nan() {
                return value;
            }
            let (lo, hi) = bounds[col];
            let range = hi - lo;
            let range = if range == 0.0 { 1.0 } else { range };
            (value - lo) / range * span + self.min
        });
        Ok(matrix)
    }
}

/// Applies hooks in order.
#[derive(Default)]
pub struct NormalizePipeline {
    steps: Vec<Box<dyn Normalize>>,
}

impl NormalizePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl Normalize + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Normalize for NormalizePipeline {
    fn normalize(&self, matrix: Matrix) -> Result<Matrix, PreprocessError> {
        self.steps
            .iter()
            .try_fold(matrix, |current, step| step.normalize(current))
    }
}

/// Mean imputation followed by scaling into `[-1, 1]`.
pub fn default_normalizer() -> NormalizePipeline {
    NormalizePipeline::new()
        .with_step(MeanImputer)
        .with_step(MinMaxScaler::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "actual={actual} expected={expected}"
        );
    }

    #[test]
    fn imputer_fills_with_column_mean() {
        let m = Matrix::from_rows(&[[1.0, f64::NAN], [f64::NAN, f64::NAN], [3.0, f64::NAN]])
            .unwrap();
        let out = MeanImputer.normalize(m).unwrap();
        assert_eq!(out.column(0), vec![1.0, 2.0, 3.0]);
        assert_eq!(out.column(1), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn scaler_maps_columns_into_range() {
        let m = Matrix::from_rows(&[[0.0, 5.0], [5.0, 5.0], [10.0, 5.0]]).unwrap();
        let out = MinMaxScaler::default().normalize(m).unwrap();
        assert_close(out.row(0)[0], -1.0);
        assert_close(out.row(1)[0], 0.0);
        assert_close(out.row(2)[0], 1.0);
        assert!(out.column(1).iter().all(|v| *v == -1.0));
    }

    #[test]
    fn scaler_rejects_inverted_range() {
        assert!(matches!(
            MinMaxScaler::new(1.0, 1.0),
            Err(PreprocessError::InvalidRange { .. })
        ));
        let bad = MinMaxScaler { min: 2.0, max: 0.0 };
        assert!(bad.normalize(Matrix::column_vector(&[1.0])).is_err());
    }

    #[test]
    fn default_pipeline_imputes_before_scaling() {
        let m = Matrix::column_vector(&[0.0, f64::NAN, 4.0]);
        let out = default_normalizer().normalize(m).unwrap();
        assert_eq!(out.column(0), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn closures_are_hooks() {
        let double = |mut m: Matrix| -> Result<Matrix, PreprocessError> {
            m.map_in_place(|_, v| v * 2.0);
            Ok(m)
        };
        let pipeline = NormalizePipeline::new().with_step(double).with_step(Identity);
        let out = pipeline.normalize(Matrix::column_vector(&[1.5])).unwrap();
        assert_eq!(out.column(0), vec![3.0]);
    }
}

//! Rolling input/target window construction over an aggregated matrix.

use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub window_size: usize,
    pub target_size: usize,
    pub step_size: usize,
    pub target_column: usize,
    /// Buckets between the end of the input window and the first target.
    pub offset: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            target_size: 1,
            step_size: 1,
            target_column: 0,
            offset: 0,
        }
    }
}

impl WindowConfig {
    /// Rows one sample spans, `window_size + offset + target_size`.
    /// `None` when the sum does not fit in `usize`; no matrix is that long.
    pub fn required_rows(&self) -> Option<usize> {
        self.window_size
            .checked_add(self.offset)?
            .checked_add(self.target_size)
    }
}

/// Which rows make a window invalid.
///
/// `Value` and `Missing` flag a row when any of its cells matches, not only the
/// target column. Use `Mask` for column-specific rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum DropPolicy {
    #[default]
    Keep,
    Mask(Vec<bool>),
    Value(f64),
    Missing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid window config: {0}")]
    InvalidConfig(String),
    #[error("{what} has length {found}, expected {expected} to match the matrix rows")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Parallel window outputs; entry `i` of each vector describes sample `i`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WindowSet {
    pub inputs: Vec<Matrix>,
    pub targets: Vec<Vec<f64>>,
    pub input_index: Vec<i64>,
    pub target_index: Vec<i64>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Inputs stacked as `samples x window_size x columns`, or `None` when
    /// there are no samples.
    pub fn stacked_inputs(&self) -> Option<Array3<f64>> {
        let views: Vec<_> = self.inputs.iter().map(Matrix::view).collect();
        ndarray::stack(Axis(0), &views).ok()
    }
}

pub fn rolling_window_sequences(
    matrix: &Matrix,
    index: &[i64],
    cfg: &WindowConfig,
    drop: &DropPolicy,
) -> Result<WindowSet, WindowError> {
    validate_config(matrix, cfg)?;
    if index.len() != matrix.rows() {
        return Err(WindowError::ShapeMismatch {
            what: "index",
            expected: matrix.rows(),
            found: index.len(),
        });
    }
    let invalid_rows = resolve_drop_mask(matrix, drop)?;

    let mut out = WindowSet::default();
    let Some(required) = cfg.required_rows().filter(|rows| *rows <= matrix.rows()) else {
        return Ok(out);
    };

    let target = matrix.column(cfg.target_column);
    let max_start = matrix.rows() - required + 1;
    let mut start = 0usize;

    while start < max_start {
        let end = start + cfg.window_size;

        if let Some(mask) = invalid_rows.as_deref() {
            let span = &mask[start..end + cfg.target_size];
            if let Some(last_invalid) = span.iter().rposition(|invalid| *invalid) {
                start += last_invalid + 1;
                continue;
            }
        }

        let target_start = end + cfg.offset;
        out.inputs.push(matrix.slice_rows(start, end));
        out.targets
            .push(target[target_start..target_start + cfg.target_size].to_vec());
        out.input_index.push(index[start]);
        out.target_index.push(index[target_start]);
        start += cfg.step_size;
    }

    Ok(out)
}

/// Per-row invalid flags for the policy, or `None` when nothing is dropped.
pub fn resolve_drop_mask(
    matrix: &Matrix,
    drop: &DropPolicy,
) -> Result<Option<Vec<bool>>, WindowError> {
    match drop {
        DropPolicy::Keep => Ok(None),
        DropPolicy::Mask(mask) => {
            if mask.len() != matrix.rows() {
                return Err(WindowError::ShapeMismatch {
                    what: "drop mask",
                    expected: matrix.rows(),
                    found: mask.len(),
                });
            }
            Ok(Some(mask.clone()))
        }
        DropPolicy::Value(marker) if marker.is_nan() => Ok(Some(flag_rows(matrix, f64::is_nan))),
        DropPolicy::Value(marker) => Ok(Some(flag_rows(matrix, |value| value == *marker))),
        DropPolicy::Missing => Ok(Some(flag_rows(matrix, f64::is_nan))),
    }
}

fn flag_rows(matrix: &Matrix, is_invalid: impl Fn(f64) -> bool) -> Vec<bool> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().any(&is_invalid))
        .collect()
}

fn validate_config(matrix: &Matrix, cfg: &WindowConfig) -> Result<(), WindowError> {
    if cfg.window_size == 0 {
        return Err(WindowError::InvalidConfig(
            "window_size must be > 0".to_string(),
        ));
    }
    if cfg.target_size == 0 {
        return Err(WindowError::InvalidConfig(
            "target_size must be > 0".to_string(),
        ));
    }
    if cfg.step_size == 0 {
        return Err(WindowError::InvalidConfig(
            "step_size must be > 0".to_string(),
        ));
    }
    if cfg.target_column >= matrix.cols() {
        return Err(WindowError::InvalidConfig(format!(
            "target_column {} out of range for {} columns",
            cfg.target_column,
            matrix.cols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> (Matrix, Vec<i64>) {
        let values: Vec<f64> = (0..n).map(|v| v as f64).collect();
        let index = (0..n as i64).collect();
        (Matrix::column_vector(&values), index)
    }

    fn cfg(window_size: usize, target_size: usize, offset: usize) -> WindowConfig {
        WindowConfig {
            window_size,
            target_size,
            step_size: 1,
            target_column: 0,
            offset,
        }
    }

    #[test]
    fn five_row_reference_case() {
        let matrix = Matrix::column_vector(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let index = vec![0, 1, 2, 3, 4];
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(2, 1, 0), &DropPolicy::Keep).unwrap();

        let inputs: Vec<Vec<f64>> = out.inputs.iter().map(|m| m.column(0)).collect();
        assert_eq!(
            inputs,
            vec![vec![1.0, 2.0], vec![2.0, 3.0], vec![3.0, 4.0]]
        );
        assert!(out.inputs.iter().all(|m| m.shape() == (2, 1)));
        assert_eq!(out.targets, vec![vec![3.0], vec![4.0], vec![5.0]]);
        assert_eq!(out.input_index, vec![0, 1, 2]);
        assert_eq!(out.target_index, vec![2, 3, 4]);
    }

    #[test]
    fn offset_shifts_targets_and_reduces_count() {
        let (matrix, index) = series(10);
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(3, 2, 2), &DropPolicy::Keep).unwrap();

        assert_eq!(out.len(), 10 - 3 - 2 - 2 + 1);
        assert_eq!(out.targets[0], vec![5.0, 6.0]);
        assert_eq!(out.target_index[0], 5);
        for (x, y) in out.input_index.iter().zip(&out.target_index) {
            assert_eq!(*y, *x + 5);
        }
    }

    #[test]
    fn step_size_strides_over_starts() {
        let (matrix, index) = series(10);
        let mut c = cfg(2, 1, 0);
        c.step_size = 3;
        let out = rolling_window_sequences(&matrix, &index, &c, &DropPolicy::Keep).unwrap();
        assert_eq!(out.input_index, vec![0, 3, 6]);
    }

    #[test]
    fn too_short_matrix_is_empty_not_an_error() {
        let (matrix, index) = series(3);
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(2, 1, 1), &DropPolicy::Keep).unwrap();
        assert!(out.is_empty());
        assert!(out.targets.is_empty());
        assert!(out.input_index.is_empty());
        assert!(out.target_index.is_empty());
    }

    #[test]
    fn oversized_config_is_empty_not_a_panic() {
        let (matrix, index) = series(3);
        for huge in [cfg(usize::MAX, 1, 0), cfg(1, 1, usize::MAX), cfg(2, usize::MAX, 2)] {
            assert_eq!(huge.required_rows(), None);
            let out = rolling_window_sequences(&matrix, &index, &huge, &DropPolicy::Keep).unwrap();
            assert!(out.is_empty());
        }
    }

    #[test]
    fn drop_scan_ignores_the_offset_gap() {
        let (matrix, index) = series(12);
        let mut mask = vec![false; 12];
        mask[5] = true;
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(3, 1, 2), &DropPolicy::Mask(mask))
                .unwrap();

        // Spans [0, 4) and [1, 5) miss row 5 even though start 0 targets it;
        // span [2, 6) holds it, so the next attempt starts at 6.
        assert_eq!(out.input_index, vec![0, 1, 6]);
        assert_eq!(out.target_index, vec![5, 6, 11]);
    }

    #[test]
    fn stacked_inputs_are_samples_by_window_by_columns() {
        let (matrix, index) = series(6);
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(2, 1, 0), &DropPolicy::Keep).unwrap();
        let stacked = out.stacked_inputs().unwrap();
        assert_eq!(stacked.shape(), &[4, 2, 1]);
        assert_eq!(stacked[[3, 1, 0]], 4.0);
        assert_eq!(WindowSet::default().stacked_inputs(), None);
    }

    #[test]
    fn skip_jumps_past_last_invalid_row_in_span() {
        let (matrix, index) = series(12);
        let mut mask = vec![false; 12];
        mask[2] = true;
        mask[4] = true;
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(3, 1, 0), &DropPolicy::Mask(mask))
                .unwrap();

        // First span [0, 4) holds row 2 only; the jump lands on 3, whose span
        // [3, 7) holds row 4, so the next attempt starts at 5.
        assert_eq!(out.input_index, vec![5, 6, 7, 8]);
        for start in &out.input_index {
            let span = (*start as usize)..(*start as usize + 4);
            assert!(!span.contains(&2) && !span.contains(&4));
        }
    }

    #[test]
    fn missing_marker_checks_every_column() {
        let matrix = Matrix::from_rows(&[
            [0.0, 0.0],
            [1.0, f64::NAN],
            [2.0, 0.0],
            [3.0, 0.0],
            [4.0, 0.0],
            [5.0, 0.0],
        ])
        .unwrap();
        let index = vec![0, 10, 20, 30, 40, 50];

        let with_nan_marker =
            rolling_window_sequences(&matrix, &index, &cfg(2, 1, 0), &DropPolicy::Value(f64::NAN))
                .unwrap();
        let with_missing =
            rolling_window_sequences(&matrix, &index, &cfg(2, 1, 0), &DropPolicy::Missing).unwrap();

        assert_eq!(with_nan_marker.input_index, vec![20, 30]);
        assert_eq!(with_missing, with_nan_marker);
    }

    #[test]
    fn value_marker_uses_equality() {
        let matrix = Matrix::column_vector(&[1.0, -1.0, 1.0, 1.0, 1.0, 1.0]);
        let index: Vec<i64> = (0..6).collect();
        let out =
            rolling_window_sequences(&matrix, &index, &cfg(2, 1, 0), &DropPolicy::Value(-1.0))
                .unwrap();
        assert_eq!(out.input_index, vec![2, 3]);
    }

    #[test]
    fn mask_length_must_match_rows() {
        let (matrix, index) = series(6);
        let err = rolling_window_sequences(
            &matrix,
            &index,
            &cfg(2, 1, 0),
            &DropPolicy::Mask(vec![false; 5]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            WindowError::ShapeMismatch {
                what: "drop mask",
                expected: 6,
                found: 5
            }
        );
    }

    #[test]
    fn rejects_invalid_sizes_and_column() {
        let (matrix, index) = series(6);
        for bad in [
            cfg(0, 1, 0),
            cfg(2, 0, 0),
            WindowConfig {
                step_size: 0,
                ..cfg(2, 1, 0)
            },
            WindowConfig {
                target_column: 1,
                ..cfg(2, 1, 0)
            },
        ] {
            assert!(matches!(
                rolling_window_sequences(&matrix, &index, &bad, &DropPolicy::Keep),
                Err(WindowError::InvalidConfig(_))
            ));
        }
    }
}

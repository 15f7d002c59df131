//! Raw observation table consumed by the aggregator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: i64,
    pub values: Vec<f64>,
}

/// Timestamped rows with one value per named column. Missing values are NaN.
/// Rows keep their input order; they are not required to be sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalTable {
    value_columns: Vec<String>,
    rows: Vec<Observation>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("table needs at least one value column")]
    NoValueColumns,
    #[error("row {row} at timestamp {timestamp} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        timestamp: i64,
        found: usize,
        expected: usize,
    },
    #[error("split point {at} is past the table length {len}")]
    SplitOutOfRange { at: usize, len: usize },
}

impl SignalTable {
    pub fn new(value_columns: Vec<String>, rows: Vec<Observation>) -> Result<Self, TableError> {
        if value_columns.is_empty() {
            return Err(TableError::NoValueColumns);
        }
        let expected = value_columns.len();
        for (idx, row) in rows.iter().enumerate() {
            if row.values.len() != expected {
                return Err(TableError::RowWidth {
                    row: idx,
                    timestamp: row.timestamp,
                    found: row.values.len(),
                    expected,
                });
            }
        }
        Ok(Self {
            value_columns,
            rows,
        })
    }

    /// Single `value` column built from `(timestamp, value)` pairs.
    pub fn univariate(points: impl IntoIterator<Item = (i64, f64)>) -> Self {
        Self {
            value_columns: vec!["value".to_string()],
            rows: points
                .into_iter()
                .map(|(timestamp, value)| Observation {
                    timestamp,
                    values: vec![value],
                })
                .collect(),
        }
    }

    pub fn value_columns(&self) -> &[String] {
        &self.value_columns
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamp_bounds(&self) -> Option<(i64, i64)> {
        let min = self.rows.iter().map(|row| row.timestamp).min()?;
        let max = self.rows.iter().map(|row| row.timestamp).max()?;
        Some((min, max))
    }

    /// Splits in row order: `[0, at)` and `[at, len)`.
    pub fn split_at(&self, at: usize) -> Result<(Self, Self), TableError> {
        if at > self.rows.len() {
            return Err(TableError::SplitOutOfRange {
                at,
                len: self.rows.len(),
            });
        }
        let head = Self {
            value_columns: self.value_columns.clone(),
            rows: self.rows[..at].to_vec(),
        };
        let tail = Self {
            value_columns: self.value_columns.clone(),
            rows: self.rows[at..].to_vec(),
        };
        Ok((head, tail))
    }
}

//! Time-bucket aggregation of irregular observations.
//!
//! Rules implemented:
//! - rows are ordered by timestamp before bucketing (stable, input order breaks ties)
//! - buckets are half-open `[start, start + interval)` from the minimum timestamp
//!   until the bucket start passes the maximum timestamp
//! - every bucket position emits a row; buckets without valid values hold NaN
//! - output columns are method-major: `[m0(c0), m0(c1), .., m1(c0), ..]`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::Matrix;
use crate::table::SignalTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    Mean,
    Median,
    Min,
    Max,
    Sum,
    /// Sample standard deviation (`ddof = 1`).
    Std,
    /// Sample variance (`ddof = 1`).
    Var,
    Count,
    First,
    Last,
}

impl AggregationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Std => "std",
            Self::Var => "var",
            Self::Count => "count",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    /// Reduces the valid (non-NaN) values of one column within one bucket.
    /// Values arrive in timestamp order. An empty slice reduces to NaN.
    fn reduce(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        match self {
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::Median => median(values),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Sum => values.iter().sum(),
            Self::Std => sample_variance(values).sqrt(),
            Self::Var => sample_variance(values),
            Self::Count => n,
            Self::First => values[0],
            Self::Last => values[values.len() - 1],
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "std" => Ok(Self::Std),
            "var" => Ok(Self::Var),
            "count" => Ok(Self::Count),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(AggregateError::InvalidConfig(format!(
                "unknown aggregation method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("invalid aggregation config: {0}")]
    InvalidConfig(String),
}

/// Aggregated matrix plus the start timestamp of each bucket row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregated {
    pub values: Matrix,
    pub index: Vec<i64>,
}

pub fn time_segments_aggregate(
    table: &SignalTable,
    interval: i64,
    methods: &[AggregationMethod],
) -> Result<Aggregated, AggregateError> {
    if interval <= 0 {
        return Err(AggregateError::InvalidConfig(format!(
            "interval must be > 0, got {interval}"
        )));
    }
    if methods.is_empty() {
        return Err(AggregateError::InvalidConfig(
            "at least one aggregation method is required".to_string(),
        ));
    }

    let value_cols = table.value_columns().len();
    let out_cols = value_cols * methods.len();
    let rows = table.rows();

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by_key(|&idx| rows[idx].timestamp);

    let (Some(&first), Some(&last)) = (order.first(), order.last()) else {
        return Ok(Aggregated {
            values: Matrix::empty(out_cols),
            index: Vec::new(),
        });
    };
    let max_ts = rows[last].timestamp;

    let mut data = Vec::new();
    let mut index = Vec::new();
    let mut scratch = Vec::new();
    let mut cursor = 0usize;
    let mut start = rows[first].timestamp;

    loop {
        let bucket_end = match start.checked_add(interval) {
            Some(end) => {
                let mut end_idx = cursor;
                while end_idx < order.len() && rows[order[end_idx]].timestamp < end {
                    end_idx += 1;
                }
                end_idx
            }
            None => order.len(),
        };
        let bucket = &order[cursor..bucket_end];

        for method in methods {
            for col in 0..value_cols {
                scratch.clear();
                scratch.extend(
                    bucket
                        .iter()
                        .map(|&idx| rows[idx].values[col])
                        .filter(|value| !value.is_nan()),
                );
                data.push(method.reduce(&scratch));
            }
        }
        index.push(start);
        cursor = bucket_end;

        match start.checked_add(interval) {
            Some(next) if next <= max_ts => start = next,
            _ => break,
        }
    }

    let values = Matrix::new(index.len(), out_cols, data)
        .map_err(|err| AggregateError::InvalidConfig(err.to_string()))?;
    Ok(Aggregated { values, index })
}

/// Names of the aggregated columns, in output order.
pub fn aggregated_column_names(
    value_columns: &[String],
    methods: &[AggregationMethod],
) -> Vec<String> {
    methods
        .iter()
        .flat_map(|method| {
            value_columns
                .iter()
                .map(move |column| format!("{column}_{method}"))
        })
        .collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0)
}

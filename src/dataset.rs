//! Windowed sequence container: aggregate, normalize, window, then index samples.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate::{time_segments_aggregate, AggregateError, Aggregated, AggregationMethod};
use crate::matrix::Matrix;
use crate::preprocess::{default_normalizer, Normalize, PreprocessError};
use crate::source::{load_csv, SourceError};
use crate::table::SignalTable;
use crate::windows::{
    rolling_window_sequences, DropPolicy, WindowConfig, WindowError, WindowSet,
};

/// Six hours in seconds.
pub const DEFAULT_INTERVAL: i64 = 21_600;
pub const DEFAULT_WINDOW_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetMode {
    Train,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub interval: i64,
    pub methods: Vec<AggregationMethod>,
    pub window: WindowConfig,
    pub drop: DropPolicy,
    pub mode: DatasetMode,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            methods: vec![AggregationMethod::Mean],
            window: WindowConfig {
                window_size: DEFAULT_WINDOW_SIZE,
                target_size: 1,
                step_size: 1,
                target_column: 0,
                offset: 0,
            },
            drop: DropPolicy::Keep,
            mode: DatasetMode::Train,
        }
    }
}

impl DatasetConfig {
    pub fn new(interval: i64, window_size: usize, mode: DatasetMode) -> Self {
        let mut cfg = Self {
            interval,
            mode,
            ..Self::default()
        };
        cfg.window.window_size = window_size;
        cfg
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("normalize changed the matrix shape from {before:?} to {after:?}")]
    NormalizedShape {
        before: (usize, usize),
        after: (usize, usize),
    },
    #[error("sample index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Evaluation payload: the sample's window plus the full series needed to map
/// predictions back to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSample<'a> {
    pub window: &'a Matrix,
    pub bucket_index: &'a [i64],
    pub targets: &'a [Vec<f64>],
    pub target_index: &'a [i64],
    pub input_index: &'a [i64],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample<'a> {
    Train(&'a Matrix),
    Evaluation(EvaluationSample<'a>),
}

impl<'a> Sample<'a> {
    pub fn window(&self) -> &'a Matrix {
        match *self {
            Self::Train(window) => window,
            Self::Evaluation(sample) => sample.window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalDataset {
    mode: DatasetMode,
    aggregated: Aggregated,
    windows: WindowSet,
}

impl SignalDataset {
    pub fn from_table(
        table: &SignalTable,
        cfg: &DatasetConfig,
        normalizer: &dyn Normalize,
    ) -> Result<Self, DatasetError> {
        info!(
            component = "dataset",
            event = "dataset.build.start",
            rows = table.len(),
            value_columns = table.value_columns().len(),
            interval = cfg.interval,
            window_size = cfg.window.window_size,
            methods = ?cfg.methods,
            mode = ?cfg.mode
        );

        let Aggregated { values, index } =
            time_segments_aggregate(table, cfg.interval, &cfg.methods)?;
        let before = values.shape();
        let values = normalizer.normalize(values)?;
        if values.shape() != before {
            return Err(DatasetError::NormalizedShape {
                before,
                after: values.shape(),
            });
        }

        let windows = rolling_window_sequences(&values, &index, &cfg.window, &cfg.drop)?;

        if windows.is_empty() {
            warn!(
                component = "dataset",
                event = "dataset.build.empty",
                buckets = index.len(),
                required_buckets = ?cfg.window.required_rows()
            );
        }
        info!(
            component = "dataset",
            event = "dataset.build.finish",
            buckets = index.len(),
            samples = windows.len(),
            mode = ?cfg.mode
        );

        Ok(Self {
            mode: cfg.mode,
            aggregated: Aggregated { values, index },
            windows,
        })
    }

    /// Loads a headered CSV with a `timestamp` column and normalizes with
    /// [`default_normalizer`].
    pub fn from_csv(path: &Path, cfg: &DatasetConfig) -> Result<Self, DatasetError> {
        let table = load_csv(path, None)?;
        Self::from_table(&table, cfg, &default_normalizer())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    pub fn get(&self, idx: usize) -> Result<Sample<'_>, DatasetError> {
        let window = self
            .windows
            .inputs
            .get(idx)
            .ok_or_else(|| DatasetError::IndexOutOfRange {
                index: idx,
                len: self.len(),
            })?;

        Ok(match self.mode {
            DatasetMode::Train => Sample::Train(window),
            DatasetMode::Evaluation => Sample::Evaluation(EvaluationSample {
                window,
                bucket_index: &self.aggregated.index,
                targets: &self.windows.targets,
                target_index: &self.windows.target_index,
                input_index: &self.windows.input_index,
            }),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Sample<'_>> + '_ {
        (0..self.len()).filter_map(move |idx| self.get(idx).ok())
    }

    /// Normalized aggregated matrix.
    pub fn values(&self) -> &Matrix {
        &self.aggregated.values
    }

    pub fn bucket_index(&self) -> &[i64] {
        &self.aggregated.index
    }

    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }
}

//! tswin core crate.
//!
//! Current implemented scope:
//! - time-bucket aggregation of irregular (timestamp, value) tables
//! - rolling input/target windows with gap-aware dropping
//! - normalize hooks (mean imputation, min-max scaling)
//! - windowed sample container for training and evaluation
//! - signal CSV loading with a cached remote source

mod aggregate;
mod dataset;
mod matrix;
mod observability;
mod preprocess;
mod source;
mod table;
mod windows;

pub use aggregate::{
    aggregated_column_names, time_segments_aggregate, AggregateError, Aggregated,
    AggregationMethod,
};
pub use dataset::{
    DatasetConfig, DatasetError, DatasetMode, EvaluationSample, Sample, SignalDataset,
    DEFAULT_INTERVAL, DEFAULT_WINDOW_SIZE,
};
pub use matrix::{Matrix, MatrixError};
pub use observability::{
    init_logging, log_app_start, log_input_selected, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use preprocess::{
    default_normalizer, Identity, MeanImputer, MinMaxScaler, Normalize, NormalizePipeline,
    PreprocessError,
};
pub use source::{
    download, download_demo, load_anomalies, load_csv, load_signal, resolve_signal,
    source_config_from_env, AnomalyInterval, CacheSource, ColumnSelection, SignalLocation,
    SignalSplit, SourceConfig, SourceError, NASA_SIGNALS,
};
pub use table::{Observation, SignalTable, TableError};
pub use windows::{
    resolve_drop_mask, rolling_window_sequences, DropPolicy, WindowConfig, WindowError,
    WindowSet,
};

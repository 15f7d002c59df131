use std::path::PathBuf;

use serde::Serialize;
use tswin::{
    aggregated_column_names, default_normalizer, init_logging, load_csv, log_app_start,
    log_input_selected, logging_config_from_env, DatasetConfig, DatasetMode, SignalDataset,
    DEFAULT_INTERVAL, DEFAULT_WINDOW_SIZE,
};

#[derive(Debug, Serialize)]
struct Summary {
    path: String,
    rows: usize,
    value_columns: Vec<String>,
    aggregated_columns: Vec<String>,
    interval: i64,
    window_size: usize,
    buckets: usize,
    samples: usize,
    /// `[samples, window_size, columns]`, absent when no window fits.
    input_shape: Option<Vec<usize>>,
    first_bucket: Option<i64>,
    last_bucket: Option<i64>,
    first_window_start: Option<i64>,
    last_target: Option<i64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .map(PathBuf::from)
        .ok_or("usage: tswin-windows <signal.csv> [interval] [window_size]")?;
    let interval = match args.next() {
        Some(raw) => raw.parse::<i64>()?,
        None => DEFAULT_INTERVAL,
    };
    let window_size = match args.next() {
        Some(raw) => raw.parse::<usize>()?,
        None => DEFAULT_WINDOW_SIZE,
    };
    log_input_selected(&path, interval, window_size);

    let cfg = DatasetConfig::new(interval, window_size, DatasetMode::Train);
    let table = load_csv(&path, None)?;
    let dataset = SignalDataset::from_table(&table, &cfg, &default_normalizer())?;
    let windows = dataset.windows();

    let summary = Summary {
        path: path.display().to_string(),
        rows: table.len(),
        value_columns: table.value_columns().to_vec(),
        aggregated_columns: aggregated_column_names(table.value_columns(), &cfg.methods),
        interval,
        window_size,
        buckets: dataset.bucket_index().len(),
        samples: dataset.len(),
        input_shape: windows
            .stacked_inputs()
            .map(|stacked| stacked.shape().to_vec()),
        first_bucket: dataset.bucket_index().first().copied(),
        last_bucket: dataset.bucket_index().last().copied(),
        first_window_start: windows.input_index.first().copied(),
        last_target: windows.target_index.last().copied(),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

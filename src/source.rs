//! Signal tables from local CSV files or a cached remote bucket.

use std::env;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::table::{Observation, SignalTable, TableError};

const CHECKSUM_SUFFIX: &str = "sha256";
const ANOMALIES_NAME: &str = "anomalies";

/// Signals of the NASA SMAP/MSL demo set hosted in the default bucket.
pub const NASA_SIGNALS: &[&str] = &[
    "P-1", "S-1", "E-1", "E-2", "E-3", "E-4", "E-5", "E-6", "E-7", "E-8", "E-9", "E-10", "E-11",
    "E-12", "E-13", "A-1", "D-1", "P-3", "D-2", "D-3", "D-4", "A-2", "A-3", "A-4", "G-1", "G-2",
    "D-5", "D-6", "D-7", "F-1", "P-4", "G-3", "T-1", "T-2", "D-8", "D-9", "F-2", "G-4", "T-3",
    "D-11", "D-12", "B-1", "G-6", "G-7", "P-7", "R-1", "A-5", "A-6", "A-7", "D-13", "A-8", "A-9",
    "F-3", "M-6", "M-1", "M-2", "S-2", "P-10", "T-4", "T-5", "F-7", "M-3", "M-4", "M-5", "P-15",
    "C-1", "C-2", "T-12", "T-13", "F-4", "F-5", "D-14", "T-9", "P-14", "T-8", "P-11", "D-15",
    "D-16", "M-7", "F-8",
];

const DEMO_SIGNAL_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub data_root: PathBuf,
    pub bucket: String,
    pub http_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub verify_checksum: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            bucket: "d3-ai-orion".to_string(),
            http_timeout_ms: 15_000,
            max_retries: 2,
            retry_backoff_ms: 200,
            verify_checksum: true,
        }
    }
}

impl SourceConfig {
    /// Overlays `TSWIN_DATA_ROOT` and `TSWIN_BUCKET` from `lookup` on the
    /// defaults. Blank values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();
        if let Some(root) = non_blank("TSWIN_DATA_ROOT") {
            config.data_root = PathBuf::from(root);
        }
        if let Some(bucket) = non_blank("TSWIN_BUCKET") {
            config.bucket = bucket;
        }
        config
    }
}

pub fn source_config_from_env() -> SourceConfig {
    SourceConfig::from_lookup(|key| env::var(key).ok())
}

/// Zero-based column positions for a headerless two-column read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub timestamp: usize,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLocation {
    pub url: String,
    pub cache_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSource {
    Cached,
    Downloaded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalSplit {
    Full(SignalTable),
    TrainTest {
        train: SignalTable,
        test: SignalTable,
    },
}

/// Known anomalous span. `score` is only set for edge-padded results: 1 for an
/// anomaly, 0 for the normal spans before the first and after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyInterval {
    pub start: i64,
    pub end: i64,
    pub score: Option<u8>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source request: {0}")]
    InvalidRequest(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("archive at {path} has no CSV entry")]
    MissingCsvEntry { path: PathBuf },
    #[error("{path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
    #[error("record {record} has {found} columns, expected at least {expected}")]
    InvalidRecordColumns {
        record: usize,
        found: usize,
        expected: usize,
    },
    #[error("failed to parse {field} value '{value}' in record {record}")]
    ParseField {
        field: String,
        value: String,
        record: usize,
    },
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("HTTP request failed for {url}: {message}")]
    HttpRequest { url: String, message: String },
    #[error("checksum mismatch for {path}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("no anomalies recorded for signal '{0}'")]
    UnknownSignal(String),
}

/// Maps a signal name to its download URL and local cache file.
///
/// `s3://bucket/path/to/file.csv` reads from that bucket and caches under the
/// file's own name; anything else is `{name}.csv` in the configured bucket.
pub fn resolve_signal(name: &str, cfg: &SourceConfig) -> Result<SignalLocation, SourceError> {
    if let Some(rest) = name.strip_prefix("s3://") {
        let (bucket, path) = rest.split_once('/').ok_or_else(|| {
            SourceError::InvalidRequest(format!("s3 name '{name}' has no object path"))
        })?;
        let file_name = path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                SourceError::InvalidRequest(format!("s3 name '{name}' has no file name"))
            })?;
        return Ok(SignalLocation {
            url: s3_url(bucket, path),
            cache_path: cfg.data_root.join(file_name),
        });
    }

    if name.is_empty() {
        return Err(SourceError::InvalidRequest(
            "signal name must not be empty".to_string(),
        ));
    }
    Ok(SignalLocation {
        url: s3_url(&cfg.bucket, &format!("{name}.csv")),
        cache_path: cfg.data_root.join(format!("{name}.csv")),
    })
}

/// Reads a signal CSV (or the first CSV inside a `.zip`).
///
/// Without `columns` the file must have a header with a `timestamp` column; all
/// other columns become value columns. With `columns` the file is read without a
/// header and only the two selected columns are kept, as `value`.
pub fn load_csv(path: &Path, columns: Option<ColumnSelection>) -> Result<SignalTable, SourceError> {
    if let Some(sel) = columns {
        if sel.timestamp == sel.value {
            return Err(SourceError::InvalidRequest(
                "timestamp column cannot be the same as value column".to_string(),
            ));
        }
    }

    let bytes = read_csv_bytes(path)?;
    let table = match columns {
        None => parse_headered_csv(path, &bytes)?,
        Some(sel) => parse_selected_columns(&bytes, sel)?,
    };

    debug!(
        component = "source",
        event = "source.csv.loaded",
        path = %path.display(),
        rows = table.len(),
        value_columns = table.value_columns().len()
    );
    Ok(table)
}

/// Loads a named signal, downloading it into the cache on first use.
pub fn download(name: &str, cfg: &SourceConfig) -> Result<SignalTable, SourceError> {
    let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms)?;
    download_with_fetcher(name, cfg, &fetcher)
}

/// Local file path if `signal` names an existing file, otherwise a cached
/// download. With `test_size` the rows are split in order and the last
/// `round(len * test_size)` rows form the test part.
pub fn load_signal(
    signal: &str,
    test_size: Option<f64>,
    columns: Option<ColumnSelection>,
    cfg: &SourceConfig,
) -> Result<SignalSplit, SourceError> {
    let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms)?;
    load_signal_with_fetcher(signal, test_size, columns, cfg, &fetcher)
}

pub fn load_anomalies(
    signal: &str,
    edges: bool,
    cfg: &SourceConfig,
) -> Result<Vec<AnomalyInterval>, SourceError> {
    let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms)?;
    load_anomalies_with_fetcher(signal, edges, cfg, &fetcher)
}

/// Downloads the first demo signals into `path`, or their `-train`/`-test`
/// halves when `split` is set. Returns the local files.
pub fn download_demo(
    path: &Path,
    split: bool,
    cfg: &SourceConfig,
) -> Result<Vec<PathBuf>, SourceError> {
    let fetcher = ReqwestBlockingFetcher::new(cfg.http_timeout_ms)?;
    download_demo_with_fetcher(path, split, cfg, &fetcher)
}

fn download_with_fetcher(
    name: &str,
    cfg: &SourceConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<SignalTable, SourceError> {
    let (local_path, _) = sync_signal(name, cfg, fetcher)?;
    load_csv(&local_path, None)
}

fn load_signal_with_fetcher(
    signal: &str,
    test_size: Option<f64>,
    columns: Option<ColumnSelection>,
    cfg: &SourceConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<SignalSplit, SourceError> {
    if let Some(size) = test_size {
        if !(0.0..=1.0).contains(&size) {
            return Err(SourceError::InvalidRequest(format!(
                "test_size must be within [0, 1], got {size}"
            )));
        }
    }

    let path = Path::new(signal);
    let table = if path.is_file() {
        load_csv(path, columns)?
    } else {
        download_with_fetcher(signal, cfg, fetcher)?
    };

    let Some(size) = test_size else {
        return Ok(SignalSplit::Full(table));
    };

    let test_len = (table.len() as f64 * size).round_ties_even() as usize;
    let (train, test) = table.split_at(table.len() - test_len.min(table.len()))?;
    info!(
        component = "source",
        event = "source.signal.split",
        signal,
        train_rows = train.len(),
        test_rows = test.len()
    );
    Ok(SignalSplit::TrainTest { train, test })
}

fn load_anomalies_with_fetcher(
    signal: &str,
    edges: bool,
    cfg: &SourceConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<Vec<AnomalyInterval>, SourceError> {
    let (anomalies_path, _) = sync_signal(ANOMALIES_NAME, cfg, fetcher)?;
    let bytes = read_csv_bytes(&anomalies_path)?;
    let events = parse_anomaly_events(&anomalies_path, &bytes, signal)?;

    let mut out: Vec<AnomalyInterval> = events
        .iter()
        .map(|&(start, end)| AnomalyInterval {
            start,
            end,
            score: edges.then_some(1),
        })
        .collect();

    if !edges {
        return Ok(out);
    }

    let data = download_with_fetcher(signal, cfg, fetcher)?;
    let (data_start, data_end) = data.timestamp_bounds().ok_or_else(|| {
        SourceError::InvalidRequest(format!("signal '{signal}' has no observations"))
    })?;

    let first_start = events.iter().map(|(start, _)| *start).min();
    let last_end = events.iter().map(|(_, end)| *end).max();
    let (Some(first_start), Some(last_end)) = (first_start, last_end) else {
        return Ok(vec![AnomalyInterval {
            start: data_start,
            end: data_end,
            score: Some(0),
        }]);
    };

    out.insert(
        0,
        AnomalyInterval {
            start: data_start,
            end: first_start,
            score: Some(0),
        },
    );
    out.push(AnomalyInterval {
        start: last_end,
        end: data_end,
        score: Some(0),
    });
    Ok(out)
}

fn download_demo_with_fetcher(
    path: &Path,
    split: bool,
    cfg: &SourceConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<Vec<PathBuf>, SourceError> {
    fs::create_dir_all(path)?;
    info!(
        component = "source",
        event = "source.demo.start",
        path = %path.display(),
        split
    );

    let demo_cfg = SourceConfig {
        data_root: path.to_path_buf(),
        ..cfg.clone()
    };

    let mut names = Vec::new();
    for signal in &NASA_SIGNALS[..DEMO_SIGNAL_COUNT] {
        if split {
            names.push(format!("{signal}-train"));
            names.push(format!("{signal}-test"));
        } else {
            names.push((*signal).to_string());
        }
    }

    let mut local = Vec::with_capacity(names.len());
    for name in &names {
        let (local_path, _) = sync_signal(name, &demo_cfg, fetcher)?;
        local.push(local_path);
    }
    Ok(local)
}

/// Ensures the named signal is present in the cache and returns its path.
fn sync_signal(
    name: &str,
    cfg: &SourceConfig,
    fetcher: &dyn HttpFetcher,
) -> Result<(PathBuf, CacheSource), SourceError> {
    let location = resolve_signal(name, cfg)?;
    let local_path = location.cache_path;
    let checksum_path = checksum_path_for(&local_path);

    if local_path.exists() {
        let expected = if cfg.verify_checksum && checksum_path.exists() {
            Some(fs::read_to_string(&checksum_path)?.trim().to_ascii_lowercase())
        } else {
            None
        };

        match expected {
            Some(expected) => {
                let actual = file_sha256_hex(&local_path)?;
                if actual == expected {
                    log_cached(name, &local_path);
                    return Ok((local_path, CacheSource::Cached));
                }
                warn!(
                    component = "source",
                    event = "source.download.checksum_failed",
                    signal = name,
                    path = %local_path.display(),
                    expected = %expected,
                    actual = %actual
                );
            }
            None => {
                log_cached(name, &local_path);
                return Ok((local_path, CacheSource::Cached));
            }
        }
    }

    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent)?;
    }

    info!(
        component = "source",
        event = "source.download.start",
        signal = name,
        url = %location.url
    );
    let bytes = retry(cfg, || fetcher.get_bytes(&location.url))?;
    write_atomic(&local_path, &bytes)?;

    let actual = file_sha256_hex(&local_path)?;
    let expected = sha256_hex(&bytes);
    if actual != expected {
        return Err(SourceError::ChecksumMismatch {
            path: local_path,
            expected,
            actual,
        });
    }
    write_atomic(&checksum_path, format!("{actual}\n").as_bytes())?;

    info!(
        component = "source",
        event = "source.download.fetched",
        signal = name,
        path = %local_path.display(),
        bytes = bytes.len()
    );
    Ok((local_path, CacheSource::Downloaded))
}

fn log_cached(name: &str, path: &Path) {
    info!(
        component = "source",
        event = "source.download.cached",
        signal = name,
        path = %path.display()
    );
}

fn s3_url(bucket: &str, path: &str) -> String {
    format!("https://{bucket}.s3.amazonaws.com/{path}")
}

fn checksum_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

fn read_csv_bytes(path: &Path) -> Result<Vec<u8>, SourceError> {
    let is_zip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip {
        return Ok(fs::read(path)?);
    }

    let file = fs::File::open(path)?;
    let mut zip = ZipArchive::new(file)?;
    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".csv") {
            continue;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        return Ok(buf);
    }

    Err(SourceError::MissingCsvEntry {
        path: path.to_path_buf(),
    })
}

fn parse_headered_csv(path: &Path, bytes: &[u8]) -> Result<SignalTable, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(Cursor::new(bytes));

    let headers = reader.headers()?.clone();
    let ts_idx = headers
        .iter()
        .position(|name| name == "timestamp")
        .ok_or_else(|| SourceError::MissingColumn {
            path: path.to_path_buf(),
            column: "timestamp".to_string(),
        })?;
    let value_positions: Vec<usize> = (0..headers.len()).filter(|idx| *idx != ts_idx).collect();
    let value_columns: Vec<String> = value_positions
        .iter()
        .map(|idx| headers[*idx].to_string())
        .collect();

    let mut rows = Vec::new();
    for (record_idx, record) in reader.records().enumerate() {
        let record = record?;
        let timestamp = parse_timestamp(&record, ts_idx, record_idx)?;
        let values = value_positions
            .iter()
            .map(|idx| parse_value(&record, *idx, &headers[*idx], record_idx))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(Observation { timestamp, values });
    }

    Ok(SignalTable::new(value_columns, rows)?)
}

fn parse_selected_columns(bytes: &[u8], sel: ColumnSelection) -> Result<SignalTable, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(Cursor::new(bytes));

    let expected = sel.timestamp.max(sel.value) + 1;
    let mut rows = Vec::new();
    for (record_idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < expected {
            return Err(SourceError::InvalidRecordColumns {
                record: record_idx,
                found: record.len(),
                expected,
            });
        }
        rows.push(Observation {
            timestamp: parse_timestamp(&record, sel.timestamp, record_idx)?,
            values: vec![parse_value(&record, sel.value, "value", record_idx)?],
        });
    }

    Ok(SignalTable::new(vec!["value".to_string()], rows)?)
}

fn parse_anomaly_events(
    path: &Path,
    bytes: &[u8],
    signal: &str,
) -> Result<Vec<(i64, i64)>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(Cursor::new(bytes));
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| SourceError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let signal_idx = column("signal")?;
    let events_idx = column("events")?;

    for record in reader.records() {
        let record = record?;
        if record.get(signal_idx).map(str::trim) != Some(signal) {
            continue;
        }
        let raw = record.get(events_idx).unwrap_or_default();
        return Ok(serde_json::from_str(raw)?);
    }

    Err(SourceError::UnknownSignal(signal.to_string()))
}

fn parse_timestamp(
    record: &StringRecord,
    idx: usize,
    record_idx: usize,
) -> Result<i64, SourceError> {
    let raw = record.get(idx).unwrap_or_default();
    parse_timestamp_str(raw).ok_or_else(|| SourceError::ParseField {
        field: "timestamp".to_string(),
        value: raw.to_string(),
        record: record_idx,
    })
}

/// Integer epoch, real epoch (floored), RFC 3339, or a naive UTC datetime/date.
fn parse_timestamp_str(raw: &str) -> Option<i64> {
    if let Ok(ts) = raw.parse::<i64>() {
        return Some(ts);
    }
    if let Ok(ts) = raw.parse::<f64>() {
        if ts.is_finite() && ts.abs() < i64::MAX as f64 {
            return Some(ts.floor() as i64);
        }
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %I:%M:%S %p"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

fn parse_value(
    record: &StringRecord,
    idx: usize,
    field: &str,
    record_idx: usize,
) -> Result<f64, SourceError> {
    let raw = record.get(idx).unwrap_or_default();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null") {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| SourceError::ParseField {
        field: field.to_string(),
        value: raw.to_string(),
        record: record_idx,
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SourceError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            SourceError::InvalidRequest(format!("invalid output path: {}", path.display()))
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn file_sha256_hex(path: &Path) -> Result<String, SourceError> {
    Ok(sha256_hex(&fs::read(path)?))
}

trait HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

struct ReqwestBlockingFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestBlockingFetcher {
    fn new(timeout_ms: u64) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| SourceError::HttpClientBuild(err.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpFetcher for ReqwestBlockingFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SourceError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpRequest {
                url: url.to_string(),
                message: format!("unexpected HTTP status {status}"),
            });
        }

        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| SourceError::HttpRequest {
                url: url.to_string(),
                message: err.to_string(),
            })
    }
}

fn retry<T>(
    cfg: &SourceConfig,
    mut f: impl FnMut() -> Result<T, SourceError>,
) -> Result<T, SourceError> {
    let mut attempt: u32 = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= cfg.max_retries => return Err(err),
            Err(err) => {
                attempt = attempt.saturating_add(1);
                let shift = attempt.saturating_sub(1).min(10);
                let sleep_ms = cfg.retry_backoff_ms.saturating_mul(1u64 << shift);
                debug!(
                    component = "source",
                    event = "source.download.retry",
                    attempt,
                    sleep_ms,
                    error = %err
                );
                std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
            }
        }
    }
}

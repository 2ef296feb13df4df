//! Equity curve loading.
//!
//! Curves are produced by an external backtest as one CSV per strategy with at
//! least a date column and a `Portfolio_Value` column. Loading is a pure read:
//! a missing artifact is reported as [`MosaicError::NotFound`], anything that
//! is present but unusable as [`MosaicError::Malformed`].

use crate::error::{MosaicError, Result};
use crate::types::{EquityCurve, EquityPoint, StrategyRef};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header names accepted for the date column.
const DATE_COLUMNS: [&str; 9] = [
    "Date",
    "date",
    "DATE",
    "Timestamp",
    "timestamp",
    "Time",
    "time",
    "datetime",
    "Datetime",
];

/// Curve loading configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Date format string for parsing (e.g., "%Y-%m-%d"). Common formats are tried if unset.
    #[serde(default)]
    pub date_format: Option<String>,
    /// Name of the numeric column holding the portfolio value.
    #[serde(default = "default_value_column")]
    pub value_column: String,
    /// File name of the curve inside each strategy directory.
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// CSV delimiter character. If None, delimiter is auto-detected.
    #[serde(default)]
    pub delimiter: Option<char>,
}

fn default_value_column() -> String {
    "Portfolio_Value".to_string()
}

fn default_file_name() -> String {
    "portfolio_history.csv".to_string()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            value_column: default_value_column(),
            file_name: default_file_name(),
            delimiter: None,
        }
    }
}

/// Detect the CSV delimiter by analyzing the first few lines of the file.
///
/// Tries comma, tab, semicolon and pipe and keeps the one giving the most
/// consistent column count, requiring at least a date and a value field.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().take(5).filter_map(|l| l.ok()).collect();

    if lines.is_empty() {
        return Ok(b',');
    }

    let delimiters = [b',', b'\t', b';', b'|'];
    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in &delimiters {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.as_bytes().iter().filter(|&&b| b == delim).count() + 1)
            .collect();

        let first_count = counts[0];
        let all_consistent = counts.iter().all(|&c| c == first_count);

        if all_consistent && first_count >= 2 && first_count > best_score {
            best_score = first_count;
            best_delimiter = delim;
        }
    }

    debug!(
        "Detected delimiter {:?} with score {}",
        best_delimiter as char, best_score
    );
    Ok(best_delimiter)
}

/// Parse a calendar date, trying an explicit format first and then common
/// date and datetime layouts. Any time-of-day is dropped.
pub fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate> {
    let s = s.trim();

    if let Some(fmt) = format {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    let date_formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%b %d, %Y",
    ];
    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    // Timezone-qualified timestamps, e.g. "2024-01-02 00:00:00+08:00".
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.date_naive());
    }

    Err(MosaicError::Malformed(format!("could not parse date: '{}'", s)))
}

fn find_column_index(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim() == *n))
}

/// Load one equity curve from a CSV file.
///
/// Rows are sorted ascending by date. A row whose date or value does not
/// parse, a duplicated date, or a file with no rows makes the whole artifact
/// malformed; nothing is skipped silently.
pub fn load_curve_csv(path: impl AsRef<Path>, config: &LoaderConfig) -> Result<EquityCurve> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MosaicError::NotFound {
            strategy: path.display().to_string(),
            path: path.display().to_string(),
        });
    }
    debug!("Loading equity curve from: {}", path.display());

    let delimiter = match config.delimiter {
        Some(d) if d.is_ascii() => d as u8,
        Some(d) => {
            return Err(MosaicError::ConfigError(format!(
                "delimiter must be a single ASCII character, got {:?}",
                d
            )))
        }
        None => detect_delimiter(path)?,
    };

    // Anything the CSV reader rejects (bad UTF-8, broken quoting) is a bad artifact.
    let malformed = |e: csv::Error| MosaicError::Malformed(format!("{}: {}", path.display(), e));

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers().map_err(malformed)?.clone();
    let date_idx = find_column_index(&headers, &DATE_COLUMNS).ok_or_else(|| {
        MosaicError::Malformed(format!("{}: no date column", path.display()))
    })?;
    let value_idx =
        find_column_index(&headers, &[config.value_column.as_str()]).ok_or_else(|| {
            MosaicError::Malformed(format!(
                "{}: missing '{}' column",
                path.display(),
                config.value_column
            ))
        })?;

    let mut points = Vec::new();
    for (row_num, record) in reader.records().enumerate() {
        let record = record.map_err(malformed)?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        let raw_value = record.get(value_idx).unwrap_or_default();

        let date = parse_date(raw_date, config.date_format.as_deref()).map_err(|e| {
            MosaicError::Malformed(format!("{} row {}: {}", path.display(), row_num + 1, e))
        })?;
        let value: f64 = raw_value.trim().parse().map_err(|_| {
            MosaicError::Malformed(format!(
                "{} row {}: '{}' is not a number",
                path.display(),
                row_num + 1,
                raw_value
            ))
        })?;

        points.push(EquityPoint::new(date, value));
    }

    if points.is_empty() {
        return Err(MosaicError::Malformed(format!(
            "{}: no rows",
            path.display()
        )));
    }

    points.sort_by_key(|p| p.date);
    let curve = EquityCurve::new(points)
        .map_err(|e| MosaicError::Malformed(format!("{}: {}", path.display(), e)))?;

    if let (Some(first), Some(last)) = (curve.first(), curve.last()) {
        debug!(
            "Loaded {} points from {} to {}",
            curve.len(),
            first.date,
            last.date
        );
    }

    Ok(curve)
}

/// Directory layout used by the backtest: `<results_dir>/<ticker>_<type lowercased>/<file_name>`.
pub fn strategy_path(results_dir: impl AsRef<Path>, strategy: &StrategyRef, file_name: &str) -> PathBuf {
    results_dir
        .as_ref()
        .join(format!(
            "{}_{}",
            strategy.ticker,
            strategy.strategy_type.to_lowercase()
        ))
        .join(file_name)
}

/// Something that can hand out the equity curve of a strategy.
pub trait CurveSource: Send + Sync {
    /// Load the curve for one strategy.
    fn load(&self, strategy: &StrategyRef) -> Result<EquityCurve>;

    /// Load curves for every strategy in order, failing on the first miss.
    fn load_all(&self, strategies: &[StrategyRef]) -> Result<Vec<EquityCurve>> {
        strategies.iter().map(|s| self.load(s)).collect()
    }
}

/// Curves stored as CSV files under a results directory.
#[derive(Debug, Clone)]
pub struct CsvCurveStore {
    results_dir: PathBuf,
    config: LoaderConfig,
}

impl CsvCurveStore {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(results_dir, LoaderConfig::default())
    }

    pub fn with_config(results_dir: impl Into<PathBuf>, config: LoaderConfig) -> Self {
        Self {
            results_dir: results_dir.into(),
            config,
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Where the curve of `strategy` is expected on disk.
    pub fn path_for(&self, strategy: &StrategyRef) -> PathBuf {
        strategy_path(&self.results_dir, strategy, &self.config.file_name)
    }
}

impl CurveSource for CsvCurveStore {
    fn load(&self, strategy: &StrategyRef) -> Result<EquityCurve> {
        let path = self.path_for(strategy);
        if !path.is_file() {
            return Err(MosaicError::NotFound {
                strategy: strategy.to_string(),
                path: path.display().to_string(),
            });
        }
        let curve = load_curve_csv(&path, &self.config)?;
        info!("Loaded {} ({} points)", strategy, curve.len());
        Ok(curve)
    }
}

/// In-memory curve store, keyed by strategy.
#[derive(Debug, Clone, Default)]
pub struct MemoryCurveStore {
    curves: HashMap<StrategyRef, EquityCurve>,
}

impl MemoryCurveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a curve, replacing any existing one for the same strategy.
    pub fn add(&mut self, strategy: StrategyRef, curve: EquityCurve) {
        if self.curves.insert(strategy.clone(), curve).is_some() {
            debug!("Replaced curve for {}", strategy);
        }
    }

    pub fn get(&self, strategy: &StrategyRef) -> Option<&EquityCurve> {
        self.curves.get(strategy)
    }

    pub fn contains(&self, strategy: &StrategyRef) -> bool {
        self.curves.contains_key(strategy)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

impl CurveSource for MemoryCurveStore {
    fn load(&self, strategy: &StrategyRef) -> Result<EquityCurve> {
        self.curves
            .get(strategy)
            .cloned()
            .ok_or_else(|| MosaicError::NotFound {
                strategy: strategy.to_string(),
                path: "<memory>".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_curve_csv() {
        let file = create_test_csv(
            "Date,Cash,Shares,Portfolio_Value\n\
             2024-01-02,1000,10,20000\n\
             2024-01-03,1000,10,20500.5\n\
             2024-01-04,1000,10,19800\n",
        );
        let curve = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap();

        assert_eq!(curve.len(), 3);
        assert_eq!(curve.values(), vec![20000.0, 20500.5, 19800.0]);
        assert_eq!(curve.first().unwrap().date.day(), 2);
    }

    #[test]
    fn test_load_sorts_unordered_rows() {
        let file = create_test_csv(
            "Date,Portfolio_Value\n2024-01-04,3\n2024-01-02,1\n2024-01-03,2\n",
        );
        let curve = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(curve.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_load_semicolon_delimited() {
        let file = create_test_csv("Date;Portfolio_Value\n2024-01-02;100\n2024-01-03;101\n");
        let curve = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap();
        assert_eq!(curve.len(), 2);
    }

    #[test]
    fn test_missing_value_column_is_malformed() {
        let file = create_test_csv("Date,Close\n2024-01-02,100\n");
        let err = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, MosaicError::Malformed(_)));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        file.write_all(b"Date,Portfolio_Value\n2024-01-02,100\n2024-01-03,\xff\xfe\n")
            .unwrap();
        let err = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, MosaicError::Malformed(_)));
        assert!(err.is_candidate_local());
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let file = create_test_csv("Date,Portfolio_Value\n2024-01-02,100\n");
        let config = LoaderConfig {
            delimiter: Some('é'),
            ..Default::default()
        };
        let err = load_curve_csv(file.path(), &config).unwrap_err();
        assert!(matches!(err, MosaicError::ConfigError(_)));
    }

    #[test]
    fn test_unparsable_value_is_malformed() {
        let file = create_test_csv("Date,Portfolio_Value\n2024-01-02,abc\n");
        let err = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, MosaicError::Malformed(_)));
    }

    #[test]
    fn test_duplicate_dates_are_malformed() {
        let file = create_test_csv("Date,Portfolio_Value\n2024-01-02,1\n2024-01-02,2\n");
        let err = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, MosaicError::Malformed(_)));
    }

    #[test]
    fn test_header_only_is_malformed() {
        let file = create_test_csv("Date,Portfolio_Value\n");
        let err = load_curve_csv(file.path(), &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, MosaicError::Malformed(_)));
    }

    #[test]
    fn test_date_parsing() {
        let d = parse_date("2024-01-15", None).unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 15));

        let d = parse_date("2024-01-15 00:00:00", None).unwrap();
        assert_eq!(d.day(), 15);

        let d = parse_date("2024-01-15 00:00:00+08:00", None).unwrap();
        assert_eq!(d.day(), 15);

        let d = parse_date("15-Jan-2024", None).unwrap();
        assert_eq!(d.month(), 1);

        let d = parse_date("15.01.2024", Some("%d.%m.%Y")).unwrap();
        assert_eq!(d.day(), 15);

        assert!(parse_date("not a date", None).is_err());
    }

    #[test]
    fn test_strategy_path_layout() {
        let s: StrategyRef = "0005.HK:Aggressive".parse().unwrap();
        let path = strategy_path("trading_results", &s, "portfolio_history.csv");
        assert_eq!(
            path,
            PathBuf::from("trading_results/0005.HK_aggressive/portfolio_history.csv")
        );
    }

    #[test]
    fn test_csv_store_not_found() {
        let dir = TempDir::new().unwrap();
        let store = CsvCurveStore::new(dir.path());
        let s: StrategyRef = "MISSING:Aggressive".parse().unwrap();
        assert!(matches!(
            store.load(&s),
            Err(MosaicError::NotFound { .. })
        ));
    }

    #[test]
    fn test_csv_store_load() {
        let dir = TempDir::new().unwrap();
        let s: StrategyRef = "AAA:Conservative".parse().unwrap();
        let store = CsvCurveStore::new(dir.path());
        let path = store.path_for(&s);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Date,Portfolio_Value\n2024-01-02,10\n2024-01-03,11\n").unwrap();

        let curve = store.load(&s).unwrap();
        assert_eq!(curve.len(), 2);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryCurveStore::new();
        let s: StrategyRef = "AAA:x".parse().unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        store.add(s.clone(), EquityCurve::from_parts(&[d], &[1.0]).unwrap());

        assert!(store.contains(&s));
        assert_eq!(store.len(), 1);
        assert!(store.load(&s).is_ok());
        assert!(store
            .load(&"BBB:x".parse().unwrap())
            .is_err());
    }

    #[test]
    fn test_load_all_stops_on_missing() {
        let mut store = MemoryCurveStore::new();
        let a: StrategyRef = "AAA:x".parse().unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        store.add(a.clone(), EquityCurve::from_parts(&[d], &[1.0]).unwrap());

        let result = store.load_all(&[a, "BBB:x".parse().unwrap()]);
        assert!(matches!(result, Err(MosaicError::NotFound { .. })));
    }
}

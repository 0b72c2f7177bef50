//! Artifact discovery and loading
//!
//! The evaluation tool does not promise a fixed directory layout, so the resolver
//! searches the reports tree for files by name and tolerates anything malformed:
//! a bad file is skipped, a bad row is dropped, a bad cell is treated as absent.
//!
//! # Files consumed
//!
//! - `**/folds.json` - `{folds: [{fold, pinball_p10, coverage}]}` or a flat list
//! - `<run>/predictions.csv` - `timestamp, y_true, y_pred_p10, y_pred_p50, y_pred_p90, horizon_step, fold`
//! - `<run>/metrics_*.csv` - `horizon_step, mae, rmse, fold`
//! - `**/report.json` - free-form, optionally carrying `fold_id`
//! - `**/*<model>*h<horizon>*.json` - legacy `{history, forecast, metrics}` bundles

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::artifacts::raw::{
    parse_f64, parse_i64, value_as_f64, value_as_i64, JsonBundleFile, RawBundle, RawForecastRow,
    RawMetrics,
};
use crate::error::ArtifactError;
use crate::models::{HistoryPoint, Horizon, ModelKind};

const FOLDS_FILENAME: &str = "folds.json";
const PREDICTIONS_FILENAME: &str = "predictions.csv";
const REPORT_FILENAME: &str = "report.json";
const METRICS_PREFIX: &str = "metrics_";

/// Folds reported when the tree holds no fold information at all
pub const DEFAULT_FOLDS: [i64; 5] = [0, 1, 2, 3, 4];

/// One `predictions.csv` row. Cells stay text so each one parses independently.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PredictionRecord {
    timestamp: Option<String>,
    y_true: Option<String>,
    y_pred_p10: Option<String>,
    y_pred_p50: Option<String>,
    y_pred_p90: Option<String>,
    horizon_step: Option<String>,
    fold: Option<String>,
}

/// One `metrics_*.csv` row.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricsRecord {
    horizon_step: Option<String>,
    mae: Option<String>,
    rmse: Option<String>,
    fold: Option<String>,
}

/// One entry of a `folds.json` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoldRecord {
    pub fold: Option<i64>,
    pub pinball_p10: Option<f64>,
    pub coverage: Option<f64>,
}

impl FoldRecord {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            fold: obj.get("fold").and_then(value_as_i64),
            pinball_p10: obj.get("pinball_p10").and_then(value_as_f64),
            coverage: obj.get("coverage").and_then(value_as_f64),
        })
    }
}

/// History and forecast rows read from one `predictions.csv`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionSet {
    pub history: Vec<HistoryPoint>,
    pub forecast: Vec<RawForecastRow>,
}

impl PredictionSet {
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() || self.forecast.is_empty()
    }
}

/// Locates and parses artifacts below a reports root.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    root: PathBuf,
}

impl ArtifactResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    // =========================================================================
    // FOLD DISCOVERY
    // =========================================================================

    /// Sorted, deduplicated fold ids found anywhere in the tree.
    ///
    /// Sources: `folds.json` records, the `fold` column of `predictions.csv`,
    /// `fold_id` in `report.json`, and integer-named top-level directories.
    /// Falls back to [`DEFAULT_FOLDS`] when nothing is found.
    pub fn discover_folds(&self) -> Vec<i64> {
        let mut folds = BTreeSet::new();

        for path in self.files_named(|name| {
            name == FOLDS_FILENAME || name == PREDICTIONS_FILENAME || name == REPORT_FILENAME
        }) {
            let found = match path.file_name().and_then(|n| n.to_str()) {
                Some(FOLDS_FILENAME) => read_fold_records(&path)
                    .map(|records| records.into_iter().filter_map(|r| r.fold).collect::<Vec<i64>>()),
                Some(PREDICTIONS_FILENAME) => read_prediction_folds(&path),
                _ => read_report_folds(&path),
            };

            match found {
                Ok(ids) => folds.extend(ids),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable fold source"),
            }
        }

        match std::fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries.filter_map(|e| e.ok()) {
                    if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                        continue;
                    }
                    if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<i64>().ok()) {
                        folds.insert(id);
                    }
                }
            }
            Err(e) => debug!(root = %self.root.display(), error = %e, "Reports root not readable"),
        }

        if folds.is_empty() {
            DEFAULT_FOLDS.to_vec()
        } else {
            folds.into_iter().collect()
        }
    }

    // =========================================================================
    // RUN LOOKUP
    // =========================================================================

    /// Most recently modified run directory whose name mentions `model`.
    ///
    /// Matching is a case-insensitive substring test with underscores and hyphens
    /// ignored, so `seq2seq_attention_quantile` matches `Seq2SeqAttentionQuantile-0412`.
    /// Only directories holding a `predictions.csv` count as runs; plot or log
    /// subdirectories named after the model are skipped.
    pub fn locate_run(&self, model: ModelKind) -> Option<PathBuf> {
        let needle = squash(model.as_str());

        WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| squash(name).contains(&needle))
                    .unwrap_or(false)
            })
            .filter(|e| e.path().join(PREDICTIONS_FILENAME).is_file())
            .max_by_key(|e| modified_at(e.path()))
            .map(|e| e.into_path())
    }

    // =========================================================================
    // FILE LOADERS
    // =========================================================================

    /// Read `predictions.csv` in `run_dir`, keeping rows for `fold_id` (when given).
    ///
    /// Every readable `y_true` becomes a history point; rows with a readable
    /// `y_pred_p50` and `horizon_step <= horizon` become forecast rows.
    pub fn load_predictions(
        &self,
        run_dir: &Path,
        horizon: Horizon,
        fold_id: Option<i64>,
    ) -> PredictionSet {
        let path = run_dir.join(PREDICTIONS_FILENAME);
        if !path.is_file() {
            return PredictionSet::default();
        }

        match read_predictions(&path, horizon, fold_id) {
            Ok(set) => {
                debug!(
                    path = %path.display(),
                    history = set.history.len(),
                    forecast = set.forecast.len(),
                    "Loaded predictions"
                );
                set
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read predictions");
                PredictionSet::default()
            }
        }
    }

    /// Per-step MAE/RMSE from every `metrics_*.csv` in `run_dir`, plus coverage
    /// from the matching `folds.json` record.
    pub fn load_metrics(&self, run_dir: &Path, horizon: Horizon, fold_id: Option<i64>) -> RawMetrics {
        let mut metrics = RawMetrics::default();

        for path in metrics_files(run_dir) {
            if let Err(e) = accumulate_metrics(&path, horizon, fold_id, &mut metrics) {
                warn!(path = %path.display(), error = %e, "Failed to read metrics");
            }
        }

        if let Some(fold_id) = fold_id {
            if let Some(record) = self.find_fold_record(run_dir, fold_id) {
                metrics.coverage_p10 = record.pinball_p10.map(|p| 1.0 - p);
                metrics.coverage_p90 = record.coverage;
            }
        }

        metrics
    }

    /// Legacy `{history, forecast, metrics}` JSON bundle matching
    /// `*<model>*h<horizon>*.json` (prefixed by `*fold<id>*` when a fold is given).
    pub fn load_json_bundle(
        &self,
        model: ModelKind,
        horizon: Horizon,
        fold_id: Option<i64>,
    ) -> Option<RawBundle> {
        let mut parts = Vec::with_capacity(3);
        if let Some(fold_id) = fold_id {
            parts.push(format!("fold{}", fold_id));
        }
        parts.push(model.as_str().to_string());
        parts.push(format!("h{}", horizon));

        let path = self
            .files_named(|name| {
                name.strip_suffix(".json")
                    .map(|stem| contains_in_order(stem, &parts))
                    .unwrap_or(false)
            })
            .into_iter()
            .max_by_key(|p| modified_at(p))?;

        match read_json::<JsonBundleFile>(&path) {
            Ok(file) => {
                debug!(path = %path.display(), "Loaded JSON forecast bundle");
                Some(file.into())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read forecast bundle");
                None
            }
        }
    }

    /// Everything available for one query: a run directory first, then a JSON
    /// bundle, otherwise an empty bundle.
    pub fn resolve(&self, model: ModelKind, horizon: Horizon, fold_id: Option<i64>) -> RawBundle {
        if let Some(run_dir) = self.locate_run(model) {
            let predictions = self.load_predictions(&run_dir, horizon, fold_id);
            if !predictions.is_empty() {
                let metrics = self.load_metrics(&run_dir, horizon, fold_id);
                return RawBundle {
                    history: predictions.history,
                    forecast: predictions.forecast,
                    metrics,
                };
            }
            debug!(run_dir = %run_dir.display(), "Run directory has no usable predictions");
        }

        self.load_json_bundle(model, horizon, fold_id).unwrap_or_default()
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn files_named<F>(&self, matches: F) -> Vec<PathBuf>
    where
        F: Fn(&str) -> bool,
    {
        WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name().to_str().map(&matches).unwrap_or(false))
            .map(|e| e.into_path())
            .collect()
    }

    /// `folds.json` next to the run wins over any other one in the tree.
    fn find_fold_record(&self, run_dir: &Path, fold_id: i64) -> Option<FoldRecord> {
        let local = run_dir.join(FOLDS_FILENAME);
        let mut candidates = vec![local.clone()];
        candidates.extend(
            self.files_named(|name| name == FOLDS_FILENAME)
                .into_iter()
                .filter(|p| *p != local),
        );

        candidates
            .into_iter()
            .filter(|p| p.is_file())
            .filter_map(|p| read_fold_records(&p).ok())
            .flatten()
            .find(|r| r.fold == Some(fold_id))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn read_fold_records(path: &Path) -> Result<Vec<FoldRecord>, ArtifactError> {
    let value: Value = read_json(path)?;
    let items = match &value {
        Value::Object(map) => map.get("folds").and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };

    Ok(items
        .map(|items| items.iter().filter_map(FoldRecord::from_value).collect())
        .unwrap_or_default())
}

fn read_report_folds(path: &Path) -> Result<Vec<i64>, ArtifactError> {
    let value: Value = read_json(path)?;
    let fold_of = |v: &Value| v.get("fold_id").and_then(value_as_i64);

    Ok(match &value {
        Value::Object(_) => fold_of(&value).into_iter().collect(),
        Value::Array(items) => items.iter().filter_map(fold_of).collect(),
        _ => Vec::new(),
    })
}

fn read_prediction_folds(path: &Path) -> Result<Vec<i64>, ArtifactError> {
    let mut reader = csv_reader(path)?;
    Ok(reader
        .deserialize::<PredictionRecord>()
        .filter_map(|row| row.ok())
        .filter_map(|row| row.fold.as_deref().and_then(parse_i64))
        .collect())
}

fn read_predictions(
    path: &Path,
    horizon: Horizon,
    fold_id: Option<i64>,
) -> Result<PredictionSet, ArtifactError> {
    let mut reader = csv_reader(path)?;
    let mut set = PredictionSet::default();
    let max_step = i64::from(horizon.steps());

    for row in reader.deserialize::<PredictionRecord>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Dropping malformed prediction row");
                continue;
            }
        };

        if let Some(fold_id) = fold_id {
            if cell_i64(&row.fold) != Some(fold_id) {
                continue;
            }
        }

        if let Some(value) = cell_f64(&row.y_true) {
            set.history.push(HistoryPoint {
                timestamp: row.timestamp.clone().unwrap_or_default(),
                value,
            });
        }

        let Some(p50) = cell_f64(&row.y_pred_p50) else {
            continue;
        };
        let within_horizon = cell_i64(&row.horizon_step)
            .map(|step| step <= max_step)
            .unwrap_or(false);
        if within_horizon {
            set.forecast.push(RawForecastRow {
                timestamp: row.timestamp,
                p10: cell_f64(&row.y_pred_p10),
                p50: Some(p50),
                p90: cell_f64(&row.y_pred_p90),
                ..RawForecastRow::default()
            });
        }
    }

    Ok(set)
}

fn accumulate_metrics(
    path: &Path,
    horizon: Horizon,
    fold_id: Option<i64>,
    metrics: &mut RawMetrics,
) -> Result<(), ArtifactError> {
    let mut reader = csv_reader(path)?;
    let max_step = i64::from(horizon.steps());

    for row in reader.deserialize::<MetricsRecord>() {
        let Ok(row) = row else {
            continue;
        };
        if let Some(fold_id) = fold_id {
            if cell_i64(&row.fold) != Some(fold_id) {
                continue;
            }
        }
        if !cell_i64(&row.horizon_step).map(|s| s <= max_step).unwrap_or(false) {
            continue;
        }
        if let Some(mae) = cell_f64(&row.mae) {
            metrics.mae_per_step.push(mae);
        }
        if let Some(rmse) = cell_f64(&row.rmse) {
            metrics.rmse_per_step.push(rmse);
        }
    }

    Ok(())
}

/// `metrics_*.csv` directly inside `run_dir`, in name order.
fn metrics_files(run_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(run_dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(METRICS_PREFIX) && n.ends_with(".csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn csv_reader(path: &Path) -> Result<csv::Reader<File>, ArtifactError> {
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn cell_f64(cell: &Option<String>) -> Option<f64> {
    cell.as_deref().and_then(parse_f64)
}

fn cell_i64(cell: &Option<String>) -> Option<i64> {
    cell.as_deref().and_then(parse_i64)
}

fn squash(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Glob-style `*a*b*c*` test.
fn contains_in_order(haystack: &str, parts: &[String]) -> bool {
    let mut rest = haystack;
    for part in parts {
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}

fn modified_at(path: &Path) -> SystemTime {
    path.metadata()
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squash() {
        assert_eq!(squash("Seq2Seq-Attention_Quantile"), "seq2seqattentionquantile");
    }

    #[test]
    fn test_contains_in_order() {
        let parts = vec!["fold2".to_string(), "arima".to_string(), "h7".to_string()];
        assert!(contains_in_order("run_fold2_arima_h7", &parts));
        assert!(!contains_in_order("run_arima_fold2_h7", &parts));
        assert!(!contains_in_order("fold2_arima_h14", &parts));
    }
}

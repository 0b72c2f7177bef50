//! Raw artifact shapes
//!
//! Producers are not consistent about field names or types, so everything here is
//! optional and numeric fields accept numbers, numeric strings or null. Values that
//! cannot be read as a finite number are treated as absent.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::HistoryPoint;

/// One forecast row as found on disk, before quantile reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawForecastRow {
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub p10: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub p50: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub p90: Option<f64>,
    #[serde(rename = "quantile_0.1", deserialize_with = "lenient_f64")]
    pub quantile_10: Option<f64>,
    #[serde(rename = "quantile_0.5", deserialize_with = "lenient_f64")]
    pub quantile_50: Option<f64>,
    #[serde(rename = "quantile_0.9", deserialize_with = "lenient_f64")]
    pub quantile_90: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub lower: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub upper: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub mean: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub forecast: Option<f64>,
}

/// History entry from a JSON bundle; only kept when both fields are readable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawHistoryPoint {
    #[serde(deserialize_with = "lenient_string")]
    timestamp: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    value: Option<f64>,
}

/// Metrics as far as the artifact provided them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawMetrics {
    #[serde(deserialize_with = "lenient_f64_vec")]
    pub mae_per_step: Vec<f64>,
    #[serde(deserialize_with = "lenient_f64_vec")]
    pub rmse_per_step: Vec<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub coverage_p10: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub coverage_p90: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub overall_mae: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub overall_rmse: Option<f64>,
}

impl RawMetrics {
    /// True when the artifact supplied no metric at all.
    pub fn is_empty(&self) -> bool {
        self.mae_per_step.is_empty()
            && self.rmse_per_step.is_empty()
            && self.coverage_p10.is_none()
            && self.coverage_p90.is_none()
            && self.overall_mae.is_none()
            && self.overall_rmse.is_none()
    }
}

/// Everything the resolver could find for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBundle {
    pub history: Vec<HistoryPoint>,
    pub forecast: Vec<RawForecastRow>,
    pub metrics: RawMetrics,
}

impl RawBundle {
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() || self.forecast.is_empty()
    }
}

/// `{history, forecast, metrics}` as written by older producers.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct JsonBundleFile {
    history: Vec<RawHistoryPoint>,
    forecast: Vec<RawForecastRow>,
    #[serde(deserialize_with = "lenient_metrics")]
    metrics: RawMetrics,
}

impl From<JsonBundleFile> for RawBundle {
    fn from(file: JsonBundleFile) -> Self {
        let history = file
            .history
            .into_iter()
            .filter_map(|h| {
                Some(HistoryPoint {
                    timestamp: h.timestamp?,
                    value: h.value?,
                })
            })
            .collect();

        Self {
            history,
            forecast: file.forecast,
            metrics: file.metrics,
        }
    }
}

/// Read a finite number out of a JSON value.
pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Read an integer, accepting integral floats such as `3.0`.
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => parse_i64(s),
        _ => None,
    }
}

/// Parse a CSV cell as a finite number; blank cells are absent.
pub(crate) fn parse_f64(raw: &str) -> Option<f64> {
    let n = raw.trim().parse::<f64>().ok()?;
    n.is_finite().then_some(n)
}

/// Parse a CSV cell as an integer, accepting `3` and `3.0`.
pub(crate) fn parse_i64(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(integral))
}

fn integral(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0).then_some(n as i64)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64))
}

fn lenient_f64_vec<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_as_f64).collect(),
        _ => Vec::new(),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_metrics<'de, D>(deserializer: D) -> Result<RawMetrics, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(v @ Value::Object(_)) => serde_json::from_value(v).unwrap_or_default(),
        _ => RawMetrics::default(),
    })
}

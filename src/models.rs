use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ForecastError;

/// Forecast model families served by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Point-estimate model; intervals are synthesized around the mean
    Arima,
    /// Quantile-native model; artifacts already carry p10/p50/p90
    Seq2seqAttentionQuantile,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Arima, ModelKind::Seq2seqAttentionQuantile];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Arima => "arima",
            ModelKind::Seq2seqAttentionQuantile => "seq2seq_attention_quantile",
        }
    }

    /// Whether artifacts of this family carry their own quantiles.
    pub fn is_quantile_native(&self) -> bool {
        matches!(self, ModelKind::Seq2seqAttentionQuantile)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("Invalid model: {}", s)))
    }
}

/// Forecast horizon in steps. Only the values in [`Horizon::SUPPORTED`] exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Horizon(u32);

impl Horizon {
    pub const SUPPORTED: [u32; 4] = [1, 7, 14, 30];

    pub fn steps(&self) -> u32 {
        self.0
    }

    /// Step count as a slice length.
    pub fn step_count(&self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<i64> for Horizon {
    type Error = ForecastError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Horizon::SUPPORTED
            .into_iter()
            .find(|&h| i64::from(h) == value)
            .map(Horizon)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("Invalid horizon: {}", value)))
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One observed value of the series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: String,
    pub value: f64,
}

/// One forecast step expressed as quantiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: Option<String>,
    pub p10: Option<f64>,
    pub p50: f64,
    pub p90: Option<f64>,
}

/// Accuracy and calibration summary, per step and overall
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub mae_per_step: Vec<f64>,
    pub rmse_per_step: Vec<f64>,
    pub coverage_p10: f64,
    pub coverage_p90: f64,
    pub overall_mae: f64,
    pub overall_rmse: f64,
}

/// Where a served bundle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Normalized from an artifact on disk
    Artifact,
    /// Produced by the mock generator because no artifact was usable
    Synthetic,
}

/// Canonical forecast payload
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastBundle {
    pub history: Vec<HistoryPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub metrics: MetricsSummary,
    pub source: DataSource,
}

impl ForecastBundle {
    /// Timestamp of the last observed point, where the forecast starts.
    pub fn forecast_origin(&self) -> Option<&str> {
        self.history.last().map(|h| h.timestamp.as_str())
    }
}

/// Body of `POST /forecast/query`
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub history: Vec<HistoryPoint>,
    pub forecast_origin: Option<String>,
    pub forecast: Vec<ForecastPoint>,
    pub metrics: MetricsSummary,
    pub source: DataSource,
}

impl From<ForecastBundle> for ForecastResponse {
    fn from(bundle: ForecastBundle) -> Self {
        let forecast_origin = bundle.forecast_origin().map(str::to_string);
        Self {
            history: bundle.history,
            forecast_origin,
            forecast: bundle.forecast,
            metrics: bundle.metrics,
            source: bundle.source,
        }
    }
}

/// A series the dashboard can display
#[derive(Debug, Clone, Serialize)]
pub struct SeriesInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesMetadata {
    pub dataset_name: String,
    pub series: Vec<SeriesInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("arima".parse::<ModelKind>().unwrap(), ModelKind::Arima);
        assert_eq!(
            "seq2seq_attention_quantile".parse::<ModelKind>().unwrap(),
            ModelKind::Seq2seqAttentionQuantile
        );

        match "prophet".parse::<ModelKind>() {
            Err(ForecastError::InvalidParameter(msg)) => assert!(msg.contains("prophet")),
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_model_kind_serializes_as_wire_name() {
        let json = serde_json::to_string(&ModelKind::Seq2seqAttentionQuantile).unwrap();
        assert_eq!(json, "\"seq2seq_attention_quantile\"");
    }

    #[test]
    fn test_horizon_validation() {
        for h in [1, 7, 14, 30] {
            let horizon = Horizon::try_from(h).unwrap();
            assert_eq!(horizon.steps() as i64, h);
            assert_eq!(horizon.step_count(), h as usize);
        }
        for h in [0, 5, -7, 31] {
            assert!(matches!(
                Horizon::try_from(h),
                Err(ForecastError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_forecast_origin_is_last_history_timestamp() {
        let bundle = ForecastBundle {
            history: vec![
                HistoryPoint { timestamp: "2024-01-01".into(), value: 1.0 },
                HistoryPoint { timestamp: "2024-01-02".into(), value: 2.0 },
            ],
            forecast: vec![],
            metrics: MetricsSummary::default(),
            source: DataSource::Artifact,
        };

        let response = ForecastResponse::from(bundle);
        assert_eq!(response.forecast_origin.as_deref(), Some("2024-01-02"));
    }
}

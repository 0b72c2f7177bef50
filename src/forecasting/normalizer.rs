//! Forecast normalization
//!
//! Turns a [`RawBundle`] into the canonical quantile schema. Quantile-native
//! models are read through ordered extraction rules; point models get a
//! symmetric interval synthesized around their mean. Metrics the artifact did
//! not supply are computed from the aligned history.

use tracing::debug;

use crate::artifacts::{RawBundle, RawForecastRow, RawMetrics};
use crate::models::{
    DataSource, ForecastBundle, ForecastPoint, HistoryPoint, Horizon, MetricsSummary, ModelKind,
};

/// z-score of the 10th/90th percentile of a standard normal
pub const Z_80: f64 = 1.28;

/// Relative standard deviation assumed for point forecasts
pub const POINT_FORECAST_REL_STD: f64 = 0.10;

type Rule = fn(&RawForecastRow) -> Option<f64>;

const P10_RULES: &[Rule] = &[|r| r.p10, |r| r.quantile_10, |r| r.lower];
const P50_RULES: &[Rule] = &[|r| r.p50, |r| r.quantile_50, |r| r.mean, |r| r.forecast];
const P90_RULES: &[Rule] = &[|r| r.p90, |r| r.quantile_90, |r| r.upper];
const POINT_MEAN_RULES: &[Rule] = &[|r| r.forecast, |r| r.mean, |r| r.p50];

/// First rule that yields a value wins.
fn first_present(row: &RawForecastRow, rules: &[Rule]) -> Option<f64> {
    rules.iter().find_map(|rule| rule(row))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastNormalizer;

impl ForecastNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Canonical bundle for `raw`, or `None` when it has no history or no
    /// usable forecast rows.
    pub fn normalize(
        &self,
        model: ModelKind,
        horizon: Horizon,
        raw: RawBundle,
    ) -> Option<ForecastBundle> {
        if raw.history.is_empty() {
            return None;
        }

        let forecast: Vec<ForecastPoint> = raw
            .forecast
            .iter()
            .filter_map(|row| reconcile(model, row))
            .take(horizon.step_count())
            .collect();

        if forecast.is_empty() {
            debug!(model = %model, horizon = %horizon, "No forecast rows survived reconciliation");
            return None;
        }

        let metrics = complete_metrics(raw.metrics, &raw.history, &forecast, horizon);

        Some(ForecastBundle {
            history: raw.history,
            forecast,
            metrics,
            source: DataSource::Artifact,
        })
    }
}

/// One raw row to a forecast point, per model family.
pub fn reconcile(model: ModelKind, row: &RawForecastRow) -> Option<ForecastPoint> {
    let point = if model.is_quantile_native() {
        ForecastPoint {
            timestamp: row.timestamp.clone(),
            p10: first_present(row, P10_RULES),
            p50: first_present(row, P50_RULES)?,
            p90: first_present(row, P90_RULES),
        }
    } else {
        let mean = first_present(row, POINT_MEAN_RULES)?;
        let spread = Z_80 * POINT_FORECAST_REL_STD * mean.abs();
        ForecastPoint {
            timestamp: row.timestamp.clone(),
            p10: Some(mean - spread),
            p50: mean,
            p90: Some(mean + spread),
        }
    };

    Some(enforce_order(point))
}

/// Clamp the outer quantiles so `p10 <= p50 <= p90`.
fn enforce_order(mut point: ForecastPoint) -> ForecastPoint {
    if let Some(p10) = point.p10 {
        if p10 > point.p50 {
            debug!(p10, p50 = point.p50, "Clamping crossed p10");
            point.p10 = Some(point.p50);
        }
    }
    if let Some(p90) = point.p90 {
        if p90 < point.p50 {
            debug!(p90, p50 = point.p50, "Clamping crossed p90");
            point.p90 = Some(point.p50);
        }
    }
    point
}

// =============================================================================
// METRICS
// =============================================================================

/// Fill every metric the artifact left out from the backfill, then derive the
/// overall values from the final per-step arrays where they are still missing.
fn complete_metrics(
    raw: RawMetrics,
    history: &[HistoryPoint],
    forecast: &[ForecastPoint],
    horizon: Horizon,
) -> MetricsSummary {
    let computed = backfill_metrics(history, forecast);

    if raw.is_empty() {
        return computed;
    }

    let mut mae_per_step = if raw.mae_per_step.is_empty() {
        computed.mae_per_step
    } else {
        raw.mae_per_step
    };
    let mut rmse_per_step = if raw.rmse_per_step.is_empty() {
        computed.rmse_per_step
    } else {
        raw.rmse_per_step
    };
    mae_per_step.truncate(horizon.step_count());
    rmse_per_step.truncate(horizon.step_count());

    MetricsSummary {
        overall_mae: raw.overall_mae.unwrap_or_else(|| mean(&mae_per_step)),
        overall_rmse: raw.overall_rmse.unwrap_or_else(|| root_mean_square(&rmse_per_step)),
        coverage_p10: raw.coverage_p10.unwrap_or(computed.coverage_p10),
        coverage_p90: raw.coverage_p90.unwrap_or(computed.coverage_p90),
        mae_per_step,
        rmse_per_step,
    }
}

/// Metrics from the last `forecast.len()` history points aligned with p50 by
/// position. Coverage needs a full window and is 0 otherwise.
pub fn backfill_metrics(history: &[HistoryPoint], forecast: &[ForecastPoint]) -> MetricsSummary {
    let window = &history[history.len().saturating_sub(forecast.len())..];

    let errors: Vec<f64> = window
        .iter()
        .zip(forecast)
        .map(|(actual, point)| actual.value - point.p50)
        .collect();

    let mae_per_step: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
    let rmse_per_step: Vec<f64> = errors.iter().map(|e| (e * e).sqrt()).collect();

    let (coverage_p10, coverage_p90) = if !forecast.is_empty() && window.len() == forecast.len() {
        let n = forecast.len() as f64;
        let below = window
            .iter()
            .zip(forecast)
            .filter(|(a, p)| p.p10.map(|q| q <= a.value).unwrap_or(false))
            .count();
        let above = window
            .iter()
            .zip(forecast)
            .filter(|(a, p)| p.p90.map(|q| a.value <= q).unwrap_or(false))
            .count();
        (below as f64 / n, above as f64 / n)
    } else {
        (0.0, 0.0)
    };

    MetricsSummary {
        overall_mae: mean(&mae_per_step),
        overall_rmse: root_mean_square(&rmse_per_step),
        mae_per_step,
        rmse_per_step,
        coverage_p10,
        coverage_p90,
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn root_mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

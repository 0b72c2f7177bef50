//! Synthetic forecast bundles
//!
//! Served whenever no usable artifact exists so the dashboard always has
//! something to draw. The series is a noisy sine wave; the forecast continues
//! it with a mild trend and an 80% interval of ±1.28·15%.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

use crate::error::ForecastError;
use crate::forecasting::normalizer::{mean, root_mean_square, Z_80};
use crate::models::{
    DataSource, ForecastBundle, ForecastPoint, HistoryPoint, Horizon, MetricsSummary, ModelKind,
};

pub const HISTORY_POINTS: usize = 80;

const BASE_LEVEL: f64 = 100.0;
const HISTORY_AMPLITUDE: f64 = 10.0;
const FORECAST_AMPLITUDE: f64 = 5.0;
const TREND_PER_STEP: f64 = 0.5;
const REL_STD: f64 = 0.15;
const COVERAGE_P10: f64 = 0.85;
const COVERAGE_P90: f64 = 0.92;

pub struct MockGenerator {
    history_noise: Normal,
    forecast_noise: Normal,
    mae: Normal,
    rmse: Normal,
}

impl MockGenerator {
    pub fn new() -> Result<Self, ForecastError> {
        let normal = |mean: f64, std_dev: f64| {
            Normal::new(mean, std_dev).map_err(|e| ForecastError::Internal(e.to_string()))
        };

        Ok(Self {
            history_noise: normal(0.0, 2.0)?,
            forecast_noise: normal(0.0, 1.0)?,
            mae: normal(2.0, 0.5)?,
            rmse: normal(2.5, 0.5)?,
        })
    }

    /// Synthetic bundle ending at the current time.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        model: ModelKind,
        horizon: Horizon,
        rng: &mut R,
    ) -> ForecastBundle {
        self.generate_at(model, horizon, Utc::now(), rng)
    }

    /// Synthetic bundle whose last history point is `now`.
    pub fn generate_at<R: Rng + ?Sized>(
        &self,
        model: ModelKind,
        horizon: Horizon,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> ForecastBundle {
        let start = now - Duration::days(HISTORY_POINTS as i64 - 1);

        let history: Vec<HistoryPoint> = (0..HISTORY_POINTS)
            .map(|i| HistoryPoint {
                timestamp: (start + Duration::days(i as i64)).to_rfc3339(),
                value: BASE_LEVEL
                    + HISTORY_AMPLITUDE * (i as f64 / 10.0).sin()
                    + self.history_noise.sample(rng),
            })
            .collect();

        let last_value = history.last().map(|h| h.value).unwrap_or(BASE_LEVEL);

        let forecast: Vec<ForecastPoint> = (0..horizon.step_count())
            .map(|i| {
                let seasonal = FORECAST_AMPLITUDE * ((HISTORY_POINTS + i) as f64 / 10.0).sin();
                let p50 = last_value
                    + TREND_PER_STEP * i as f64
                    + seasonal
                    + self.forecast_noise.sample(rng);
                let spread = Z_80 * (REL_STD * p50).abs();

                ForecastPoint {
                    timestamp: Some((now + Duration::days(i as i64 + 1)).to_rfc3339()),
                    p10: Some(p50 - spread),
                    p50,
                    p90: Some(p50 + spread),
                }
            })
            .collect();

        let mae_per_step: Vec<f64> = (0..horizon.step_count()).map(|_| self.mae.sample(rng).abs()).collect();
        let rmse_per_step: Vec<f64> = (0..horizon.step_count()).map(|_| self.rmse.sample(rng).abs()).collect();

        tracing::debug!(model = %model, horizon = %horizon, "Generated synthetic forecast");

        ForecastBundle {
            history,
            forecast,
            metrics: MetricsSummary {
                overall_mae: mean(&mae_per_step),
                overall_rmse: root_mean_square(&rmse_per_step),
                mae_per_step,
                rmse_per_step,
                coverage_p10: COVERAGE_P10,
                coverage_p90: COVERAGE_P90,
            },
            source: DataSource::Synthetic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn generator() -> MockGenerator {
        MockGenerator::new().unwrap()
    }

    #[test]
    fn test_shape_for_every_horizon() {
        let gen = generator();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for h in Horizon::SUPPORTED {
            let horizon = Horizon::try_from(i64::from(h)).unwrap();
            let bundle = gen.generate(ModelKind::Arima, horizon, &mut rng);

            assert_eq!(bundle.history.len(), HISTORY_POINTS);
            assert_eq!(bundle.forecast.len(), h as usize);
            assert_eq!(bundle.metrics.mae_per_step.len(), h as usize);
            assert_eq!(bundle.metrics.rmse_per_step.len(), h as usize);
            assert_eq!(bundle.source, DataSource::Synthetic);
        }
    }

    #[test]
    fn test_intervals_and_metrics_are_sane() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let bundle = generator().generate(
            ModelKind::Seq2seqAttentionQuantile,
            Horizon::try_from(30).unwrap(),
            &mut rng,
        );

        for p in &bundle.forecast {
            assert!(p.p10.unwrap() <= p.p50);
            assert!(p.p50 <= p.p90.unwrap());
        }
        assert!(bundle.metrics.mae_per_step.iter().all(|v| *v >= 0.0));
        assert_eq!(bundle.metrics.coverage_p10, 0.85);
        assert_eq!(bundle.metrics.coverage_p90, 0.92);
        assert!((bundle.metrics.overall_mae - mean(&bundle.metrics.mae_per_step)).abs() < 1e-12);
    }

    #[test]
    fn test_timeline_is_daily_and_continues_after_history() {
        let now = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let bundle = generator().generate_at(ModelKind::Arima, Horizon::try_from(7).unwrap(), now, &mut rng);

        assert_eq!(bundle.forecast_origin(), Some(now.to_rfc3339().as_str()));
        let first = DateTime::parse_from_rfc3339(&bundle.history[0].timestamp).unwrap();
        assert_eq!((now - first.with_timezone(&Utc)).num_days(), 79);
        let next = bundle.forecast[0].timestamp.as_deref().unwrap();
        assert_eq!(next, (now + Duration::days(1)).to_rfc3339());
    }

    #[test]
    fn test_seeded_output_is_reproducible() {
        let gen = generator();
        let horizon = Horizon::try_from(14).unwrap();
        let now = Utc::now();

        let a = gen.generate_at(ModelKind::Arima, horizon, now, &mut ChaCha8Rng::seed_from_u64(9));
        let b = gen.generate_at(ModelKind::Arima, horizon, now, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}

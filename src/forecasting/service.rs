use serde::Deserialize;
use tracing::{debug, info};

use crate::artifacts::ArtifactResolver;
use crate::error::ForecastError;
use crate::forecasting::mock::MockGenerator;
use crate::forecasting::normalizer::ForecastNormalizer;
use crate::models::{ForecastBundle, Horizon, ModelKind, SeriesInfo, SeriesMetadata};

/// Query as received from the dashboard; validated by [`ForecastingService::get_forecast`].
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastQuery {
    pub model: String,
    pub horizon: i64,
    #[serde(default)]
    pub fold_id: Option<i64>,
    /// Accepted for compatibility; the dashboard applies overlays client side
    #[serde(default)]
    pub overlay_mode: Option<bool>,
}

impl ForecastQuery {
    pub fn validate(&self) -> Result<(ModelKind, Horizon), ForecastError> {
        let model = self.model.parse::<ModelKind>()?;
        let horizon = Horizon::try_from(self.horizon)?;
        Ok((model, horizon))
    }
}

/// Resolver, normalizer and mock fallback wired together.
pub struct ForecastingService {
    resolver: ArtifactResolver,
    normalizer: ForecastNormalizer,
    mock: MockGenerator,
}

impl ForecastingService {
    pub fn new(resolver: ArtifactResolver) -> Result<Self, ForecastError> {
        Ok(Self {
            resolver,
            normalizer: ForecastNormalizer::new(),
            mock: MockGenerator::new()?,
        })
    }

    pub fn resolver(&self) -> &ArtifactResolver {
        &self.resolver
    }

    /// Blocking: walks the reports tree. Call from `spawn_blocking`.
    pub fn get_forecast(&self, query: &ForecastQuery) -> Result<ForecastBundle, ForecastError> {
        let (model, horizon) = query.validate()?;

        let raw = self.resolver.resolve(model, horizon, query.fold_id);
        if let Some(bundle) = self.normalizer.normalize(model, horizon, raw) {
            info!(
                model = %model,
                horizon = %horizon,
                fold_id = ?query.fold_id,
                points = bundle.forecast.len(),
                "Serving artifact forecast"
            );
            return Ok(bundle);
        }

        debug!(model = %model, horizon = %horizon, fold_id = ?query.fold_id, "No usable artifact, serving synthetic forecast");
        Ok(self.mock.generate(model, horizon, &mut rand::thread_rng()))
    }

    pub fn series_metadata(&self) -> SeriesMetadata {
        SeriesMetadata {
            dataset_name: "default_series".to_string(),
            series: vec![SeriesInfo {
                id: "series_1".to_string(),
                name: "Default Time Series".to_string(),
                description: "Main forecasting series".to_string(),
            }],
        }
    }
}

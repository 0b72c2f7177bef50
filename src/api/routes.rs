use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::ForecastError;
use crate::forecasting::{ForecastQuery, ForecastingService};
use crate::models::{ForecastResponse, Horizon, ModelKind, SeriesMetadata};
use crate::runs::{Run, RunOrchestrator, RunStatus};

/// Quantile levels every forecast carries
pub const QUANTILES: [f64; 3] = [0.1, 0.5, 0.9];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub forecasting: Arc<ForecastingService>,
    pub runs: Arc<RunOrchestrator>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/config", get(get_config))
        .route("/forecast/series", get(get_series))
        .route("/forecast/query", post(query_forecast))
        .route("/runs/start", post(start_run))
        .route("/runs/:run_id/stream", get(stream_run))
        .route("/runs/:run_id/status", get(get_run_status))
        .with_state(state)
}

// ===== Route Handlers =====

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Forecast Dashboard API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Models, horizons, quantiles and the folds found on disk
async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigResponse>, ApiError> {
    let forecasting = state.forecasting.clone();
    let folds_available =
        tokio::task::spawn_blocking(move || forecasting.resolver().discover_folds()).await?;

    Ok(Json(ConfigResponse {
        models: ModelKind::ALL.to_vec(),
        horizons: Horizon::SUPPORTED.to_vec(),
        quantiles: QUANTILES.to_vec(),
        folds_available,
    }))
}

async fn get_series(State(state): State<AppState>) -> Json<SeriesMetadata> {
    Json(state.forecasting.series_metadata())
}

/// Forecast for one model/horizon/fold, synthetic when no artifact is usable
async fn query_forecast(
    State(state): State<AppState>,
    Json(query): Json<ForecastQuery>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let forecasting = state.forecasting.clone();
    let bundle =
        tokio::task::spawn_blocking(move || forecasting.get_forecast(&query)).await??;

    Ok(Json(bundle.into()))
}

async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> Result<Json<StartRunResponse>, ApiError> {
    let model = req.model.parse::<ModelKind>()?;
    let horizon = Horizon::try_from(req.horizon)?;

    let run_id = state.runs.start_run(model, horizon, req.fold_id);

    Ok(Json(StartRunResponse {
        run_id,
        status: RunStatus::Queued,
    }))
}

/// Server-sent events for one run: its full history, then live updates
async fn stream_run(State(state): State<AppState>, Path(run_id): Path<String>) -> impl IntoResponse {
    info!(run_id = %run_id, "Run stream opened");

    let events = state
        .runs
        .stream_run(&run_id)
        .map(|event| Event::default().json_data(event));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

async fn get_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Run>, ApiError> {
    state
        .runs
        .status(&run_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))
}

// ===== Request/Response Types =====

#[derive(Serialize)]
struct ConfigResponse {
    models: Vec<ModelKind>,
    horizons: Vec<u32>,
    quantiles: Vec<f64>,
    folds_available: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct StartRunRequest {
    model: String,
    horizon: i64,
    #[serde(default)]
    fold_id: Option<i64>,
}

#[derive(Serialize)]
struct StartRunResponse {
    run_id: String,
    status: RunStatus,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::InvalidParameter(msg) => ApiError::BadRequest(msg),
            ForecastError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(json!({ "detail": message }))).into_response()
    }
}

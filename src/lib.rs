//! Forecast Lab Backend Library
//!
//! Serves pre-computed forecast artifacts to the dashboard and runs simulated
//! evaluations whose progress is streamed as server-sent events.
//! The binary in `main.rs` only wires configuration, logging and the router.

pub mod api;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod forecasting;
pub mod middleware;
pub mod models;
pub mod runs;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::AppState;
use crate::artifacts::ArtifactResolver;
use crate::config::AppConfig;
use crate::error::ForecastError;
use crate::forecasting::ForecastingService;
use crate::runs::RunOrchestrator;

/// Shared state for `config`.
pub fn build_state(config: &AppConfig) -> Result<AppState, ForecastError> {
    let resolver = ArtifactResolver::new(config.reports_dir.clone());
    Ok(AppState {
        forecasting: Arc::new(ForecastingService::new(resolver)?),
        runs: Arc::new(RunOrchestrator::simulated(
            config.run_step_delay,
            config.retention,
        )),
    })
}

/// Full application: routes plus logging, tracing and CORS layers.
pub fn build_app(config: &AppConfig) -> Result<Router, ForecastError> {
    let state = build_state(config)?;

    Ok(api::create_router(state)
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(api::cors_layer(config.cors_origins.as_deref())))
}

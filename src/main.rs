//! Forecast Lab API server
//!
//! Usage:
//!   forecast-lab --reports-dir ./reports --bind 0.0.0.0:8001
//!
//! Environment:
//!   FORECAST_REPORTS_DIR - Artifact root (default: ./reports)
//!   FORECAST_BIND_ADDR - Listen address (default: 0.0.0.0:8001)
//!   FORECAST_CORS_ORIGINS - Comma-separated origins, `*` for any
//!   RUN_STEP_DELAY_MS - Simulated evaluation step delay (default: 500)
//!   RUN_MAX_RETAINED - Run table capacity (default: 1000)
//!   RUN_TERMINAL_TTL_SECS - Finished run retention, 0 to disable (default: 3600)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forecast_lab_backend::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "forecast-lab")]
#[command(about = "Forecast dashboard API - artifact serving and evaluation runs")]
struct Args {
    /// Root directory of evaluation artifacts
    #[arg(long, env = "FORECAST_REPORTS_DIR")]
    reports_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "FORECAST_BIND_ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(dir) = args.reports_dir {
        config.reports_dir = dir;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    config
        .ensure_reports_dir()
        .with_context(|| format!("Failed to create reports dir {}", config.reports_dir.display()))?;

    info!(
        reports_dir = %config.reports_dir.display(),
        step_delay_ms = config.run_step_delay.as_millis() as u64,
        max_runs = config.retention.max_runs,
        cors = ?config.cors_origins,
        "Starting Forecast Lab API"
    );

    let app = forecast_lab_backend::build_app(&config).context("Failed to build application")?;

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forecast_lab_backend=debug,forecast_lab=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // cwd and parents first, then the crate root when run from elsewhere
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

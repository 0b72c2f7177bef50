//! Server configuration
//!
//! Every value has a default and can be overridden from the environment
//! (a `.env` file is honoured by the binary before this is read).

use std::path::PathBuf;
use std::time::Duration;

use crate::runs::RetentionPolicy;

/// Dashboard dev servers allowed by default
const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5173"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root of the artifact tree produced by the evaluation tool
    pub reports_dir: PathBuf,
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Allowed CORS origins; `None` means any origin
    pub cors_origins: Option<Vec<String>>,
    /// Delay between simulated evaluation steps
    pub run_step_delay: Duration,
    /// Bounds on the in-memory run table
    pub retention: RetentionPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("./reports"),
            bind_addr: "0.0.0.0:8001".to_string(),
            cors_origins: Some(DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect()),
            run_step_delay: Duration::from_millis(500),
            retention: RetentionPolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("FORECAST_REPORTS_DIR") {
            if !v.trim().is_empty() {
                config.reports_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("FORECAST_BIND_ADDR") {
            if !v.trim().is_empty() {
                config.bind_addr = v;
            }
        }
        if let Ok(v) = std::env::var("FORECAST_CORS_ORIGINS") {
            config.cors_origins = parse_origins(&v);
        }
        if let Ok(v) = std::env::var("RUN_STEP_DELAY_MS") {
            if let Ok(ms) = v.parse() {
                config.run_step_delay = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("RUN_MAX_RETAINED") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    config.retention.max_runs = n;
                }
            }
        }
        if let Ok(v) = std::env::var("RUN_TERMINAL_TTL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                // 0 disables time-based eviction
                config.retention.terminal_ttl = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }

        config
    }

    /// Create the reports root if it does not exist yet.
    pub fn ensure_reports_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.reports_dir)
    }
}

/// `*` means any origin; otherwise a comma-separated list.
fn parse_origins(raw: &str) -> Option<Vec<String>> {
    if raw.trim() == "*" {
        return None;
    }
    Some(
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

//! Forecast serving
//!
//! Raw artifacts are normalized into the canonical quantile schema; when nothing
//! usable exists the mock generator stands in.

pub mod mock;
pub mod normalizer;
pub mod service;


pub use mock::MockGenerator;
pub use normalizer::ForecastNormalizer;
pub use service::{ForecastQuery, ForecastingService};

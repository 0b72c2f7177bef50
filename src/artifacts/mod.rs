//! Artifact ingestion
//!
//! Reads what the external evaluation tool left under the reports root and hands
//! it to the forecasting layer as loosely-typed [`RawBundle`]s.

pub mod raw;
pub mod resolver;


pub use raw::{RawBundle, RawForecastRow, RawMetrics};
pub use resolver::{ArtifactResolver, FoldRecord, PredictionSet, DEFAULT_FOLDS};

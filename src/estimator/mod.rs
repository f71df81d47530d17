//! Confidence estimation from noisy forecast ensembles.
//!
//! Everything in here is a pure function of its inputs: no I/O, no clock
//! reads, no shared state. Safe to call from any task concurrently.

pub mod blend;
pub mod confidence;
pub mod config;
pub mod ensemble;

pub use blend::{blend, blend_score, BlendConfig};
pub use confidence::{estimate_confidence, raw_score, ConfidenceScore, EventHorizon};
pub use config::{ConfigError, EstimatorConfig};
pub use ensemble::{aggregate, Aggregate, EnsembleSummary, ForecastEnsemble};

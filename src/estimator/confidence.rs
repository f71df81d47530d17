use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::EstimatorConfig;
use super::ensemble::{Aggregate, EnsembleSummary};

/// Estimated probability (percent) that the high outcome occurs.
///
/// `Unreliable` means there was nothing to estimate from; it is not the same
/// thing as a genuine 50% reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ConfidenceScore {
    Reliable(f64),
    Unreliable,
}

impl ConfidenceScore {
    pub const NEUTRAL: f64 = 50.0;

    pub fn value(&self) -> f64 {
        match self {
            ConfidenceScore::Reliable(score) => *score,
            ConfidenceScore::Unreliable => Self::NEUTRAL,
        }
    }

    pub fn is_reliable(&self) -> bool {
        matches!(self, ConfidenceScore::Reliable(_))
    }
}

/// Time remaining until the market resolves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventHorizon {
    hours_until_event: f64,
}

impl EventHorizon {
    /// Negative or non-finite inputs are treated as "event is now".
    pub fn hours(hours_until_event: f64) -> Self {
        let hours_until_event = if hours_until_event.is_finite() {
            hours_until_event.max(0.0)
        } else {
            0.0
        };
        Self { hours_until_event }
    }

    pub fn from_deadline(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let seconds = (deadline - now).num_seconds() as f64;
        Self::hours(seconds / 3600.0)
    }

    pub fn hours_until_event(&self) -> f64 {
        self.hours_until_event
    }

    /// `max(floor, 1 - hours / window)`, never above 1.
    pub fn decay_factor(&self, config: &EstimatorConfig) -> f64 {
        let linear = 1.0 - self.hours_until_event / config.decay_window_hours;
        linear.max(config.decay_floor).min(1.0)
    }
}

/// Pre-clamp score: `neutral + deviation * k_dev - spread * k_spread`.
pub fn raw_score(summary: &EnsembleSummary, baseline: f64, config: &EstimatorConfig) -> f64 {
    let deviation = summary.average - baseline;
    config.neutral + deviation * config.k_dev - summary.spread * config.k_spread
}

pub fn estimate_confidence(
    aggregate: &Aggregate,
    baseline: f64,
    config: &EstimatorConfig,
    horizon: Option<EventHorizon>,
) -> ConfidenceScore {
    let summary = match aggregate {
        Aggregate::Summary(summary) => summary,
        Aggregate::NoData => return ConfidenceScore::Unreliable,
    };

    let raw = raw_score(summary, baseline, config);
    if !raw.is_finite() {
        return ConfidenceScore::Unreliable;
    }

    let mut score = raw.clamp(config.low, config.high);
    if let Some(horizon) = horizon {
        score = (score * horizon.decay_factor(config)).clamp(config.low, config.high);
    }

    ConfidenceScore::Reliable(score)
}

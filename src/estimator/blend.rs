use serde::Deserialize;

use super::confidence::ConfidenceScore;
use super::config::ConfigError;
use crate::data::types::{NowcastKind, NowcastSignal};

/// Convex weights for mixing the temperature score with nowcast signals.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub base_weight: f64,
    pub precipitation_weight: f64,
    pub storm_weight: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            base_weight: 0.6,
            precipitation_weight: 0.15,
            storm_weight: 0.15,
        }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("base_weight", self.base_weight),
            ("precipitation_weight", self.precipitation_weight),
            ("storm_weight", self.storm_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
            if value < 0.0 {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }

        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        // small tolerance so 0.6 + 0.2 + 0.2 is accepted
        if total > 1.0 + 1e-9 {
            return Err(ConfigError::WeightsExceedOne(total));
        }
        Ok(())
    }

    pub fn weight_for(&self, kind: NowcastKind) -> f64 {
        match kind {
            NowcastKind::Precipitation => self.precipitation_weight,
            NowcastKind::Storm => self.storm_weight,
        }
    }

    /// Blend a confidence score with whatever nowcasts are available.
    ///
    /// With no signals the score passes through untouched; an unreliable
    /// score stays unreliable.
    pub fn apply(&self, score: ConfidenceScore, signals: &[NowcastSignal]) -> ConfidenceScore {
        blend_score(score, self, signals)
    }
}

/// `raw * base_weight + Σ weight_i * pct_i`, re-clamped to [0, 100].
///
/// Negative or non-finite weights and non-finite percentages contribute
/// nothing; a non-finite raw score is treated as 0.
pub fn blend(raw_score: f64, base_weight: f64, aux_signals: &[(f64, f64)]) -> f64 {
    let usable = |w: f64| w.is_finite() && w > 0.0;

    let mut total = if raw_score.is_finite() && usable(base_weight) {
        raw_score * base_weight
    } else {
        0.0
    };

    for &(weight, percentage) in aux_signals {
        if usable(weight) && percentage.is_finite() {
            total += weight * percentage;
        }
    }

    if total.is_finite() {
        total.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn blend_score(
    score: ConfidenceScore,
    config: &BlendConfig,
    signals: &[NowcastSignal],
) -> ConfidenceScore {
    match score {
        ConfidenceScore::Unreliable => ConfidenceScore::Unreliable,
        ConfidenceScore::Reliable(_) if signals.is_empty() => score,
        ConfidenceScore::Reliable(raw) => {
            let aux: Vec<(f64, f64)> = signals
                .iter()
                .map(|s| (config.weight_for(s.kind), s.percentage()))
                .collect();
            ConfidenceScore::Reliable(blend(raw, config.base_weight, &aux))
        }
    }
}

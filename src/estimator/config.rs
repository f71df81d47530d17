use serde::Deserialize;

/// Tunable constants for the confidence heuristic.
///
/// Defaults are the values the dashboards shipped with. None of them were
/// calibrated, so everything is overridable from `[estimator]` in config.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Points of confidence per °F the ensemble mean sits above baseline.
    pub k_dev: f64,
    /// Points of confidence lost per °F of ensemble spread.
    pub k_spread: f64,
    pub low: f64,
    pub high: f64,
    /// Starting point of the raw score. Unreliable scores always report
    /// `ConfidenceScore::NEUTRAL` (50), whatever this is set to.
    pub neutral: f64,
    pub decay_floor: f64,
    pub decay_window_hours: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            k_dev: 3.0,
            k_spread: 2.0,
            low: 10.0,
            high: 99.0,
            neutral: 50.0,
            decay_floor: 0.5,
            decay_window_hours: 24.0,
        }
    }
}

impl EstimatorConfig {
    pub fn with_k_dev(mut self, k_dev: f64) -> Self {
        self.k_dev = k_dev;
        self
    }

    pub fn with_k_spread(mut self, k_spread: f64) -> Self {
        self.k_spread = k_spread;
        self
    }

    pub fn with_bounds(mut self, low: f64, high: f64) -> Self {
        self.low = low;
        self.high = high;
        self
    }

    pub fn with_decay_floor(mut self, decay_floor: f64) -> Self {
        self.decay_floor = decay_floor;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("k_dev", self.k_dev),
            ("k_spread", self.k_spread),
            ("low", self.low),
            ("high", self.high),
            ("neutral", self.neutral),
            ("decay_floor", self.decay_floor),
            ("decay_window_hours", self.decay_window_hours),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite(name));
            }
        }

        if self.low >= self.high {
            return Err(ConfigError::InvertedBounds(self.low, self.high));
        }
        if self.low < 0.0 || self.high > 100.0 {
            return Err(ConfigError::BoundsOutOfRange(self.low, self.high));
        }
        if !(0.0..=100.0).contains(&self.neutral) {
            return Err(ConfigError::NeutralOutOfRange(self.neutral));
        }
        if !(0.0..=1.0).contains(&self.decay_floor) {
            return Err(ConfigError::DecayFloorOutOfRange(self.decay_floor));
        }
        if self.decay_window_hours <= 0.0 {
            return Err(ConfigError::DecayWindow(self.decay_window_hours));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be finite")]
    NotFinite(&'static str),

    #[error("low bound {0} must be below high bound {1}")]
    InvertedBounds(f64, f64),

    #[error("bounds [{0}, {1}] must lie within [0, 100]")]
    BoundsOutOfRange(f64, f64),

    #[error("neutral score {0} must lie within [0, 100]")]
    NeutralOutOfRange(f64),

    #[error("decay floor {0} must lie within [0, 1]")]
    DecayFloorOutOfRange(f64),

    #[error("decay window must be positive, got {0}h")]
    DecayWindow(f64),

    #[error("blend weight {name} is negative: {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("blend weights sum to {0:.3}, must be at most 1")]
    WeightsExceedOne(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EstimatorConfig::default();
        assert_eq!(config.k_dev, 3.0);
        assert_eq!(config.k_spread, 2.0);
        assert_eq!((config.low, config.high), (10.0, 99.0));
        assert_eq!(config.decay_floor, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let config = EstimatorConfig::default().with_bounds(90.0, 20.0);
        assert_eq!(config.validate(), Err(ConfigError::InvertedBounds(90.0, 20.0)));
    }

    #[test]
    fn test_rejects_bad_decay_floor() {
        let config = EstimatorConfig::default().with_decay_floor(1.5);
        assert_eq!(config.validate(), Err(ConfigError::DecayFloorOutOfRange(1.5)));
    }

    #[test]
    fn test_rejects_nan() {
        let config = EstimatorConfig::default().with_k_dev(f64::NAN);
        assert_eq!(config.validate(), Err(ConfigError::NotFinite("k_dev")));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EstimatorConfig = toml::from_str("k_dev = 4.5").unwrap();
        assert_eq!(config.k_dev, 4.5);
        assert_eq!(config.k_spread, 2.0);
        assert_eq!(config.high, 99.0);
    }
}

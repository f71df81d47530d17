use serde::Serialize;

use crate::data::types::ForecastSample;

/// Mean and max-min disagreement of an ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnsembleSummary {
    pub average: f64,
    pub spread: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Aggregate {
    NoData,
    Summary(EnsembleSummary),
}

impl Aggregate {
    pub fn summary(&self) -> Option<&EnsembleSummary> {
        match self {
            Aggregate::NoData => None,
            Aggregate::Summary(s) => Some(s),
        }
    }
}

/// Summarize a set of forecast values.
///
/// Non-finite values are dropped, exactly like a provider that returned
/// nothing. Returns `NoData` when nothing usable remains.
pub fn aggregate(samples: &[f64]) -> Aggregate {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for &value in samples.iter().filter(|v| v.is_finite()) {
        count += 1;
        sum += value;
        min = min.min(value);
        max = max.max(value);
    }

    if count == 0 {
        return Aggregate::NoData;
    }

    Aggregate::Summary(EnsembleSummary {
        average: sum / count as f64,
        spread: (max - min).max(0.0),
        count,
    })
}

/// Forecast samples for one city at one point in time, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForecastEnsemble {
    samples: Vec<ForecastSample>,
}

impl ForecastEnsemble {
    pub fn new(samples: Vec<ForecastSample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: ForecastSample) {
        self.samples.push(sample);
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = ForecastSample>) {
        self.samples.extend(samples);
    }

    pub fn samples(&self) -> &[ForecastSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.max_temp_f).collect()
    }

    pub fn summary(&self) -> Aggregate {
        aggregate(&self.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_no_data() {
        assert_eq!(aggregate(&[]), Aggregate::NoData);
        assert_eq!(ForecastEnsemble::default().summary(), Aggregate::NoData);
    }

    #[test]
    fn test_single_sample_has_zero_spread() {
        let agg = aggregate(&[71.5]);
        let summary = agg.summary().unwrap();
        assert_eq!(summary.average, 71.5);
        assert_eq!(summary.spread, 0.0);
        assert_eq!(summary.count, 1);
    }

    #[test]
    fn test_average_and_spread() {
        let summary = *aggregate(&[74.0, 78.0, 76.0]).summary().unwrap();
        assert!((summary.average - 76.0).abs() < 1e-9);
        assert!((summary.spread - 4.0).abs() < 1e-9);
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn test_non_finite_samples_dropped() {
        let summary = *aggregate(&[f64::NAN, 80.0, f64::INFINITY, 70.0])
            .summary()
            .unwrap();
        assert_eq!(summary.count, 2);
        assert!((summary.average - 75.0).abs() < 1e-9);
        assert!((summary.spread - 10.0).abs() < 1e-9);

        assert_eq!(aggregate(&[f64::NAN]), Aggregate::NoData);
    }

    #[test]
    fn test_ensemble_keeps_provider_order() {
        let mut ensemble = ForecastEnsemble::default();
        ensemble.push(ForecastSample::new("OpenWeatherMap", 74.0));
        ensemble.extend([ForecastSample::new("Open-Meteo", 78.0)]);

        assert_eq!(ensemble.len(), 2);
        assert_eq!(ensemble.values(), vec![74.0, 78.0]);
        assert_eq!(ensemble.samples()[1].source, "Open-Meteo");
    }
}

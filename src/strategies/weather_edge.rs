use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::prompt::ForecastDigest;
use crate::config::Config;
use crate::data::baseline::BaselineTable;
use crate::data::cache::EnsembleCache;
use crate::data::cities::{resolve_city, City, UnsupportedCity};
use crate::data::types::{BucketQuote, BucketRange, ForecastSample, NowcastSignal};
use crate::data::weather::{
    collect_ensemble, collect_nowcasts, EnsembleReport, ForecastProvider, NowcastProvider,
};
use crate::estimator::{
    estimate_confidence, Aggregate, BlendConfig, ConfidenceScore, ConfigError, EstimatorConfig,
    EventHorizon,
};
use crate::strategies::recommend::recommend_for;
use crate::strategies::types::Recommendation;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    UnsupportedCity(#[from] UnsupportedCity),

    #[error("invalid estimator configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Everything one evaluation produced, for display, logging, or the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub city: City,
    pub date: NaiveDate,
    pub samples: Vec<ForecastSample>,
    pub summary: Aggregate,
    pub baseline: f64,
    pub horizon: Option<EventHorizon>,
    /// Temperature-only score, before nowcasts are blended in.
    pub temperature_score: ConfidenceScore,
    pub nowcasts: Vec<NowcastSignal>,
    pub score: ConfidenceScore,
    pub recommendation: Recommendation,
    /// Listed bucket the ensemble average falls in, if any.
    pub forecast_bucket: Option<String>,
    pub digest: Option<ForecastDigest>,
}

pub struct WeatherEdgeStrategy {
    estimator: EstimatorConfig,
    blend: BlendConfig,
    fallback_threshold: f64,
    baselines: BaselineTable,
    forecast_providers: Vec<Arc<dyn ForecastProvider>>,
    nowcast_providers: Vec<Arc<dyn NowcastProvider>>,
    cache: Arc<EnsembleCache>,
}

impl WeatherEdgeStrategy {
    pub fn new(
        config: &Config,
        forecast_providers: Vec<Arc<dyn ForecastProvider>>,
        nowcast_providers: Vec<Arc<dyn NowcastProvider>>,
    ) -> Result<Self, AnalysisError> {
        config.estimator.validate()?;
        config.blend.validate()?;

        Ok(Self {
            estimator: config.estimator.clone(),
            blend: config.blend.clone(),
            fallback_threshold: config.recommendation.fallback_threshold,
            baselines: BaselineTable::from_config(&config.baselines),
            forecast_providers,
            nowcast_providers,
            cache: Arc::new(EnsembleCache::new(config.cache.bucket(), config.cache.ttl())),
        })
    }

    pub fn baselines(&self) -> &BaselineTable {
        &self.baselines
    }

    /// Resolve the city named in `text` and evaluate it against `quotes`.
    pub async fn analyze(
        &self,
        text: &str,
        quotes: &[BucketQuote],
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Analysis, AnalysisError> {
        self.analyze_at(text, quotes, deadline, Utc::now()).await
    }

    pub async fn analyze_at(
        &self,
        text: &str,
        quotes: &[BucketQuote],
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Analysis, AnalysisError> {
        let city = match resolve_city(text) {
            Ok(city) => city,
            Err(e) => {
                warn!("Unsupported market text: {}", e);
                return Err(e.into());
            }
        };
        Ok(self.analyze_city(city, quotes, deadline, now).await)
    }

    pub async fn analyze_city(
        &self,
        city: City,
        quotes: &[BucketQuote],
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Analysis {
        let date = city.local_date(now);
        let report = self.ensemble_for(&city, date, now).await;
        let nowcasts = collect_nowcasts(&self.nowcast_providers, &city).await;
        let horizon = deadline.map(|d| EventHorizon::from_deadline(d, now));

        self.evaluate(city, date, &report, nowcasts, quotes, horizon)
    }

    async fn ensemble_for(
        &self,
        city: &City,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> EnsembleReport {
        if let Some(cached) = self.cache.get(city.name, now) {
            info!("Using cached ensemble for {}", city.name);
            return cached;
        }

        let report = collect_ensemble(&self.forecast_providers, city, date).await;
        // an all-failed fetch is not worth keeping around
        if !report.ensemble.is_empty() {
            self.cache.insert(city.name, now, report.clone());
        }
        report
    }

    /// Pure part of the analysis: no I/O, deterministic in its inputs.
    pub fn evaluate(
        &self,
        city: City,
        date: NaiveDate,
        report: &EnsembleReport,
        nowcasts: Vec<NowcastSignal>,
        quotes: &[BucketQuote],
        horizon: Option<EventHorizon>,
    ) -> Analysis {
        let baseline = self.baselines.lookup(city.name);
        let summary = report.ensemble.summary();

        let temperature_score = estimate_confidence(&summary, baseline, &self.estimator, horizon);
        let score = self.blend.apply(temperature_score, &nowcasts);
        let recommendation = recommend_for(&score, quotes, self.fallback_threshold);
        let forecast_bucket = summary.summary().and_then(|s| bucket_for(s.average, quotes));

        let digest = summary.summary().map(|s| ForecastDigest {
            forecast_high_f: s.average,
            baseline_f: baseline,
            rain_mm: report.rain_mm.unwrap_or(0.0),
            condition: report.condition.clone(),
        });

        match summary.summary() {
            Some(s) => info!(
                "{}: avg={:.1}°F spread={:.1}°F baseline={:.1}°F -> confidence {:.1}%",
                city.name,
                s.average,
                s.spread,
                baseline,
                score.value()
            ),
            None => warn!("{}: no forecast data, confidence is unreliable", city.name),
        }
        info!(
            "Recommendation: bucket={:?} price={:?} edge={}",
            recommendation.bucket, recommendation.market_price, recommendation.edge
        );

        Analysis {
            city,
            date,
            samples: report.ensemble.samples().to_vec(),
            summary,
            baseline,
            horizon,
            temperature_score,
            nowcasts,
            score,
            recommendation,
            forecast_bucket,
            digest,
        }
    }

    /// Re-run only the recommendation step against fresh quotes.
    pub fn requote(&self, analysis: &mut Analysis, quotes: &[BucketQuote]) {
        analysis.recommendation = recommend_for(&analysis.score, quotes, self.fallback_threshold);
        analysis.forecast_bucket = analysis
            .summary
            .summary()
            .and_then(|s| bucket_for(s.average, quotes));
    }
}

fn bucket_for(temp_f: f64, quotes: &[BucketQuote]) -> Option<String> {
    quotes
        .iter()
        .find(|q| BucketRange::parse(&q.bucket).is_some_and(|r| r.contains(temp_f)))
        .map(|q| q.bucket.clone())
}

use serde::Serialize;
use std::fmt;

use crate::strategies::weather_edge::Analysis;

pub const SYSTEM_PROMPT: &str = "You are a high-accuracy prediction market analyst.";

/// Rain total above which the forecast is considered decisive, in mm.
const HEAVY_RAIN_MM: f64 = 2.0;
/// Forecast high at or above which the forecast is considered decisive, in °F.
const HOT_DAY_F: f64 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceHint {
    High,
    Medium,
}

impl fmt::Display for ConfidenceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceHint::High => write!(f, "High"),
            ConfidenceHint::Medium => write!(f, "Medium"),
        }
    }
}

/// Human-readable forecast summary handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDigest {
    pub forecast_high_f: f64,
    pub baseline_f: f64,
    pub rain_mm: f64,
    pub condition: Option<String>,
}

impl ForecastDigest {
    pub fn deviation(&self) -> f64 {
        self.forecast_high_f - self.baseline_f
    }

    pub fn hint(&self) -> ConfidenceHint {
        if self.forecast_high_f >= HOT_DAY_F || self.rain_mm > HEAVY_RAIN_MM {
            ConfidenceHint::High
        } else {
            ConfidenceHint::Medium
        }
    }
}

impl fmt::Display for ForecastDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Forecast high: {:.1}°F (avg {:.0}°F, Δ {:+.1}), Condition: {}, Rain: {:.1}mm\nConfidence Hint: {}",
            self.forecast_high_f,
            self.baseline_f,
            self.deviation(),
            self.condition.as_deref().unwrap_or("unknown"),
            self.rain_mm,
            self.hint()
        )
    }
}

pub fn format_prompt(question: &str, analysis: Option<&Analysis>) -> String {
    let mut prompt = format!("{}\n\nMarket Question:\n{}", SYSTEM_PROMPT, question.trim());

    match analysis {
        Some(analysis) => {
            if let Some(digest) = &analysis.digest {
                prompt.push_str(&format!("\n\nWeather Forecast:\n{}", digest));
            }

            let reliability = if analysis.score.is_reliable() {
                "reliable"
            } else {
                "no forecast data, treat as unknown"
            };
            prompt.push_str(&format!(
                "\n\nModel confidence (high outcome): {:.1}% ({})",
                analysis.score.value(),
                reliability
            ));

            if let Some(bucket) = &analysis.recommendation.bucket {
                prompt.push_str(&format!(
                    "\nMarket favourite: \"{}\" at {:.0}%, model edge: {}",
                    bucket,
                    analysis.recommendation.market_price.unwrap_or_default(),
                    if analysis.recommendation.edge { "yes" } else { "no" }
                ));
            }
            if let Some(bucket) = &analysis.forecast_bucket {
                prompt.push_str(&format!("\nForecast falls in: \"{}\"", bucket));
            }
        }
        None => prompt.push_str("\n\nWeather Forecast:\nunavailable"),
    }

    prompt.push_str(
        "\n\nInstructions:\n\
         1. Use the weather forecast to estimate today's high temperature.\n\
         2. Choose the single most likely correct YES range.\n\
         3. Justify your choice in 1-2 sentences.\n\
         4. Say exactly what to bet on, like this: BET: \"75° to 76°\" - Yes\n\
         5. Rate confidence: High / Medium / Low.\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cities::CHICAGO;
    use crate::estimator::{aggregate, ConfidenceScore};
    use crate::strategies::types::Recommendation;
    use chrono::NaiveDate;

    fn analysis(score: ConfidenceScore, temps: &[f64]) -> Analysis {
        let summary = aggregate(temps);
        Analysis {
            city: CHICAGO,
            date: NaiveDate::from_ymd_opt(2026, 7, 2).unwrap(),
            samples: vec![],
            summary,
            baseline: 75.0,
            horizon: None,
            temperature_score: score,
            nowcasts: vec![],
            score,
            recommendation: Recommendation {
                bucket: Some("76-77".into()),
                market_price: Some(40.0),
                edge: score.is_reliable(),
            },
            forecast_bucket: summary.summary().map(|_| "76-77".to_string()),
            digest: summary.summary().map(|s| ForecastDigest {
                forecast_high_f: s.average,
                baseline_f: 75.0,
                rain_mm: 0.5,
                condition: Some("clear".into()),
            }),
        }
    }

    fn digest(high: f64, rain: f64) -> ForecastDigest {
        ForecastDigest {
            forecast_high_f: high,
            baseline_f: 76.0,
            rain_mm: rain,
            condition: Some("scattered clouds".into()),
        }
    }

    #[test]
    fn test_hint_thresholds() {
        assert_eq!(digest(85.0, 0.0).hint(), ConfidenceHint::High);
        assert_eq!(digest(80.0, 2.5).hint(), ConfidenceHint::High);
        assert_eq!(digest(80.0, 2.0).hint(), ConfidenceHint::Medium);
    }

    #[test]
    fn test_digest_display() {
        let text = digest(79.5, 0.0).to_string();
        assert!(text.contains("Forecast high: 79.5°F"));
        assert!(text.contains("avg 76°F"));
        assert!(text.contains("Δ +3.5"));
        assert!(text.contains("Confidence Hint: Medium"));
    }

    #[test]
    fn test_prompt_without_analysis() {
        let prompt = format_prompt("  Highest temperature in Denver?  ", None);
        assert!(prompt.contains("Market Question:\nHighest temperature in Denver?"));
        assert!(prompt.contains("Weather Forecast:\nunavailable"));
        assert!(prompt.contains("Instructions:"));
    }

    #[test]
    fn test_prompt_with_reliable_analysis() {
        let analysis = analysis(ConfidenceScore::Reliable(45.0), &[74.0, 78.0, 76.0]);
        let prompt = format_prompt("Highest temperature in Chicago?", Some(&analysis));

        assert!(prompt.contains("Weather Forecast:\nForecast high: 76.0°F (avg 75°F, Δ +1.0)"));
        assert!(prompt.contains("Condition: clear, Rain: 0.5mm"));
        assert!(prompt.contains("Model confidence (high outcome): 45.0% (reliable)"));
        assert!(prompt.contains("Market favourite: \"76-77\" at 40%, model edge: yes"));
        assert!(prompt.contains("Forecast falls in: \"76-77\""));
        assert!(!prompt.contains("unavailable"));
    }

    #[test]
    fn test_prompt_with_unreliable_analysis() {
        let analysis = analysis(ConfidenceScore::Unreliable, &[]);
        let prompt = format_prompt("Highest temperature in Chicago?", Some(&analysis));

        assert!(!prompt.contains("Weather Forecast:"));
        assert!(prompt.contains(
            "Model confidence (high outcome): 50.0% (no forecast data, treat as unknown)"
        ));
        assert!(prompt.contains("Market favourite: \"76-77\" at 40%, model edge: no"));
        assert!(!prompt.contains("Forecast falls in"));
    }
}

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::strategies::types::Side;

/// One provider's predicted daily high, in °F.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub source: String,
    pub max_temp_f: f64,
}

impl ForecastSample {
    pub fn new(source: impl Into<String>, max_temp_f: f64) -> Self {
        Self {
            source: source.into(),
            max_temp_f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NowcastKind {
    Precipitation,
    Storm,
}

/// Short-horizon probability of an adverse condition, as a fraction in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NowcastSignal {
    pub kind: NowcastKind,
    pub probability: f64,
}

impl NowcastSignal {
    pub fn new(kind: NowcastKind, probability: f64) -> Self {
        Self { kind, probability }
    }

    /// Probability in percentage space, clamped to [0, 100]. Non-finite input maps to 0.
    pub fn percentage(&self) -> f64 {
        if self.probability.is_finite() {
            (self.probability * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Most recent observed price for one side of one temperature bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub side: Side,
    /// Price as a percentage (0-100).
    pub price: f64,
    pub bucket: String,
    pub observed_at: DateTime<Utc>,
}

/// YES price for a bucket, the view `recommend` works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketQuote {
    pub bucket: String,
    pub price: f64,
}

impl BucketQuote {
    pub fn new(bucket: impl Into<String>, price: f64) -> Self {
        Self {
            bucket: bucket.into(),
            price,
        }
    }
}

impl MarketQuote {
    /// YES-side view of this quote. A NO quote at `p` implies YES at `100 - p`.
    pub fn to_bucket_quote(&self) -> BucketQuote {
        let price = match self.side {
            Side::Yes => self.price,
            Side::No => 100.0 - self.price,
        };
        BucketQuote::new(self.bucket.clone(), price)
    }
}

/// Whole-degree range a bucket label covers, e.g. "76-77°F" or "90°F or higher".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

/// A sign only counts at the start or after whitespace/`(`, so "74-75" is two
/// positive numbers while "-2 to -1" is two negative ones.
static DEGREES: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])([-−]\d+(?:\.\d+)?)|(\d+(?:\.\d+)?)").ok()
});

impl BucketRange {
    pub fn parse(label: &str) -> Option<Self> {
        let re = DEGREES.as_ref()?;
        let numbers: Vec<f64> = re
            .captures_iter(label)
            .filter_map(|c| c.get(1).or_else(|| c.get(2)))
            .filter_map(|m| m.as_str().replace('−', "-").parse().ok())
            .collect();
        let lower = label.to_lowercase();

        match numbers.as_slice() {
            [] => None,
            [n] if lower.contains("higher") || lower.contains("above") || lower.contains('+') => {
                Some(Self { low: Some(*n), high: None })
            }
            [n] if lower.contains("lower") || lower.contains("below") => {
                Some(Self { low: None, high: Some(*n) })
            }
            [n] => Some(Self { low: Some(*n), high: Some(*n) }),
            [a, b, ..] => Some(Self { low: Some(a.min(*b)), high: Some(a.max(*b)) }),
        }
    }

    /// Markets resolve on whole degrees, so each end extends half a degree.
    pub fn contains(&self, temp_f: f64) -> bool {
        self.low.map_or(true, |l| temp_f >= l - 0.5)
            && self.high.map_or(true, |h| temp_f < h + 0.5)
    }
}

/// A temperature bucket listed on the market, with the token id the live
/// feed reports its YES price under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketMarket {
    pub label: String,
    pub yes_token_id: Option<String>,
    pub yes_price: Option<f64>,
}

/// A discovered temperature event and its buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureEvent {
    pub slug: String,
    pub title: String,
    pub end_date: Option<DateTime<Utc>>,
    pub buckets: Vec<BucketMarket>,
}

impl TemperatureEvent {
    /// Quotes for every bucket with a known YES price, in listing order.
    pub fn bucket_quotes(&self) -> Vec<BucketQuote> {
        self.buckets
            .iter()
            .filter_map(|b| b.yes_price.map(|p| BucketQuote::new(b.label.clone(), p)))
            .collect()
    }
}

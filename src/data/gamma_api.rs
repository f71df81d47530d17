use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::data::types::{BucketMarket, BucketQuote, TemperatureEvent};

/// Anything that can report the current YES price of each bucket of a market.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quotes(&self, market: &str) -> Result<Vec<BucketQuote>>;
}

pub struct GammaApiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    slug: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    #[serde(default)]
    question: String,
    #[serde(default)]
    group_item_title: Option<String>,
    /// JSON-encoded string array, e.g. `"[\"0.55\", \"0.45\"]"`
    #[serde(default)]
    outcome_prices: Option<String>,
    #[serde(default)]
    clob_token_ids: Option<String>,
    #[serde(default)]
    closed: bool,
}

impl GammaApiClient {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build gamma http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_events(&self, query: &[(&str, &str)]) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.base_url);
        self.client
            .get(&url)
            .query(query)
            .send()
            .await
            .context("Failed to fetch events")?
            .error_for_status()
            .context("Gamma API returned an error status")?
            .json()
            .await
            .context("Failed to parse events response")
    }

    /// Fetch one event by slug with all of its bucket markets.
    pub async fn fetch_event(&self, slug: &str) -> Result<TemperatureEvent> {
        let events = self.fetch_events(&[("slug", slug)]).await?;
        let event = events
            .into_iter()
            .next()
            .with_context(|| format!("No event found for slug {}", slug))?;

        let event = convert_event(event);
        info!("Loaded event {} with {} bucket(s)", event.slug, event.buckets.len());
        Ok(event)
    }

    /// Discover open daily-high temperature events.
    pub async fn fetch_temperature_events(&self) -> Result<Vec<TemperatureEvent>> {
        let events = self
            .fetch_events(&[("tag_slug", "weather"), ("closed", "false"), ("limit", "100")])
            .await?;

        let found: Vec<TemperatureEvent> = events
            .into_iter()
            .filter(|e| !e.closed && is_temperature_event(&e.title))
            .map(convert_event)
            .collect();

        debug!("Discovered {} temperature event(s)", found.len());
        Ok(found)
    }
}

#[async_trait]
impl QuoteProvider for GammaApiClient {
    async fn fetch_quotes(&self, market: &str) -> Result<Vec<BucketQuote>> {
        Ok(self.fetch_event(market).await?.bucket_quotes())
    }
}

/// Check if an event title describes a daily temperature market
pub fn is_temperature_event(title: &str) -> bool {
    let lower = title.to_lowercase();
    let mentions_temperature = lower.contains("temperature")
        || lower.contains("temp")
        || lower.contains("°f")
        || lower.contains("degrees");
    let daily_extreme = lower.contains("high") || lower.contains("highest");

    mentions_temperature && daily_extreme
}

fn convert_event(event: GammaEvent) -> TemperatureEvent {
    let end_date = event
        .end_date
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let buckets = event
        .markets
        .into_iter()
        .filter(|m| !m.closed)
        .map(convert_market)
        .collect();

    TemperatureEvent {
        slug: event.slug,
        title: event.title,
        end_date,
        buckets,
    }
}

fn convert_market(market: GammaMarket) -> BucketMarket {
    let label = market
        .group_item_title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(market.question);

    let yes_price = market
        .outcome_prices
        .as_deref()
        .and_then(|s| parse_string_array(s).into_iter().next())
        .and_then(|p| p.parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .map(|p| p * 100.0);

    let yes_token_id = market
        .clob_token_ids
        .as_deref()
        .and_then(|s| parse_string_array(s).into_iter().next());

    BucketMarket {
        label,
        yes_token_id,
        yes_price,
    }
}

/// Gamma encodes arrays as JSON strings; numbers may or may not be quoted.
fn parse_string_array(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_temperature_event() {
        assert!(is_temperature_event("Highest temperature in NYC on July 2?"));
        assert!(is_temperature_event("Chicago daily high temp"));
        assert!(!is_temperature_event("Will it rain in Miami?"));
        assert!(!is_temperature_event("Bitcoin above 100k?"));
    }

    #[test]
    fn test_convert_event() {
        let event: GammaEvent = serde_json::from_value(json!({
            "slug": "highest-temperature-in-nyc-on-july-2",
            "title": "Highest temperature in NYC on July 2?",
            "endDate": "2026-07-03T04:00:00Z",
            "markets": [
                {
                    "question": "Will the high be 74-75°F?",
                    "groupItemTitle": "74-75°F",
                    "outcomePrices": "[\"0.30\", \"0.70\"]",
                    "clobTokenIds": "[\"111\", \"112\"]"
                },
                {
                    "question": "Will the high be 76-77°F?",
                    "groupItemTitle": "",
                    "outcomePrices": "[0.55, 0.45]",
                    "clobTokenIds": "[\"221\", \"222\"]"
                },
                {
                    "question": "Will the high be 72°F or below?",
                    "groupItemTitle": "72°F or below",
                    "outcomePrices": "[\"0.01\", \"0.99\"]",
                    "closed": true
                }
            ]
        }))
        .unwrap();

        let converted = convert_event(event);
        assert_eq!(converted.buckets.len(), 2);
        assert_eq!(converted.buckets[0].label, "74-75°F");
        assert_eq!(converted.buckets[0].yes_token_id.as_deref(), Some("111"));
        assert!((converted.buckets[0].yes_price.unwrap() - 30.0).abs() < 1e-9);
        // falls back to the question when the group title is blank
        assert_eq!(converted.buckets[1].label, "Will the high be 76-77°F?");
        assert!((converted.buckets[1].yes_price.unwrap() - 55.0).abs() < 1e-9);
        assert_eq!(
            converted.end_date,
            Some(DateTime::parse_from_rfc3339("2026-07-03T04:00:00Z").unwrap().with_timezone(&Utc))
        );
    }

    #[test]
    fn test_parse_string_array_handles_garbage() {
        assert_eq!(parse_string_array("[\"a\", \"b\"]"), vec!["a", "b"]);
        assert!(parse_string_array("not json").is_empty());
    }
}

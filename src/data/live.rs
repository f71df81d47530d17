//! Live bucket prices over the CLOB market WebSocket.
//!
//! The feed task owns the socket and pushes every parsed quote into an mpsc
//! channel. The consumer folds them into a [`QuoteBook`]; nothing else holds
//! quote state.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::data::types::{BucketMarket, BucketQuote, MarketQuote};
use crate::strategies::types::Side;

const PING_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SubscribeMessage<'a> {
    assets_ids: Vec<&'a str>,
    #[serde(rename = "type")]
    msg_type: &'static str,
}

pub struct LiveQuoteFeed {
    ws_url: String,
    /// YES token id -> bucket label
    assets: HashMap<String, String>,
    reconnect_backoff: Duration,
    max_reconnect_delay: Duration,
}

enum StreamEnd {
    /// Socket closed or errored; reconnect.
    Disconnected,
    /// Receiver dropped; stop for good.
    ReceiverGone,
}

impl LiveQuoteFeed {
    pub fn new(ws_url: impl Into<String>, buckets: &[BucketMarket]) -> Self {
        let assets = buckets
            .iter()
            .filter_map(|b| b.yes_token_id.clone().map(|id| (id, b.label.clone())))
            .collect();

        Self {
            ws_url: ws_url.into(),
            assets,
            reconnect_backoff: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_backoff = initial;
        self.max_reconnect_delay = max;
        self
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Run the feed on its own task until the receiving side is dropped.
    pub fn spawn(self, tx: mpsc::Sender<MarketQuote>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(tx).await })
    }

    async fn run(self, tx: mpsc::Sender<MarketQuote>) {
        if self.assets.is_empty() {
            warn!("Live feed has no token ids to subscribe to, not starting");
            return;
        }

        let mut delay = self.reconnect_backoff;
        loop {
            match self.stream_once(&tx).await {
                Ok(StreamEnd::ReceiverGone) => {
                    info!("Quote receiver dropped, stopping live feed");
                    return;
                }
                Ok(StreamEnd::Disconnected) => {
                    delay = self.reconnect_backoff;
                    warn!("Live feed disconnected, reconnecting in {:?}", delay);
                }
                Err(e) => {
                    warn!("Live feed error: {:#}, reconnecting in {:?}", e, delay);
                }
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_reconnect_delay);
        }
    }

    async fn stream_once(&self, tx: &mpsc::Sender<MarketQuote>) -> Result<StreamEnd> {
        let (socket, _) = connect_async(self.ws_url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.ws_url))?;
        let (mut write, mut read) = socket.split();

        let subscribe = SubscribeMessage {
            assets_ids: self.assets.keys().map(String::as_str).collect(),
            msg_type: "market",
        };
        write
            .send(Message::Text(serde_json::to_string(&subscribe)?))
            .await
            .context("Failed to send subscription")?;
        info!("Subscribed to {} bucket token(s)", self.assets.len());

        let mut ping = tokio::time::interval(PING_INTERVAL);
        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write
                        .send(Message::Text("PING".to_string()))
                        .await
                        .context("Failed to send ping")?;
                }
                message = read.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Server closed socket: {:?}", frame);
                            return Ok(StreamEnd::Disconnected);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                        None => return Ok(StreamEnd::Disconnected),
                    };

                    for quote in parse_message(&text, &self.assets) {
                        if tx.send(quote).await.is_err() {
                            return Ok(StreamEnd::ReceiverGone);
                        }
                    }
                }
            }
        }
    }
}

/// Extract YES quotes for known assets from one socket frame.
///
/// Frames are either a single event object or an array of them. Unknown
/// event types, unknown assets and non-JSON frames (e.g. `PONG`) yield nothing.
pub fn parse_message(text: &str, assets: &HashMap<String, String>) -> Vec<MarketQuote> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let events = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut quotes = Vec::new();
    for event in &events {
        match event.get("event_type").and_then(Value::as_str) {
            Some("price_change") => {
                if let Some(changes) = event.get("price_changes").and_then(Value::as_array) {
                    for change in changes {
                        push_quote(&mut quotes, assets, change, change_price(change));
                    }
                } else {
                    push_quote(&mut quotes, assets, event, decimal_field(event, "price"));
                }
            }
            Some("last_trade_price") => {
                push_quote(&mut quotes, assets, event, decimal_field(event, "price"));
            }
            Some("book") | None if event.get("bids").is_some() || event.get("asks").is_some() => {
                push_quote(&mut quotes, assets, event, book_midpoint(event));
            }
            _ => {}
        }
    }
    quotes
}

fn push_quote(
    quotes: &mut Vec<MarketQuote>,
    assets: &HashMap<String, String>,
    event: &Value,
    price: Option<f64>,
) {
    let asset_id = match event.get("asset_id").and_then(Value::as_str) {
        Some(id) => id,
        None => return,
    };
    let (bucket, price) = match (assets.get(asset_id), price) {
        (Some(bucket), Some(price)) => (bucket, price),
        _ => return,
    };

    quotes.push(MarketQuote {
        side: Side::Yes,
        price: (price * 100.0).clamp(0.0, 100.0),
        bucket: bucket.clone(),
        observed_at: Utc::now(),
    });
}

fn decimal_field(value: &Value, key: &str) -> Option<f64> {
    let field = value.get(key)?;
    let parsed = match field {
        Value::String(s) => s.parse::<f64>().ok()?,
        other => other.as_f64()?,
    };
    parsed.is_finite().then_some(parsed)
}

/// Midpoint of best bid/ask when both are present, else the trade price.
fn change_price(change: &Value) -> Option<f64> {
    match (decimal_field(change, "best_bid"), decimal_field(change, "best_ask")) {
        (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
        _ => decimal_field(change, "price"),
    }
}

fn book_midpoint(book: &Value) -> Option<f64> {
    let best = |side: &str, pick: fn(f64, f64) -> f64| {
        book.get(side)?
            .as_array()?
            .iter()
            .filter_map(|level| decimal_field(level, "price"))
            .reduce(pick)
    };

    match (best("bids", f64::max), best("asks", f64::min)) {
        (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

/// Latest YES price per bucket, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct QuoteBook {
    quotes: Vec<BucketQuote>,
}

impl QuoteBook {
    pub fn seeded(initial: &[BucketQuote]) -> Self {
        let mut book = Self::default();
        for quote in initial {
            book.upsert(quote.clone());
        }
        book
    }

    /// Last write wins for a bucket; new buckets go to the end.
    pub fn apply(&mut self, quote: &MarketQuote) {
        self.upsert(quote.to_bucket_quote());
    }

    fn upsert(&mut self, quote: BucketQuote) {
        match self.quotes.iter_mut().find(|q| q.bucket == quote.bucket) {
            Some(existing) => existing.price = quote.price,
            None => self.quotes.push(quote),
        }
    }

    pub fn quotes(&self) -> &[BucketQuote] {
        &self.quotes
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets() -> HashMap<String, String> {
        [("111", "74-75°F"), ("221", "76-77°F")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_price_change_batch() {
        let text = r#"{
            "event_type": "price_change",
            "market": "0xabc",
            "price_changes": [
                {"asset_id": "111", "price": "0.31", "side": "BUY", "best_bid": "0.30", "best_ask": "0.32"},
                {"asset_id": "999", "price": "0.50", "side": "BUY"},
                {"asset_id": "221", "price": "0.56", "side": "SELL"}
            ]
        }"#;

        let quotes = parse_message(text, &assets());
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].bucket, "74-75°F");
        assert!((quotes[0].price - 31.0).abs() < 1e-9);
        assert_eq!(quotes[1].bucket, "76-77°F");
        assert!((quotes[1].price - 56.0).abs() < 1e-9);
        assert!(quotes.iter().all(|q| q.side == Side::Yes));
    }

    #[test]
    fn test_parse_last_trade_price() {
        let text = r#"{"event_type": "last_trade_price", "asset_id": "221", "price": "0.6"}"#;
        let quotes = parse_message(text, &assets());
        assert_eq!(quotes.len(), 1);
        assert!((quotes[0].price - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_book_array() {
        let text = r#"[{
            "asset_id": "111",
            "market": "0xabc",
            "bids": [{"price": "0.20", "size": "10"}, {"price": "0.24", "size": "5"}],
            "asks": [{"price": "0.30", "size": "10"}, {"price": "0.28", "size": "5"}]
        }]"#;
        let quotes = parse_message(text, &assets());
        assert_eq!(quotes.len(), 1);
        assert!((quotes[0].price - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_message("PONG", &assets()).is_empty());
        let tick = r#"{"event_type": "tick_size_change", "asset_id": "111"}"#;
        assert!(parse_message(tick, &assets()).is_empty());
        assert!(parse_message(r#"[]"#, &assets()).is_empty());
    }

    #[test]
    fn test_quote_book_last_write_wins_in_order() {
        let mut book = QuoteBook::seeded(&[
            BucketQuote::new("74-75°F", 30.0),
            BucketQuote::new("76-77°F", 55.0),
        ]);

        let update = |bucket: &str, price: f64| MarketQuote {
            side: Side::Yes,
            price,
            bucket: bucket.to_string(),
            observed_at: Utc::now(),
        };

        book.apply(&update("76-77°F", 48.0));
        book.apply(&update("78°F+", 12.0));
        book.apply(&update("76-77°F", 51.0));

        assert_eq!(
            book.quotes(),
            &[
                BucketQuote::new("74-75°F", 30.0),
                BucketQuote::new("76-77°F", 51.0),
                BucketQuote::new("78°F+", 12.0),
            ]
        );
    }

    #[test]
    fn test_feed_maps_token_ids() {
        let feed = LiveQuoteFeed::new(
            "wss://example.invalid/ws/market",
            &[
                BucketMarket {
                    label: "74-75°F".into(),
                    yes_token_id: Some("111".into()),
                    yes_price: None,
                },
                BucketMarket {
                    label: "76-77°F".into(),
                    yes_token_id: None,
                    yes_price: Some(50.0),
                },
            ],
        );
        assert_eq!(feed.asset_count(), 1);
    }

    #[tokio::test]
    async fn test_feed_without_assets_exits() {
        let (tx, _rx) = mpsc::channel(4);
        let handle = LiveQuoteFeed::new("wss://example.invalid/ws/market", &[]).spawn(tx);
        handle.await.unwrap();
    }
}

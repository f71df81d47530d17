//! Weather Sniper
//!
//! Scores daily-high temperature markets from a forecast ensemble and picks
//! the bucket worth backing.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use weather_sniper::{
    ai::{prompt::format_prompt, OpenAiSummarizer, Summarizer},
    config::{Config, EnvConfig},
    data::{
        cities::supported_cities,
        gamma_api::{GammaApiClient, QuoteProvider},
        live::{LiveQuoteFeed, QuoteBook},
        ocr::{PlainText, TesseractCli, TextExtractor},
        types::TemperatureEvent,
        weather::build_providers,
    },
    monitoring::logger::CsvLogger,
    strategies::weather_edge::{Analysis, WeatherEdgeStrategy},
};

#[derive(Parser)]
#[command(name = "weather-sniper")]
#[command(about = "Confidence scoring for daily-high temperature markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one market question
    Analyze {
        /// Market question text, e.g. "Highest temperature in NYC today?"
        question: Option<String>,

        /// Screenshot of the market to OCR
        #[arg(long, conflicts_with = "text_file")]
        image: Option<PathBuf>,

        /// Text file holding the market question
        #[arg(long)]
        text_file: Option<PathBuf>,

        /// Polymarket event slug to pull bucket prices and deadline from
        #[arg(short, long)]
        event: Option<String>,

        /// Hours until the market resolves, overriding the event deadline
        #[arg(long)]
        hours: Option<f64>,

        /// Ask the summarizer for a written pick
        #[arg(long)]
        llm: bool,
    },
    /// Follow live prices for an event and re-rank on every quote
    Watch {
        /// Polymarket event slug
        event: String,

        /// Minutes between full forecast refreshes
        #[arg(long, default_value = "30")]
        refresh_mins: u64,
    },
    /// List open temperature events
    Events,
    /// Show supported cities and their baselines
    Cities,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;
    config.logging.init();
    let env = EnvConfig::load();

    match cli.command {
        Commands::Analyze {
            question,
            image,
            text_file,
            event,
            hours,
            llm,
        } => {
            let input = QuestionInput {
                question,
                image,
                text_file,
            };
            analyze(&config, &env, input, event, hours, llm).await
        }
        Commands::Watch {
            event,
            refresh_mins,
        } => watch(&config, &env, &event, refresh_mins).await,
        Commands::Events => list_events(&env).await,
        Commands::Cities => list_cities(&config, &env),
    }
}

fn build_strategy(config: &Config, env: &EnvConfig) -> Result<WeatherEdgeStrategy> {
    let (forecasts, nowcasts) =
        build_providers(&config.providers, env.openweather_api_key.as_deref())?;
    if forecasts.is_empty() {
        tracing::warn!("No forecast providers enabled, every score will be unreliable");
    }
    Ok(WeatherEdgeStrategy::new(config, forecasts, nowcasts)?)
}

/// Append to the CSV log; a write failure is logged, never fatal.
fn record(logger: &CsvLogger, analysis: &Analysis) -> bool {
    match logger.log_analysis(analysis) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to append analysis to CSV log: {:#}", e);
            false
        }
    }
}

fn csv_logger(config: &Config) -> Result<Option<CsvLogger>> {
    if !config.monitoring.csv_logging {
        return Ok(None);
    }
    Ok(Some(CsvLogger::new(&config.monitoring.csv_log_path)?))
}

struct QuestionInput {
    question: Option<String>,
    image: Option<PathBuf>,
    text_file: Option<PathBuf>,
}

impl QuestionInput {
    async fn read(self, env: &EnvConfig) -> Result<Option<String>> {
        let (path, extractor): (PathBuf, Box<dyn TextExtractor>) =
            match (self.image, self.text_file) {
                (Some(path), _) => {
                    let ocr = TesseractCli::new(env.tesseract_bin.clone());
                    (path, Box::new(ocr) as Box<dyn TextExtractor>)
                }
                (None, Some(path)) => (path, Box::new(PlainText) as Box<dyn TextExtractor>),
                (None, None) => return Ok(self.question),
            };
        let bytes = read_file(&path).await?;

        let text = extractor.extract_text(&bytes).await?;
        tracing::debug!("Extracted {} chars of market text", text.len());
        Ok(Some(text))
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn deadline_from_hours(hours: f64, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    anyhow::ensure!(
        hours.is_finite() && hours >= 0.0,
        "--hours must be a non-negative number, got {}",
        hours
    );
    Ok(now + ChronoDuration::seconds((hours * 3600.0).round() as i64))
}

async fn analyze(
    config: &Config,
    env: &EnvConfig,
    input: QuestionInput,
    event_slug: Option<String>,
    hours: Option<f64>,
    llm: bool,
) -> Result<()> {
    let strategy = build_strategy(config, env)?;

    let event = match event_slug {
        Some(slug) => {
            let gamma = GammaApiClient::new(env.polymarket_gamma_url.clone())?;
            Some(gamma.fetch_event(&slug).await?)
        }
        None => None,
    };

    let text = input
        .read(env)
        .await?
        .or_else(|| event.as_ref().map(|e| e.title.clone()))
        .context("Nothing to analyze: pass a question, --image, --text-file or --event")?;

    let quotes = event.as_ref().map(|e| e.bucket_quotes()).unwrap_or_default();
    let deadline = match hours {
        Some(h) => Some(deadline_from_hours(h, Utc::now())?),
        None => event.as_ref().and_then(|e| e.end_date),
    };

    let analysis = strategy.analyze(&text, &quotes, deadline).await?;
    print_analysis(&analysis);

    if let Some(logger) = csv_logger(config)? {
        logger.log_analysis(&analysis)?;
    }

    if llm {
        let summarizer = OpenAiSummarizer::from_env(env)?;
        let prompt = format_prompt(&text, Some(&analysis));
        let pick = summarizer.summarize(&prompt).await?;
        println!("\n{}", pick);
    }

    Ok(())
}

async fn watch(config: &Config, env: &EnvConfig, slug: &str, refresh_mins: u64) -> Result<()> {
    let strategy = build_strategy(config, env)?;
    let gamma = GammaApiClient::new(env.polymarket_gamma_url.clone())?;
    let event = gamma.fetch_event(slug).await?;
    let logger = csv_logger(config)?;

    let mut book = QuoteBook::seeded(&event.bucket_quotes());
    let mut analysis = strategy.analyze(&event.title, book.quotes(), event.end_date).await?;
    print_analysis(&analysis);

    let feed = LiveQuoteFeed::new(env.polymarket_ws_url.clone(), &event.buckets);
    anyhow::ensure!(
        feed.asset_count() > 0,
        "Event {} has no buckets with token ids to subscribe to",
        event.slug
    );

    let (tx, mut rx) = mpsc::channel(1000);
    let handle = feed.spawn(tx);
    let mut refresh = tokio::time::interval(Duration::from_secs(refresh_mins.max(1) * 60));
    // first tick fires immediately
    refresh.tick().await;

    tracing::info!("Watching {} ({} buckets)", event.slug, event.buckets.len());

    loop {
        tokio::select! {
            quote = rx.recv() => {
                let Some(quote) = quote else {
                    tracing::warn!("Live feed closed");
                    break;
                };
                book.apply(&quote);
                let previous = analysis.recommendation.clone();
                strategy.requote(&mut analysis, book.quotes());
                if analysis.recommendation != previous {
                    print_recommendation(&analysis);
                }
            }
            _ = refresh.tick() => {
                match gamma.fetch_quotes(&event.slug).await {
                    Ok(fresh) if !fresh.is_empty() => book = QuoteBook::seeded(&fresh),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Quote refresh failed, keeping live book: {}", e),
                }
                analysis = refresh_analysis(&strategy, &event, &book).await?;
                print_analysis(&analysis);
                if let Some(logger) = &logger {
                    record(logger, &analysis);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}

async fn refresh_analysis(
    strategy: &WeatherEdgeStrategy,
    event: &TemperatureEvent,
    book: &QuoteBook,
) -> Result<Analysis> {
    Ok(strategy.analyze(&event.title, book.quotes(), event.end_date).await?)
}

async fn list_events(env: &EnvConfig) -> Result<()> {
    let gamma = GammaApiClient::new(env.polymarket_gamma_url.clone())?;
    let events = gamma.fetch_temperature_events().await?;

    println!("\n=== Temperature Events ({}) ===\n", events.len());
    for event in events {
        let ends = event
            .end_date
            .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<50} {:>3} buckets  ends {}", event.slug, event.buckets.len(), ends);
        println!("    {}", event.title);
    }
    Ok(())
}

fn list_cities(config: &Config, env: &EnvConfig) -> Result<()> {
    let strategy = build_strategy(config, env)?;
    let baselines = strategy.baselines();

    println!("\n=== Supported Cities ===\n");
    for city in supported_cities() {
        let source = if baselines.contains(city.name) { "" } else { " (default)" };
        println!(
            "{:<12} {:>8.4}, {:>9.4}  baseline {:.1}°F{}",
            city.name,
            city.lat,
            city.lon,
            baselines.lookup(city.name),
            source
        );
    }
    Ok(())
}

fn print_analysis(analysis: &Analysis) {
    println!("\n=== {} ({}) ===", analysis.city.name, analysis.date);
    for sample in &analysis.samples {
        println!("  {:<14} {:.1}°F", sample.source, sample.max_temp_f);
    }
    match analysis.summary.summary() {
        Some(s) => println!(
            "  ensemble       avg {:.1}°F, spread {:.1}°F over {} sample(s)",
            s.average, s.spread, s.count
        ),
        None => println!("  ensemble       no data"),
    }
    println!("  baseline       {:.1}°F", analysis.baseline);
    if let Some(horizon) = &analysis.horizon {
        println!("  resolves in    {:.1}h", horizon.hours_until_event());
    }
    for signal in &analysis.nowcasts {
        let kind = format!("{:?}", signal.kind).to_lowercase();
        println!("  {:<14} {:.0}%", kind, signal.percentage());
    }

    let reliability = if analysis.score.is_reliable() { "" } else { " (unreliable)" };
    println!("  confidence     {:.1}%{}", analysis.score.value(), reliability);
    if let Some(bucket) = &analysis.forecast_bucket {
        println!("  forecast in    {}", bucket);
    }
    print_recommendation(analysis);
}

fn print_recommendation(analysis: &Analysis) {
    let rec = &analysis.recommendation;
    match (&rec.bucket, rec.market_price) {
        (Some(bucket), Some(price)) => println!(
            "  pick           {} {} at {:.1}% (model {:.1}%)",
            rec.side(),
            bucket,
            price,
            analysis.score.value()
        ),
        _ => println!("  pick           no priced buckets"),
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use crate::data::baseline::BaselineConfig;
use crate::estimator::{BlendConfig, EstimatorConfig};
use crate::strategies::recommend::DEFAULT_FALLBACK_THRESHOLD;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub estimator: EstimatorConfig,
    pub blend: BlendConfig,
    pub recommendation: RecommendationConfig,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub baselines: BaselineConfig,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    /// Score the model must beat when no live quote is available.
    pub fallback_threshold: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openweathermap: bool,
    pub open_meteo: bool,
    pub noaa: bool,
    pub nowcasts: bool,
    pub nowcast_hours: u32,
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openweathermap: true,
            open_meteo: true,
            noaa: true,
            nowcasts: true,
            nowcast_hours: 3,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub bucket_secs: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bucket_secs: 3600,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn bucket(&self) -> Duration {
        Duration::from_secs(self.bucket_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    /// Initialize the tracing subscriber. `RUST_LOG` takes precedence over `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).init(),
            _ => fmt().with_env_filter(filter).init(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub csv_logging: bool,
    pub csv_log_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: "analyses.csv".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub openweather_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub polymarket_gamma_url: String,
    pub polymarket_ws_url: String,
    pub tesseract_bin: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Missing file means defaults; a present but broken file is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.estimator.validate().context("invalid [estimator] section")?;
        self.blend.validate().context("invalid [blend] section")?;
        anyhow::ensure!(
            self.recommendation.fallback_threshold.is_finite(),
            "recommendation.fallback_threshold must be finite"
        );
        anyhow::ensure!(self.cache.bucket_secs > 0, "cache.bucket_secs must be positive");
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            openweather_api_key: std::env::var("OPENWEATHER_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty()),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o"),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com"),
            polymarket_gamma_url: env_or(
                "POLYMARKET_GAMMA_URL",
                "https://gamma-api.polymarket.com",
            ),
            polymarket_ws_url: env_or(
                "POLYMARKET_WS_URL",
                "wss://ws-subscriptions-clob.polymarket.com/ws/market",
            ),
            tesseract_bin: env_or("TESSERACT_BIN", "tesseract"),
        }
    }

    pub fn require_openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .context("OPENAI_API_KEY not set")
    }
}

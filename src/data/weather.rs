use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ProvidersConfig;
use crate::data::cities::City;
use crate::data::types::{ForecastSample, NowcastKind, NowcastSignal};
use crate::estimator::ForecastEnsemble;

const USER_AGENT: &str = "WeatherSniper/1.0";
const OWM_BASE_URL: &str = "https://api.openweathermap.org";
const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";
const NOAA_BASE_URL: &str = "https://api.weather.gov";

/// OpenWeatherMap returns 3-hour steps; 8 of them cover the next day.
const OWM_WINDOW_ENTRIES: usize = 8;

/// WMO weather codes 95-99 are thunderstorms.
const THUNDERSTORM_CODES: std::ops::RangeInclusive<u32> = 95..=99;

/// What one provider said about one city/day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderForecast {
    pub samples: Vec<ForecastSample>,
    pub rain_mm: Option<f64>,
    pub condition: Option<String>,
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_daily_high(&self, city: &City, date: NaiveDate) -> Result<ProviderForecast>;
}

#[async_trait]
pub trait NowcastProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_nowcasts(&self, city: &City) -> Result<Vec<NowcastSignal>>;
}

/// Ensemble plus the side information the forecast digest shows.
#[derive(Debug, Clone, Default)]
pub struct EnsembleReport {
    pub ensemble: ForecastEnsemble,
    pub rain_mm: Option<f64>,
    pub condition: Option<String>,
    pub failed_providers: Vec<&'static str>,
}

/// Query every provider concurrently. A provider that errors contributes
/// nothing; the ensemble may come back empty.
pub async fn collect_ensemble(
    providers: &[Arc<dyn ForecastProvider>],
    city: &City,
    date: NaiveDate,
) -> EnsembleReport {
    let fetches = providers.iter().map(|provider| async move {
        (provider.name(), provider.fetch_daily_high(city, date).await)
    });

    let mut report = EnsembleReport::default();
    for (name, result) in join_all(fetches).await {
        match result {
            Ok(forecast) => {
                debug!("{} returned {} sample(s) for {}", name, forecast.samples.len(), city.name);
                report.ensemble.extend(forecast.samples);
                if let Some(rain) = forecast.rain_mm {
                    report.rain_mm = Some(report.rain_mm.map_or(rain, |r| r.max(rain)));
                }
                if report.condition.is_none() {
                    report.condition = forecast.condition;
                }
            }
            Err(e) => {
                warn!("Forecast provider {} failed for {}: {:#}", name, city.name, e);
                report.failed_providers.push(name);
            }
        }
    }

    info!(
        "Collected {} forecast sample(s) for {} on {} ({} provider failure(s))",
        report.ensemble.len(),
        city.name,
        date,
        report.failed_providers.len()
    );
    report
}

pub async fn collect_nowcasts(
    providers: &[Arc<dyn NowcastProvider>],
    city: &City,
) -> Vec<NowcastSignal> {
    let fetches = providers
        .iter()
        .map(|provider| async move { (provider.name(), provider.fetch_nowcasts(city).await) });

    let mut signals = Vec::new();
    for (name, result) in join_all(fetches).await {
        match result {
            Ok(found) => signals.extend(found),
            Err(e) => warn!("Nowcast provider {} failed for {}: {:#}", name, city.name, e),
        }
    }
    signals
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

fn build_client(config: &ProvidersConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build weather http client")
}

// ---------------------------------------------------------------------------
// OpenWeatherMap

#[derive(Debug, Deserialize)]
struct OwmResponse {
    list: Vec<OwmEntry>,
}

#[derive(Debug, Deserialize)]
struct OwmEntry {
    main: OwmMain,
    #[serde(default)]
    rain: Option<OwmRain>,
    #[serde(default)]
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwmRain {
    #[serde(rename = "3h", default)]
    three_hour: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    description: String,
}

pub struct OpenWeatherMapProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherMapProvider {
    pub fn new(api_key: String, config: &ProvidersConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            api_key,
            base_url: OWM_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Max temperature and total rain over the next day of 3-hour steps.
fn owm_outlook(response: &OwmResponse) -> Result<ProviderForecast> {
    let window = &response.list[..response.list.len().min(OWM_WINDOW_ENTRIES)];
    let max_temp = window
        .iter()
        .map(|e| e.main.temp)
        .filter(|t| t.is_finite())
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
        .context("OpenWeatherMap returned no temperatures")?;

    let rain_mm = window
        .iter()
        .filter_map(|e| e.rain.as_ref().map(|r| r.three_hour))
        .sum::<f64>();

    let condition = window
        .first()
        .and_then(|e| e.weather.first())
        .map(|w| w.description.clone());

    Ok(ProviderForecast {
        samples: vec![ForecastSample::new("OpenWeatherMap", max_temp)],
        rain_mm: Some(rain_mm),
        condition,
    })
}

#[async_trait]
impl ForecastProvider for OpenWeatherMapProvider {
    fn name(&self) -> &'static str {
        "OpenWeatherMap"
    }

    /// Uses the rolling next-24h window; the date is not selectable on the free tier.
    async fn fetch_daily_high(&self, city: &City, _date: NaiveDate) -> Result<ProviderForecast> {
        let url = format!("{}/data/2.5/forecast", self.base_url.trim_end_matches('/'));
        let response: OwmResponse = self
            .client
            .get(&url)
            .query(&[
                ("lat", city.lat.to_string()),
                ("lon", city.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "imperial".to_string()),
            ])
            .send()
            .await
            .context("OpenWeatherMap request failed")?
            .error_for_status()
            .context("OpenWeatherMap returned an error status")?
            .json()
            .await
            .context("Failed to parse OpenWeatherMap response")?;

        owm_outlook(&response)
    }
}

// ---------------------------------------------------------------------------
// Open-Meteo

#[derive(Debug, Deserialize)]
struct OpenMeteoDailyResponse {
    daily: OpenMeteoDaily,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourlyResponse {
    hourly: OpenMeteoHourly,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoHourly {
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<u32>>,
}

pub struct OpenMeteoProvider {
    client: Client,
    base_url: String,
    nowcast_hours: u32,
}

impl OpenMeteoProvider {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: OPEN_METEO_BASE_URL.to_string(),
            nowcast_hours: config.nowcast_hours,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn open_meteo_daily_high(daily: &OpenMeteoDaily, date: NaiveDate) -> Result<ProviderForecast> {
    let wanted = date.format("%Y-%m-%d").to_string();
    let index = daily
        .time
        .iter()
        .position(|t| *t == wanted)
        .with_context(|| format!("Open-Meteo has no forecast for {}", wanted))?;

    let max_temp = daily
        .temperature_2m_max
        .get(index)
        .copied()
        .flatten()
        .with_context(|| format!("Open-Meteo max temperature missing for {}", wanted))?;

    let rain_mm = daily.precipitation_sum.get(index).copied().flatten();

    Ok(ProviderForecast {
        samples: vec![ForecastSample::new("Open-Meteo", max_temp)],
        rain_mm,
        condition: None,
    })
}

fn open_meteo_nowcasts(hourly: &OpenMeteoHourly) -> Vec<NowcastSignal> {
    let mut signals = Vec::new();

    let precip = hourly
        .precipitation_probability
        .iter()
        .flatten()
        .copied()
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));
    if let Some(max_pct) = precip {
        signals.push(NowcastSignal::new(NowcastKind::Precipitation, max_pct / 100.0));
    }

    let codes: Vec<u32> = hourly.weather_code.iter().flatten().copied().collect();
    if !codes.is_empty() {
        let stormy = codes.iter().filter(|c| THUNDERSTORM_CODES.contains(*c)).count();
        signals.push(NowcastSignal::new(
            NowcastKind::Storm,
            stormy as f64 / codes.len() as f64,
        ));
    }

    signals
}

#[async_trait]
impl ForecastProvider for OpenMeteoProvider {
    fn name(&self) -> &'static str {
        "Open-Meteo"
    }

    async fn fetch_daily_high(&self, city: &City, date: NaiveDate) -> Result<ProviderForecast> {
        let url = format!("{}/v1/forecast", self.base_url.trim_end_matches('/'));
        let response: OpenMeteoDailyResponse = self
            .client
            .get(&url)
            .query(&[
                ("latitude", city.lat.to_string()),
                ("longitude", city.lon.to_string()),
                ("daily", "temperature_2m_max,precipitation_sum".to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", "3".to_string()),
            ])
            .send()
            .await
            .context("Open-Meteo request failed")?
            .error_for_status()
            .context("Open-Meteo returned an error status")?
            .json()
            .await
            .context("Failed to parse Open-Meteo daily response")?;

        open_meteo_daily_high(&response.daily, date)
    }
}

#[async_trait]
impl NowcastProvider for OpenMeteoProvider {
    fn name(&self) -> &'static str {
        "Open-Meteo"
    }

    async fn fetch_nowcasts(&self, city: &City) -> Result<Vec<NowcastSignal>> {
        let url = format!("{}/v1/forecast", self.base_url.trim_end_matches('/'));
        let response: OpenMeteoHourlyResponse = self
            .client
            .get(&url)
            .query(&[
                ("latitude", city.lat.to_string()),
                ("longitude", city.lon.to_string()),
                ("hourly", "precipitation_probability,weather_code".to_string()),
                ("forecast_hours", self.nowcast_hours.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .context("Open-Meteo nowcast request failed")?
            .error_for_status()
            .context("Open-Meteo returned an error status")?
            .json()
            .await
            .context("Failed to parse Open-Meteo hourly response")?;

        Ok(open_meteo_nowcasts(&response.hourly))
    }
}

// ---------------------------------------------------------------------------
// NOAA

#[derive(Debug, Deserialize)]
struct NoaaResponse {
    properties: NoaaProperties,
}

#[derive(Debug, Deserialize)]
struct NoaaProperties {
    periods: Vec<NoaaPeriod>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoaaPeriod {
    start_time: String,
    temperature: f64,
    temperature_unit: String,
    #[serde(default)]
    short_forecast: Option<String>,
}

pub struct NoaaProvider {
    client: Client,
    base_url: String,
}

impl NoaaProvider {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: NOAA_BASE_URL.to_string(),
        })
    }
}

/// Max over the hourly periods that start on `date` in the station's local time.
fn noaa_daily_high(periods: &[NoaaPeriod], date: NaiveDate) -> Result<ProviderForecast> {
    let on_date: Vec<&NoaaPeriod> = periods
        .iter()
        .filter(|p| {
            DateTime::parse_from_rfc3339(&p.start_time)
                .map(|t| t.date_naive() == date)
                .unwrap_or(false)
        })
        .collect();

    let max_temp = on_date
        .iter()
        .map(|p| match p.temperature_unit.as_str() {
            "C" => celsius_to_fahrenheit(p.temperature),
            _ => p.temperature,
        })
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
        .with_context(|| format!("NOAA has no hourly periods on {}", date))?;

    Ok(ProviderForecast {
        samples: vec![ForecastSample::new("NOAA", max_temp)],
        rain_mm: None,
        condition: on_date.first().and_then(|p| p.short_forecast.clone()),
    })
}

#[async_trait]
impl ForecastProvider for NoaaProvider {
    fn name(&self) -> &'static str {
        "NOAA"
    }

    async fn fetch_daily_high(&self, city: &City, date: NaiveDate) -> Result<ProviderForecast> {
        let grid_url = format!(
            "{}/points/{},{}",
            self.base_url.trim_end_matches('/'),
            city.lat,
            city.lon
        );

        let grid_response: serde_json::Value = self
            .client
            .get(&grid_url)
            .send()
            .await
            .context("NOAA points request failed")?
            .error_for_status()
            .context("NOAA points returned an error status")?
            .json()
            .await
            .context("Failed to parse NOAA points response")?;

        let forecast_hourly_url = grid_response["properties"]["forecastHourly"]
            .as_str()
            .context("Missing forecast URL")?;

        let forecast_response: NoaaResponse = self
            .client
            .get(forecast_hourly_url)
            .send()
            .await
            .context("NOAA hourly forecast request failed")?
            .error_for_status()
            .context("NOAA hourly forecast returned an error status")?
            .json()
            .await
            .context("Failed to parse NOAA hourly forecast")?;

        noaa_daily_high(&forecast_response.properties.periods, date)
    }
}

/// Build the configured forecast and nowcast providers.
pub fn build_providers(
    config: &ProvidersConfig,
    openweather_api_key: Option<&str>,
) -> Result<(Vec<Arc<dyn ForecastProvider>>, Vec<Arc<dyn NowcastProvider>>)> {
    let mut forecasts: Vec<Arc<dyn ForecastProvider>> = Vec::new();
    let mut nowcasts: Vec<Arc<dyn NowcastProvider>> = Vec::new();

    if config.openweathermap {
        match openweather_api_key {
            Some(key) => {
                let owm = OpenWeatherMapProvider::new(key.to_string(), config)?;
                forecasts.push(Arc::new(owm));
            }
            None => warn!("OpenWeatherMap enabled but OPENWEATHER_API_KEY is not set, skipping"),
        }
    }
    if config.open_meteo {
        let open_meteo = Arc::new(OpenMeteoProvider::new(config)?);
        forecasts.push(open_meteo.clone());
        if config.nowcasts {
            nowcasts.push(open_meteo);
        }
    }
    if config.noaa {
        forecasts.push(Arc::new(NoaaProvider::new(config)?));
    }

    info!(
        "Configured {} forecast provider(s), {} nowcast provider(s)",
        forecasts.len(),
        nowcasts.len()
    );
    Ok((forecasts, nowcasts))
}

//! OpenWeatherMap 5-day / 3-hour forecast adapter.

use chrono::DateTime;
use serde::Deserialize;

use crate::path::Coordinate;
use crate::traits::{ForecastSource, LookupError};
use crate::weather::ForecastSample;

#[derive(Debug, Clone)]
pub struct OpenWeatherConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    config: OpenWeatherConfig,
    client: reqwest::blocking::Client,
}

impl OpenWeatherClient {
    pub fn new(config: OpenWeatherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

impl ForecastSource for OpenWeatherClient {
    fn forecast(&self, at: Coordinate) -> Result<Vec<ForecastSample>, LookupError> {
        let url = format!("{}/forecast", self.config.base_url.trim_end_matches('/'));

        let body = self
            .client
            .get(url)
            .query(&[
                ("lat", at.lat.to_string()),
                ("lon", at.lon.to_string()),
                ("appid", self.config.api_key.clone()),
            ])
            .send()?
            .error_for_status()?
            .json::<ForecastResponse>()?;

        samples_from(body)
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    #[serde(default)]
    weather: Vec<WeatherEntry>,
}

#[derive(Debug, Deserialize)]
struct WeatherEntry {
    main: String,
}

/// Entries without a weather block are skipped; tags are lowercased.
fn samples_from(response: ForecastResponse) -> Result<Vec<ForecastSample>, LookupError> {
    let mut samples = Vec::with_capacity(response.list.len());
    for entry in response.list {
        let Some(weather) = entry.weather.first() else {
            continue;
        };
        let timestamp = DateTime::from_timestamp(entry.dt, 0)
            .ok_or_else(|| LookupError::Parse(format!("timestamp {} out of range", entry.dt)))?;
        samples.push(ForecastSample::new(timestamp, weather.main.to_lowercase()));
    }
    Ok(samples)
}

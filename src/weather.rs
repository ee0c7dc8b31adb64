//! Weather fetching via the Open-Meteo public API.
//!
//! Two requests per refresh: a geocoding lookup turning the configured
//! place name into coordinates, then a forecast call for current
//! conditions plus the day's high/low. Every field of the result is
//! optional so a partial response still renders; callers downgrade a
//! failed fetch to `None` and never let weather problems touch the
//! calendar side.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GEOCODE_TIMEOUT_SECS, WEATHER_TIMEOUT_SECS};

const GEOCODE_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Weather result consumed by the renderer. All-optional by design: the
/// dashboard shows `--` placeholders for anything missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    /// Current temperature, °C.
    pub temp: Option<f64>,
    /// Today's high, °C.
    pub high: Option<f64>,
    /// Today's low, °C.
    pub low: Option<f64>,
    /// Current relative humidity, %.
    pub humidity: Option<f64>,
    /// WMO weather interpretation code.
    pub weather_code: Option<i64>,
    /// Whether it is currently daytime at the location.
    pub is_day: bool,
}

impl Default for WeatherReport {
    fn default() -> Self {
        WeatherReport {
            temp: None,
            high: None,
            low: None,
            humidity: None,
            weather_code: None,
            is_day: true,
        }
    }
}

/// Why a weather fetch failed. Only ever logged; the snapshot records the
/// failure as an absent report.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("geocoding found no result for '{0}'")]
    Geocode(String),
    #[error("weather request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Fetch the weather for a place name, localizing daily values to the
/// user's timezone.
pub async fn fetch(
    http: &Client,
    location: &str,
    timezone: &str,
) -> Result<WeatherReport, WeatherError> {
    let (lat, lon) = geocode(http, location).await?;
    tracing::debug!(location, lat, lon, "geocoded weather location");
    forecast(http, lat, lon, timezone).await
}

async fn geocode(http: &Client, location: &str) -> Result<(f64, f64), WeatherError> {
    let response: GeocodeResponse = http
        .get(GEOCODE_URL)
        .timeout(Duration::from_secs(GEOCODE_TIMEOUT_SECS))
        .query(&[
            ("name", location),
            ("count", "1"),
            ("language", "en"),
            ("format", "json"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    response
        .results
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|result| (result.latitude, result.longitude))
        .ok_or_else(|| WeatherError::Geocode(location.to_string()))
}

async fn forecast(
    http: &Client,
    lat: f64,
    lon: f64,
    timezone: &str,
) -> Result<WeatherReport, WeatherError> {
    let response: ForecastResponse = http
        .get(FORECAST_URL)
        .timeout(Duration::from_secs(WEATHER_TIMEOUT_SECS))
        .query(&[
            ("latitude", lat.to_string().as_str()),
            ("longitude", lon.to_string().as_str()),
            ("timezone", timezone),
            (
                "current",
                "temperature_2m,relative_humidity_2m,is_day,weather_code",
            ),
            ("daily", "weather_code,temperature_2m_max,temperature_2m_min"),
            ("forecast_days", "1"),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(build_report(response))
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    results: Option<Vec<GeocodeResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current: Option<CurrentBlock>,
    #[serde(default)]
    daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    is_day: Option<u8>,
    weather_code: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    weather_code: Vec<Option<i64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
}

fn build_report(response: ForecastResponse) -> WeatherReport {
    let current = response.current.unwrap_or_default();
    let daily = response.daily.unwrap_or_default();

    let first = |values: &[Option<f64>]| values.first().copied().flatten();

    // The current code can be absent; today's daily code is the next best.
    let weather_code = current
        .weather_code
        .or_else(|| daily.weather_code.first().copied().flatten());

    WeatherReport {
        temp: current.temperature_2m,
        high: first(&daily.temperature_2m_max),
        low: first(&daily.temperature_2m_min),
        humidity: current.relative_humidity_2m,
        weather_code,
        is_day: current.is_day.map(|d| d != 0).unwrap_or(true),
    }
}

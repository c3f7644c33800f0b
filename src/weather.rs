//! Ambient temperature enrichment
//!
//! Two interchangeable REST providers share one capability contract: a
//! point-in-time temperature and an hourly series covering a whole day.
//! Whichever API key is configured selects the provider; with no key the
//! enrichment is a no-op and readings simply stay without temperature.

pub mod darksky;
pub mod openweather;

use crate::config::WeatherConfig;
use crate::error::{HeliographError, Result};
use crate::logging::StructuredLogger;
use crate::retry::{MAX_HTTP_ATTEMPTS, cubic_backoff};
use crate::types::TemperaturePoint;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

pub use darksky::DarkSkyClient;
pub use openweather::OpenWeatherClient;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const SECONDS_PER_DAY: i64 = 86_400;

/// The configured weather provider
pub enum WeatherService {
    DarkSky(DarkSkyClient),
    OpenWeather(OpenWeatherClient),
}

impl WeatherService {
    /// Resolve the provider from whichever API key is configured, Dark Sky
    /// first as the original tooling did; `None` disables enrichment.
    pub fn from_config(config: &WeatherConfig) -> Result<Option<Self>> {
        if !config.darksky_api_key.is_empty() {
            return Ok(Some(Self::DarkSky(DarkSkyClient::new(
                &config.darksky_api_key,
            )?)));
        }
        if !config.openweather_api_key.is_empty() {
            return Ok(Some(Self::OpenWeather(OpenWeatherClient::new(
                &config.openweather_api_key,
            )?)));
        }
        Ok(None)
    }

    /// Current temperature at the given coordinates, Celsius
    pub async fn temperature_at(&self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
        match self {
            Self::DarkSky(client) => client.temperature_at(latitude, longitude).await,
            Self::OpenWeather(client) => client.temperature_at(latitude, longitude).await,
        }
    }

    /// Hourly temperature series covering the given day in every timezone
    pub async fn temperature_series_for_day(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Vec<TemperaturePoint>> {
        match self {
            Self::DarkSky(client) => {
                client
                    .temperature_series_for_day(latitude, longitude, date)
                    .await
            }
            Self::OpenWeather(client) => {
                client
                    .temperature_series_for_day(latitude, longitude, date)
                    .await
            }
        }
    }
}

/// UTC-midnight timestamps of the day before, the day itself and the day
/// after, the last clamped to `now` when the target day is still in progress.
///
/// Providers return hourly history per UTC day; the one-day margin on both
/// sides covers every local timezone offset.
pub(crate) fn day_window(date: NaiveDate, now_ts: i64) -> [i64; 3] {
    let base = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    [
        base - SECONDS_PER_DAY,
        base,
        (base + SECONDS_PER_DAY).min(now_ts),
    ]
}

/// Whether the whole window for `date` still falls inside a provider's
/// history retention measured in days from today's UTC midnight.
pub(crate) fn within_retention(date: NaiveDate, now_ts: i64, retention_days: i64) -> bool {
    let day_before = date.and_time(NaiveTime::MIN).and_utc().timestamp() - SECONDS_PER_DAY;
    let today_start = now_ts - now_ts.rem_euclid(SECONDS_PER_DAY);
    day_before > today_start - retention_days * SECONDS_PER_DAY
}

/// GET a JSON document with the bounded cubic-backoff retry policy
pub(crate) async fn get_json(
    http: &reqwest::Client,
    url: &str,
    logger: &StructuredLogger,
) -> Result<Value> {
    for attempt in 1..=MAX_HTTP_ATTEMPTS {
        let outcome = async {
            let response = http.get(url).send().await?.error_for_status()?;
            Ok::<Value, HeliographError>(response.json::<Value>().await?)
        }
        .await;

        match outcome {
            Ok(body) => return Ok(body),
            Err(e) => {
                logger.warn(&e.to_string());
                if attempt < MAX_HTTP_ATTEMPTS {
                    sleep(cubic_backoff(attempt)).await;
                }
            }
        }
    }
    Err(HeliographError::network("failed to call the weather API"))
}

//! Dark Sky forecast client
//!
//! Same capability contract as the OpenWeather client; the forecast endpoint
//! carries the current conditions and the time-machine variant serves one UTC
//! day of hourly history per call.

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::types::TemperaturePoint;
use crate::weather::{REQUEST_TIMEOUT, day_window, get_json};
use chrono::NaiveDate;
use serde_json::Value;

const FORECAST_URL: &str = "https://api.darksky.net/forecast";

pub struct DarkSkyClient {
    api_key: String,
    http: reqwest::Client,
    logger: StructuredLogger,
}

impl DarkSkyClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            http,
            logger: get_logger("darksky"),
        })
    }

    /// Current temperature at the given coordinates, Celsius
    pub async fn temperature_at(&self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
        let url = format!(
            "{}/{}/{},{}?units=si&exclude=minutely,hourly,daily,alerts",
            FORECAST_URL, self.api_key, latitude, longitude
        );
        let body = get_json(&self.http, &url, &self.logger).await?;
        Ok(body
            .get("currently")
            .and_then(|currently| currently.get("temperature"))
            .and_then(Value::as_f64))
    }

    /// Hourly temperatures covering the given day in every timezone
    pub async fn temperature_series_for_day(
        &self,
        latitude: f64,
        longitude: f64,
        date: NaiveDate,
    ) -> Result<Vec<TemperaturePoint>> {
        let now_ts = chrono::Utc::now().timestamp();

        let mut series = Vec::new();
        for day_ts in day_window(date, now_ts) {
            let url = format!(
                "{}/{}/{},{},{}?units=si&exclude=currently,minutely,daily,alerts",
                FORECAST_URL, self.api_key, latitude, longitude, day_ts
            );
            let body = get_json(&self.http, &url, &self.logger).await?;
            let Some(hourly) = body
                .get("hourly")
                .and_then(|hourly| hourly.get("data"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for sample in hourly {
                if let (Some(time), Some(temperature_c)) = (
                    sample.get("time").and_then(Value::as_i64),
                    sample.get("temperature").and_then(Value::as_f64),
                ) {
                    series.push(TemperaturePoint {
                        time,
                        temperature_c,
                    });
                }
            }
        }
        Ok(series)
    }
}

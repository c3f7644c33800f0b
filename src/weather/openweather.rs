//! OpenWeather One Call client
//!
//! The time-machine endpoint serves hourly history per UTC day and only
//! retains the last five days; older dates are rejected before any request
//! goes out.

use crate::error::{HeliographError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::types::TemperaturePoint;
use crate::weather::{REQUEST_TIMEOUT, day_window, get_json, within_retention};
use chrono::NaiveDate;
use serde_json::Value;

const ONECALL_URL: &str = "https://api.openweathermap.org/data/2.5/onecall";

/// Days of hourly history the time-machine endpoint retains
const RETENTION_DAYS: i64 = 5;

pub struct OpenWeatherClient {
    api_key: String,
    http: reqwest::Client,
    logger: StructuredLogger,
}

impl OpenWeatherClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            http,
            logger: get_logger("openweather"),
        })
    }

    /// Current temperature at the given coordinates, Celsius
    pub async fn temperature_at(&self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
        let url = format!(
            "{}?lat={}&lon={}&units=metric&exclude=minutely,hourly,daily,alerts&appid={}",
            ONECALL_URL, latitude, longitude, self.api_key
        );
        let body = get_json(&self.http, &url, &self.logger).await?;
        Ok(body
            .get("current")
            .and_then(|current| current.get("temp"))
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
        if !within_retention(date, now_ts, RETENTION_DAYS) {
            return Err(HeliographError::incomplete(format!(
                "OpenWeather historic data is only available for {} days; \
                 upload will exclude temperature data",
                RETENTION_DAYS
            )));
        }

        let mut series = Vec::new();
        for day_ts in day_window(date, now_ts) {
            let url = format!(
                "{}/timemachine?lat={}&lon={}&units=metric&dt={}&appid={}",
                ONECALL_URL, latitude, longitude, day_ts, self.api_key
            );
            let body = get_json(&self.http, &url, &self.logger).await?;
            let Some(hourly) = body.get("hourly").and_then(Value::as_array) else {
                continue;
            };
            for sample in hourly {
                if let (Some(time), Some(temperature_c)) = (
                    sample.get("dt").and_then(Value::as_i64),
                    sample.get("temp").and_then(Value::as_f64),
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

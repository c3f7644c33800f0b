//! PVOutput delivery protocol
//!
//! Two endpoints: `addstatus.jsp` takes one live sample as `v1..v6` form
//! fields, `addbatchstatus.jsp` takes up to 30 semicolon-joined records per
//! request. Every response refreshes the rate-limit bookkeeping; the
//! status-code policy distinguishes fatal credential rejection, rate-limit
//! waits, service unavailability and plain retryable failures.

use crate::csv_sink::ArchiveRecord;
use crate::error::{HeliographError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::notify::Notifier;
use crate::retry::{MAX_HTTP_ATTEMPTS, cubic_backoff};
use crate::types::{DayEntry, TemperaturePoint};
use chrono_tz::Tz;
use std::time::Duration;
use tokio::time::sleep;

const ADD_STATUS_URL: &str = "https://pvoutput.org/service/r2/addstatus.jsp";
const ADD_BATCH_URL: &str = "https://pvoutput.org/service/r2/addbatchstatus.jsp";

/// Maximum records per bulk request
pub const BATCH_CHUNK_SIZE: usize = 30;

/// Remaining-quota level that triggers a warning
const LOW_QUOTA_THRESHOLD: u32 = 10;

/// Wait applied on a 503 before the next attempt
const UNAVAILABLE_BACKOFF: Duration = Duration::from_secs(120);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Remaining request quota and reset time, refreshed from response headers.
/// Ephemeral: lives only for the duration of one call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    pub reset_epoch: Option<f64>,
}

impl RateLimitState {
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        fn parse<T: std::str::FromStr>(
            headers: &reqwest::header::HeaderMap,
            name: &str,
        ) -> Option<T> {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok())
        }
        Self {
            remaining: parse(headers, "X-Rate-Limit-Remaining"),
            reset_epoch: parse(headers, "X-Rate-Limit-Reset"),
        }
    }

    /// Seconds until the quota resets, measured from `now_ts`
    pub fn reset_in(&self, now_ts: f64) -> i64 {
        match self.reset_epoch {
            Some(reset) => (reset - now_ts).round() as i64,
            None => 0,
        }
    }
}

/// How a response status code is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    /// 401: credentials invalid, abort the process
    Fatal,
    /// 403: quota exhausted, wait for the reported reset
    RateLimited,
    /// 503: service down, wait a fixed two minutes
    Unavailable,
    /// Everything else: verify success, retry on failure
    Verify,
}

pub fn classify_status(status: u16) -> StatusPolicy {
    match status {
        401 => StatusPolicy::Fatal,
        403 => StatusPolicy::RateLimited,
        503 => StatusPolicy::Unavailable,
        _ => StatusPolicy::Verify,
    }
}

/// Serialize one day-trace entry as a batch record
fn batch_record(entry: &DayEntry, temperatures: Option<&[TemperaturePoint]>) -> String {
    let mut fields = vec![
        entry.timestamp.format("%Y%m%d").to_string(),
        entry.timestamp.format("%H:%M").to_string(),
        format!("{}", (entry.energy_today_kwh * 1000.0).round() as i64),
        format!("{}", entry.power_w),
        format!("{}", (entry.energy_used_kwh * 1000.0).round() as i64),
        format!("{}", entry.load_w),
    ];
    if let Some(series) = temperatures {
        let at = entry.timestamp.timestamp();
        if let Some(point) = series.iter().rev().find(|point| point.time <= at) {
            fields.push(format!("{}", point.temperature_c));
        }
    }
    fields.join(",")
}

/// Partition a day trace into bulk request payloads of at most
/// [`BATCH_CHUNK_SIZE`] records each
pub fn batch_payloads(entries: &[DayEntry], temperatures: Option<&[TemperaturePoint]>) -> Vec<String> {
    entries
        .chunks(BATCH_CHUNK_SIZE)
        .map(|chunk| {
            chunk
                .iter()
                .map(|entry| batch_record(entry, temperatures))
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect()
}

/// Serialize re-parsed archive rows as bulk request payloads
pub fn archive_payloads(records: &[ArchiveRecord]) -> Vec<String> {
    records
        .chunks(BATCH_CHUNK_SIZE)
        .map(|chunk| {
            chunk
                .iter()
                .map(|record| {
                    let mut fields = vec![
                        record.timestamp.format("%Y%m%d").to_string(),
                        record.timestamp.format("%H:%M").to_string(),
                        format!("{}", (record.energy_today_kwh * 1000.0).round() as i64),
                        format!("{}", record.power_w),
                        format!("{}", (record.energy_used_kwh * 1000.0).round() as i64),
                        format!("{}", record.load_w),
                    ];
                    if let Some(temperature) = record.temperature_c {
                        fields.push(format!("{}", temperature));
                    } else {
                        fields.push(String::new());
                    }
                    if let Some(voltage) = record.voltage_v {
                        fields.push(format!("{}", voltage));
                    } else {
                        fields.push(String::new());
                    }
                    fields.join(",")
                })
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect()
}

/// Delivery client for one registered PVOutput system
pub struct PvOutputClient {
    system_id: String,
    api_key: String,
    http: reqwest::Client,
    notifier: Notifier,
    logger: StructuredLogger,
    tz: Tz,
}

impl PvOutputClient {
    pub fn new(system_id: &str, api_key: &str, notifier: Notifier, tz: Tz) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            system_id: system_id.to_string(),
            api_key: api_key.to_string(),
            http,
            notifier,
            logger: get_logger("pvoutput"),
            tz,
        })
    }

    /// Push one live sample, stamped with the current local time
    pub async fn add_status(
        &self,
        power_w: f64,
        energy_today_kwh: f64,
        temperature_c: Option<f64>,
        voltage_v: Option<f64>,
        energy_used_kwh: f64,
        load_w: f64,
    ) -> Result<()> {
        let now = chrono::Utc::now().with_timezone(&self.tz);
        let mut payload = vec![
            ("d".to_string(), now.format("%Y%m%d").to_string()),
            ("t".to_string(), now.format("%H:%M").to_string()),
            (
                "v1".to_string(),
                format!("{}", (energy_today_kwh * 1000.0).round() as i64),
            ),
            ("v2".to_string(), format!("{}", power_w.round() as i64)),
            (
                "v3".to_string(),
                format!("{}", (energy_used_kwh * 1000.0).round() as i64),
            ),
            ("v4".to_string(), format!("{}", load_w.round() as i64)),
        ];
        if let Some(temperature) = temperature_c {
            payload.push(("v5".to_string(), format!("{}", temperature)));
        }
        if let Some(voltage) = voltage_v {
            payload.push(("v6".to_string(), format!("{}", voltage)));
        }

        self.call(ADD_STATUS_URL, &payload).await
    }

    /// Upload a reconstructed day trace in bulk chunks
    pub async fn add_day(
        &self,
        entries: &[DayEntry],
        temperatures: Option<&[TemperaturePoint]>,
    ) -> Result<()> {
        for payload in batch_payloads(entries, temperatures) {
            self.call(ADD_BATCH_URL, &[("data".to_string(), payload)])
                .await?;
        }
        Ok(())
    }

    /// Upload re-parsed CSV archive rows in bulk chunks
    pub async fn add_day_csv(&self, records: &[ArchiveRecord]) -> Result<()> {
        for payload in archive_payloads(records) {
            self.call(ADD_BATCH_URL, &[("data".to_string(), payload)])
                .await?;
        }
        Ok(())
    }

    /// POST one payload under the bounded retry policy.
    ///
    /// 401 aborts immediately; 403 waits out the reported reset; 503 waits a
    /// fixed two minutes; transport failures and other non-2xx responses
    /// retry on the cubic schedule. At most [`MAX_HTTP_ATTEMPTS`] attempts.
    async fn call(&self, url: &str, payload: &[(String, String)]) -> Result<()> {
        self.logger.debug(&format!("{:?}", payload));

        for attempt in 1..=MAX_HTTP_ATTEMPTS {
            let response = self
                .http
                .post(url)
                .header("X-Pvoutput-Apikey", &self.api_key)
                .header("X-Pvoutput-SystemId", &self.system_id)
                .header("X-Rate-Limit", "1")
                .form(payload)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let limits = RateLimitState::from_headers(response.headers());
                    let now_ts = chrono::Utc::now().timestamp() as f64;
                    let reset = limits.reset_in(now_ts).max(0);
                    if let Some(remaining) = limits.remaining
                        && remaining < LOW_QUOTA_THRESHOLD
                    {
                        self.logger.warn(&format!(
                            "Only {} requests left, reset after {} seconds",
                            remaining, reset
                        ));
                    }

                    let status = response.status();
                    match classify_status(status.as_u16()) {
                        StatusPolicy::Fatal => {
                            let message = format!(
                                "Unable to connect to pvoutput.org - Reason: {}",
                                status
                            );
                            self.logger.error(&message);
                            return Err(HeliographError::auth(message));
                        }
                        StatusPolicy::RateLimited => {
                            self.logger.warn(&format!(
                                "Unable to connect to pvoutput.org - Forbidden: {}",
                                status
                            ));
                            sleep(Duration::from_secs((reset + 1) as u64)).await;
                        }
                        StatusPolicy::Unavailable => {
                            self.logger.warn(&format!(
                                "Unable to connect to pvoutput.org - Reason: {}",
                                status
                            ));
                            sleep(UNAVAILABLE_BACKOFF).await;
                        }
                        StatusPolicy::Verify => {
                            if status.is_success() {
                                self.logger
                                    .info(&format!("PVOutput.org result: {}", status));
                                return Ok(());
                            }
                            let body = response.text().await.unwrap_or_default();
                            let message = if body.is_empty() {
                                format!("PVOutput.org rejected the request: {}", status)
                            } else {
                                body
                            };
                            self.logger.warn(&message);
                            self.notifier.send(&message).await;
                            sleep(cubic_backoff(attempt)).await;
                        }
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    self.logger.warn(&message);
                    self.notifier.send(&message).await;
                    sleep(cubic_backoff(attempt)).await;
                }
            }
        }

        let message = "Failed to call PVOutput API";
        self.logger.error(message);
        self.notifier.send(message).await;
        Err(HeliographError::delivery(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(hour: u32, minute: u32) -> DayEntry {
        DayEntry {
            timestamp: chrono_tz::UTC
                .with_ymd_and_hms(2023, 6, 1, hour, minute, 0)
                .unwrap(),
            power_w: 1500.0,
            load_w: 400.0,
            energy_today_kwh: 3.217,
            energy_used_kwh: 1.111,
        }
    }

    #[test]
    fn test_status_policy() {
        assert_eq!(classify_status(401), StatusPolicy::Fatal);
        assert_eq!(classify_status(403), StatusPolicy::RateLimited);
        assert_eq!(classify_status(503), StatusPolicy::Unavailable);
        assert_eq!(classify_status(200), StatusPolicy::Verify);
        assert_eq!(classify_status(400), StatusPolicy::Verify);
    }

    #[test]
    fn test_batch_record_fields() {
        let record = batch_record(&entry(11, 35), None);
        assert_eq!(record, "20230601,11:35,3217,1500,1111,400");
    }

    #[test]
    fn test_batch_record_selects_last_temperature_at_or_before() {
        let at = entry(11, 35).timestamp.timestamp();
        let series = [
            TemperaturePoint {
                time: at - 7200,
                temperature_c: 14.0,
            },
            TemperaturePoint {
                time: at - 600,
                temperature_c: 16.5,
            },
            TemperaturePoint {
                time: at + 600,
                temperature_c: 19.0,
            },
        ];
        let record = batch_record(&entry(11, 35), Some(&series));
        assert!(record.ends_with(",16.5"));
    }

    #[test]
    fn test_chunking_sixty_five_records_into_three_requests() {
        let entries: Vec<DayEntry> = (0..65).map(|i| entry(8 + i / 12, (i % 12) * 5)).collect();
        let payloads = batch_payloads(&entries, None);
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[0].split(';').count(), 30);
        assert_eq!(payloads[1].split(';').count(), 30);
        assert_eq!(payloads[2].split(';').count(), 5);
    }

    #[test]
    fn test_rate_limit_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-Rate-Limit-Remaining", "7".parse().unwrap());
        headers.insert("X-Rate-Limit-Reset", "1700000120".parse().unwrap());

        let limits = RateLimitState::from_headers(&headers);
        assert_eq!(limits.remaining, Some(7));
        assert_eq!(limits.reset_in(1_700_000_000.0), 120);

        let empty = RateLimitState::from_headers(&reqwest::header::HeaderMap::new());
        assert_eq!(empty.remaining, None);
        assert_eq!(empty.reset_in(1_700_000_000.0), 0);
    }
}

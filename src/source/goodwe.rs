//! GoodWe SEMS portal polling client
//!
//! The portal speaks a keyed JSON envelope `{code, data}` over POSTed form
//! requests. Code 0 carries data, code 100001 means the session token has
//! expired and a cross-login exchange must be performed before retrying.

use crate::backfill::{self, PowerSample};
use crate::error::{HeliographError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::retry::{MAX_HTTP_ATTEMPTS, cubic_backoff};
use crate::types::{InverterStatus, Reading};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

const GLOBAL_URL: &str = "https://semsportal.com/api/";
const DEFAULT_TOKEN: &str = r#"{"version":"v3.1","client":"ios","language":"en"}"#;
const USER_AGENT: &str = "SEMS Portal/3.1 (iPhone; iOS 13.5.1; Scale/2.00)";

/// Envelope code signalling an expired session
const SESSION_EXPIRED_CODE: i64 = 100001;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Portal session: the login exchange hands out a region-specific base URL
/// and an opaque token consumed by every subsequent call.
#[derive(Debug, Clone)]
struct Session {
    base_url: String,
    token: String,
}

impl Session {
    fn unauthenticated() -> Self {
        Self {
            base_url: GLOBAL_URL.to_string(),
            token: DEFAULT_TOKEN.to_string(),
        }
    }
}

/// Polling client for one registered power station
pub struct GoodWeClient {
    station_id: String,
    account: String,
    password: String,
    session: Session,
    http: reqwest::Client,
    tz: Tz,
    logger: StructuredLogger,
}

impl GoodWeClient {
    pub fn new(station_id: &str, account: &str, password: &str, tz: Tz) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            station_id: station_id.to_string(),
            account: account.to_string(),
            password: password.to_string(),
            session: Session::unauthenticated(),
            http,
            tz,
            logger: get_logger("goodwe"),
        })
    }

    /// Download and normalize the most recent station snapshot
    pub async fn fetch_current(&mut self) -> Result<Reading> {
        let payload = [("powerStationId", self.station_id.clone())];
        let data = self
            .call("v2/PowerStation/GetMonitorDetailByPowerstationId", &payload)
            .await?;

        let now = chrono::Utc::now().with_timezone(&self.tz);
        let reading = normalize_monitor_detail(&data, now);

        let message = reading.summary();
        match reading.status {
            InverterStatus::Normal | InverterStatus::Offline => self.logger.info(&message),
            _ => self.logger.warn(&message),
        }

        Ok(reading)
    }

    /// Station coordinates from the monitor-detail endpoint
    pub async fn station_location(&mut self) -> Result<Option<(f64, f64)>> {
        let payload = [("powerStationId", self.station_id.clone())];
        let data = self
            .call("v2/PowerStation/GetMonitorDetailByPowerstationId", &payload)
            .await?;
        let Some(info) = data.get("info") else {
            self.logger
                .warn("GetMonitorDetailByPowerstationId returned no station info");
            return Ok(None);
        };
        Ok(location_of(info))
    }

    /// Instantaneous power samples for a past day
    pub async fn day_pac(&mut self, date: NaiveDate) -> Result<Vec<PowerSample>> {
        let payload = [
            ("id", self.station_id.clone()),
            ("date", date.format("%Y-%m-%d").to_string()),
        ];
        let data = self
            .call("v2/PowerStationMonitor/GetPowerStationPacByDayForApp", &payload)
            .await?;

        let Some(pacs) = data.get("pacs").and_then(Value::as_array) else {
            self.logger
                .warn(&format!("GetPowerStationPacByDayForApp returned bad data: {}", data));
            return Ok(Vec::new());
        };

        let mut samples = Vec::with_capacity(pacs.len());
        for pac in pacs {
            let Some(raw_date) = pac.get("date").and_then(Value::as_str) else {
                continue;
            };
            let naive = NaiveDateTime::parse_from_str(raw_date, "%m/%d/%Y %H:%M:%S")?;
            let Some(timestamp) = naive.and_local_timezone(self.tz).earliest() else {
                continue;
            };
            samples.push(PowerSample {
                timestamp,
                power_w: pac.get("pac").and_then(Value::as_f64).unwrap_or(0.0),
            });
        }
        Ok(samples)
    }

    /// Instantaneous load samples for a past day, paired by index with the
    /// power series
    pub async fn day_load(&mut self, date: NaiveDate) -> Result<Vec<f64>> {
        let data = self.chart_by_plant(date, "1").await?;
        let Some(xy) = data
            .get("lines")
            .and_then(|lines| lines.get(3))
            .and_then(|line| line.get("xy"))
            .and_then(Value::as_array)
        else {
            self.logger
                .warn(&format!("GetChartByPlant returned bad data: {}", data));
            return Ok(Vec::new());
        };

        Ok(xy
            .iter()
            .map(|point| point.get("y").and_then(Value::as_f64).unwrap_or(0.0))
            .collect())
    }

    /// Authoritative consumption total for a past day, kWh
    pub async fn actual_consumption(&mut self, date: NaiveDate) -> Result<f64> {
        let data = self.chart_by_plant(date, "7").await?;
        match data
            .get("modelData")
            .and_then(|model| model.get("consumptionOfLoad"))
            .and_then(Value::as_f64)
        {
            Some(total) => Ok(total),
            None => {
                self.logger
                    .warn(&format!("GetChartByPlant returned bad data: {}", data));
                Ok(0.0)
            }
        }
    }

    /// Authoritative generation total for a past day, kWh
    pub async fn actual_kwh(&mut self, date: NaiveDate) -> Result<f64> {
        let payload = [
            ("powerstation_id", self.station_id.clone()),
            ("count", "1".to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
        ];
        let data = self
            .call(
                "v2/PowerStationMonitor/GetPowerStationPowerAndIncomeByDay",
                &payload,
            )
            .await?;

        let Some(days) = data.as_array() else {
            self.logger
                .warn("GetPowerStationPowerAndIncomeByDay missing data");
            return Ok(0.0);
        };

        let wanted = date.format("%m/%d/%Y").to_string();
        Ok(days
            .iter()
            .find(|day| day.get("d").and_then(Value::as_str) == Some(wanted.as_str()))
            .and_then(|day| day.get("p").and_then(Value::as_f64))
            .unwrap_or(0.0))
    }

    /// Reconstruct a full day trace: integrate the power and load series and
    /// reconcile consumption against the authoritative daily total.
    pub async fn day_readings(
        &mut self,
        date: NaiveDate,
    ) -> Result<(Option<(f64, f64)>, Vec<crate::types::DayEntry>)> {
        let location = self.station_location().await?;
        let pacs = self.day_pac(date).await?;
        let loads = self.day_load(date).await?;
        let actual = self.actual_consumption(date).await?;

        let entries = backfill::integrate_day(&pacs, &loads, Some(actual));
        Ok((location, entries))
    }

    async fn chart_by_plant(&mut self, date: NaiveDate, chart_index: &str) -> Result<Value> {
        let payload = [
            ("id", self.station_id.clone()),
            ("date", date.format("%Y-%m-%d").to_string()),
            ("range", "2".to_string()),
            ("chartIndexId", chart_index.to_string()),
            ("isDetailFull", String::new()),
        ];
        self.call("v2/Charts/GetChartByPlant", &payload).await
    }

    /// Perform one envelope call with bounded transport retries and at most
    /// one transparent re-login per call.
    async fn call(&mut self, endpoint: &str, form: &[(&str, String)]) -> Result<Value> {
        let mut reauthenticated = false;
        let mut attempt: u32 = 1;

        while attempt <= MAX_HTTP_ATTEMPTS {
            let url = format!("{}{}", self.session.base_url, endpoint);
            match self.post_envelope(&url, form).await {
                Ok(body) => {
                    let code = envelope_code(&body)?;
                    if code == 0 {
                        if let Some(data) = body.get("data")
                            && !data.is_null()
                        {
                            self.logger.debug(&format!("{}", data));
                            return Ok(data.clone());
                        }
                        return Err(HeliographError::source(
                            "portal returned an empty data envelope",
                        ));
                    }
                    if code == SESSION_EXPIRED_CODE {
                        if reauthenticated {
                            return Err(HeliographError::source(
                                "portal rejected the renewed session",
                            ));
                        }
                        self.login().await?;
                        reauthenticated = true;
                        continue;
                    }
                    return Err(HeliographError::source(format!(
                        "portal call failed with code {}",
                        code
                    )));
                }
                Err(HeliographError::Network { message }) => {
                    self.logger.warn(&message);
                    sleep(cubic_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(HeliographError::source(
            "failed to call the SEMS portal (too many retries)",
        ))
    }

    async fn post_envelope(&self, url: &str, form: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("Token", &self.session.token)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Cross-login exchange: trades account credentials for a region base URL
    /// and a fresh opaque session token.
    async fn login(&mut self) -> Result<()> {
        self.logger.info("Session expired, logging in to the SEMS portal");
        let url = format!("{}v2/Common/CrossLogin", GLOBAL_URL);
        let form = [
            ("account", self.account.clone()),
            ("pwd", self.password.clone()),
        ];
        let body = self.post_envelope(&url, &form).await?;

        let Some(api) = body.get("api").and_then(Value::as_str) else {
            let msg = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("login rejected");
            return Err(HeliographError::source(format!(
                "SEMS portal login failed: {}",
                msg
            )));
        };

        self.session = Session {
            base_url: api.to_string(),
            token: serde_json::to_string(body.get("data").unwrap_or(&Value::Null))?,
        };
        Ok(())
    }
}

fn envelope_code(body: &Value) -> Result<i64> {
    match body.get("code") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| HeliographError::source("portal response carries a non-integer code")),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| HeliographError::source("portal response carries a non-integer code")),
        _ => Err(HeliographError::source("portal response carries no code")),
    }
}

fn location_of(info: &Value) -> Option<(f64, f64)> {
    let latitude = info.get("latitude").and_then(Value::as_f64)?;
    let longitude = info.get("longitude").and_then(Value::as_f64)?;
    Some((latitude, longitude))
}

/// Normalize a monitor-detail payload into the canonical reading.
///
/// Inverters in state Normal are aggregated: power and load are summed,
/// voltages and SOC averaged over that subset. The cumulative energy
/// counters are summed across all inverters regardless of state. When no
/// inverter is Normal the first inverter's raw values stand in as a
/// best-effort snapshot.
pub fn normalize_monitor_detail(data: &Value, timestamp: DateTime<Tz>) -> Reading {
    let mut reading = Reading::empty(timestamp);

    if let Some(info) = data.get("info") {
        reading.location = location_of(info);
    }

    let station_load = data
        .get("powerflow")
        .and_then(|flow| flow.get("load"))
        .map(|load| parse_suffixed_value(load, "(W)"))
        .unwrap_or(0.0);
    let station_soc = data
        .get("powerflow")
        .and_then(|flow| flow.get("soc"))
        .and_then(numeric_value);
    reading.energy_used_kwh = data
        .get("energeStatisticsCharts")
        .and_then(|charts| charts.get("consumptionOfLoad"))
        .and_then(Value::as_f64)
        .map(|used| (used * 100.0).round() / 100.0)
        .unwrap_or(0.0);

    let inverters: Vec<&Value> = data
        .get("inverter")
        .and_then(Value::as_array)
        .map(|list| list.iter().collect())
        .unwrap_or_default();

    let mut normal_count = 0u32;
    for inverter in &inverters {
        let status =
            InverterStatus::from_code(inverter.get("status").and_then(Value::as_i64).unwrap_or(99));
        if status == InverterStatus::Normal {
            reading.status = InverterStatus::Normal;
            reading.power_w += inverter.get("out_pac").and_then(Value::as_f64).unwrap_or(0.0);
            reading.grid_voltage_v += inverter
                .get("output_voltage")
                .map(|voltage| parse_suffixed_value(voltage, "V"))
                .unwrap_or(0.0);
            reading.pv_voltage_v += inverter
                .get("d")
                .map(calc_pv_voltage)
                .unwrap_or(0.0);
            reading.load_w += station_load;
            normal_count += 1;
        }
        reading.energy_today_kwh += inverter.get("eday").and_then(Value::as_f64).unwrap_or(0.0);
        reading.energy_total_kwh += inverter.get("etotal").and_then(Value::as_f64).unwrap_or(0.0);
    }

    if normal_count > 0 {
        // Voltages and SOC are averages over the online subset, not sums
        reading.grid_voltage_v /= f64::from(normal_count);
        reading.pv_voltage_v /= f64::from(normal_count);
        reading.state_of_charge_pct = station_soc;
    } else if let Some(first) = inverters.first() {
        // No online inverters, fall back to the first one verbatim
        reading.status =
            InverterStatus::from_code(first.get("status").and_then(Value::as_i64).unwrap_or(99));
        reading.power_w = first.get("out_pac").and_then(Value::as_f64).unwrap_or(0.0);
        reading.grid_voltage_v = first
            .get("output_voltage")
            .map(|voltage| parse_suffixed_value(voltage, "V"))
            .unwrap_or(0.0);
        reading.pv_voltage_v = first.get("d").map(calc_pv_voltage).unwrap_or(0.0);
        reading.load_w = station_load;
        reading.state_of_charge_pct = station_soc;
    }

    reading
}

/// Sum the string inverter voltages `vpv1..vpv4`, ignoring absent, zero and
/// the 6553 not-connected sentinel values.
fn calc_pv_voltage(d: &Value) -> f64 {
    let mut total = 0.0;
    for i in 1..=4 {
        if let Some(voltage) = d.get(format!("vpv{}", i)).and_then(Value::as_f64)
            && voltage != 0.0
            && voltage < 6553.0
        {
            total += voltage;
        }
    }
    (total * 10.0).round() / 10.0
}

/// Parse a numeric field that may carry a unit suffix (for example
/// `"231.6V"` or `"45(W)"`); failures are logged and read as 0.
fn parse_suffixed_value(value: &Value, unit: &str) -> f64 {
    if let Some(number) = value.as_f64() {
        return number;
    }
    let Some(text) = value.as_str() else {
        return 0.0;
    };
    let trimmed = text.trim_end_matches(|c| unit.contains(c)).trim();
    match trimmed.parse() {
        Ok(number) => number,
        Err(_) => {
            tracing::warn!("could not parse value {:?} with unit {}", text, unit);
            0.0
        }
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

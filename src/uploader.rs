//! Orchestration of the polling, enrichment and delivery pipeline
//!
//! Three run modes: the live loop polls the configured source on a wall-clock
//! aligned interval until interrupted, the two backfill modes run once and
//! exit. A cycle failure never terminates the live loop unless it is fatal
//! (bad configuration or rejected delivery credentials).

use crate::config::{Config, Mode};
use crate::csv_sink::{self, CsvSink};
use crate::error::{HeliographError, Result};
use crate::filter::ChangeFilter;
use crate::logging::{StructuredLogger, get_logger};
use crate::notify::Notifier;
use crate::pvoutput::PvOutputClient;
use crate::source::SourceReader;
use crate::types::InverterStatus;
use crate::weather::WeatherService;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

pub struct Uploader {
    config: Config,
    tz: Tz,
    source: Option<SourceReader>,
    weather: Option<WeatherService>,
    pvoutput: Option<PvOutputClient>,
    notifier: Notifier,
    filter: ChangeFilter,
    logger: StructuredLogger,
}

impl Uploader {
    /// Build the pipeline from validated configuration. The source is
    /// resolved exactly once here, never re-dispatched per cycle.
    pub fn new(config: Config) -> Result<Self> {
        let tz = config.tz()?;
        let notifier = Notifier::from_config(&config.telegram)?;

        let source = if config.goodwe.is_configured() || config.mqtt.is_configured() {
            Some(SourceReader::from_config(&config, tz)?)
        } else {
            None
        };
        let weather = WeatherService::from_config(&config.weather)?;
        let pvoutput = if config.pvoutput.is_configured() {
            Some(PvOutputClient::new(
                &config.pvoutput.system_id,
                &config.pvoutput.api_key,
                notifier.clone(),
                tz,
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            tz,
            source,
            weather,
            pvoutput,
            notifier,
            filter: ChangeFilter::new(),
            logger: get_logger("uploader"),
        })
    }

    /// Run the selected mode to completion
    pub async fn run(&mut self, mode: &Mode) -> Result<()> {
        match mode {
            Mode::Live => self.run_live().await,
            Mode::BackfillDate(date) => self.run_backfill_date(*date).await,
            Mode::BackfillCsv(path) => self.run_backfill_csv(path).await,
        }
    }

    /// Poll, enrich and deliver until interrupted. Without an interval the
    /// cycle runs exactly once.
    pub async fn run_live(&mut self) -> Result<()> {
        loop {
            let cycle_result = tokio::select! {
                result = self.cycle() => result,
                _ = tokio::signal::ctrl_c() => {
                    self.logger.info("Interrupted, shutting down");
                    return Ok(());
                }
            };

            if let Err(e) = cycle_result {
                if e.is_fatal() {
                    return Err(e);
                }
                let message = format!("Failed to publish data PVOutput - {}", e);
                let now = chrono::Utc::now().with_timezone(&self.tz);
                self.logger.error(&format!("{} - {}", now, message));
                self.notifier.send(&message).await;
            }

            let Some(minutes) = self.config.interval_minutes else {
                return Ok(());
            };

            // Align to wall-clock boundaries of the interval instead of a
            // fixed post-cycle delay
            let period = i64::from(minutes) * 60;
            let now = chrono::Utc::now().timestamp();
            let wait = (period - now.rem_euclid(period)) as u64;
            tokio::select! {
                _ = sleep(Duration::from_secs(wait)) => {}
                _ = tokio::signal::ctrl_c() => {
                    self.logger.info("Interrupted, shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// One live cycle: fetch, filter, enrich, archive, deliver
    async fn cycle(&mut self) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| HeliographError::config("no inverter data source configured"))?;

        let mut reading = source.fetch_current().await?;

        if self.config.skip_offline && reading.status == InverterStatus::Offline {
            self.logger.debug("Skipped upload as the inverter is offline");
            return Ok(());
        }

        if let Some(template) = &self.config.csv {
            if reading.status == InverterStatus::Offline {
                self.logger.debug("Don't append offline data to CSV file");
            } else {
                let sink = CsvSink::new(
                    template,
                    reading.timestamp.date_naive(),
                    self.config.decimal_comma,
                );
                sink.append(&reading)?;
            }
        }

        let counters = self.filter.apply(&reading);

        if reading.temperature_c.is_none()
            && source.wants_weather()
            && let (Some(weather), Some((latitude, longitude))) = (&self.weather, reading.location)
        {
            match weather.temperature_at(latitude, longitude).await {
                Ok(temperature) => reading.temperature_c = temperature,
                Err(e) => self
                    .logger
                    .warn(&format!("Temperature lookup failed: {}", e)),
            }
        }

        let voltage = if self.config.pv_voltage {
            reading.pv_voltage_v
        } else {
            reading.grid_voltage_v
        };

        match &self.pvoutput {
            Some(pvoutput) => {
                pvoutput
                    .add_status(
                        reading.power_w,
                        counters.energy_today_kwh,
                        reading.temperature_c,
                        Some(voltage),
                        counters.energy_used_kwh,
                        reading.load_w,
                    )
                    .await?;
            }
            None => {
                self.logger.debug(&format!("{:?}", reading));
                self.logger.warn("Missing PVOutput system id and/or API key");
            }
        }

        Ok(())
    }

    /// Reconstruct a past day from the portal and upload it in bulk
    pub async fn run_backfill_date(&mut self, date: NaiveDate) -> Result<()> {
        let goodwe = self
            .source
            .as_mut()
            .and_then(SourceReader::as_goodwe)
            .ok_or_else(|| {
                HeliographError::config(
                    "backfilling historic data requires the GoodWe (SEMS portal) source",
                )
            })?;

        let (location, entries) = goodwe.day_readings(date).await?;

        let reported = goodwe.actual_kwh(date).await.unwrap_or(0.0);
        if reported > 0.0
            && let Some(last) = entries.last()
        {
            self.logger.info(&format!(
                "Integrated {:.3} kWh for {}, portal reports {:.3} kWh",
                last.energy_today_kwh, date, reported
            ));
        }

        match &self.pvoutput {
            Some(pvoutput) => {
                let temperatures = match (&self.weather, location) {
                    (Some(weather), Some((latitude, longitude))) => {
                        match weather
                            .temperature_series_for_day(latitude, longitude, date)
                            .await
                        {
                            Ok(series) => Some(series),
                            Err(e) => {
                                self.logger.error(&e.to_string());
                                None
                            }
                        }
                    }
                    _ => None,
                };
                pvoutput.add_day(&entries, temperatures.as_deref()).await?;
            }
            None => {
                for entry in &entries {
                    self.logger.info(&format!(
                        "{}: {:6.0} W {:6.2} kWh",
                        entry.timestamp, entry.power_w, entry.energy_today_kwh
                    ));
                }
                self.logger.warn("Missing PVOutput system id and/or API key");
            }
        }

        Ok(())
    }

    /// Re-parse a day archive and upload it in bulk
    pub async fn run_backfill_csv(&self, path: &Path) -> Result<()> {
        let pvoutput = self.pvoutput.as_ref().ok_or_else(|| {
            HeliographError::config("CSV upload requires PVOutput system id and API key")
        })?;

        let records = csv_sink::read_records(path)?;
        self.logger.info(&format!(
            "Uploading {} archived readings from {}",
            records.len(),
            path.display()
        ));
        pvoutput.add_day_csv(&records).await
    }
}

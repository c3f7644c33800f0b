//! Command-line surface
//!
//! Every flag mirrors a configuration field; values given on the command line
//! override the optional YAML config file.

use crate::config::{Config, Mode};
use crate::error::Result;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Upload GoodWe power inverter data to PVOutput.org
#[derive(Parser, Debug)]
#[command(name = "heliograph", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// GoodWe station ID
    #[arg(long, value_name = "ID")]
    pub gw_station_id: Option<String>,

    /// GoodWe account
    #[arg(long, value_name = "ACCOUNT")]
    pub gw_account: Option<String>,

    /// GoodWe password
    #[arg(long, value_name = "PASSWORD")]
    pub gw_password: Option<String>,

    /// MQTT hostname
    #[arg(long, value_name = "HOST")]
    pub mqtt_host: Option<String>,

    /// MQTT port
    #[arg(long, value_name = "PORT")]
    pub mqtt_port: Option<u16>,

    /// MQTT username
    #[arg(long, value_name = "USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long, value_name = "PASS")]
    pub mqtt_password: Option<String>,

    /// MQTT topic the inverter bridge publishes under
    #[arg(long, value_name = "TOPIC")]
    pub mqtt_topic: Option<String>,

    /// PVOutput system ID
    #[arg(long, value_name = "ID")]
    pub pvo_system_id: Option<String>,

    /// PVOutput API key
    #[arg(long, value_name = "KEY")]
    pub pvo_api_key: Option<String>,

    /// PVOutput interval in minutes
    #[arg(long, value_name = "MINUTES")]
    pub pvo_interval: Option<u32>,

    /// Dark Sky Weather API key
    #[arg(long, value_name = "KEY")]
    pub darksky_api_key: Option<String>,

    /// Open Weather API key
    #[arg(long, value_name = "KEY")]
    pub openweather_api_key: Option<String>,

    /// Telegram bot token
    #[arg(long, value_name = "TOKEN")]
    pub telegram_token: Option<String>,

    /// Telegram chat id
    #[arg(long, value_name = "CHATID")]
    pub telegram_chatid: Option<String>,

    /// Copy all readings for a past date (max 14/90 days ago)
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "upload_csv")]
    pub date: Option<NaiveDate>,

    /// Upload all readings from a CSV archive (max 14/90 days ago)
    #[arg(long, value_name = "FILE")]
    pub upload_csv: Option<PathBuf>,

    /// Send PV voltage instead of grid voltage
    #[arg(long)]
    pub pv_voltage: bool,

    /// Skip uploads when the inverter is offline
    #[arg(long)]
    pub skip_offline: bool,

    /// Append readings to a CSV file; DATE in the name is replaced by the
    /// current date
    #[arg(long, value_name = "TEMPLATE")]
    pub csv: Option<String>,

    /// Write CSV numbers with a decimal comma
    #[arg(long)]
    pub decimal_comma: bool,

    /// IANA timezone used for local timestamps
    #[arg(long, value_name = "TZ")]
    pub timezone: Option<String>,

    /// Set log level (default info)
    #[arg(long, value_name = "LEVEL")]
    pub log: Option<String>,
}

impl Cli {
    /// The run mode selected by the one-shot flags
    pub fn mode(&self) -> Mode {
        if let Some(date) = self.date {
            Mode::BackfillDate(date)
        } else if let Some(path) = &self.upload_csv {
            Mode::BackfillCsv(path.clone())
        } else {
            Mode::Live
        }
    }

    /// Load the config file (when given) and lay the command-line values
    /// over it
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(station_id) = self.gw_station_id {
            config.goodwe.station_id = station_id;
        }
        if let Some(account) = self.gw_account {
            config.goodwe.account = account;
        }
        if let Some(password) = self.gw_password {
            config.goodwe.password = password;
        }
        if let Some(host) = self.mqtt_host {
            config.mqtt.host = host;
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt.port = port;
        }
        if let Some(user) = self.mqtt_user {
            config.mqtt.username = user;
        }
        if let Some(password) = self.mqtt_password {
            config.mqtt.password = password;
        }
        if let Some(topic) = self.mqtt_topic {
            config.mqtt.topic = topic;
        }
        if let Some(system_id) = self.pvo_system_id {
            config.pvoutput.system_id = system_id;
        }
        if let Some(api_key) = self.pvo_api_key {
            config.pvoutput.api_key = api_key;
        }
        if let Some(minutes) = self.pvo_interval {
            config.interval_minutes = Some(minutes);
        }
        if let Some(key) = self.darksky_api_key {
            config.weather.darksky_api_key = key;
        }
        if let Some(key) = self.openweather_api_key {
            config.weather.openweather_api_key = key;
        }
        if let Some(token) = self.telegram_token {
            config.telegram.token = token;
        }
        if let Some(chat_id) = self.telegram_chatid {
            config.telegram.chat_id = chat_id;
        }
        if self.pv_voltage {
            config.pv_voltage = true;
        }
        if self.skip_offline {
            config.skip_offline = true;
        }
        if let Some(template) = self.csv {
            config.csv = Some(template);
        }
        if self.decimal_comma {
            config.decimal_comma = true;
        }
        if let Some(timezone) = self.timezone {
            config.timezone = timezone;
        }
        if let Some(level) = self.log {
            config.logging.level = level;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "heliograph",
            "--gw-station-id",
            "abc-123",
            "--gw-account",
            "user@example.com",
            "--gw-password",
            "secret",
            "--pvo-interval",
            "10",
            "--skip-offline",
            "--timezone",
            "Europe/Amsterdam",
        ]);
        assert_eq!(cli.mode(), Mode::Live);

        let config = cli.into_config().unwrap();
        assert_eq!(config.goodwe.station_id, "abc-123");
        assert_eq!(config.interval_minutes, Some(10));
        assert!(config.skip_offline);
        assert_eq!(config.timezone, "Europe/Amsterdam");
    }

    #[test]
    fn test_date_selects_backfill_mode() {
        let cli = Cli::parse_from(["heliograph", "--date", "2023-06-01"]);
        let expected = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert_eq!(cli.mode(), Mode::BackfillDate(expected));
    }

    #[test]
    fn test_date_and_upload_csv_conflict() {
        let parsed = Cli::try_parse_from([
            "heliograph",
            "--date",
            "2023-06-01",
            "--upload-csv",
            "day.csv",
        ]);
        assert!(parsed.is_err());
    }
}

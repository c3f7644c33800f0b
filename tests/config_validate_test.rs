use chrono::NaiveDate;
use heliograph::config::{Config, Mode};
use std::path::PathBuf;

fn goodwe_config() -> Config {
    let mut config = Config::default();
    config.goodwe.station_id = "abc-123".to_string();
    config.goodwe.account = "user@example.com".to_string();
    config.goodwe.password = "secret".to_string();
    config
}

fn mqtt_config() -> Config {
    let mut config = Config::default();
    config.mqtt.host = "broker.local".to_string();
    config.mqtt.topic = "inverter".to_string();
    config
}

#[test]
fn both_sources_at_once_is_a_fatal_configuration_error() {
    let mut config = goodwe_config();
    config.mqtt.host = "broker.local".to_string();
    config.mqtt.topic = "inverter".to_string();

    let err = config.validate(&Mode::Live).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn live_mode_accepts_either_source_alone() {
    assert!(goodwe_config().validate(&Mode::Live).is_ok());
    assert!(mqtt_config().validate(&Mode::Live).is_ok());
}

#[test]
fn live_mode_without_a_source_is_rejected() {
    assert!(Config::default().validate(&Mode::Live).is_err());
}

#[test]
fn goodwe_credentials_must_be_complete() {
    let mut config = goodwe_config();
    config.goodwe.password.clear();
    assert!(config.validate(&Mode::Live).is_err());
}

#[test]
fn date_backfill_requires_goodwe_and_rejects_mqtt() {
    let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let mode = Mode::BackfillDate(date);

    assert!(goodwe_config().validate(&mode).is_ok());
    assert!(mqtt_config().validate(&mode).is_err());
    assert!(Config::default().validate(&mode).is_err());
}

#[test]
fn csv_upload_requires_delivery_credentials() {
    let mode = Mode::BackfillCsv(PathBuf::from("day.csv"));
    assert!(Config::default().validate(&mode).is_err());

    let mut config = Config::default();
    config.pvoutput.system_id = "9999".to_string();
    config.pvoutput.api_key = "key".to_string();
    assert!(config.validate(&mode).is_ok());
}

#[test]
fn interval_must_match_a_pvoutput_plan() {
    for minutes in [5u32, 10, 15] {
        let mut config = goodwe_config();
        config.interval_minutes = Some(minutes);
        assert!(config.validate(&Mode::Live).is_ok());
    }
    let mut config = goodwe_config();
    config.interval_minutes = Some(60);
    assert!(config.validate(&Mode::Live).is_err());
}

#[test]
fn yaml_round_trip_keeps_every_section() {
    let mut config = goodwe_config();
    config.csv = Some("solar-DATE.csv".to_string());
    config.timezone = "Europe/Amsterdam".to_string();
    config.weather.openweather_api_key = "ow-key".to_string();

    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.goodwe.station_id, "abc-123");
    assert_eq!(parsed.csv.as_deref(), Some("solar-DATE.csv"));
    assert_eq!(parsed.timezone, "Europe/Amsterdam");
    assert_eq!(parsed.weather.openweather_api_key, "ow-key");
}

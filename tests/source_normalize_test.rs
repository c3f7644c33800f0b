use chrono::TimeZone;
use chrono_tz::Tz;
use heliograph::source::goodwe::normalize_monitor_detail;
use heliograph::source::mqtt::normalize_snapshot;
use heliograph::types::InverterStatus;
use serde_json::json;
use std::collections::HashMap;

fn now() -> chrono::DateTime<Tz> {
    chrono_tz::UTC
        .with_ymd_and_hms(2023, 6, 1, 12, 0, 0)
        .unwrap()
}

#[test]
fn grid_voltage_is_the_mean_of_exactly_the_normal_inverters() {
    let data = json!({
        "info": {"latitude": 52.0, "longitude": 5.0},
        "powerflow": {"load": "500(W)", "soc": "40"},
        "energeStatisticsCharts": {"consumptionOfLoad": 2.0},
        "inverter": [
            {"status": 1, "out_pac": 900.0, "output_voltage": "230.0V",
             "eday": 3.0, "etotal": 500.0, "d": {"vpv1": 240.0}},
            {"status": 2, "out_pac": 50.0, "output_voltage": "200.0V",
             "eday": 0.2, "etotal": 80.0, "d": {"vpv1": 100.0}},
            {"status": 1, "out_pac": 1100.0, "output_voltage": "234.0V",
             "eday": 3.4, "etotal": 700.0, "d": {"vpv1": 260.0}},
        ]
    });

    let reading = normalize_monitor_detail(&data, now());

    // The faulted inverter's voltage must not enter the mean
    assert_eq!(reading.grid_voltage_v, 232.0);
    assert_eq!(reading.power_w, 2000.0);
    assert_eq!(reading.status, InverterStatus::Normal);

    // Cumulative counters sum across every inverter regardless of state
    assert!((reading.energy_today_kwh - 6.6).abs() < 1e-9);
    assert_eq!(reading.energy_total_kwh, 1280.0);
}

#[test]
fn with_no_normal_inverter_the_first_one_stands_in_verbatim() {
    let data = json!({
        "info": {},
        "powerflow": {"load": "80(W)"},
        "energeStatisticsCharts": {"consumptionOfLoad": 0.4},
        "inverter": [
            {"status": 0, "out_pac": 3.0, "output_voltage": "226.1V",
             "eday": 0.1, "etotal": 12.0, "d": {"vpv1": 50.0, "vpv2": 30.0}},
            {"status": -1, "out_pac": 0.0, "output_voltage": "0V",
             "eday": 0.0, "etotal": 9.0, "d": {}},
        ]
    });

    let reading = normalize_monitor_detail(&data, now());
    assert_eq!(reading.status, InverterStatus::Waiting);
    assert_eq!(reading.power_w, 3.0);
    assert_eq!(reading.grid_voltage_v, 226.1);
    assert_eq!(reading.pv_voltage_v, 80.0);
    assert_eq!(reading.load_w, 80.0);
}

#[test]
fn empty_inverter_list_yields_an_unknown_reading() {
    let data = json!({
        "info": {},
        "powerflow": {"load": "0(W)"},
        "energeStatisticsCharts": {"consumptionOfLoad": 0.0},
        "inverter": []
    });

    let reading = normalize_monitor_detail(&data, now());
    assert_eq!(reading.status, InverterStatus::Unknown);
    assert_eq!(reading.power_w, 0.0);
}

fn snapshot_fields() -> HashMap<String, String> {
    [
        ("work_mode_label", "Normal"),
        ("ppv", "840.0"),
        ("vgrid", "229.9"),
        ("vpv1", "255.1"),
        ("house_consumption", "310.5"),
        ("v1", "4.2"),
        ("e_total", "8123.4"),
        ("battery_soc", "64"),
        ("v3", "2.8"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[test]
fn broker_snapshot_normalizes_to_the_same_reading_shape() {
    let reading = normalize_snapshot(&snapshot_fields(), now()).unwrap();
    assert_eq!(reading.status, InverterStatus::Normal);
    assert_eq!(reading.power_w, 840.0);
    assert_eq!(reading.grid_voltage_v, 229.9);
    assert_eq!(reading.pv_voltage_v, 255.1);
    assert_eq!(reading.load_w, 310.5);
    assert_eq!(reading.energy_today_kwh, 4.2);
    assert_eq!(reading.energy_total_kwh, 8123.4);
    assert_eq!(reading.energy_used_kwh, 2.8);
    assert_eq!(reading.state_of_charge_pct, Some(64.0));
    assert_eq!(reading.temperature_c, None);
}

#[test]
fn broker_snapshot_with_a_missing_required_field_is_rejected() {
    let mut fields = snapshot_fields();
    fields.remove("e_total");
    assert!(normalize_snapshot(&fields, now()).is_err());
}

#[test]
fn broker_temperature_leaf_is_passed_through() {
    let mut fields = snapshot_fields();
    fields.insert("v5".to_string(), "21.5".to_string());
    let reading = normalize_snapshot(&fields, now()).unwrap();
    assert_eq!(reading.temperature_c, Some(21.5));
}

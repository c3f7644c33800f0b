use chrono::TimeZone;
use heliograph::backfill::{PowerSample, integrate_day};

fn sample(hour: u32, minute: u32, power_w: f64) -> PowerSample {
    PowerSample {
        timestamp: chrono_tz::UTC
            .with_ymd_and_hms(2023, 6, 1, hour, minute, 0)
            .unwrap(),
        power_w,
    }
}

#[test]
fn integration_holds_previous_sample_over_the_gap() {
    let pacs = [sample(9, 0, 100.0), sample(10, 0, 200.0)];
    let loads = [50.0, 150.0];

    let entries = integrate_day(&pacs, &loads, None);
    assert_eq!(entries.len(), 2);

    // After the second sample the first one has been held for one hour
    assert_eq!(entries[1].energy_today_kwh, 0.1);
    assert_eq!(entries[1].energy_used_kwh, 0.05);
}

#[test]
fn authoritative_consumption_rescales_every_entry() {
    let pacs = [sample(9, 0, 100.0), sample(10, 0, 200.0)];
    let loads = [50.0, 150.0];

    let entries = integrate_day(&pacs, &loads, Some(0.06));

    // correction factor 0.06 / 0.05 = 1.2
    assert!((entries[1].energy_used_kwh - 0.06).abs() < 1e-12);
    assert_eq!(entries[0].energy_used_kwh, 0.0);
}

#[test]
fn negative_power_samples_leave_no_trace() {
    let pacs = [
        sample(9, 0, 100.0),
        sample(10, 0, -5.0),
        sample(11, 0, 300.0),
    ];
    let loads = [50.0, 999.0, 70.0];

    let entries = integrate_day(&pacs, &loads, None);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.power_w >= 0.0));

    // The 100 W sample bridges the full two-hour gap; the dropped sample's
    // load never enters the integral
    assert_eq!(entries[1].energy_today_kwh, 0.2);
    assert_eq!(entries[1].energy_used_kwh, 0.1);
}

#[test]
fn entries_carry_three_decimal_counters() {
    let pacs = [sample(9, 0, 333.0), sample(9, 10, 333.0), sample(9, 20, 333.0)];
    let loads = [111.0, 111.0, 111.0];

    let entries = integrate_day(&pacs, &loads, None);
    for entry in &entries {
        let scaled = entry.energy_today_kwh * 1000.0;
        assert!((scaled - scaled.round()).abs() < 1e-9);
    }
}

#[test]
fn empty_series_produce_an_empty_trace() {
    let entries = integrate_day(&[], &[], Some(1.0));
    assert!(entries.is_empty());
}

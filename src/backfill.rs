//! Historical day-trace reconstruction
//!
//! The portal exposes a past day as three independent series: instantaneous
//! power samples, instantaneous load samples and one authoritative daily
//! consumption total. This module merges them into a consistent per-sample
//! trace of cumulative energy and consumption.

use crate::types::DayEntry;
use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use tracing::warn;

/// One instantaneous power sample of a historical day
#[derive(Debug, Clone, Copy)]
pub struct PowerSample {
    pub timestamp: DateTime<Tz>,
    pub power_w: f64,
}

fn fractional_hours(ts: &DateTime<Tz>) -> f64 {
    f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Integrate a day of paired power/load samples into cumulative counters.
///
/// Samples are integrated by holding the previous non-negative sample's rates
/// over the elapsed fractional-hour gap. Samples with negative power are
/// dropped entirely: they contribute neither output entries nor gap time.
/// When `actual_consumption_kwh` is positive, every entry's cumulative
/// consumption is rescaled so the day total matches it.
pub fn integrate_day(
    pacs: &[PowerSample],
    loads: &[f64],
    actual_consumption_kwh: Option<f64>,
) -> Vec<DayEntry> {
    if pacs.len() != loads.len() {
        warn!(
            "Power and load series differ in length ({} vs {}), truncating",
            pacs.len(),
            loads.len()
        );
    }

    let mut entries: Vec<DayEntry> = Vec::with_capacity(pacs.len().min(loads.len()));
    let mut energy_kwh = 0.0;
    let mut used_kwh = 0.0;
    let mut previous: Option<(f64, f64, f64)> = None; // (hours, power_w, load_w)

    for (sample, &load_w) in pacs.iter().zip(loads.iter()) {
        if sample.power_w < 0.0 {
            continue;
        }
        let hours = fractional_hours(&sample.timestamp);
        if let Some((prev_hours, prev_power, prev_load)) = previous {
            let gap = hours - prev_hours;
            energy_kwh += prev_power / 1000.0 * gap;
            used_kwh += prev_load / 1000.0 * gap;
        }
        entries.push(DayEntry {
            timestamp: sample.timestamp,
            power_w: sample.power_w,
            load_w,
            energy_today_kwh: round3(energy_kwh),
            energy_used_kwh: round3(used_kwh),
        });
        previous = Some((hours, sample.power_w, load_w));
    }

    if let Some(actual) = actual_consumption_kwh
        && actual > 0.0
        && used_kwh > 0.0
    {
        let correction = actual / used_kwh;
        for entry in &mut entries {
            entry.energy_used_kwh *= correction;
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(hour: u32, minute: u32, power_w: f64) -> PowerSample {
        PowerSample {
            timestamp: chrono_tz::UTC
                .with_ymd_and_hms(2023, 6, 1, hour, minute, 0)
                .unwrap(),
            power_w,
        }
    }

    #[test]
    fn test_two_sample_integration_and_correction() {
        let pacs = [sample(10, 0, 100.0), sample(11, 0, 200.0)];
        let loads = [50.0, 150.0];

        let uncorrected = integrate_day(&pacs, &loads, None);
        assert_eq!(uncorrected.len(), 2);
        assert_eq!(uncorrected[1].energy_today_kwh, 0.1);
        assert_eq!(uncorrected[1].energy_used_kwh, 0.05);

        // Authoritative total 0.06 kWh rescales consumption by 1.2
        let corrected = integrate_day(&pacs, &loads, Some(0.06));
        assert!((corrected[1].energy_used_kwh - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_negative_samples_skipped_entirely() {
        let pacs = [sample(10, 0, 100.0), sample(11, 0, -5.0), sample(12, 0, 300.0)];
        let loads = [50.0, 60.0, 70.0];

        let entries = integrate_day(&pacs, &loads, None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].power_w, 100.0);
        assert_eq!(entries[1].power_w, 300.0);

        // The negative sample contributes no gap time either: the 100 W
        // sample is held across the full two hours
        assert_eq!(entries[1].energy_today_kwh, 0.2);
        assert_eq!(entries[1].energy_used_kwh, 0.1);
    }

    #[test]
    fn test_no_correction_when_total_missing_or_zero() {
        let pacs = [sample(8, 0, 1000.0), sample(9, 0, 1000.0)];
        let loads = [500.0, 500.0];

        let entries = integrate_day(&pacs, &loads, Some(0.0));
        assert_eq!(entries[1].energy_used_kwh, 0.5);
    }

    #[test]
    fn test_length_mismatch_truncates() {
        let pacs = [sample(8, 0, 100.0), sample(9, 0, 100.0), sample(10, 0, 100.0)];
        let loads = [50.0, 50.0];

        let entries = integrate_day(&pacs, &loads, None);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_fractional_minute_gaps() {
        let pacs = [sample(10, 0, 600.0), sample(10, 30, 0.0)];
        let loads = [0.0, 0.0];

        let entries = integrate_day(&pacs, &loads, None);
        assert_eq!(entries[1].energy_today_kwh, 0.3);
    }
}

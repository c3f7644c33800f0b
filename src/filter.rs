//! Change filter for the cumulative energy counters
//!
//! The upstream counters oscillate around their last value while the inverter
//! is idle; submitting every sample would report noise as real change to a
//! rate-limited downstream. The filter keeps the last submitted value per
//! counter and only moves it when the counter really advanced.

use crate::types::Reading;

/// Minimum counter movement that counts as real change, kWh
const COUNTER_EPSILON: f64 = 0.001;

/// Counter values to submit for one cycle, after duplicate suppression
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredCounters {
    pub energy_today_kwh: f64,
    pub energy_used_kwh: f64,
}

/// Session state tracking the last submitted counter pair.
///
/// Owned by the orchestration loop; one `apply` per cycle, no reentrancy.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last_energy_today_kwh: f64,
    last_energy_used_kwh: f64,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one reading into the filter state and return the counter values
    /// to submit.
    ///
    /// A counter is held at its previous value when the associated
    /// instantaneous rate is zero and the counter moved by less than
    /// [`COUNTER_EPSILON`]; such a sample is a stale duplicate of an
    /// already-reported measurement, not new production or consumption.
    pub fn apply(&mut self, reading: &Reading) -> FilteredCounters {
        if reading.power_w == 0.0
            && (reading.energy_today_kwh - self.last_energy_today_kwh).abs() < COUNTER_EPSILON
        {
            tracing::debug!("Ignore unchanged energy_today reading");
        } else {
            self.last_energy_today_kwh = reading.energy_today_kwh;
        }

        if reading.load_w == 0.0
            && (reading.energy_used_kwh - self.last_energy_used_kwh).abs() < COUNTER_EPSILON
        {
            tracing::debug!("Ignore unchanged energy_used reading");
        } else {
            self.last_energy_used_kwh = reading.energy_used_kwh;
        }

        FilteredCounters {
            energy_today_kwh: self.last_energy_today_kwh,
            energy_used_kwh: self.last_energy_used_kwh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InverterStatus, Reading};
    use chrono::TimeZone;

    fn reading(power_w: f64, energy_today_kwh: f64, load_w: f64, energy_used_kwh: f64) -> Reading {
        let ts = chrono_tz::UTC
            .with_ymd_and_hms(2023, 6, 1, 12, 0, 0)
            .unwrap();
        Reading {
            status: InverterStatus::Normal,
            power_w,
            energy_today_kwh,
            load_w,
            energy_used_kwh,
            ..Reading::empty(ts)
        }
    }

    #[test]
    fn test_noise_at_zero_power_is_suppressed() {
        let mut filter = ChangeFilter::new();
        filter.apply(&reading(500.0, 1.0, 200.0, 2.0));

        // Zero power, counter within epsilon: previous value must stand
        let out = filter.apply(&reading(0.0, 1.0005, 0.0, 2.0004));
        assert_eq!(out.energy_today_kwh, 1.0);
        assert_eq!(out.energy_used_kwh, 2.0);
    }

    #[test]
    fn test_nonzero_rate_always_tracks() {
        let mut filter = ChangeFilter::new();
        filter.apply(&reading(500.0, 1.0, 200.0, 2.0));

        // Tiny counter delta but the rates are non-zero: track the new value
        let out = filter.apply(&reading(10.0, 1.0005, 5.0, 2.0004));
        assert_eq!(out.energy_today_kwh, 1.0005);
        assert_eq!(out.energy_used_kwh, 2.0004);
    }

    #[test]
    fn test_real_change_at_zero_power_tracks() {
        let mut filter = ChangeFilter::new();
        filter.apply(&reading(0.0, 1.0, 0.0, 2.0));

        let out = filter.apply(&reading(0.0, 1.5, 0.0, 2.5));
        assert_eq!(out.energy_today_kwh, 1.5);
        assert_eq!(out.energy_used_kwh, 2.5);
    }

    #[test]
    fn test_counters_filter_independently() {
        let mut filter = ChangeFilter::new();
        filter.apply(&reading(500.0, 1.0, 200.0, 2.0));

        // Generation stale, consumption advancing
        let out = filter.apply(&reading(0.0, 1.0002, 150.0, 2.3));
        assert_eq!(out.energy_today_kwh, 1.0);
        assert_eq!(out.energy_used_kwh, 2.3);
    }
}

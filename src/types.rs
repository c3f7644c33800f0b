//! Canonical telemetry types shared by the source readers, the delivery
//! protocol and the CSV archive.

use chrono::DateTime;
use chrono_tz::Tz;

/// Overall inverter status as reported upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverterStatus {
    Unknown,
    Waiting,
    Normal,
    Fault,
    Offline,
}

impl InverterStatus {
    /// Map the numeric status code of the GoodWe portal
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => Self::Offline,
            0 => Self::Waiting,
            1 => Self::Normal,
            2 => Self::Fault,
            _ => Self::Unknown,
        }
    }

    /// Map a work-mode label as republished over MQTT
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "offline" => Self::Offline,
            "wait" | "waiting" => Self::Waiting,
            "normal" => Self::Normal,
            "fault" | "error" => Self::Fault,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Waiting => "Waiting",
            Self::Normal => "Normal",
            Self::Fault => "Fault",
            Self::Offline => "Offline",
        }
    }
}

/// One normalized snapshot of the station at a single instant.
///
/// `energy_today_kwh` and `energy_used_kwh` are cumulative counters that the
/// upstream resets daily; the change filter decides which counter values are
/// actually submitted downstream.
#[derive(Debug, Clone)]
pub struct Reading {
    pub status: InverterStatus,
    /// Instantaneous grid-export power, watts
    pub power_w: f64,
    /// Generated energy since midnight, kWh
    pub energy_today_kwh: f64,
    /// Lifetime generated energy, kWh
    pub energy_total_kwh: f64,
    pub grid_voltage_v: f64,
    pub pv_voltage_v: f64,
    /// Household consumption, watts
    pub load_w: f64,
    /// Consumed energy since midnight, kWh
    pub energy_used_kwh: f64,
    /// Battery state of charge, percent
    pub state_of_charge_pct: Option<f64>,
    /// Station coordinates (latitude, longitude), degrees
    pub location: Option<(f64, f64)>,
    /// Ambient temperature, Celsius; attached post-hoc by the enricher
    pub temperature_c: Option<f64>,
    /// Point in time the reading represents
    pub timestamp: DateTime<Tz>,
}

impl Reading {
    /// Empty reading at the given instant; sources fill in what they know.
    pub fn empty(timestamp: DateTime<Tz>) -> Self {
        Self {
            status: InverterStatus::Unknown,
            power_w: 0.0,
            energy_today_kwh: 0.0,
            energy_total_kwh: 0.0,
            grid_voltage_v: 0.0,
            pv_voltage_v: 0.0,
            load_w: 0.0,
            energy_used_kwh: 0.0,
            state_of_charge_pct: None,
            location: None,
            temperature_c: None,
            timestamp,
        }
    }

    /// Multi-line operator summary, mirroring what the portal app shows
    pub fn summary(&self) -> String {
        format!(
            "Status: {}\nCurrent PV power: {} W\nCurrent consumption: {} W\n\
             Current grid voltage: {} V\nCurrent PV voltage: {} V\n\
             Total PV power generated today: {} kWh\nTotal consumption today: {} kWh\n\
             Current battery SOC: {} %\nAll time total generation: {} kWh",
            self.status.as_str(),
            self.power_w,
            self.load_w,
            self.grid_voltage_v,
            self.pv_voltage_v,
            self.energy_today_kwh,
            self.energy_used_kwh,
            self.state_of_charge_pct.unwrap_or(0.0),
            self.energy_total_kwh,
        )
    }
}

/// One reconstructed sample of a historical day trace.
///
/// The cumulative counters are integrated from the instantaneous series and
/// rescaled against the authoritative daily consumption figure.
#[derive(Debug, Clone)]
pub struct DayEntry {
    pub timestamp: DateTime<Tz>,
    pub power_w: f64,
    pub load_w: f64,
    pub energy_today_kwh: f64,
    pub energy_used_kwh: f64,
}

/// A single point of an hourly temperature series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperaturePoint {
    /// Unix timestamp, seconds
    pub time: i64,
    pub temperature_c: f64,
}

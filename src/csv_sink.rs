//! Per-day CSV archive
//!
//! One file per calendar day (a literal `DATE` in the configured template is
//! substituted), UTF-8 with a byte-order mark so spreadsheet tools open it
//! correctly, a header row and appended data rows. Rows written here can be
//! re-parsed for bulk upload; format and parse are symmetric, including the
//! optional decimal-comma mode.

use crate::error::{HeliographError, Result};
use crate::types::Reading;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: [&str; 7] = [
    "date",
    "eday_kwh",
    "pgrid_w",
    "energy_used",
    "load",
    "temp",
    "voltage",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One row of a day archive, as re-parsed for bulk upload
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    pub timestamp: NaiveDateTime,
    pub energy_today_kwh: f64,
    pub power_w: f64,
    pub energy_used_kwh: f64,
    pub load_w: f64,
    pub temperature_c: Option<f64>,
    pub voltage_v: Option<f64>,
}

/// Append-only archive for the current day
pub struct CsvSink {
    path: PathBuf,
    decimal_comma: bool,
}

/// Format a number for the archive, honoring the decimal-separator setting
fn format_number(value: f64, decimal_comma: bool) -> String {
    let plain = format!("{}", value);
    if decimal_comma {
        plain.replace('.', ",")
    } else {
        plain
    }
}

/// Parse an archive number; both decimal separators are accepted
fn parse_number(raw: &str) -> Result<f64> {
    let normalized = raw.trim().replace(',', ".");
    normalized.parse().map_err(|_| {
        HeliographError::validation("csv", &format!("not a number: {:?}", raw))
    })
}

fn parse_optional(raw: &str) -> Result<Option<f64>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_number(raw).map(Some)
}

impl CsvSink {
    /// Resolve the sink path from the filename template for the given day
    pub fn new(template: &str, date: NaiveDate, decimal_comma: bool) -> Self {
        let path = template.replace("DATE", &date.format("%Y-%m-%d").to_string());
        Self {
            path: PathBuf::from(path),
            decimal_comma,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one reading; creates the file with BOM and header first
    pub fn append(&self, reading: &Reading) -> Result<()> {
        if !self.path.exists() {
            let mut file = std::fs::File::create(&self.path)?;
            file.write_all("\u{feff}".as_bytes())?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(HEADER)?;
            writer.flush()?;
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record([
            reading.timestamp.format(DATE_FORMAT).to_string(),
            format_number(reading.energy_today_kwh, self.decimal_comma),
            format_number(reading.power_w, self.decimal_comma),
            format_number(reading.energy_used_kwh, self.decimal_comma),
            format_number(reading.load_w, self.decimal_comma),
            reading
                .temperature_c
                .map(|t| format_number(t, self.decimal_comma))
                .unwrap_or_default(),
            format_number(reading.grid_voltage_v, self.decimal_comma),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

/// Re-parse a day archive for bulk upload
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<ArchiveRecord>> {
    let contents = std::fs::read_to_string(path)?;
    let contents = contents.trim_start_matches('\u{feff}');

    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize> {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            HeliographError::validation("csv", &format!("missing column {}", name))
        })
    };
    let date_col = column("date")?;
    let eday_col = column("eday_kwh")?;
    let pgrid_col = column("pgrid_w")?;
    let used_col = column("energy_used")?;
    let load_col = column("load")?;
    let temp_col = column("temp")?;
    let voltage_col = column("voltage")?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let field = |index: usize| row.get(index).unwrap_or_default();
        records.push(ArchiveRecord {
            timestamp: NaiveDateTime::parse_from_str(field(date_col), DATE_FORMAT)?,
            energy_today_kwh: parse_number(field(eday_col))?,
            power_w: parse_number(field(pgrid_col))?,
            energy_used_kwh: parse_number(field(used_col))?,
            load_w: parse_number(field(load_col))?,
            temperature_c: parse_optional(field(temp_col))?,
            voltage_v: parse_optional(field(voltage_col))?,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitution() {
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let sink = CsvSink::new("/var/log/solar-DATE.csv", date, false);
        assert_eq!(
            sink.path(),
            Path::new("/var/log/solar-2023-06-01.csv")
        );
    }

    #[test]
    fn test_number_round_trip_both_separators() {
        for decimal_comma in [false, true] {
            let formatted = format_number(1234.567, decimal_comma);
            assert_eq!(parse_number(&formatted).unwrap(), 1234.567);
        }
        assert_eq!(format_number(12.5, true), "12,5");
        assert_eq!(parse_number("12,5").unwrap(), 12.5);
        assert!(parse_number("n/a").is_err());
    }
}

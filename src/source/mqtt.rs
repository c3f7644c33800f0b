//! MQTT broker snapshot client
//!
//! An inverter bridge republishes readings as retained leaf topics under a
//! configured root (`<topic>/<device>/<field>`). The reader subscribes to the
//! whole hierarchy, accumulates the latest value per field into a shared map
//! while a background task drives the event loop, and polls that map until
//! every required field has arrived or the observation window closes.

use crate::config::MqttConfig;
use crate::error::{HeliographError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::types::{InverterStatus, Reading};
use chrono::DateTime;
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Leaf fields a snapshot must carry before it can be normalized
const REQUIRED_FIELDS: [&str; 9] = [
    "work_mode_label",
    "ppv",
    "vgrid",
    "vpv1",
    "house_consumption",
    "v1",
    "e_total",
    "battery_soc",
    "v3",
];

/// How often and how many times the shared map is checked for completeness
const POLL_ATTEMPTS: u32 = 5;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

type FieldMap = Arc<Mutex<HashMap<String, String>>>;

/// Snapshot reader bound to one broker and topic root
pub struct MqttReader {
    config: MqttConfig,
    tz: Tz,
    logger: StructuredLogger,
}

impl MqttReader {
    pub fn new(config: MqttConfig, tz: Tz) -> Self {
        Self {
            config,
            tz,
            logger: get_logger("mqtt"),
        }
    }

    /// Collect the most recent value of every leaf field and normalize the
    /// result. Missing required fields after the observation window are fatal
    /// for the cycle.
    pub async fn fetch_current(&self) -> Result<Reading> {
        let fields = self.collect_fields().await?;
        let now = chrono::Utc::now().with_timezone(&self.tz);
        let reading = normalize_snapshot(&fields, now)?;
        self.logger.info(&reading.summary());
        Ok(reading)
    }

    async fn collect_fields(&self) -> Result<HashMap<String, String>> {
        let client_id = format!("heliograph-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if !self.config.username.is_empty() {
            options.set_credentials(self.config.username.clone(), self.config.password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 50);
        client
            .subscribe(format!("{}/#", self.config.topic), QoS::AtLeastOnce)
            .await
            .map_err(|e| HeliographError::source(format!("MQTT subscribe failed: {}", e)))?;
        self.logger.info(&format!(
            "Grabbing latest inverter data from topic: {}",
            self.config.topic
        ));

        let fields: FieldMap = Arc::new(Mutex::new(HashMap::new()));
        let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        // The event loop runs on its own task while we watch the map; every
        // write to the map goes through the mutex.
        let topic_root = self.config.topic.clone();
        let task_fields = Arc::clone(&fields);
        let task_failure = Arc::clone(&failure);
        let receiver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let payload = String::from_utf8_lossy(&publish.payload).to_string();
                        if let Some((_device, field)) = split_topic(&topic_root, &publish.topic)
                            && let Ok(mut map) = task_fields.lock()
                        {
                            map.insert(field.to_string(), payload);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if let Ok(mut slot) = task_failure.lock() {
                            *slot = Some(e.to_string());
                        }
                        break;
                    }
                }
            }
        });

        let mut snapshot = HashMap::new();
        for _ in 0..POLL_ATTEMPTS {
            sleep(POLL_INTERVAL).await;

            if let Some(message) = failure.lock().ok().and_then(|slot| slot.clone()) {
                receiver.abort();
                return Err(HeliographError::source(format!(
                    "MQTT broker connection failed: {}",
                    message
                )));
            }

            snapshot = fields
                .lock()
                .map(|map| map.clone())
                .unwrap_or_default();
            if missing_fields(&snapshot).is_empty() {
                break;
            }
        }

        receiver.abort();
        let _ = client.disconnect().await;

        let missing = missing_fields(&snapshot);
        if !missing.is_empty() {
            return Err(HeliographError::incomplete(format!(
                "required MQTT fields never arrived: {}",
                missing.join(", ")
            )));
        }
        Ok(snapshot)
    }
}

/// Locate the leaf field name at path segment index 2 of a topic under the
/// configured root.
fn split_topic<'t>(root: &str, topic: &'t str) -> Option<(&'t str, &'t str)> {
    let mut parts = topic.split('/');
    if parts.next() != Some(root) {
        return None;
    }
    let device = parts.next()?;
    let field = parts.next()?;
    Some((device, field))
}

fn missing_fields(fields: &HashMap<String, String>) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .filter(|field| !fields.contains_key(**field))
        .copied()
        .collect()
}

fn parse_field(fields: &HashMap<String, String>, field: &str) -> Result<f64> {
    let raw = fields
        .get(field)
        .ok_or_else(|| HeliographError::incomplete(format!("MQTT field {} missing", field)))?;
    raw.trim().parse().map_err(|_| {
        HeliographError::incomplete(format!("MQTT field {} is not numeric: {:?}", field, raw))
    })
}

/// Normalize an accumulated field map into the canonical reading
pub fn normalize_snapshot(
    fields: &HashMap<String, String>,
    timestamp: DateTime<Tz>,
) -> Result<Reading> {
    let mut reading = Reading::empty(timestamp);

    reading.status = fields
        .get("work_mode_label")
        .map(|label| InverterStatus::from_label(label))
        .unwrap_or(InverterStatus::Unknown);
    reading.power_w = parse_field(fields, "ppv")?;
    reading.grid_voltage_v = parse_field(fields, "vgrid")?;
    reading.pv_voltage_v = parse_field(fields, "vpv1")?;
    reading.load_w = parse_field(fields, "house_consumption")?;
    reading.energy_today_kwh = parse_field(fields, "v1")?;
    reading.energy_total_kwh = parse_field(fields, "e_total")?;
    reading.energy_used_kwh = parse_field(fields, "v3")?;
    reading.state_of_charge_pct = parse_field(fields, "battery_soc").ok();

    // The bridge republishes ambient temperature when it has one; no weather
    // lookup happens for this source
    reading.temperature_c = fields.get("v5").and_then(|raw| raw.trim().parse().ok());

    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn complete_fields() -> HashMap<String, String> {
        let pairs = [
            ("work_mode_label", "Normal"),
            ("ppv", "1250.5"),
            ("vgrid", "231.4"),
            ("vpv1", "250.0"),
            ("house_consumption", "430.0"),
            ("v1", "6.4"),
            ("e_total", "10250.3"),
            ("battery_soc", "76"),
            ("v3", "5.2"),
        ];
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> DateTime<Tz> {
        chrono_tz::UTC
            .with_ymd_and_hms(2023, 6, 1, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_split_topic() {
        assert_eq!(
            split_topic("inverter", "inverter/GW5000/ppv"),
            Some(("GW5000", "ppv"))
        );
        assert_eq!(split_topic("inverter", "other/GW5000/ppv"), None);
        assert_eq!(split_topic("inverter", "inverter/GW5000"), None);
    }

    #[test]
    fn test_missing_fields_reported() {
        let mut fields = complete_fields();
        fields.remove("ppv");
        fields.remove("v3");
        let missing = missing_fields(&fields);
        assert_eq!(missing, vec!["ppv", "v3"]);
    }

    #[test]
    fn test_normalize_snapshot() {
        let mut fields = complete_fields();
        fields.insert("v5".to_string(), "18.5".to_string());

        let reading = normalize_snapshot(&fields, now()).unwrap();
        assert_eq!(reading.status, InverterStatus::Normal);
        assert_eq!(reading.power_w, 1250.5);
        assert_eq!(reading.grid_voltage_v, 231.4);
        assert_eq!(reading.energy_today_kwh, 6.4);
        assert_eq!(reading.energy_used_kwh, 5.2);
        assert_eq!(reading.state_of_charge_pct, Some(76.0));
        assert_eq!(reading.temperature_c, Some(18.5));
    }

    #[test]
    fn test_normalize_rejects_non_numeric_required_field() {
        let mut fields = complete_fields();
        fields.insert("ppv".to_string(), "n/a".to_string());
        assert!(normalize_snapshot(&fields, now()).is_err());
    }

    #[test]
    fn test_field_map_is_safe_across_threads() {
        // The event loop writes from another execution context than the
        // poller reads; the mutex-guarded map must tolerate that interleaving.
        let fields: FieldMap = Arc::new(Mutex::new(HashMap::new()));
        let writer_fields = Arc::clone(&fields);
        let writer = std::thread::spawn(move || {
            for i in 0..1000 {
                let mut map = writer_fields.lock().unwrap();
                map.insert("ppv".to_string(), format!("{}", i));
            }
        });
        for _ in 0..1000 {
            let _ = fields.lock().unwrap().get("ppv").cloned();
        }
        writer.join().unwrap();
        assert_eq!(fields.lock().unwrap().get("ppv").unwrap(), "999");
    }
}

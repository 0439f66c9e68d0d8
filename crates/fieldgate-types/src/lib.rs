//! Shared types and constants for the fieldgate IoT gateway.
//!
//! This crate holds the domain records exchanged between the ingestion
//! pipeline, the store, and the HTTP surface: client records, rules and
//! their trigger kinds, alerts, telemetry events, and the validated device
//! identifier. It has no runtime dependencies beyond serde.

mod device_id;
mod rule;

pub use device_id::{DeviceId, InvalidDeviceId};
pub use rule::{ParseTriggerKindError, Rule, TriggerKind};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Rule `client_id` value that matches every client.
pub const WILDCARD_CLIENT: &str = "*";

/// Category recorded on alerts raised by the rule evaluation engine.
pub const RULE_TRIGGER_CATEGORY: &str = "rule trigger";

/// A device known to the gateway, keyed by its stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// Stable device identifier (usually the hardware address).
    #[serde(rename = "client_id")]
    pub id: String,
    /// Network address the device declared at registration (`host` or `host:port`).
    #[serde(rename = "ip")]
    pub address: String,
    /// Declared device type.
    #[serde(rename = "device_type")]
    pub device_type: String,
}

/// An active alert held in the in-memory alert log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier assigned when the alert was appended.
    pub id: u64,
    /// Alert category, e.g. [`RULE_TRIGGER_CATEGORY`].
    #[serde(rename = "alert_type")]
    pub category: String,
    /// The client the alert concerns.
    pub client_id: String,
    /// Wall-clock time the alert was raised (`YYYY-MM-DD HH:MM:SS`).
    pub timestamp: String,
    /// Human-readable description.
    pub message: String,
}

/// Kind of an inbound device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Periodic parameter readings.
    Telemetry,
    /// A sensor-detected intrusion, carrying detection parameters.
    Intrusion,
    /// A device announcing its address and type.
    Registration,
}

impl EventKind {
    /// Returns the wire label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Intrusion => "intrusion",
            Self::Registration => "registration",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A telemetry or intrusion event as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub client_id: String,
    pub device_type: String,
    /// Client-supplied timestamp, seconds since the Unix epoch.
    pub local_timestamp: i64,
    pub kind: EventKind,
    /// Parameter name to value mapping; values are usually numeric.
    pub data: Map<String, Value>,
}

/// A persisted event read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub client_id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub local_timestamp: i64,
    pub event: String,
    pub data: Value,
}

/// Alert event published back to a device on its private sub-topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAlert {
    /// `<name>_alert`, e.g. `fox_alert`.
    pub event: String,
    pub client_id: String,
    pub data: Map<String, Value>,
}

impl OutboundAlert {
    /// Builds the alert for `name` addressed to `client_id`.
    pub fn new(name: &str, client_id: &str) -> Self {
        Self {
            event: format!("{name}_alert"),
            client_id: client_id.to_string(),
            data: Map::new(),
        }
    }
}

/// Settings document pushed to a device through the passthrough endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub device_id: String,
    pub ssid: String,
    pub password: String,
    pub gateway: String,
    pub noise_threshold: i64,
    /// Seconds between telemetry publishes.
    pub telemetry_interval: i64,
    pub mqtt_broker: String,
    pub mqtt_topic: String,
    pub mqtt_topic_sub: String,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_record_uses_wire_field_names() {
        let record = ClientRecord {
            id: "AA:BB:CC:DD:EE:FF".to_string(),
            address: "10.0.0.7".to_string(),
            device_type: "camera".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["client_id"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(json["ip"], "10.0.0.7");
        assert_eq!(json["device_type"], "camera");
    }

    #[test]
    fn outbound_alert_suffixes_event_name() {
        let alert = OutboundAlert::new("fox", "AA:BB:CC:DD:EE:FF");
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["event"], "fox_alert");
        assert_eq!(json["client_id"], "AA:BB:CC:DD:EE:FF");
        assert!(json["data"].as_object().unwrap().is_empty());
    }

    #[test]
    fn event_kind_labels() {
        assert_eq!(EventKind::Telemetry.as_str(), "telemetry");
        assert_eq!(EventKind::Intrusion.to_string(), "intrusion");
        let parsed: EventKind = serde_json::from_str("\"registration\"").unwrap();
        assert_eq!(parsed, EventKind::Registration);
    }

    #[test]
    fn device_settings_fill_missing_fields() {
        let settings: DeviceSettings =
            serde_json::from_str(r#"{"ssid":"field-net","telemetry_interval":60}"#).unwrap();
        assert_eq!(settings.ssid, "field-net");
        assert_eq!(settings.telemetry_interval, 60);
        assert_eq!(settings.mqtt_port, 0);
        assert!(settings.device_id.is_empty());
    }
}

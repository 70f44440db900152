//! # Telemetry Records
//!
//! Records produced on the node and the JSON documents they turn into.

use serde::{Deserialize, Serialize};

/// Estimated position attached to a CSI sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate in meters
    pub x: f32,

    /// Y coordinate in meters
    pub y: f32,

    /// Confidence (0.0-1.0)
    pub confidence: f32,
}

/// One channel-state measurement from the collector
///
/// Owned by the supervisor from the moment it is popped until its
/// transmission attempt completes.
#[derive(Debug, Clone, PartialEq)]
pub struct CsiSample {
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,

    /// Transmitter MAC address
    pub mac: [u8; 6],

    /// Signal strength in dBm
    pub rssi: i8,

    /// WiFi channel
    pub channel: u16,

    /// Per-subcarrier amplitude
    pub amplitude: Vec<f32>,

    /// Per-subcarrier phase, same length as `amplitude`
    pub phase: Option<Vec<f32>>,

    /// Position estimate, if one was computed upstream
    pub position: Option<Position>,
}

impl CsiSample {
    /// Build a sample with amplitude data only
    pub fn new(
        timestamp_us: u64,
        mac: [u8; 6],
        rssi: i8,
        channel: u16,
        amplitude: Vec<f32>,
    ) -> Self {
        Self {
            timestamp_us,
            mac,
            rssi,
            channel,
            amplitude,
            phase: None,
            position: None,
        }
    }

    /// MAC address in `AA:BB:CC:DD:EE:FF` form
    pub fn mac_string(&self) -> String {
        self.mac
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// JSON document for `POST /api/csi/data`
#[derive(Debug, Serialize)]
pub struct CsiDocument<'a> {
    pub device_id: &'a str,
    pub timestamp: u64,
    pub mac: String,
    pub rssi: i8,
    pub channel: u16,
    pub data_length: usize,
    pub amplitude: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl<'a> CsiDocument<'a> {
    pub fn new(device_id: &'a str, sample: &'a CsiSample) -> Self {
        Self {
            device_id,
            timestamp: sample.timestamp_us,
            mac: sample.mac_string(),
            rssi: sample.rssi,
            channel: sample.channel,
            data_length: sample.amplitude.len(),
            amplitude: &sample.amplitude,
            phase: sample.phase.as_deref(),
            position_x: sample.position.map(|p| p.x),
            position_y: sample.position.map(|p| p.y),
            confidence: sample.position.map(|p| p.confidence),
        }
    }
}

/// Point-in-time system health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemMetricsSnapshot {
    #[serde(rename = "timestamp")]
    pub timestamp_us: u64,
    pub uptime_sec: u64,
    pub free_heap_bytes: u32,
    pub min_free_heap_bytes: u32,
    pub cpu_usage_percent: u8,
    pub wifi_rssi: i8,
    pub task_count: u16,
    #[serde(rename = "csi_packets_processed")]
    pub csi_samples_processed: u64,
    #[serde(rename = "csi_packets_dropped")]
    pub csi_samples_dropped: u64,
    pub http_requests_sent: u64,
    #[serde(rename = "http_errors")]
    pub http_requests_failed: u64,
    pub stream_messages_sent: u64,
    pub stream_latency_ms: f64,
    pub firmware_version: String,
}

/// Device liveness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Online,
    Offline,
    Error,
}

/// Periodic liveness report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub status: HeartbeatStatus,
    #[serde(rename = "timestamp")]
    pub timestamp_us: u64,
    pub uptime_sec: u64,
    pub ip_address: String,
    pub wifi_rssi: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

/// Outward alert message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub message: String,
    #[serde(rename = "timestamp")]
    pub timestamp_us: u64,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        component: impl Into<String>,
        message: impl Into<String>,
        timestamp_us: u64,
    ) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
            timestamp_us,
        }
    }
}

/// Borrowed document that prefixes a record with the device id
#[derive(Debug, Serialize)]
pub struct DocumentRef<'a, T: Serialize> {
    pub device_id: &'a str,
    #[serde(flatten)]
    pub body: &'a T,
}

/// Owned document, as read back from the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document<T> {
    pub device_id: String,
    #[serde(flatten)]
    pub body: T,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample() -> CsiSample {
        CsiSample::new(
            1_700_000_000_000_000,
            [0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03],
            -42,
            6,
            vec![1.0, 2.5, 3.25],
        )
    }

    #[test]
    fn test_mac_string() {
        assert_eq!(sample().mac_string(), "AA:BB:CC:01:02:03");
    }

    #[test]
    fn test_csi_document_fields() {
        let s = sample();
        let json: Value = serde_json::to_value(CsiDocument::new("node-1", &s)).unwrap();

        assert_eq!(json["device_id"], "node-1");
        assert_eq!(json["mac"], "AA:BB:CC:01:02:03");
        assert_eq!(json["rssi"], -42);
        assert_eq!(json["channel"], 6);
        assert_eq!(json["data_length"], 3);
        assert_eq!(json["amplitude"].as_array().unwrap().len(), 3);
        // Optional fields are omitted, not null
        assert!(json.get("phase").is_none());
        assert!(json.get("position_x").is_none());
    }

    #[test]
    fn test_csi_document_with_position() {
        let mut s = sample();
        s.phase = Some(vec![0.1, 0.2, 0.3]);
        s.position = Some(Position { x: 1.5, y: -2.0, confidence: 0.75 });
        let json: Value = serde_json::to_value(CsiDocument::new("node-1", &s)).unwrap();

        assert_eq!(json["phase"].as_array().unwrap().len(), 3);
        assert_eq!(json["position_x"], 1.5);
        assert_eq!(json["position_y"], -2.0);
        assert_eq!(json["confidence"], 0.75);
    }

    #[test]
    fn test_heartbeat_document() {
        let hb = Heartbeat {
            status: HeartbeatStatus::Online,
            timestamp_us: 10,
            uptime_sec: 3600,
            ip_address: "192.168.1.50".to_string(),
            wifi_rssi: -55,
            error_message: None,
        };
        let json: Value = serde_json::to_value(DocumentRef {
            device_id: "node-1",
            body: &hb,
        })
        .unwrap();

        assert_eq!(json["device_id"], "node-1");
        assert_eq!(json["status"], "online");
        assert_eq!(json["timestamp"], 10);
        assert_eq!(json["ip_address"], "192.168.1.50");
        assert!(json.get("error_message").is_none());
    }

    #[test]
    fn test_alert_document_roundtrips_through_owned_document() {
        let alert = Alert::new(AlertLevel::Critical, "memory", "Critical low memory", 99);
        let bytes = serde_json::to_vec(&DocumentRef { device_id: "node-7", body: &alert }).unwrap();
        let doc: Document<Alert> = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc.device_id, "node-7");
        assert_eq!(doc.body, alert);
    }

    #[test]
    fn test_metrics_field_names() {
        let metrics = SystemMetricsSnapshot {
            csi_samples_processed: 12,
            http_requests_failed: 2,
            ..Default::default()
        };
        let json: Value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["csi_packets_processed"], 12);
        assert_eq!(json["http_errors"], 2);
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Critical > AlertLevel::Error);
        assert!(AlertLevel::Warning > AlertLevel::Info);
    }
}

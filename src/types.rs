//! Core data types for the telemetry pipeline
//!
//! This module contains the fundamental data structures shared across the
//! crate: per-sensor telemetry records, status/severity classification
//! inputs, and the QoS level negotiated per message.
//!
//! # Sensor Records
//!
//! A [`SensorRecord`] is the last-known state of one sensor. Records are
//! created from JSON telemetry payloads (see [`SensorPayload`]) and stored
//! in the [`crate::cache::SensorCache`] with last-received-wins semantics:
//! each new record for a sensor id overwrites the previous one, regardless
//! of embedded source timestamps. The `revision` field is stamped from
//! local arrival order by the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery-guarantee level negotiated per message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QosLevel {
    /// At most once (fire and forget)
    AtMostOnce,
    /// At least once (acknowledged delivery)
    #[default]
    AtLeastOnce,
    /// Exactly once (assured delivery)
    ExactlyOnce,
}

impl QosLevel {
    /// Construct from the wire-level 0/1/2 value, clamping unknown values to 0
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => QosLevel::AtLeastOnce,
            2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce,
        }
    }

    /// The wire-level 0/1/2 value
    pub fn as_u8(&self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

impl From<QosLevel> for rumqttc::QoS {
    fn from(qos: QosLevel) -> Self {
        match qos {
            QosLevel::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QosLevel::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QosLevel::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QosLevel {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => QosLevel::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QosLevel::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QosLevel::ExactlyOnce,
        }
    }
}

/// Operational status reported by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    /// Normal operation
    #[default]
    Online,
    /// Degraded but functioning
    Warning,
    /// Alert condition
    Critical,
    /// No recent data from the sensor
    Offline,
}

/// Visual severity derived from status and quality
///
/// The mapping is pure and shared by every consumer (3D view, dashboard),
/// so all surfaces agree on a sensor's color. See
/// [`crate::cache::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Offline / no data
    Gray,
    /// Critical alert or poor quality
    Red,
    /// Warning or degraded quality
    Yellow,
    /// Healthy
    Green,
}

/// Last-known telemetry state for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Sensor identity (extracted from the topic, e.g. `042`)
    pub sensor_id: String,
    /// Current measured value
    pub value: f64,
    /// Measurement unit (e.g. `pH`, `mg/L`)
    pub unit: String,
    /// Operational status
    pub status: SensorStatus,
    /// Signal quality in the 0..=100 range
    pub quality: f64,
    /// Position of the sensor in the 3D scene
    pub position: [f32; 3],
    /// Wall-clock time of the last update (local receive time)
    pub last_update: DateTime<Utc>,
    /// Arrival-order version, stamped by the cache on insert
    #[serde(default)]
    pub revision: u64,
}

/// Wire format of a telemetry payload
///
/// All fields except `value` are optional; missing fields fall back to
/// defaults so partial publishers (e.g. simulators) still produce usable
/// records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPayload {
    /// Measured value
    pub value: f64,
    /// Measurement unit
    #[serde(default)]
    pub unit: String,
    /// Reported status; unknown strings decode as `online`
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: SensorStatus,
    /// Signal quality, defaults to 100
    #[serde(default = "default_quality")]
    pub quality: f64,
    /// Scene position
    #[serde(default)]
    pub position: [f32; 3],
    /// Source timestamp; stored but never used for ordering
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_quality() -> f64 {
    100.0
}

/// Accepts unknown status strings as `Online` instead of failing the
/// whole payload.
fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<SensorStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.to_ascii_lowercase().as_str() {
        "warning" => SensorStatus::Warning,
        "critical" => SensorStatus::Critical,
        "offline" => SensorStatus::Offline,
        _ => SensorStatus::Online,
    })
}

impl SensorRecord {
    /// Build a record from a decoded payload
    ///
    /// `last_update` is the local receive time; the payload's own
    /// `timestamp` does not participate in ordering.
    pub fn from_payload(sensor_id: impl Into<String>, payload: SensorPayload) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value: payload.value,
            unit: payload.unit,
            status: payload.status,
            quality: payload.quality.clamp(0.0, 100.0),
            position: payload.position,
            last_update: payload.timestamp.unwrap_or_else(Utc::now),
            revision: 0,
        }
    }

    /// Parse a JSON telemetry payload into a record
    pub fn parse(sensor_id: impl Into<String>, bytes: &[u8]) -> crate::error::Result<Self> {
        let payload: SensorPayload = serde_json::from_slice(bytes)?;
        Ok(Self::from_payload(sensor_id, payload))
    }
}

/// Extract the sensor id from a telemetry topic
///
/// The id is the segment immediately before the trailing `data` segment
/// (`station/sensors/042/data` -> `042`). Topics without that shape yield
/// the last segment, so analytics-style topics (`station/analytics/042`)
/// still resolve.
pub fn sensor_id_from_topic(topic: &str) -> Option<&str> {
    let mut segments = topic.split('/').rev();
    let last = segments.next()?;
    if last == "data" {
        segments.next().filter(|s| !s.is_empty())
    } else if !last.is_empty() {
        Some(last)
    } else {
        None
    }
}

//! Canonical telemetry types
//!
//! `RawReading` is the untyped snapshot a source produces each tick. The
//! remaining types form the fixed wire schema published to the cloud.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Which acquisition path produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mock,
    Http,
    File,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Mock => "mock",
            SourceKind::Http => "http",
            SourceKind::File => "file",
        }
    }
}

/// Process-wide device identity, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    device_id: String,
    venue_id: String,
    location_id: String,
}

impl Identity {
    pub fn new(
        device_id: impl Into<String>,
        venue_id: impl Into<String>,
        location_id: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            venue_id: venue_id.into(),
            location_id: location_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn venue_id(&self) -> &str {
        &self.venue_id
    }

    pub fn location_id(&self) -> &str {
        &self.location_id
    }
}

/// One snapshot as produced by a source, keyed by the source's own field names
#[derive(Debug, Clone)]
pub struct RawReading {
    kind: SourceKind,
    fields: Map<String, Value>,
}

impl RawReading {
    pub fn new(kind: SourceKind, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Numeric value for `key`. Numeric strings ("21.5") are accepted since
    /// some sensor scripts write every value quoted.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Counter value for `key`, truncated toward zero and floored at zero
    pub fn counter(&self, key: &str) -> Option<u32> {
        let value = match self.fields.get(key)? {
            Value::Number(n) => match n.as_u64() {
                Some(v) => return Some(v.min(u32::MAX as u64) as u32),
                None => n.as_f64()?,
            },
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if !value.is_finite() {
            return None;
        }
        Some(value.clamp(0.0, u32::MAX as f64) as u32)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key)?.as_str()
    }
}

/// Environmental readings in canonical units (dB, lux, °F, %RH, hPa)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSensors {
    pub sound_level: f64,
    pub light_level: f64,
    pub indoor_temperature: f64,
    pub outdoor_temperature: f64,
    pub humidity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl Default for NormalizedSensors {
    fn default() -> Self {
        Self {
            sound_level: 0.0,
            light_level: 0.0,
            indoor_temperature: 0.0,
            outdoor_temperature: 0.0,
            humidity: 0.0,
            pressure: None,
        }
    }
}

/// Door-counter derived occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OccupancyInfo {
    pub current: u32,
    pub entries: u32,
    pub exits: u32,
    pub capacity: u32,
}

impl OccupancyInfo {
    /// Percentage of capacity currently occupied (0 when capacity is unset)
    pub fn fill_percent(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.current as f64 / self.capacity as f64 * 100.0
    }
}

/// Track currently playing in the venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlayingInfo {
    #[serde(rename = "current_song")]
    pub title: String,
    pub artist: String,
    #[serde(rename = "album_art")]
    pub album_art_url: Option<String>,
}

/// Result of normalizing one raw reading
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub sensors: NormalizedSensors,
    pub occupancy: Option<OccupancyInfo>,
    pub now_playing: Option<NowPlayingInfo>,
}

/// The canonical message published once per tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub device_id: String,
    pub venue_id: String,
    #[serde(serialize_with = "serialize_utc_z")]
    pub timestamp: DateTime<Utc>,
    pub sensors: NormalizedSensors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<OccupancyInfo>,
    #[serde(rename = "spotify", skip_serializing_if = "Option::is_none")]
    pub now_playing: Option<NowPlayingInfo>,
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// ISO-8601 UTC with millisecond precision and a literal `Z` suffix
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_utc_z<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

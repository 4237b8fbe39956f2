//! Data models for the air-quality ingestion pipeline.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::scoring::FeatureVector;

// ---

/// Raw sensor payload as dropped into the input directory.
///
/// Every block is optional: absent blocks and fields read as zero here and
/// completeness is judged separately by the alert engine.
#[derive(Debug, Default, Deserialize)]
pub struct RawSensorPayload {
    // ---
    #[serde(default)]
    pub sensor_data: SensorData,
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorData {
    // ---
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub readings: Readings,
    #[serde(default)]
    pub system_info: Option<SystemInfo>,
}

/// Device metadata. Scalars are read leniently so that a mistyped field
/// degrades to its default instead of rejecting the file.
#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    // ---
    #[serde(default, deserialize_with = "string_or_number")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub location: Option<String>,
    /// Non-string timestamps are treated as absent.
    #[serde(default, deserialize_with = "string_only")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "number_only")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "number_only")]
    pub longitude: Option<f64>,
}

/// Strings as-is, numbers and booleans in their JSON text form.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    // ---
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn string_only<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn number_only<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(Value::as_f64))
}

#[derive(Debug, Default, Deserialize)]
pub struct Readings {
    // ---
    pub scd30: Option<Scd30>,
    pub bme280: Option<Bme280>,
    pub mq135: Option<Mq135>,
}

/// CO2 / temperature / humidity sensor.
#[derive(Debug, Default, Deserialize)]
pub struct Scd30 {
    pub co2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// Meteorological sensor.
#[derive(Debug, Default, Deserialize)]
pub struct Bme280 {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
}

/// Gas sensor.
#[derive(Debug, Default, Deserialize)]
pub struct Mq135 {
    pub analog_value: Option<f64>,
    pub digital_value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SystemInfo {
    pub battery_level: Option<f64>,
    pub sampling_interval: Option<f64>,
}

/// Flattened reading extracted from a payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    // ---
    pub device_id: String,
    pub location: String,
    pub timestamp: String,
    pub co2: f64,
    pub temperature_scd: f64,
    pub humidity_scd: f64,
    pub temperature_bme: f64,
    pub humidity_bme: f64,
    pub pressure: f64,
    pub mq135_analog: f64,
    pub mq135_digital: f64,
}

/// The three values the threshold checks look at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingLevels {
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
}

pub const UNKNOWN_DEVICE: &str = "UNKNOWN";
pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Defaults used when the reading timestamp is missing or unparsable.
const DEFAULT_HOUR: u32 = 12;
const DEFAULT_WEEKDAY: u32 = 0;

impl RawSensorPayload {
    // ---
    pub fn to_reading(&self) -> SensorReading {
        // ---
        let meta = &self.sensor_data.metadata;
        let readings = &self.sensor_data.readings;

        let scd30 = readings.scd30.as_ref();
        let bme280 = readings.bme280.as_ref();
        let mq135 = readings.mq135.as_ref();

        SensorReading {
            device_id: meta
                .device_id
                .clone()
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            location: meta
                .location
                .clone()
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
            timestamp: meta.timestamp.clone().unwrap_or_default(),
            co2: scd30.and_then(|s| s.co2).unwrap_or(0.0),
            temperature_scd: scd30.and_then(|s| s.temperature).unwrap_or(0.0),
            humidity_scd: scd30.and_then(|s| s.humidity).unwrap_or(0.0),
            temperature_bme: bme280.and_then(|s| s.temperature).unwrap_or(0.0),
            humidity_bme: bme280.and_then(|s| s.humidity).unwrap_or(0.0),
            pressure: bme280.and_then(|s| s.pressure).unwrap_or(0.0),
            mq135_analog: mq135.and_then(|s| s.analog_value).unwrap_or(0.0),
            mq135_digital: mq135.and_then(|s| s.digital_value).unwrap_or(0.0),
        }
    }
}

impl SensorReading {
    // ---
    pub fn levels(&self) -> ReadingLevels {
        ReadingLevels {
            co2: self.co2,
            temperature: self.temperature_scd,
            humidity: self.humidity_scd,
        }
    }

    /// Six-feature vector handed to the scorer.
    pub fn features(&self) -> FeatureVector {
        // ---
        let (hour_of_day, day_of_week) =
            hour_and_weekday(&self.timestamp).unwrap_or((DEFAULT_HOUR, DEFAULT_WEEKDAY));

        FeatureVector {
            co2: self.co2,
            temperature: self.temperature_scd,
            humidity: self.humidity_scd,
            pressure: self.pressure,
            hour_of_day: f64::from(hour_of_day),
            day_of_week: f64::from(day_of_week),
        }
    }
}

/// Hour (0-23) and weekday (Monday = 0) of an ISO-8601 timestamp.
///
/// Accepts offset-qualified timestamps (`Z` or `+hh:mm`) as well as naive
/// ones, with `T` or a space as the date/time separator.
pub fn hour_and_weekday(timestamp: &str) -> Option<(u32, u32)> {
    // ---
    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some((dt.hour(), dt.weekday().num_days_from_monday()));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        .map(|dt| (dt.hour(), dt.weekday().num_days_from_monday()))
}

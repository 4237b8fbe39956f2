//! Threshold evaluation.
//!
//! The evaluators only decide which alerts fire and build them. Persisting
//! them is the [`AlertRecorder`](super::AlertRecorder)'s job.

use serde_json::{json, Map, Value};

use crate::classifier::AirQuality;
use crate::models::{ReadingLevels, UNKNOWN_LOCATION};

use super::dedup::DedupCache;
use super::types::{Alert, AlertCategory, Severity};

// ---

/// Static alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub co2_critical: f64,
    pub co2_high: f64,
    pub temperature_high: f64,
    pub temperature_low: f64,
    pub humidity_high: f64,
    pub humidity_low: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            co2_critical: 1200.0,
            co2_high: 1000.0,
            temperature_high: 35.0,
            temperature_low: 15.0,
            humidity_high: 85.0,
            humidity_low: 30.0,
        }
    }
}

/// Required sub-fields per sensor block, with the labels reported when the
/// block is absent or incomplete. `mq135` only needs to be present.
const SENSOR_BLOCKS: [(&str, &[&str], &str, Option<&str>); 3] = [
    (
        "scd30",
        &["co2", "temperature", "humidity"],
        "SCD30 (CO2)",
        Some("SCD30 datos incompletos"),
    ),
    (
        "bme280",
        &["temperature", "humidity", "pressure"],
        "BME280 (meteorologico)",
        Some("BME280 datos incompletos"),
    ),
    ("mq135", &[], "MQ135 (calidad aire)", None),
];

/// Threshold checks plus the dedup state that gates them.
#[derive(Debug, Default)]
pub struct AlertEngine {
    thresholds: Thresholds,
    dedup: DedupCache,
}

impl AlertEngine {
    // ---
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            dedup: DedupCache::new(),
        }
    }

    pub fn dedup_mut(&mut self) -> &mut DedupCache {
        &mut self.dedup
    }

    /// CO2, temperature and humidity checks, in that order.
    ///
    /// Within each check the more severe branch wins; across checks every
    /// condition is independent.
    pub fn evaluate_reading(&mut self, levels: &ReadingLevels, location: &str) -> Vec<Alert> {
        // ---
        let t = self.thresholds;
        let mut alerts = Vec::new();

        let co2 = levels.co2;
        let co2_check = if co2 >= t.co2_critical {
            Some((
                Severity::Critical,
                "co2_critical",
                format!("CO2 level CRITICAL: {} ppm", co2),
                t.co2_critical,
                "CO2_CRITICAL",
                "EVACUATE AREA - Emergency ventilation required",
            ))
        } else if co2 >= t.co2_high {
            Some((
                Severity::Warning,
                "co2_high",
                format!("CO2 level HIGH: {} ppm", co2),
                t.co2_high,
                "CO2_HIGH",
                "Increase ventilation - Monitor continuously",
            ))
        } else {
            None
        };
        if let Some((severity, key, message, threshold, condition, advice)) = co2_check {
            let data = object(json!({
                "co2_ppm": co2,
                "threshold": threshold,
                "condition": condition,
                "recommendation": advice,
            }));
            self.push_if_due(&mut alerts, severity, key, location, message, data);
        }

        let temperature = levels.temperature;
        let temp_check = if temperature >= t.temperature_high {
            Some((
                "temp_high",
                format!("Temperature HIGH: {}°C", temperature),
                t.temperature_high,
                "TEMPERATURE_HIGH",
                "Activate cooling systems",
            ))
        } else if temperature <= t.temperature_low {
            Some((
                "temp_low",
                format!("Temperature LOW: {}°C", temperature),
                t.temperature_low,
                "TEMPERATURE_LOW",
                "Activate heating systems",
            ))
        } else {
            None
        };
        if let Some((key, message, threshold, condition, advice)) = temp_check {
            let data = object(json!({
                "temperature_c": temperature,
                "threshold": threshold,
                "condition": condition,
                "recommendation": advice,
            }));
            self.push_if_due(&mut alerts, Severity::Warning, key, location, message, data);
        }

        let humidity = levels.humidity;
        let hum_check = if humidity >= t.humidity_high {
            Some((
                "hum_high",
                format!("Humidity HIGH: {}%", humidity),
                t.humidity_high,
                "HUMIDITY_HIGH",
                "Control humidity - Condensation risk",
            ))
        } else if humidity <= t.humidity_low {
            Some((
                "hum_low",
                format!("Humidity LOW: {}%", humidity),
                t.humidity_low,
                "HUMIDITY_LOW",
                "Increase humidity - Dryness risk",
            ))
        } else {
            None
        };
        if let Some((key, message, threshold, condition, advice)) = hum_check {
            let data = object(json!({
                "humidity_percent": humidity,
                "threshold": threshold,
                "condition": condition,
                "recommendation": advice,
            }));
            self.push_if_due(&mut alerts, Severity::Warning, key, location, message, data);
        }

        alerts
    }

    /// Extra CRITICAL alert when the overall category is `Dangerous`.
    ///
    /// Uses its own dedup key, so it fires alongside the CO2 alert for the
    /// same reading.
    pub fn evaluate_dangerous_category(
        &mut self,
        category: AirQuality,
        levels: &ReadingLevels,
        location: &str,
    ) -> Vec<Alert> {
        // ---
        if category != AirQuality::Dangerous {
            return Vec::new();
        }

        let data = object(json!({
            "co2_ppm": levels.co2,
            "temperature": levels.temperature,
            "humidity": levels.humidity,
            "detected_quality": category.as_str(),
            "condition": "DANGEROUS_QUALITY",
            "recommendation": "EVACUATION RECOMMENDED - Activate emergency systems",
        }));

        let mut alerts = Vec::new();
        self.push_if_due(
            &mut alerts,
            Severity::Critical,
            "dangerous_quality",
            location,
            "DANGEROUS air quality detected".to_string(),
            data,
        );
        alerts
    }

    /// One WARNING listing every missing sensor block or field.
    ///
    /// Deduplicated on the content of the missing set, so a different set
    /// from the same location still fires.
    pub fn evaluate_completeness(&mut self, raw_payload: &Value) -> Vec<Alert> {
        // ---
        let missing = missing_sensors(raw_payload);
        if missing.is_empty() {
            return Vec::new();
        }

        let metadata = raw_payload.pointer("/sensor_data/metadata");
        let location = metadata
            .and_then(|m| m.get("location"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        let timestamp = metadata
            .and_then(|m| m.get("timestamp"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let detail_key = format!("incomplete_{}", missing.join("|"));
        if !self
            .dedup
            .should_raise(AlertCategory::IncompleteData, Some(&detail_key), &location)
        {
            return Vec::new();
        }

        let message = format!("Incomplete sensor data: {}", missing.join(", "));
        let data = object(json!({
            "missing_sensors": missing,
            "timestamp": timestamp,
            "recommendation": "Check sensor connections",
        }));

        vec![Alert::new(
            Severity::Warning,
            AlertCategory::IncompleteData,
            &location,
            message,
            data,
        )]
    }

    fn push_if_due(
        &mut self,
        alerts: &mut Vec<Alert>,
        severity: Severity,
        key: &str,
        location: &str,
        message: String,
        data: Map<String, Value>,
    ) {
        // ---
        if self
            .dedup
            .should_raise(AlertCategory::AirQuality, Some(key), location)
        {
            alerts.push(Alert::new(
                severity,
                AlertCategory::AirQuality,
                location,
                message,
                data,
            ));
        }
    }
}

/// Labels of absent sensor blocks or blocks missing a required field.
pub fn missing_sensors(raw_payload: &Value) -> Vec<&'static str> {
    // ---
    let readings = raw_payload.pointer("/sensor_data/readings");

    SENSOR_BLOCKS
        .iter()
        .filter_map(|(block, fields, absent_label, partial_label)| {
            match readings.and_then(|r| r.get(*block)).filter(|v| !v.is_null()) {
                None => Some(*absent_label),
                Some(sensor) => {
                    let complete = fields
                        .iter()
                        .all(|f| sensor.get(*f).is_some_and(|v| !v.is_null()));
                    if complete {
                        None
                    } else {
                        *partial_label
                    }
                }
            }
        })
        .collect()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn levels(co2: f64, temperature: f64, humidity: f64) -> ReadingLevels {
        ReadingLevels {
            co2,
            temperature,
            humidity,
        }
    }

    fn full_payload() -> Value {
        json!({"sensor_data": {
            "metadata": {"location": "Aula 101", "timestamp": "2025-12-01T10:00:00"},
            "readings": {
                "scd30": {"co2": 400, "temperature": 24, "humidity": 60},
                "bme280": {"temperature": 24, "humidity": 60, "pressure": 1013},
                "mq135": {"analog_value": 300, "digital_value": 0}
            }
        }})
    }

    #[test]
    fn test_normal_reading_raises_nothing() {
        // ---
        let mut engine = AlertEngine::default();
        assert!(engine.evaluate_reading(&levels(400.0, 24.0, 60.0), "Aula 101").is_empty());
    }

    #[test]
    fn test_co2_critical_wins_over_high() {
        // ---
        let mut engine = AlertEngine::default();
        let alerts = engine.evaluate_reading(&levels(1300.0, 24.0, 60.0), "Aula 101");

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[0].message.contains("1300"));
        assert_eq!(alerts[0].additional_data["condition"], "CO2_CRITICAL");
    }

    #[test]
    fn test_co2_high_is_warning() {
        // ---
        let mut engine = AlertEngine::default();
        let alerts = engine.evaluate_reading(&levels(1000.0, 24.0, 60.0), "Aula 101");

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].additional_data["threshold"], 1000.0);
    }

    #[test]
    fn test_independent_checks_all_fire() {
        // ---
        let mut engine = AlertEngine::default();
        let alerts = engine.evaluate_reading(&levels(1100.0, 36.0, 20.0), "Lab");

        let conditions: Vec<&str> = alerts
            .iter()
            .map(|a| a.additional_data["condition"].as_str().unwrap())
            .collect();
        assert_eq!(conditions, vec!["CO2_HIGH", "TEMPERATURE_HIGH", "HUMIDITY_LOW"]);
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        // ---
        let mut engine = AlertEngine::default();
        let alerts = engine.evaluate_reading(&levels(500.0, 15.0, 85.0), "Lab");

        let conditions: Vec<&str> = alerts
            .iter()
            .map(|a| a.additional_data["condition"].as_str().unwrap())
            .collect();
        assert_eq!(conditions, vec!["TEMPERATURE_LOW", "HUMIDITY_HIGH"]);
    }

    #[test]
    fn test_repeat_reading_is_suppressed() {
        // ---
        let mut engine = AlertEngine::default();
        assert_eq!(engine.evaluate_reading(&levels(1300.0, 24.0, 60.0), "Aula 101").len(), 1);
        assert!(engine.evaluate_reading(&levels(1350.0, 24.0, 60.0), "Aula 101").is_empty());
        // Another room is a different key
        assert_eq!(engine.evaluate_reading(&levels(1300.0, 24.0, 60.0), "Aula 102").len(), 1);
    }

    #[test]
    fn test_dangerous_category_adds_distinct_alert() {
        // ---
        let mut engine = AlertEngine::default();
        let reading = levels(1300.0, 24.0, 60.0);

        let co2_alerts = engine.evaluate_reading(&reading, "Aula 101");
        let extra = engine.evaluate_dangerous_category(AirQuality::Dangerous, &reading, "Aula 101");

        assert_eq!(co2_alerts.len(), 1);
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].severity, Severity::Critical);
        assert_ne!(co2_alerts[0].message, extra[0].message);
    }

    #[test]
    fn test_dangerous_check_ignores_other_categories() {
        // ---
        let mut engine = AlertEngine::default();
        let alerts =
            engine.evaluate_dangerous_category(AirQuality::VeryPoor, &levels(1150.0, 24.0, 60.0), "X");
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_complete_payload_has_no_missing_sensors() {
        // ---
        assert!(missing_sensors(&full_payload()).is_empty());
        let mut engine = AlertEngine::default();
        assert!(engine.evaluate_completeness(&full_payload()).is_empty());
    }

    #[test]
    fn test_missing_mq135_is_reported_once() {
        // ---
        let mut payload = full_payload();
        payload["sensor_data"]["readings"]
            .as_object_mut()
            .unwrap()
            .remove("mq135");

        let mut engine = AlertEngine::default();
        let alerts = engine.evaluate_completeness(&payload);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].category, AlertCategory::IncompleteData);
        assert_eq!(alerts[0].location, "Aula 101");
        assert_eq!(
            alerts[0].additional_data["missing_sensors"],
            json!(["MQ135 (calidad aire)"])
        );

        assert!(engine.evaluate_completeness(&payload).is_empty());
    }

    #[test]
    fn test_partial_blocks_and_different_sets() {
        // ---
        let payload = json!({"sensor_data": {
            "metadata": {"location": "Lab"},
            "readings": {"scd30": {"co2": 500}, "mq135": {}}
        }});
        assert_eq!(
            missing_sensors(&payload),
            vec!["SCD30 datos incompletos", "BME280 (meteorologico)"]
        );

        let mut engine = AlertEngine::default();
        assert_eq!(engine.evaluate_completeness(&payload).len(), 1);

        // A different missing set from the same location is a new key
        let other = json!({"sensor_data": {"metadata": {"location": "Lab"}, "readings": {}}});
        let alerts = engine.evaluate_completeness(&other);
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts[0].additional_data["missing_sensors"],
            json!(["SCD30 (CO2)", "BME280 (meteorologico)", "MQ135 (calidad aire)"])
        );
    }

    #[test]
    fn test_numeric_location_matches_reading_location() {
        // ---
        let payload = json!({"sensor_data": {"metadata": {"location": 101}, "readings": {}}});
        let mut engine = AlertEngine::default();
        let alerts = engine.evaluate_completeness(&payload);
        assert_eq!(alerts[0].location, "101");

        let payload = json!({"sensor_data": {"metadata": {"location": ["Aula"]}, "readings": {}}});
        let alerts = engine.evaluate_completeness(&payload);
        assert_eq!(alerts[0].location, UNKNOWN_LOCATION);
    }
}

//! Alert vocabulary shared by the engine, recorder and reports.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(anyhow::anyhow!("Unknown alert severity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertCategory {
    AirQuality,
    SensorFailure,
    IncompleteData,
    ModelError,
    System,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            AlertCategory::AirQuality => "AIR_QUALITY",
            AlertCategory::SensorFailure => "SENSOR_FAILURE",
            AlertCategory::IncompleteData => "INCOMPLETE_DATA",
            AlertCategory::ModelError => "MODEL_ERROR",
            AlertCategory::System => "SYSTEM",
        }
    }

    /// Minimum time before the same alert key may fire again.
    pub fn min_interval(&self) -> Duration {
        // ---
        let secs = match self {
            AlertCategory::AirQuality => 300,
            AlertCategory::SensorFailure => 600,
            AlertCategory::IncompleteData => 300,
            AlertCategory::ModelError => 300,
            AlertCategory::System => 60,
        };
        Duration::seconds(secs)
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raised alert. `id` is set once it has been stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    // ---
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: AlertCategory,
    pub location: String,
    pub message: String,
    pub additional_data: Map<String, Value>,
}

impl Alert {
    // ---
    pub fn new(
        severity: Severity,
        category: AlertCategory,
        location: &str,
        message: String,
        additional_data: Map<String, Value>,
    ) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            severity,
            category,
            location: location.to_string(),
            message,
            additional_data,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Alerts raised while processing one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub critical: usize,
    pub alerts: Vec<Alert>,
}

impl AlertSummary {
    pub fn from_alerts(alerts: Vec<Alert>) -> Self {
        // ---
        Self {
            total: alerts.len(),
            critical: alerts.iter().filter(|a| a.is_critical()).count(),
            alerts,
        }
    }

    pub fn warnings(&self) -> usize {
        self.total - self.critical
    }
}

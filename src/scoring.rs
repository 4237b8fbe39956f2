//! Scoring boundary.
//!
//! The pipeline only needs a value in `[0, 1]` and a feature-importance map
//! from whatever model sits behind [`Scorer`]. How that number is produced is
//! not its concern.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PipelineError;

// ---

/// Feature names in the order the model consumes them.
pub const FEATURE_NAMES: [&str; 6] = [
    "co2",
    "temperature",
    "humidity",
    "pressure",
    "hour_of_day",
    "day_of_week",
];

/// Input to a scoring model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub hour_of_day: f64,
    pub day_of_week: f64,
}

impl FeatureVector {
    // ---
    fn values(&self) -> [(&'static str, f64); 6] {
        [
            (FEATURE_NAMES[0], self.co2),
            (FEATURE_NAMES[1], self.temperature),
            (FEATURE_NAMES[2], self.humidity),
            (FEATURE_NAMES[3], self.pressure),
            (FEATURE_NAMES[4], self.hour_of_day),
            (FEATURE_NAMES[5], self.day_of_week),
        ]
    }
}

/// Output of a scoring model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    /// Prediction in `[0, 1]`.
    pub value: f64,
    /// Per-feature weights. Read only; the pipeline never checks the sum.
    pub importances: BTreeMap<String, f64>,
}

/// An opaque predictor over a [`FeatureVector`].
///
/// Any error aborts processing of the current file.
pub trait Scorer {
    fn score(&self, features: &FeatureVector) -> anyhow::Result<Score>;
}

/// Deterministic closed-form scorer.
///
/// Reproduces the target the statistical model is trained against: CO2
/// dominates, with penalties for distance from 25 degC and 60 % relative
/// humidity. The raw value is normalised over the range seen in the
/// synthetic training set.
#[derive(Debug, Clone, Default)]
pub struct BaselineScorer;

const RAW_MIN: f64 = 1.176;
const RAW_MAX: f64 = 42.0;

/// Fixed importances; they sum to 1.0.
const IMPORTANCES: [(&str, f64); 6] = [
    ("co2", 0.62),
    ("temperature", 0.07),
    ("humidity", 0.05),
    ("pressure", 0.03),
    ("hour_of_day", 0.14),
    ("day_of_week", 0.09),
];

impl Scorer for BaselineScorer {
    fn score(&self, features: &FeatureVector) -> anyhow::Result<Score> {
        // ---
        if let Some((name, _)) = features.values().iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::InvalidFeature(name).into());
        }

        let raw = (features.co2 * 0.6
            + (features.temperature - 25.0).abs() * 10.0
            + (features.humidity - 60.0).abs() * 2.0)
            / 100.0;
        let value = ((raw - RAW_MIN) / (RAW_MAX - RAW_MIN)).clamp(0.0, 1.0);

        let importances = IMPORTANCES
            .iter()
            .map(|(name, weight)| (name.to_string(), *weight))
            .collect();

        Ok(Score { value, importances })
    }
}

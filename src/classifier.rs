//! CO2-based air-quality classification.
//!
//! Category authority belongs to the fixed CO2 bins in this module. The
//! scoring model's output is stored alongside the category but never
//! overrides it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---

/// Ordinal air-quality category, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AirQuality {
    Excellent,
    Good,
    Moderate,
    Poor,
    VeryPoor,
    Dangerous,
}

impl AirQuality {
    /// Every category in ascending severity.
    pub const ALL: [AirQuality; 6] = [
        AirQuality::Excellent,
        AirQuality::Good,
        AirQuality::Moderate,
        AirQuality::Poor,
        AirQuality::VeryPoor,
        AirQuality::Dangerous,
    ];

    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            AirQuality::Excellent => "Excellent",
            AirQuality::Good => "Good",
            AirQuality::Moderate => "Moderate",
            AirQuality::Poor => "Poor",
            AirQuality::VeryPoor => "VeryPoor",
            AirQuality::Dangerous => "Dangerous",
        }
    }

    /// Coarser CO2 descriptor stored next to the category.
    pub fn band_label(&self) -> &'static str {
        // ---
        match self {
            AirQuality::Excellent => "Muy bueno",
            AirQuality::Good => "Aceptable",
            AirQuality::Moderate => "Ligeramente elevado",
            AirQuality::Poor => "Elevado",
            AirQuality::VeryPoor => "Muy elevado",
            AirQuality::Dangerous => "Critico",
        }
    }

    /// Operator guidance for this category.
    pub fn recommendation(&self) -> &'static str {
        // ---
        match self {
            AirQuality::Excellent => "Optimal conditions. Keep normal ventilation.",
            AirQuality::Good => "Acceptable conditions. Check emission sources.",
            AirQuality::Moderate => "Increase ventilation. Consider reducing intense activity.",
            AirQuality::Poor => "Forced ventilation recommended. Monitor continuously.",
            AirQuality::VeryPoor => "ALERT: Dangerous conditions. Limit activity.",
            AirQuality::Dangerous => "CRITICAL ALERT: Avoid exposure. Activate emergency systems.",
        }
    }
}

impl fmt::Display for AirQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AirQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        AirQuality::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown air quality category: {}", s))
    }
}

/// Map a CO2 concentration (ppm) to its category and band label.
///
/// Bins are right-open: a value equal to a boundary belongs to the more
/// severe bin.
pub fn classify(co2_ppm: f64) -> (AirQuality, &'static str) {
    // ---
    let category = if co2_ppm < 450.0 {
        AirQuality::Excellent
    } else if co2_ppm < 600.0 {
        AirQuality::Good
    } else if co2_ppm < 800.0 {
        AirQuality::Moderate
    } else if co2_ppm < 1000.0 {
        AirQuality::Poor
    } else if co2_ppm < 1200.0 {
        AirQuality::VeryPoor
    } else {
        AirQuality::Dangerous
    };

    (category, category.band_label())
}

/// Recommendation text for a category.
pub fn recommendation(category: AirQuality) -> &'static str {
    category.recommendation()
}

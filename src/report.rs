//! Batch run report and database summary.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::alerts::PendingCounts;
use crate::pipeline::ResponseRecord;
use crate::store::{self, QualitySummaryRow, TableCount};

// ---

const DETAIL_LIMIT: usize = 10;

/// Write `value` as pretty JSON to `dir/{prefix}_YYYYMMDD_HHMMSS.json`.
pub fn write_json_report<T: Serialize>(
    dir: &Path,
    prefix: &str,
    now: DateTime<Utc>,
    value: &T,
) -> Result<PathBuf> {
    // ---
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports dir {}", dir.display()))?;

    let path = dir.join(format!("{}_{}.json", prefix, now.format("%Y%m%d_%H%M%S")));
    let text = serde_json::to_string_pretty(value)?;
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

/// Mean, minimum and maximum of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    /// `None` for an empty series.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        // ---
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }

        (count > 0).then(|| Stats {
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationStats {
    pub samples: usize,
    pub co2: Option<Stats>,
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileCounts {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertCounts {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
}

/// Short per-file line in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ResultDetail {
    pub file_name: String,
    pub location: String,
    pub category: String,
    pub co2_ppm: f64,
    pub prediction: f64,
    pub alerts: usize,
}

/// Aggregate view of one `process_all` run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    // ---
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files: FileCounts,
    pub quality_distribution: BTreeMap<String, usize>,
    pub locations: BTreeMap<String, LocationStats>,
    pub co2: Option<Stats>,
    pub temperature_mean: Option<f64>,
    pub humidity_mean: Option<f64>,
    pub prediction: Option<Stats>,
    pub feature_importance: BTreeMap<String, f64>,
    pub alerts: AlertCounts,
    pub pending_alerts: Option<PendingCounts>,
    pub results: Vec<ResultDetail>,
}

impl BatchReport {
    pub fn build(
        records: &[ResponseRecord],
        files: FileCounts,
        pending_alerts: Option<PendingCounts>,
        now: DateTime<Utc>,
    ) -> Self {
        // ---
        let mut quality_distribution = BTreeMap::new();
        let mut by_location: BTreeMap<String, Vec<&ResponseRecord>> = BTreeMap::new();
        let mut importance_sums: BTreeMap<String, f64> = BTreeMap::new();
        let mut alerts = AlertCounts::default();

        for r in records {
            *quality_distribution
                .entry(r.category.as_str().to_string())
                .or_insert(0) += 1;
            by_location.entry(r.location.clone()).or_default().push(r);
            for (name, weight) in &r.importances {
                *importance_sums.entry(name.clone()).or_insert(0.0) += weight;
            }
            alerts.total += r.alerts.total;
            alerts.critical += r.alerts.critical;
            alerts.warning += r.alerts.warnings();
        }

        let locations = by_location
            .into_iter()
            .map(|(location, rs)| {
                let mut categories = BTreeMap::new();
                for r in &rs {
                    *categories.entry(r.category.as_str().to_string()).or_insert(0) += 1;
                }
                let stats = LocationStats {
                    samples: rs.len(),
                    co2: Stats::from_values(rs.iter().map(|r| r.co2_ppm)),
                    categories,
                };
                (location, stats)
            })
            .collect();

        let n = records.len() as f64;
        let feature_importance = importance_sums
            .into_iter()
            .map(|(name, sum)| (name, sum / n))
            .collect();

        let results = records
            .iter()
            .take(DETAIL_LIMIT)
            .map(|r| ResultDetail {
                file_name: r.file_name.clone(),
                location: r.location.clone(),
                category: r.category.as_str().to_string(),
                co2_ppm: r.co2_ppm,
                prediction: r.prediction,
                alerts: r.alerts.total,
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            generated_at: now,
            files,
            quality_distribution,
            locations,
            co2: Stats::from_values(records.iter().map(|r| r.co2_ppm)),
            temperature_mean: Stats::from_values(records.iter().map(|r| r.temperature))
                .map(|s| s.mean),
            humidity_mean: Stats::from_values(records.iter().map(|r| r.humidity)).map(|s| s.mean),
            prediction: Stats::from_values(records.iter().map(|r| r.prediction)),
            feature_importance,
            alerts,
            pending_alerts,
            results,
        }
    }
}

/// Schema version, row counts and per-category averages.
#[derive(Debug, Clone, Serialize)]
pub struct DbSummary {
    pub schema_version: i64,
    pub tables: Vec<TableCount>,
    pub quality: Vec<QualitySummaryRow>,
}

pub async fn db_summary(pool: &SqlitePool) -> Result<DbSummary> {
    // ---
    Ok(DbSummary {
        schema_version: store::schema_version(pool).await?,
        tables: store::table_counts(pool).await?,
        quality: store::quality_summary(pool).await?,
    })
}

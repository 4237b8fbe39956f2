//! Alert activity report over a trailing window.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::report::write_json_report;
use crate::store::{self, AlertBreakdownRow};

// ---

const RECENT_LIMIT: u32 = 10;
const MESSAGE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertTotals {
    pub total: i64,
    pub critical: i64,
    pub warning: i64,
    pub info: i64,
    pub processed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentAlert {
    pub id: i64,
    pub timestamp: String,
    pub severity: String,
    pub category: String,
    pub location: Option<String>,
    pub message: String,
    pub processed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertReport {
    // ---
    pub generated_at: DateTime<Utc>,
    pub period_hours: u32,
    pub totals: AlertTotals,
    pub breakdown: Vec<AlertBreakdownRow>,
    pub recent: Vec<RecentAlert>,
}

/// Build the report for the last `hours` and write it under `reports_dir`.
pub async fn alert_report(
    pool: &SqlitePool,
    hours: u32,
    reports_dir: &Path,
    now: DateTime<Utc>,
) -> Result<(AlertReport, PathBuf)> {
    // ---
    let since = Duration::try_hours(i64::from(hours))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| anyhow!("Report window of {} hours is out of range", hours))?;

    let breakdown = store::alert_breakdown(pool, &since).await?;
    let recent = store::recent_alerts(pool, &since, RECENT_LIMIT)
        .await?
        .into_iter()
        .map(|row| RecentAlert {
            id: row.id,
            timestamp: row.timestamp,
            severity: row.severity,
            category: row.category,
            location: row.location,
            message: row.message.chars().take(MESSAGE_PREVIEW_CHARS).collect(),
            processed: row.processed,
        })
        .collect();

    let report = AlertReport {
        generated_at: now,
        period_hours: hours,
        totals: totals(&breakdown),
        breakdown,
        recent,
    };

    let path = write_json_report(reports_dir, "alert_report", now, &report)?;
    tracing::info!(path = %path.display(), total = report.totals.total, "Alert report written");

    Ok((report, path))
}

fn totals(breakdown: &[AlertBreakdownRow]) -> AlertTotals {
    // ---
    breakdown.iter().fold(AlertTotals::default(), |mut acc, row| {
        acc.total += row.total;
        acc.processed += row.processed;
        match row.severity.as_str() {
            "CRITICAL" => acc.critical += row.total,
            "WARNING" => acc.warning += row.total,
            _ => acc.info += row.total,
        }
        acc.pending = acc.total - acc.processed;
        acc
    })
}

//! `system_alerts` table access.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::fmt_ts;

// ---

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertRow {
    // ---
    pub id: i64,
    pub timestamp: String,
    pub severity: String,
    pub category: String,
    pub location: Option<String>,
    pub message: String,
    pub additional_data: Option<String>,
    pub processed: bool,
    pub processed_at: Option<String>,
}

/// Values for a new alert row; always stored unprocessed.
#[derive(Debug, Clone)]
pub struct NewAlert<'a> {
    // ---
    pub timestamp: DateTime<Utc>,
    pub severity: &'a str,
    pub category: &'a str,
    pub location: &'a str,
    pub message: &'a str,
    pub additional_data: String,
}

/// Optional filters for [`pending_alerts`].
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub severity: Option<String>,
    /// Substring match on location.
    pub location: Option<String>,
}

/// Alert counts grouped by severity, category and location.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AlertBreakdownRow {
    // ---
    pub severity: String,
    pub category: String,
    pub location: Option<String>,
    pub total: i64,
    pub processed: i64,
}

pub async fn insert_alert(pool: &SqlitePool, alert: &NewAlert<'_>) -> Result<i64> {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO system_alerts (
            timestamp, severity, category, location, message,
            additional_data, processed, processed_at
        ) VALUES (?, ?, ?, ?, ?, ?, 0, NULL)
        "#,
    )
    .bind(fmt_ts(&alert.timestamp))
    .bind(alert.severity)
    .bind(alert.category)
    .bind(alert.location)
    .bind(alert.message)
    .bind(&alert.additional_data)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_alert(pool: &SqlitePool, id: i64) -> Result<Option<AlertRow>> {
    // ---
    let row = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, timestamp, severity, category, location, message,
               additional_data, processed, processed_at
        FROM system_alerts
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Flag an alert processed and replace its additional data.
///
/// Returns `false` when no row matched `id`.
pub async fn mark_alert_processed(
    pool: &SqlitePool,
    id: i64,
    processed_at: &DateTime<Utc>,
    additional_data: &str,
) -> Result<bool> {
    // ---
    let result = sqlx::query(
        r#"
        UPDATE system_alerts
        SET processed = 1, processed_at = ?, additional_data = ?
        WHERE id = ?
        "#,
    )
    .bind(fmt_ts(processed_at))
    .bind(additional_data)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unprocessed alerts of `severity` raised at or before `cutoff`.
pub async fn count_stale_pending(
    pool: &SqlitePool,
    severity: &str,
    cutoff: &DateTime<Utc>,
) -> Result<i64> {
    // ---
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM system_alerts
        WHERE processed = 0 AND severity = ? AND timestamp <= ?
        "#,
    )
    .bind(severity)
    .bind(fmt_ts(cutoff))
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Unprocessed alerts, newest first.
pub async fn pending_alerts(
    pool: &SqlitePool,
    filter: &AlertFilter,
    limit: u32,
) -> Result<Vec<AlertRow>> {
    // ---
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT id, timestamp, severity, category, location, message,
               additional_data, processed, processed_at
        FROM system_alerts
        WHERE processed = 0
        "#,
    );

    if let Some(severity) = &filter.severity {
        qb.push(" AND severity = ").push_bind(severity.clone());
    }
    if let Some(location) = &filter.location {
        qb.push(" AND location LIKE ")
            .push_bind(format!("%{}%", location));
    }
    qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ")
        .push_bind(i64::from(limit));

    let rows = qb.build_query_as::<AlertRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Grouped counts since `since`, most severe first, then by volume.
pub async fn alert_breakdown(
    pool: &SqlitePool,
    since: &DateTime<Utc>,
) -> Result<Vec<AlertBreakdownRow>> {
    // ---
    let rows = sqlx::query_as::<_, AlertBreakdownRow>(
        r#"
        SELECT severity, category, location,
               COUNT(*) AS total,
               SUM(CASE WHEN processed = 1 THEN 1 ELSE 0 END) AS processed
        FROM system_alerts
        WHERE timestamp >= ?
        GROUP BY severity, category, location
        ORDER BY
            CASE severity
                WHEN 'CRITICAL' THEN 1
                WHEN 'WARNING'  THEN 2
                WHEN 'INFO'     THEN 3
                ELSE 4
            END,
            total DESC
        "#,
    )
    .bind(fmt_ts(since))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Most recent alerts since `since`.
pub async fn recent_alerts(
    pool: &SqlitePool,
    since: &DateTime<Utc>,
    limit: u32,
) -> Result<Vec<AlertRow>> {
    // ---
    let rows = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT id, timestamp, severity, category, location, message,
               additional_data, processed, processed_at
        FROM system_alerts
        WHERE timestamp >= ?
        ORDER BY timestamp DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(fmt_ts(since))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

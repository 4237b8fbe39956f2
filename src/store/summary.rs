//! Read-only aggregate queries over the stored analyses.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

// ---

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

/// Per-category counts and averages over all stored responses.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct QualitySummaryRow {
    // ---
    pub quality_category: String,
    pub total: i64,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
}

const TABLES: [&str; 4] = [
    "sensor_requests",
    "sensor_responses",
    "processed_files",
    "system_alerts",
];

/// Row count for each application table.
pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<TableCount>> {
    // ---
    let mut counts = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        // Table names come from the fixed list above, never from input
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;
        counts.push(TableCount { table, rows });
    }
    Ok(counts)
}

/// Responses grouped by category, ordered from best to worst air.
pub async fn quality_summary(pool: &SqlitePool) -> Result<Vec<QualitySummaryRow>> {
    // ---
    let rows = sqlx::query_as::<_, QualitySummaryRow>(
        r#"
        SELECT quality_category,
               COUNT(*)         AS total,
               AVG(temperature) AS avg_temperature,
               AVG(humidity)    AS avg_humidity
        FROM sensor_responses
        GROUP BY quality_category
        ORDER BY
            CASE quality_category
                WHEN 'Excellent' THEN 1
                WHEN 'Good'      THEN 2
                WHEN 'Moderate'  THEN 3
                WHEN 'Poor'      THEN 4
                WHEN 'VeryPoor'  THEN 5
                WHEN 'Dangerous' THEN 6
                ELSE 7
            END
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

//! Requests, responses and processed-file markers.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use super::fmt_ts;

// ---

/// Raw ingested reading.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RequestRow {
    // ---
    pub id: i64,
    pub timestamp: Option<String>,
    pub device_id: Option<String>,
    pub request_data: String,
    pub processed_at: Option<String>,
    pub archived: bool,
}

/// Stored analysis for one request.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ResponseRow {
    // ---
    pub id: i64,
    pub request_id: i64,
    pub quality_category: String,
    pub co2_band: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub feature_importance: String,
    pub prediction_detail: String,
    pub created_at: String,
}

/// Idempotency marker for one input file name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProcessedFileRow {
    // ---
    pub id: i64,
    pub file_name: String,
    pub processed_at: Option<String>,
    pub processed: bool,
    pub request_id: Option<i64>,
}

/// Values for a new `sensor_responses` row.
#[derive(Debug, Clone)]
pub struct NewResponse<'a> {
    // ---
    pub request_id: i64,
    pub quality_category: &'a str,
    pub co2_band: &'a str,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub feature_importance: String,
    pub prediction_detail: String,
    pub created_at: DateTime<Utc>,
}

/// Marker for `file_name` if it has been fully processed.
pub async fn find_processed_file(
    pool: &SqlitePool,
    file_name: &str,
) -> Result<Option<ProcessedFileRow>> {
    // ---
    let row = sqlx::query_as::<_, ProcessedFileRow>(
        r#"
        SELECT id, file_name, processed_at, processed, request_id
        FROM processed_files
        WHERE file_name = ? AND processed = 1
        "#,
    )
    .bind(file_name)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Store a raw payload with `processed_at = NULL`, returning its id.
pub async fn insert_request(
    pool: &SqlitePool,
    timestamp: &str,
    device_id: &str,
    request_data: &str,
) -> Result<i64> {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO sensor_requests (timestamp, device_id, request_data, processed_at, archived)
        VALUES (?, ?, ?, NULL, 0)
        "#,
    )
    .bind(timestamp)
    .bind(device_id)
    .bind(request_data)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_request(pool: &SqlitePool, id: i64) -> Result<Option<RequestRow>> {
    // ---
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
        SELECT id, timestamp, device_id, request_data, processed_at, archived
        FROM sensor_requests
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Set `processed_at` and the archived flag once the pipeline succeeded.
pub async fn mark_request_processed(
    pool: &SqlitePool,
    id: i64,
    processed_at: &DateTime<Utc>,
) -> Result<()> {
    // ---
    sqlx::query(
        r#"
        UPDATE sensor_requests
        SET processed_at = ?, archived = 1
        WHERE id = ?
        "#,
    )
    .bind(fmt_ts(processed_at))
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert the analysis row.
///
/// Returns the raw `sqlx::Error` so the pipeline can classify the failure.
pub async fn insert_response(
    pool: &SqlitePool,
    response: &NewResponse<'_>,
) -> std::result::Result<i64, sqlx::Error> {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO sensor_responses (
            request_id, quality_category, co2_band,
            temperature, humidity, pressure,
            feature_importance, prediction_detail, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(response.request_id)
    .bind(response.quality_category)
    .bind(response.co2_band)
    .bind(response.temperature)
    .bind(response.humidity)
    .bind(response.pressure)
    .bind(&response.feature_importance)
    .bind(&response.prediction_detail)
    .bind(fmt_ts(&response.created_at))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_response_for_request(
    pool: &SqlitePool,
    request_id: i64,
) -> Result<Option<ResponseRow>> {
    // ---
    let row = sqlx::query_as::<_, ResponseRow>(
        r#"
        SELECT id, request_id, quality_category, co2_band,
               temperature, humidity, pressure,
               feature_importance, prediction_detail, created_at
        FROM sensor_responses
        WHERE request_id = ?
        "#,
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Record `file_name` as processed, replacing any earlier marker.
pub async fn upsert_processed_file(
    pool: &SqlitePool,
    file_name: &str,
    request_id: i64,
    processed_at: &DateTime<Utc>,
) -> Result<()> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO processed_files (file_name, processed_at, processed, request_id)
        VALUES (?, ?, 1, ?)
        ON CONFLICT (file_name) DO UPDATE SET
            processed_at = excluded.processed_at,
            processed    = 1,
            request_id   = excluded.request_id
        "#,
    )
    .bind(file_name)
    .bind(fmt_ts(processed_at))
    .bind(request_id)
    .execute(pool)
    .await?;

    Ok(())
}

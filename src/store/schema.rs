//! Database schema management.
//!
//! The schema is owned by this crate and versioned explicitly. `migrate` is
//! applied once on startup; it is idempotent and refuses to touch a database
//! written by a newer build.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::error::PipelineError;

// ---

/// Schema version this build writes.
pub const SCHEMA_VERSION: i64 = 1;

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// Version 1 creates the four tables (`sensor_requests`, `sensor_responses`,
/// `processed_files`, `system_alerts`) and the alert indexes. All steps for a
/// version run inside one transaction together with the version bump.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // ---
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    let current = schema_version(pool).await?;

    if current > SCHEMA_VERSION {
        return Err(PipelineError::SchemaTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        }
        .into());
    }
    if current == SCHEMA_VERSION {
        tracing::debug!("Schema already at version {}", current);
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    if current < 1 {
        // Raw payloads, one row per ingested file
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_requests (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp    TEXT,
                device_id    TEXT,
                request_data TEXT    NOT NULL,
                processed_at TEXT,
                archived     INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        // Derived analysis, 1:1 with a request
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_responses (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id         INTEGER NOT NULL REFERENCES sensor_requests(id),
                quality_category   TEXT    NOT NULL,
                co2_band           TEXT    NOT NULL,
                temperature        REAL    NOT NULL,
                humidity           REAL    NOT NULL,
                pressure           REAL    NOT NULL,
                feature_importance TEXT    NOT NULL,
                prediction_detail  TEXT    NOT NULL,
                created_at         TEXT    NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        // Idempotency markers
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_files (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name    TEXT    NOT NULL UNIQUE,
                processed_at TEXT,
                processed    INTEGER NOT NULL DEFAULT 1,
                request_id   INTEGER REFERENCES sensor_requests(id)
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_alerts (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp       TEXT    NOT NULL,
                severity        TEXT    NOT NULL,
                category        TEXT    NOT NULL,
                location        TEXT,
                message         TEXT    NOT NULL,
                additional_data TEXT,
                processed       INTEGER NOT NULL DEFAULT 0,
                processed_at    TEXT
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON system_alerts (timestamp);",
            "CREATE INDEX IF NOT EXISTS idx_alerts_processed ON system_alerts (processed);",
            "CREATE INDEX IF NOT EXISTS idx_alerts_severity ON system_alerts (severity);",
            "CREATE INDEX IF NOT EXISTS idx_responses_request ON sensor_responses (request_id);",
        ] {
            sqlx::query(ddl).execute(&mut *tx).await?;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO schema_version (id, version) VALUES (1, ?)
        ON CONFLICT (id) DO UPDATE SET version = excluded.version
        "#,
    )
    .bind(SCHEMA_VERSION)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Database schema migrated from version {} to {}",
        current,
        SCHEMA_VERSION
    );
    Ok(())
}

/// Currently applied schema version, 0 for a fresh database.
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    // ---
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

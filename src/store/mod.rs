//! SQLite persistence gateway.
//!
//! Callers reach the database only through the functions re-exported here
//! (EMBP: sibling modules stay private). Every statement runs on its own and
//! commits independently; nothing spans more than one logical step.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

mod alerts;
mod readings;
mod schema;
mod summary;

pub use alerts::{
    alert_breakdown, count_stale_pending, get_alert, insert_alert, mark_alert_processed,
    pending_alerts, recent_alerts, AlertBreakdownRow, AlertFilter, AlertRow, NewAlert,
};
pub use readings::{
    find_processed_file, get_request, get_response_for_request, insert_request, insert_response,
    mark_request_processed, upsert_processed_file, NewResponse, ProcessedFileRow, RequestRow,
    ResponseRow,
};
pub use schema::{migrate, schema_version, SCHEMA_VERSION};
pub use summary::{quality_summary, table_counts, QualitySummaryRow, TableCount};

// ---

/// Open (creating if needed) the SQLite file behind `db_url`.
///
/// The parent directory of the database file is created first so a fresh
/// checkout can run without any bootstrap step.
pub async fn connect(db_url: &str, max_connections: u32) -> Result<SqlitePool> {
    // ---
    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("Invalid database URL '{}'", db_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_url))
}

/// Fixed-width UTC timestamp text, so stored values sort lexically.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_timestamps_sort_lexically() {
        // ---
        let a = Utc.with_ymd_and_hms(2025, 12, 1, 9, 0, 0).unwrap();
        let b = a + Duration::milliseconds(1);
        let c = a + Duration::hours(3);

        let (ta, tb, tc) = (fmt_ts(&a), fmt_ts(&b), fmt_ts(&c));
        assert_eq!(ta.len(), tb.len());
        assert!(ta < tb && tb < tc);
        assert_eq!(DateTime::parse_from_rfc3339(&tb).unwrap(), b);
    }
}

//! Alert persistence and operator-facing alert operations.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;

use crate::error::PipelineError;
use crate::store::{self, AlertFilter, AlertRow, NewAlert};

use super::engine::AlertEngine;
use super::journal::AlertJournal;
use super::types::{Alert, AlertCategory, Severity};

// ---

/// Marker stored in `additional_data.processed_by` for auto-handled alerts.
pub const PROCESSED_BY: &str = "ingestion_pipeline";

pub const SYSTEM_LOCATION: &str = "System";

const CRITICAL_STALE_HOURS: i64 = 1;
const WARNING_STALE_HOURS: i64 = 4;

/// Result of [`AlertRecorder::sweep_stale_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub critical: i64,
    pub warning: i64,
}

/// Writes alerts to the database and the journal files.
#[derive(Debug, Clone)]
pub struct AlertRecorder {
    pool: SqlitePool,
    journal: AlertJournal,
}

impl AlertRecorder {
    // ---
    pub fn new(pool: SqlitePool, journal: AlertJournal) -> Self {
        Self { pool, journal }
    }

    /// Store `alert` unprocessed, journal it and emit a tracing event.
    ///
    /// Sets `alert.id`. Journal failures are logged and do not fail the call.
    pub async fn record(&self, alert: &mut Alert) -> Result<i64> {
        // ---
        let additional_data = Value::Object(alert.additional_data.clone()).to_string();
        let id = store::insert_alert(
            &self.pool,
            &NewAlert {
                timestamp: alert.timestamp,
                severity: alert.severity.as_str(),
                category: alert.category.as_str(),
                location: &alert.location,
                message: &alert.message,
                additional_data,
            },
        )
        .await
        .context("Failed to store alert")?;
        alert.id = Some(id);

        if let Err(e) = self.journal.append(alert) {
            tracing::warn!(alert_id = id, "Alert journal write failed: {:#}", e);
        }

        match alert.severity {
            Severity::Critical => tracing::error!(
                alert_id = id, category = %alert.category, location = %alert.location,
                "{}", alert.message
            ),
            Severity::Warning => tracing::warn!(
                alert_id = id, category = %alert.category, location = %alert.location,
                "{}", alert.message
            ),
            Severity::Info => tracing::info!(
                alert_id = id, category = %alert.category, location = %alert.location,
                "{}", alert.message
            ),
        }

        Ok(id)
    }

    /// Store `alert` and immediately mark it handled by the pipeline.
    pub async fn record_processed(&self, alert: &mut Alert) -> Result<i64> {
        // ---
        let id = self.record(alert).await?;

        let now = Utc::now();
        alert
            .additional_data
            .insert("processed_at".into(), json!(store::fmt_ts(&now)));
        alert
            .additional_data
            .insert("processed_by".into(), json!(PROCESSED_BY));

        let data = Value::Object(alert.additional_data.clone()).to_string();
        store::mark_alert_processed(&self.pool, id, &now, &data)
            .await
            .with_context(|| format!("Failed to mark alert {} processed", id))?;

        Ok(id)
    }

    /// Count stale unprocessed alerts and raise one SYSTEM meta-alert.
    ///
    /// CRITICAL alerts are stale after 1 hour, WARNING after 4. A critical
    /// backlog takes precedence; the warning meta-alert is only raised when
    /// nothing critical is pending. Meta-alerts stay unprocessed.
    pub async fn sweep_stale_pending(
        &self,
        engine: &mut AlertEngine,
        now: DateTime<Utc>,
    ) -> Result<PendingCounts> {
        // ---
        let critical = store::count_stale_pending(
            &self.pool,
            Severity::Critical.as_str(),
            &(now - Duration::hours(CRITICAL_STALE_HOURS)),
        )
        .await?;
        let warning = store::count_stale_pending(
            &self.pool,
            Severity::Warning.as_str(),
            &(now - Duration::hours(WARNING_STALE_HOURS)),
        )
        .await?;

        let counts = PendingCounts { critical, warning };

        let meta = if critical > 0 {
            Some((
                Severity::Critical,
                "pending_critical",
                format!("{} critical alerts pending for more than 1 hour", critical),
                critical,
            ))
        } else if warning > 0 {
            Some((
                Severity::Warning,
                "pending_warning",
                format!("{} warning alerts pending for more than 4 hours", warning),
                warning,
            ))
        } else {
            None
        };

        if let Some((severity, key, message, count)) = meta {
            let due = engine.dedup_mut().should_raise_at(
                AlertCategory::System,
                Some(key),
                SYSTEM_LOCATION,
                now,
            );
            if due {
                let mut data = Map::new();
                data.insert("pending_count".into(), json!(count));
                data.insert(
                    "recommendation".into(),
                    json!("Review and acknowledge pending alerts"),
                );

                let mut alert =
                    Alert::new(severity, AlertCategory::System, SYSTEM_LOCATION, message, data);
                alert.timestamp = now;
                self.record(&mut alert).await?;
            }
        }

        tracing::debug!(critical, warning, "Stale alert sweep finished");
        Ok(counts)
    }

    /// Operator acknowledgement of one alert.
    pub async fn acknowledge(&self, alert_id: i64, comment: &str) -> Result<AlertRow> {
        // ---
        let row = store::get_alert(&self.pool, alert_id)
            .await?
            .ok_or(PipelineError::AlertNotFound(alert_id))?;

        let mut data = row
            .additional_data
            .as_deref()
            .and_then(|text| serde_json::from_str::<Map<String, Value>>(text).ok())
            .unwrap_or_default();

        let now = Utc::now();
        data.insert("ack_comment".into(), json!(comment));
        data.insert("ack_at".into(), json!(store::fmt_ts(&now)));

        let text = Value::Object(data).to_string();
        if !store::mark_alert_processed(&self.pool, alert_id, &now, &text).await? {
            return Err(PipelineError::AlertNotFound(alert_id).into());
        }

        tracing::info!(alert_id, "Alert acknowledged");

        store::get_alert(&self.pool, alert_id)
            .await?
            .ok_or_else(|| PipelineError::AlertNotFound(alert_id).into())
    }

    /// Unprocessed alerts, newest first.
    pub async fn pending(&self, filter: &AlertFilter, limit: u32) -> Result<Vec<AlertRow>> {
        store::pending_alerts(&self.pool, filter, limit).await
    }
}

//! Single-file processing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde_json::{json, Value};

use crate::alerts::AlertSummary;
use crate::classifier::{classify, recommendation, AirQuality};
use crate::error::PipelineError;
use crate::models::{RawSensorPayload, ReadingLevels, SensorReading};
use crate::scoring::FEATURE_NAMES;
use crate::store::{self, NewResponse};

use super::{FileOutcome, Pipeline, ResponseRecord};

// ---

pub const ERROR_LOG_FILE: &str = "processing_errors.log";

impl Pipeline {
    /// Process one payload file end to end.
    ///
    /// The processed-file marker is written only after the response row is
    /// committed, so any failure leaves the file eligible for the next run.
    /// Failures are appended to `processing_errors.log` before returning.
    #[tracing::instrument(level = "debug", skip(self), fields(file = %path.display()))]
    pub async fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        // ---
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?
            .to_string();

        if let Some(marker) = store::find_processed_file(&self.pool, &file_name).await? {
            tracing::info!(
                file = %file_name,
                request_id = ?marker.request_id,
                "Already processed, skipping"
            );
            return Ok(FileOutcome::Skipped);
        }

        match self.ingest(path, &file_name).await {
            Ok(record) => {
                tracing::info!(
                    file = %file_name,
                    request_id = record.request_id,
                    category = %record.category,
                    co2_ppm = record.co2_ppm,
                    alerts = record.alerts.total,
                    "File processed"
                );
                Ok(FileOutcome::Processed(Box::new(record)))
            }
            Err(e) => {
                tracing::error!(file = %file_name, "Processing failed: {:#}", e);
                self.log_failure(&file_name, &e);
                Err(e)
            }
        }
    }

    async fn ingest(&mut self, path: &Path, file_name: &str) -> Result<ResponseRecord> {
        // ---
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw: Value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in {}", file_name))?;
        let payload: RawSensorPayload = serde_json::from_value(raw.clone())
            .with_context(|| format!("Unexpected payload shape in {}", file_name))?;
        let reading = payload.to_reading();

        let request_id =
            store::insert_request(&self.pool, &reading.timestamp, &reading.device_id, &raw.to_string())
                .await
                .context("Failed to store request")?;

        let features = reading.features();
        let score = self
            .scorer
            .score(&features)
            .map_err(|e| PipelineError::Scoring {
                request_id,
                reason: format!("{:#}", e),
            })?;

        let (category, band) = classify(reading.co2);
        let levels = reading.levels();
        let alerts = self.raise_alerts(&reading, &levels, category, &raw).await?;
        let advice = recommendation(category);

        let detail = json!({
            "score": score.value,
            "co2_ppm": reading.co2,
            "recommendation": advice,
            "location": reading.location,
            "features_used": FEATURE_NAMES,
            "alert_summary": {
                "total": alerts.total,
                "critical": alerts.critical,
                "alerts": alerts.alerts,
            },
        });

        let analyzed_at = Utc::now();
        store::insert_response(
            &self.pool,
            &NewResponse {
                request_id,
                quality_category: category.as_str(),
                co2_band: band,
                temperature: reading.temperature_scd,
                humidity: reading.humidity_scd,
                pressure: reading.pressure,
                feature_importance: serde_json::to_string(&score.importances)?,
                prediction_detail: detail.to_string(),
                created_at: analyzed_at,
            },
        )
        .await
        .map_err(|source| PipelineError::ResponseInsert { request_id, source })?;

        store::mark_request_processed(&self.pool, request_id, &analyzed_at).await?;
        store::upsert_processed_file(&self.pool, file_name, request_id, &analyzed_at).await?;

        let target = self.cfg.archive_dir.join(file_name);
        if let Err(e) = move_file(path, &target) {
            tracing::error!(file = %file_name, "Archiving failed: {:#}", e);
        }

        Ok(ResponseRecord {
            request_id,
            file_name: file_name.to_string(),
            device_id: reading.device_id,
            location: reading.location,
            timestamp: reading.timestamp,
            category,
            band: band.to_string(),
            co2_ppm: reading.co2,
            temperature: reading.temperature_scd,
            humidity: reading.humidity_scd,
            pressure: reading.pressure,
            features,
            prediction: score.value,
            importances: score.importances,
            recommendation: advice,
            alerts,
            analyzed_at,
        })
    }

    /// Run every evaluator and store what fires, marked processed.
    async fn raise_alerts(
        &mut self,
        reading: &SensorReading,
        levels: &ReadingLevels,
        category: AirQuality,
        raw: &Value,
    ) -> Result<AlertSummary> {
        // ---
        let Some(engine) = self.alerts.as_mut() else {
            return Ok(AlertSummary::default());
        };

        let mut raised = engine.evaluate_reading(levels, &reading.location);
        raised.extend(engine.evaluate_completeness(raw));
        raised.extend(engine.evaluate_dangerous_category(category, levels, &reading.location));

        for alert in raised.iter_mut() {
            self.recorder.record_processed(alert).await?;
        }

        let summary = AlertSummary::from_alerts(raised);
        if summary.critical > 0 {
            tracing::warn!(
                location = %reading.location,
                critical = summary.critical,
                "Critical alerts raised"
            );
        }
        Ok(summary)
    }

    fn log_failure(&self, file_name: &str, err: &anyhow::Error) {
        // ---
        let result = fs::create_dir_all(&self.cfg.logs_dir).and_then(|_| {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.cfg.logs_dir.join(ERROR_LOG_FILE))?;
            writeln!(
                file,
                "{} - {}: {:#}",
                Utc::now().format("%Y-%m-%d %H:%M:%S"),
                file_name,
                err
            )
        });

        if let Err(e) = result {
            tracing::warn!("Could not write {}: {}", ERROR_LOG_FILE, e);
        }
    }
}

/// Move `from` to `to`, creating the target directory.
///
/// Falls back to copy + remove when a rename is not possible, e.g. across
/// filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    // ---
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if let Err(rename_err) = fs::rename(from, to) {
        tracing::debug!("Rename failed ({}), copying instead", rename_err);
        fs::copy(from, to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        fs::remove_file(from)
            .with_context(|| format!("Failed to remove {}", from.display()))?;
    }
    Ok(())
}

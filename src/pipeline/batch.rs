//! Directory-level driver.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::report::{write_json_report, BatchReport, FileCounts};

use super::{BatchSummary, FailedFile, FileOutcome, Pipeline};

// ---

/// `*.json` files directly under `dir`, sorted by file name.
///
/// A missing directory is created and yields an empty list.
pub fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    // ---
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create input dir {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(files)
}

impl Pipeline {
    /// Process every pending file in the input directory.
    ///
    /// Per-file failures are collected, never propagated. Afterwards the
    /// stale-alert sweep runs and, if anything was processed, a batch report
    /// is written.
    pub async fn process_all(&mut self) -> Result<BatchSummary> {
        // ---
        let files = list_input_files(&self.cfg.input_dir)?;
        tracing::info!(
            count = files.len(),
            dir = %self.cfg.input_dir.display(),
            "Starting batch"
        );

        let mut summary = BatchSummary::default();

        for path in files {
            match self.process_file(&path).await {
                Ok(FileOutcome::Processed(record)) => summary.records.push(*record),
                Ok(FileOutcome::Skipped) => summary.skipped += 1,
                Err(e) => summary.failed.push(FailedFile {
                    file: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    reason: format!("{:#}", e),
                }),
            }
        }
        summary.processed = summary.records.len();

        if let Some(engine) = self.alerts.as_mut() {
            match self.recorder.sweep_stale_pending(engine, Utc::now()).await {
                Ok(counts) => summary.pending = Some(counts),
                Err(e) => tracing::warn!("Stale alert sweep failed: {:#}", e),
            }
        }

        if summary.processed > 0 {
            let now = Utc::now();
            let files = FileCounts {
                processed: summary.processed,
                skipped: summary.skipped,
                failed: summary.failed.len(),
            };
            let report = BatchReport::build(&summary.records, files, summary.pending, now);
            summary.report_path =
                Some(write_json_report(&self.cfg.reports_dir, "report", now, &report)?);
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Batch finished"
        );

        Ok(summary)
    }
}

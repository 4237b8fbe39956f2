//! Ingestion pipeline gateway (EMBP).
//!
//! `ingest` takes one file through classification, scoring, alerting and
//! persistence; `batch` drives a whole input directory. Both are `impl`
//! blocks on [`Pipeline`], which owns the pool, the scorer and the alert
//! engine for the lifetime of a run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::alerts::{AlertEngine, AlertJournal, AlertRecorder, AlertSummary, PendingCounts, Thresholds};
use crate::classifier::AirQuality;
use crate::config::Config;
use crate::scoring::{BaselineScorer, FeatureVector, Scorer};

mod batch;
mod ingest;

pub use batch::list_input_files;
pub use ingest::{move_file, ERROR_LOG_FILE};

// ---

/// Everything produced for one successfully processed file.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    // ---
    pub request_id: i64,
    pub file_name: String,
    pub device_id: String,
    pub location: String,
    pub timestamp: String,
    pub category: AirQuality,
    pub band: String,
    pub co2_ppm: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub features: FeatureVector,
    pub prediction: f64,
    pub importances: BTreeMap<String, f64>,
    pub recommendation: &'static str,
    pub alerts: AlertSummary,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum FileOutcome {
    Processed(Box<ResponseRecord>),
    /// Already marked processed by an earlier run.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub reason: String,
}

/// Result of [`Pipeline::process_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<FailedFile>,
    /// `None` when alerts are disabled or the sweep failed.
    pub pending: Option<PendingCounts>,
    pub report_path: Option<PathBuf>,
    pub records: Vec<ResponseRecord>,
}

/// One pipeline run over a configured set of directories.
pub struct Pipeline {
    pool: SqlitePool,
    cfg: Config,
    scorer: Box<dyn Scorer>,
    alerts: Option<AlertEngine>,
    recorder: AlertRecorder,
}

impl Pipeline {
    // ---
    pub fn new(pool: SqlitePool, cfg: Config) -> Self {
        // ---
        let alerts = if cfg.alerts_enabled {
            Some(AlertEngine::new(Thresholds::default()))
        } else {
            tracing::warn!("Alert engine disabled, continuing without alerts");
            None
        };
        let recorder = AlertRecorder::new(
            pool.clone(),
            AlertJournal::new(&cfg.alerts_dir, &cfg.logs_dir),
        );

        Self {
            pool,
            cfg,
            scorer: Box::new(BaselineScorer),
            alerts,
            recorder,
        }
    }

    /// Replace the default scorer.
    pub fn with_scorer(mut self, scorer: Box<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }
}

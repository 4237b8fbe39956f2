//! Configuration loader for the `air-quality` pipeline.
//!
//! All runtime settings live here, loaded from environment variables (with
//! optional `.env` support provided by the caller), so no other module reads
//! `env::var` directly.
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean environment variable with a default value.
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => $default,
            Some("1") | Some("true") | Some("yes") | Some("on") => true,
            Some("0") | Some("false") | Some("no") | Some("off") => false,
            Some(other) => return Err(anyhow!("Invalid {}: '{}'", $var_name, other)),
        }
    };
}

/// Optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/database/air_quality.db";

/// Strongly typed application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Directory scanned for `*.json` payloads.
    pub input_dir: PathBuf,

    /// Where processed payloads are moved.
    pub archive_dir: PathBuf,

    /// Daily alert journals.
    pub alerts_dir: PathBuf,

    /// `alerts.log` and `processing_errors.log`.
    pub logs_dir: PathBuf,

    /// Batch and alert reports.
    pub reports_dir: PathBuf,

    /// When false the pipeline runs without an alert engine.
    pub alerts_enabled: bool,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – SQLite URL (default: `sqlite://data/database/air_quality.db`)
/// - `DB_POOL_MAX` – max DB connections (default: 1)
/// - `INPUT_DIR` (default: `data/raw_json`)
/// - `ARCHIVE_DIR` (default: `data/archive`)
/// - `ALERTS_DIR` (default: `data/alerts`)
/// - `LOGS_DIR` (default: `logs`)
/// - `REPORTS_DIR` (default: `reports`)
/// - `ALERTS_ENABLED` (default: true)
///
/// Returns an error if a variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = env_or!("DATABASE_URL", DEFAULT_DATABASE_URL);
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 1);
    let alerts_enabled = parse_env_bool!("ALERTS_ENABLED", true);

    Ok(Config {
        db_url,
        db_pool_max,
        input_dir: env_or!("INPUT_DIR", "data/raw_json").into(),
        archive_dir: env_or!("ARCHIVE_DIR", "data/archive").into(),
        alerts_dir: env_or!("ALERTS_DIR", "data/alerts").into(),
        logs_dir: env_or!("LOGS_DIR", "logs").into(),
        reports_dir: env_or!("REPORTS_DIR", "reports").into(),
        alerts_enabled,
    })
}

impl Config {
    /// Every path under `root`, with the database at `root/air_quality.db`.
    pub fn with_root(root: &Path) -> Self {
        // ---
        Self {
            db_url: format!("sqlite://{}", root.join("air_quality.db").display()),
            db_pool_max: 1,
            input_dir: root.join("raw_json"),
            archive_dir: root.join("archive"),
            alerts_dir: root.join("alerts"),
            logs_dir: root.join("logs"),
            reports_dir: root.join("reports"),
            alerts_enabled: true,
        }
    }

    /// Log the loaded configuration.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL   : {}", self.db_url);
        tracing::info!("  DB_POOL_MAX    : {}", self.db_pool_max);
        tracing::info!("  INPUT_DIR      : {}", self.input_dir.display());
        tracing::info!("  ARCHIVE_DIR    : {}", self.archive_dir.display());
        tracing::info!("  ALERTS_DIR     : {}", self.alerts_dir.display());
        tracing::info!("  LOGS_DIR       : {}", self.logs_dir.display());
        tracing::info!("  REPORTS_DIR    : {}", self.reports_dir.display());
        tracing::info!("  ALERTS_ENABLED : {}", self.alerts_enabled);
    }
}

//! File-based alert trail: one JSON array per day plus a plain-text log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tempfile::NamedTempFile;

use super::types::Alert;

// ---

pub const ALERT_LOG_FILE: &str = "alerts.log";

#[derive(Debug, Clone)]
pub struct AlertJournal {
    alerts_dir: PathBuf,
    log_path: PathBuf,
}

impl AlertJournal {
    // ---
    pub fn new(alerts_dir: impl Into<PathBuf>, logs_dir: impl AsRef<Path>) -> Self {
        Self {
            alerts_dir: alerts_dir.into(),
            log_path: logs_dir.as_ref().join(ALERT_LOG_FILE),
        }
    }

    /// `alerts_YYYYMMDD.json` for the day the alert was raised.
    pub fn daily_path(&self, alert: &Alert) -> PathBuf {
        self.alerts_dir
            .join(format!("alerts_{}.json", alert.timestamp.format("%Y%m%d")))
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append to both the daily array and `alerts.log`.
    ///
    /// Both trails are attempted; the first error is returned.
    pub fn append(&self, alert: &Alert) -> Result<()> {
        // ---
        let daily = self.append_daily(alert);
        let line = self.append_log_line(alert);
        daily.and(line)
    }

    /// Rewrite the day's array with `alert` added at the end.
    ///
    /// A missing file, or one that is not a JSON array, starts a new array.
    fn append_daily(&self, alert: &Alert) -> Result<()> {
        // ---
        fs::create_dir_all(&self.alerts_dir).with_context(|| {
            format!("Failed to create alerts dir {}", self.alerts_dir.display())
        })?;

        let path = self.daily_path(alert);
        let mut entries = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Array(entries)) => entries,
                _ => {
                    tracing::warn!(path = %path.display(), "Unreadable alert journal, starting a new one");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        entries.push(serde_json::to_value(alert)?);

        replace_file(&path, |file| {
            serde_json::to_writer_pretty(file, &entries).map_err(io::Error::from)
        })
        .with_context(|| format!("Failed to write alert journal {}", path.display()))
    }

    fn append_log_line(&self, alert: &Alert) -> Result<()> {
        // ---
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create logs dir {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open {}", self.log_path.display()))?;

        writeln!(file, "{}", log_line(alert))?;
        Ok(())
    }
}

/// Write `path` through a temp file in the same directory, then rename it
/// over the target. On any failure the previous contents are left intact.
fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&File>) -> io::Result<()>,
{
    // ---
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;

    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        write(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `"{timestamp} - {LEVEL} - {CATEGORY} [{location}]: {message}"`
pub fn log_line(alert: &Alert) -> String {
    format!(
        "{} - {} - {} [{}]: {}",
        alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        alert.severity,
        alert.category,
        alert.location,
        alert.message
    )
}

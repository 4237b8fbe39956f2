//! Alert gateway (EMBP).
//!
//! `engine` decides what fires, `dedup` gates repeats, `recorder` and
//! `journal` persist, `report` summarizes. Only the names re-exported here
//! are part of the crate surface.

mod dedup;
mod engine;
mod journal;
mod recorder;
mod report;
mod types;

pub use dedup::DedupCache;
pub use engine::{missing_sensors, AlertEngine, Thresholds};
pub use journal::{log_line, AlertJournal, ALERT_LOG_FILE};
pub use recorder::{AlertRecorder, PendingCounts, PROCESSED_BY, SYSTEM_LOCATION};
pub use report::{alert_report, AlertReport, AlertTotals, RecentAlert};
pub use types::{Alert, AlertCategory, AlertSummary, Severity};

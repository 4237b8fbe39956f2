//! Command-line entry point for the `air-quality` pipeline.
//!
//! Startup sequence:
//! - Load `.env` and configuration from the environment
//! - Initialize structured logging/tracing
//! - Open (creating if needed) the SQLite database and apply migrations
//! - Dispatch the requested subcommand; `process` is the default
//!
//! # Environment Variables
//! - `DATABASE_URL` (optional) – SQLite URL (default: `sqlite://data/database/air_quality.db`)
//! - `SENSOR_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `SENSOR_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See [`sensorflow_airquality::config`] for the rest.
use std::env;
use std::process::ExitCode;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use sensorflow_airquality::alerts::{self, AlertRecorder, AlertJournal};
use sensorflow_airquality::config::{self, Config};
use sensorflow_airquality::report::db_summary;
use sensorflow_airquality::store::{self, AlertFilter};
use sensorflow_airquality::Pipeline;

// ---

const MAX_REPORT_HOURS: i64 = 87_600;

#[derive(Debug, Parser)]
#[command(name = "air-quality", about = "Air-quality sensor ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process every pending JSON file in the input directory.
    Process,
    /// Write an alert report for the trailing window.
    AlertReport {
        /// Trailing window, at most ten years.
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(u32).range(1..=MAX_REPORT_HOURS))]
        hours: u32,
    },
    /// List unprocessed alerts, newest first.
    Pending {
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Acknowledge one alert.
    Ack {
        id: i64,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Row counts and per-category averages.
    Summary,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ---
    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Opening database: {}", cfg.db_url);
    let pool = store::connect(&cfg.db_url, cfg.db_pool_max).await?;
    store::migrate(&pool).await?;

    match cli.command.unwrap_or(Command::Process) {
        Command::Process => {
            let mut pipeline = Pipeline::new(pool, cfg);
            let summary = pipeline.process_all().await?;

            println!(
                "Processed: {}  Skipped: {}  Failed: {}",
                summary.processed,
                summary.skipped,
                summary.failed.len()
            );
            for failed in &summary.failed {
                println!("  FAILED {}: {}", failed.file, failed.reason);
            }
            if let Some(pending) = summary.pending {
                println!(
                    "Stale pending alerts: {} critical, {} warning",
                    pending.critical, pending.warning
                );
            }
            if let Some(path) = &summary.report_path {
                println!("Report: {}", path.display());
            }
        }
        Command::AlertReport { hours } => {
            let (report, path) =
                alerts::alert_report(&pool, hours, &cfg.reports_dir, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report.totals)?);
            println!("Report: {}", path.display());
        }
        Command::Pending {
            severity,
            location,
            limit,
        } => {
            let filter = AlertFilter {
                severity: severity.map(|s| s.to_ascii_uppercase()),
                location,
            };
            for row in recorder(pool, &cfg).pending(&filter, limit).await? {
                println!(
                    "#{} {} {} {} [{}]: {}",
                    row.id,
                    row.timestamp,
                    row.severity,
                    row.category,
                    row.location.as_deref().unwrap_or("-"),
                    row.message
                );
            }
        }
        Command::Ack { id, comment } => {
            let row = recorder(pool, &cfg).acknowledge(id, &comment).await?;
            println!("Alert {} acknowledged: {}", row.id, row.message);
        }
        Command::Summary => {
            let summary = db_summary(&pool).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn recorder(pool: sqlx::SqlitePool, cfg: &Config) -> AlertRecorder {
    AlertRecorder::new(pool, AlertJournal::new(&cfg.alerts_dir, &cfg.logs_dir))
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// - Color output controlled by TTY detection and `FORCE_COLOR`:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span events controlled by `SENSOR_SPAN_EVENTS`:
///   - `"full"`       : ENTER, EXIT and CLOSE with timing
///   - `"enter_exit"` : ENTER and EXIT only
///   - unset or other values: CLOSE only
/// - Level from `RUST_LOG`, else `SENSOR_LOG_LEVEL` (default `info`)
///
/// Call once, before any tracing macro fires.
fn init_tracing() {
    // ---
    let span_events = match env::var("SENSOR_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SENSOR_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

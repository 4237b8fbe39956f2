//! Batch ingestion, classification and alerting for air-quality sensor
//! readings.
//!
//! JSON payloads dropped into an input directory are parsed, classified by
//! CO2 concentration, scored, checked against alert thresholds and stored in
//! SQLite, then archived. Each module is a gateway in the EMBP sense: callers
//! use the names re-exported here and never reach into sub-modules.

pub mod alerts;
pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod store;

pub use classifier::{classify, recommendation, AirQuality};
pub use config::Config;
pub use error::PipelineError;
pub use models::{RawSensorPayload, ReadingLevels, SensorReading};
pub use pipeline::{BatchSummary, FailedFile, FileOutcome, Pipeline, ResponseRecord};
pub use scoring::{BaselineScorer, FeatureVector, Score, Scorer};

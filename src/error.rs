//! Typed errors callers need to match on.
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! module boundary.

/// Errors raised by the ingestion pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A feature handed to the scorer was NaN or infinite.
    #[error("Scoring: feature '{0}' is not a finite number")]
    InvalidFeature(&'static str),

    /// The scorer could not produce a value for the current file.
    #[error("Scoring failed for request {request_id}: {reason}")]
    Scoring { request_id: i64, reason: String },

    /// Writing the analysis row failed; the request stays unprocessed.
    #[error("Failed to store response for request {request_id}: {source}")]
    ResponseInsert {
        request_id: i64,
        #[source]
        source: sqlx::Error,
    },

    /// No alert with this id exists.
    #[error("Alert {0} not found")]
    AlertNotFound(i64),

    /// The database was written by a newer build.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },
}

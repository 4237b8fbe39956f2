use std::fs;
use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use sensorflow_airquality::alerts::{Severity, PROCESSED_BY};
use sensorflow_airquality::store;
use sensorflow_airquality::{
    AirQuality, Config, FeatureVector, FileOutcome, Pipeline, PipelineError, Score, Scorer,
};

// ---

async fn setup() -> Result<(TempDir, Config, SqlitePool)> {
    // ---
    let dir = tempfile::tempdir()?;
    let cfg = Config::with_root(dir.path());
    fs::create_dir_all(&cfg.input_dir)?;

    let pool = store::connect(&cfg.db_url, cfg.db_pool_max).await?;
    store::migrate(&pool).await?;

    Ok((dir, cfg, pool))
}

fn payload(location: &str, co2: f64, temperature: f64, humidity: f64) -> Value {
    json!({"sensor_data": {
        "metadata": {
            "device_id": "UPS-SENSOR-001",
            "location": location,
            "timestamp": "2025-12-01T10:00:00",
            "latitude": -2.1894,
            "longitude": -79.8891
        },
        "readings": {
            "scd30": {"co2": co2, "temperature": temperature, "humidity": humidity},
            "bme280": {"temperature": temperature, "humidity": humidity, "pressure": 1013.2},
            "mq135": {"analog_value": 310, "digital_value": 0}
        },
        "system_info": {"battery_level": 88, "sampling_interval": 300}
    }})
}

fn drop_file(cfg: &Config, name: &str, body: &Value) -> Result<std::path::PathBuf> {
    let path = cfg.input_dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(body)?)?;
    Ok(path)
}

async fn count(pool: &SqlitePool, table: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?)
}

fn names_in(dir: &Path) -> Result<Vec<String>> {
    // ---
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    names.sort();
    Ok(names)
}

fn processed(outcome: FileOutcome) -> sensorflow_airquality::ResponseRecord {
    match outcome {
        FileOutcome::Processed(record) => *record,
        FileOutcome::Skipped => panic!("expected the file to be processed"),
    }
}

#[tokio::test]
async fn normal_reading_is_excellent_without_alerts() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let path = drop_file(&cfg, "reading_001.json", &payload("Aula 101", 400.0, 24.0, 60.0))?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    let record = processed(pipeline.process_file(&path).await?);

    assert_eq!(record.category, AirQuality::Excellent);
    assert_eq!(record.band, "Muy bueno");
    assert_eq!(record.alerts.total, 0);
    assert!((0.0..=1.0).contains(&record.prediction));
    assert_eq!(record.recommendation, AirQuality::Excellent.recommendation());

    // Request, response and marker are all committed
    let request = store::get_request(&pool, record.request_id).await?.unwrap();
    assert!(request.processed_at.is_some());
    assert!(request.archived);
    assert_eq!(request.device_id.as_deref(), Some("UPS-SENSOR-001"));

    let response = store::get_response_for_request(&pool, record.request_id)
        .await?
        .unwrap();
    assert_eq!(response.quality_category, "Excellent");
    assert_eq!(response.pressure, 1013.2);
    let detail: Value = serde_json::from_str(&response.prediction_detail)?;
    assert_eq!(detail["location"], "Aula 101");
    assert_eq!(detail["alert_summary"]["total"], 0);
    assert_eq!(detail["features_used"].as_array().map(Vec::len), Some(6));

    let marker = store::find_processed_file(&pool, "reading_001.json").await?.unwrap();
    assert_eq!(marker.request_id, Some(record.request_id));

    // File moved to the archive
    assert!(!path.exists());
    assert_eq!(names_in(&cfg.archive_dir)?, vec!["reading_001.json"]);
    assert_eq!(count(&pool, "system_alerts").await?, 0);

    Ok(())
}

#[tokio::test]
async fn dangerous_co2_raises_two_critical_alerts() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let path = drop_file(&cfg, "reading_002.json", &payload("Laboratorio", 1300.0, 24.0, 60.0))?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    let record = processed(pipeline.process_file(&path).await?);

    assert_eq!(record.category, AirQuality::Dangerous);
    assert_eq!(record.alerts.total, 2);
    assert_eq!(record.alerts.critical, 2);

    let messages: Vec<&str> = record.alerts.alerts.iter().map(|a| a.message.as_str()).collect();
    assert!(messages[0].contains("1300"));
    assert_ne!(messages[0], messages[1]);
    assert!(record.alerts.alerts.iter().all(|a| a.severity == Severity::Critical));

    // Stored and auto-marked processed by the pipeline
    for alert in &record.alerts.alerts {
        let row = store::get_alert(&pool, alert.id.unwrap()).await?.unwrap();
        assert!(row.processed);
        assert!(row.processed_at.is_some());
        let data: Value = serde_json::from_str(row.additional_data.as_deref().unwrap())?;
        assert_eq!(data["processed_by"], PROCESSED_BY);
    }

    // Journals written
    let log = fs::read_to_string(cfg.logs_dir.join("alerts.log"))?;
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains("CRITICAL - AIR_QUALITY [Laboratorio]"));
    assert_eq!(names_in(&cfg.alerts_dir)?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn missing_sensor_warning_is_deduplicated() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let mut body = payload("Aula 101", 500.0, 24.0, 60.0);
    body["sensor_data"]["readings"]
        .as_object_mut()
        .unwrap()
        .remove("mq135");

    let first = drop_file(&cfg, "a.json", &body)?;
    let second = drop_file(&cfg, "b.json", &body)?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    let record = processed(pipeline.process_file(&first).await?);
    assert_eq!(record.alerts.total, 1);
    let alert = &record.alerts.alerts[0];
    assert_eq!(alert.severity, Severity::Warning);
    assert_eq!(alert.additional_data["missing_sensors"], json!(["MQ135 (calidad aire)"]));

    // Same location and missing set within five minutes
    let record = processed(pipeline.process_file(&second).await?);
    assert_eq!(record.alerts.total, 0);
    assert_eq!(count(&pool, "system_alerts").await?, 1);

    Ok(())
}

#[tokio::test]
async fn reprocessing_a_file_name_is_skipped() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let body = payload("Aula 101", 450.0, 24.0, 60.0);
    let path = drop_file(&cfg, "dup.json", &body)?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    processed(pipeline.process_file(&path).await?);

    // Same name dropped again
    let path = drop_file(&cfg, "dup.json", &body)?;
    let outcome = pipeline.process_file(&path).await?;

    assert!(matches!(outcome, FileOutcome::Skipped));
    assert_eq!(count(&pool, "sensor_requests").await?, 1);
    assert_eq!(count(&pool, "sensor_responses").await?, 1);
    assert_eq!(count(&pool, "processed_files").await?, 1);
    assert!(path.exists());

    Ok(())
}

#[tokio::test]
async fn failed_response_insert_leaves_file_retryable() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let path = drop_file(&cfg, "crash.json", &payload("Aula 101", 420.0, 24.0, 60.0))?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    sqlx::query(
        "CREATE TRIGGER fail_response BEFORE INSERT ON sensor_responses \
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .execute(&pool)
    .await?;

    let err = pipeline.process_file(&path).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::ResponseInsert { .. })
    ));

    // Request recorded but not processed, no marker, file untouched
    let pending: Vec<(i64, Option<String>)> =
        sqlx::query_as("SELECT id, processed_at FROM sensor_requests")
            .fetch_all(&pool)
            .await?;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].1.is_none());
    assert!(store::find_processed_file(&pool, "crash.json").await?.is_none());
    assert!(path.exists());

    let errors = fs::read_to_string(cfg.logs_dir.join("processing_errors.log"))?;
    assert!(errors.contains("crash.json"));

    // Next run picks it up
    sqlx::query("DROP TRIGGER fail_response").execute(&pool).await?;
    let record = processed(pipeline.process_file(&path).await?);
    assert!(store::find_processed_file(&pool, "crash.json").await?.is_some());
    assert_ne!(record.request_id, pending[0].0);

    Ok(())
}

#[tokio::test]
async fn batch_with_one_malformed_file() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    drop_file(&cfg, "01.json", &payload("Aula 101", 420.0, 24.0, 60.0))?;
    drop_file(&cfg, "02.json", &payload("Aula 102", 650.0, 24.0, 60.0))?;
    fs::write(cfg.input_dir.join("03.json"), "{\"sensor_data\": ")?;
    drop_file(&cfg, "04.json", &payload("Biblioteca", 900.0, 24.0, 60.0))?;
    drop_file(&cfg, "05.json", &payload("Laboratorio", 1100.0, 24.0, 60.0))?;

    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());
    let summary = pipeline.process_all().await?;

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].file, "03.json");

    assert_eq!(names_in(&cfg.input_dir)?, vec!["03.json"]);
    assert_eq!(names_in(&cfg.archive_dir)?.len(), 4);

    // Parse precedes the request insert
    assert_eq!(count(&pool, "sensor_requests").await?, 4);

    let errors = fs::read_to_string(cfg.logs_dir.join("processing_errors.log"))?;
    assert!(errors.contains("03.json"));

    // Lexical order, and a report for the run
    let files: Vec<&str> = summary.records.iter().map(|r| r.file_name.as_str()).collect();
    assert_eq!(files, vec!["01.json", "02.json", "04.json", "05.json"]);

    let report_path = summary.report_path.unwrap();
    let report: Value = serde_json::from_str(&fs::read_to_string(report_path)?)?;
    assert_eq!(report["files"]["processed"], 4);
    assert_eq!(report["files"]["failed"], 1);
    assert_eq!(report["quality_distribution"]["VeryPoor"], 1);
    assert_eq!(report["co2"]["max"], 1100.0);
    assert_eq!(report["pending_alerts"]["critical"], 0);

    // A second run finds only the malformed file
    let summary = pipeline.process_all().await?;
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.report_path.is_none());

    Ok(())
}

#[tokio::test]
async fn alerts_disabled_still_processes() -> Result<()> {
    // ---
    let (_dir, mut cfg, pool) = setup().await?;
    cfg.alerts_enabled = false;
    let path = drop_file(&cfg, "hot.json", &payload("Aula 101", 1300.0, 40.0, 90.0))?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    let record = processed(pipeline.process_file(&path).await?);

    assert_eq!(record.category, AirQuality::Dangerous);
    assert_eq!(record.alerts.total, 0);
    assert_eq!(count(&pool, "system_alerts").await?, 0);

    let summary = pipeline.process_all().await?;
    assert!(summary.pending.is_none());

    Ok(())
}

#[tokio::test]
async fn empty_payload_uses_defaults() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let path = cfg.input_dir.join("empty.json");
    fs::write(&path, "{}")?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    let record = processed(pipeline.process_file(&path).await?);

    assert_eq!(record.device_id, "UNKNOWN");
    assert_eq!(record.location, "Unknown location");
    assert_eq!(record.category, AirQuality::Excellent);
    // Every sensor block missing, temperature and humidity read as zero
    let missing = record
        .alerts
        .alerts
        .iter()
        .find(|a| a.additional_data.contains_key("missing_sensors"))
        .unwrap();
    assert_eq!(missing.additional_data["missing_sensors"].as_array().map(Vec::len), Some(3));

    Ok(())
}

/// Stands in for a model that cannot be loaded.
struct FailingScorer;

impl Scorer for FailingScorer {
    fn score(&self, _features: &FeatureVector) -> Result<Score> {
        Err(anyhow::anyhow!("model unavailable"))
    }
}

#[tokio::test]
async fn scoring_failure_leaves_file_retryable() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let path = drop_file(&cfg, "unscored.json", &payload("Aula 101", 1600.0, 24.0, 60.0))?;
    let mut pipeline =
        Pipeline::new(pool.clone(), cfg.clone()).with_scorer(Box::new(FailingScorer));

    let err = pipeline.process_file(&path).await.unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Scoring { reason, .. }) => assert!(reason.contains("model unavailable")),
        other => panic!("unexpected error: {:?}", other),
    }

    // The request row stays unprocessed and nothing downstream of scoring ran
    let requests: Vec<(i64, Option<String>)> =
        sqlx::query_as("SELECT id, processed_at FROM sensor_requests")
            .fetch_all(&pool)
            .await?;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].1.is_none());
    assert_eq!(count(&pool, "sensor_responses").await?, 0);
    assert_eq!(count(&pool, "system_alerts").await?, 0);
    assert!(store::find_processed_file(&pool, "unscored.json").await?.is_none());

    assert!(path.exists());
    assert!(names_in(&cfg.archive_dir)?.is_empty());
    let errors = fs::read_to_string(cfg.logs_dir.join("processing_errors.log"))?;
    assert!(errors.contains("unscored.json"));
    assert!(errors.contains("model unavailable"));

    Ok(())
}

#[tokio::test]
async fn archive_failure_after_commit_is_still_processed() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let path = drop_file(&cfg, "stuck.json", &payload("Aula 101", 420.0, 24.0, 60.0))?;

    // A non-empty directory at the archive target defeats both rename and copy
    let blocker = cfg.archive_dir.join("stuck.json");
    fs::create_dir_all(&blocker)?;
    fs::write(blocker.join("occupied"), "")?;

    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());
    let record = processed(pipeline.process_file(&path).await?);

    let marker = store::find_processed_file(&pool, "stuck.json").await?.unwrap();
    assert_eq!(marker.request_id, Some(record.request_id));
    assert!(store::get_request(&pool, record.request_id).await?.unwrap().processed_at.is_some());

    // Left in place, and skipped from now on
    assert!(path.exists());
    assert!(blocker.is_dir());
    assert!(matches!(pipeline.process_file(&path).await?, FileOutcome::Skipped));

    Ok(())
}

#[tokio::test]
async fn numeric_metadata_scalars_are_accepted() -> Result<()> {
    // ---
    let (_dir, cfg, pool) = setup().await?;
    let mut body = payload("Aula 101", 420.0, 24.0, 60.0);
    // Epoch seconds are not a timestamp string, so features use the defaults
    body["sensor_data"]["metadata"]["timestamp"] = json!(1733045400);
    body["sensor_data"]["metadata"]["device_id"] = json!(17);
    let path = drop_file(&cfg, "numeric_meta.json", &body)?;
    let mut pipeline = Pipeline::new(pool.clone(), cfg.clone());

    let record = processed(pipeline.process_file(&path).await?);

    assert_eq!(record.device_id, "17");
    assert_eq!(record.location, "Aula 101");
    assert_eq!(record.timestamp, "");
    assert_eq!(record.features.hour_of_day, 12.0);
    assert_eq!(record.features.day_of_week, 0.0);
    assert_eq!(record.category, AirQuality::Excellent);

    let request = store::get_request(&pool, record.request_id).await?.unwrap();
    assert_eq!(request.device_id.as_deref(), Some("17"));

    Ok(())
}

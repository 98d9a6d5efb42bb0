//! Run log integration tests.
//!
//! A full batch against a file-backed relay: the log must contain the run
//! section, per-item info and error blocks, and no progress noise.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use retro2mp4_core::{
    ledger::report_file_name,
    relay::{EventRelay, FileLogSink, LogSink},
    scheduler::{Scheduler, SchedulerConfig},
    testing::{fixtures, MockConverter},
};

#[tokio::test]
async fn test_batch_is_written_to_run_log() {
    let source_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    let log_dir = TempDir::new().unwrap();

    let sink = Arc::new(FileLogSink::create(log_dir.path()).unwrap());
    let relay = Arc::new(EventRelay::with_sink(sink.clone()));

    let converter = MockConverter::new();
    converter.set_progress_ticks(&["00:00:30.00", "00:01:00.00"]).await;
    let broken = source_dir.path().join("b.flv");
    converter.fail_probe(&broken, "Invalid data found when processing input").await;

    let scheduler = Scheduler::new(converter, relay, SchedulerConfig::default());
    scheduler.set_output_dir(Some(output_dir.path().to_path_buf()));
    scheduler
        .load(fixtures::touch_inputs(source_dir.path(), &["a.avi", "b.flv"]))
        .unwrap();

    scheduler.start().unwrap();
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_until_idle())
        .await
        .expect("Scheduler did not become idle");

    let log = sink.read_all().unwrap();
    assert!(log.starts_with("retro2mp4 conversion log\n"));
    assert!(log.contains(&format!("\n{}\nBatch started\n", "=".repeat(50))));
    assert!(log.contains("[scheduler] Converting a.avi"));
    assert!(log.contains("[scheduler] Completed a.avi"));
    assert!(log.contains("[scheduler] ERROR: Failed: b.flv"));
    assert!(log.contains("Invalid data found when processing input"));
    assert!(log.contains("Batch finished: 1 completed, 1 failed"));
    assert!(!log.contains("\"timemark\""), "progress entries must not reach the log");

    let exported = log_dir.path().join("copy.log");
    let bytes = sink.export_to(&exported).unwrap();
    assert_eq!(bytes, log.len() as u64);

    let report_path = output_dir
        .path()
        .join(report_file_name(chrono::Local::now().date_naive()));
    std::fs::write(&report_path, scheduler.ledger().export_text()).unwrap();
    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.starts_with("1. b.flv\n"));
    assert_eq!(sink.location(), Some(sink.path()));
}

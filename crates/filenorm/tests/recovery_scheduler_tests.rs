//! Restart recovery and the periodic scan scheduler.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{wait_for_status, wait_until, RecordingRenderer, TestHarness};
use filenorm::db::job_repo;
use filenorm::{JobFilter, JobStatus};

#[test]
fn test_job_left_processing_completes_after_restart() {
    let harness = TestHarness::new();
    harness.write_incoming("a.txt", "survivor");

    // First run: the job is claimed, then the process "dies".
    let job_id = {
        let manager = harness.manager(Arc::new(RecordingRenderer::new()));
        let job = manager.enqueue("a.txt").unwrap();
        job.id
    };
    let db = harness.open_db();
    db.with_conn(|conn| {
        let mut job = job_repo::find_by_id(conn, &job_id)?.unwrap();
        job.status = JobStatus::Processing;
        job_repo::update(conn, &job)?;
        Ok(())
    })
    .unwrap();
    drop(db);

    let renderer = Arc::new(RecordingRenderer::new());
    let manager = harness.manager(renderer.clone());
    assert_eq!(
        manager.get_job(&job_id).unwrap().unwrap().status,
        JobStatus::Processing
    );

    manager.start().unwrap();
    let done = wait_for_status(&manager, &job_id, JobStatus::Completed);
    manager.stop();

    assert_eq!(done.retry_count, 0);
    assert_eq!(renderer.call_count(), 1);
    assert_eq!(harness.read_stored("processed/a.md").as_deref(), Some("survivor"));
}

#[test]
fn test_queued_jobs_resume_after_restart() {
    let harness = TestHarness::new();
    harness.write_incoming("a.txt", "a");
    harness.write_incoming("b.txt", "b");

    {
        let manager = harness.manager(Arc::new(RecordingRenderer::new()));
        manager.enqueue("a.txt").unwrap();
        manager.enqueue("b.txt").unwrap();
    }

    let manager = harness.manager(Arc::new(RecordingRenderer::new()));
    manager.start().unwrap();
    for job in manager.list_jobs(&JobFilter::default()).unwrap() {
        wait_for_status(&manager, &job.id, JobStatus::Completed);
    }
    manager.stop();
    assert_eq!(manager.stats().unwrap().completed, 2);
}

#[test]
fn test_stamps_keep_increasing_across_restarts() {
    let harness = TestHarness::new();
    harness.write_incoming("a.txt", "a");

    let first = {
        let manager = harness.manager(Arc::new(RecordingRenderer::new()));
        manager.enqueue("a.txt").unwrap()
    };
    let manager = harness.manager(Arc::new(RecordingRenderer::new()));
    let second = manager.enqueue("a.txt").unwrap();
    assert!(second.updated_at > first.updated_at);
}

#[test]
fn test_scheduler_scans_on_start_and_on_trigger() {
    let mut harness = TestHarness::new();
    harness.settings.enable_scheduler = true;
    harness.settings.polling_interval_secs = 3600;
    let manager = harness.manager(Arc::new(RecordingRenderer::new()));

    harness.write_incoming("early.txt", "early");
    manager.start().unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        manager.stats().unwrap().completed == 1
    }));

    harness.write_incoming("late.txt", "late");
    assert!(manager.trigger_scan());
    assert!(wait_until(Duration::from_secs(10), || {
        manager.stats().unwrap().completed == 2
    }));

    let started = Instant::now();
    manager.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!manager.is_running());
    assert!(!manager.trigger_scan());
}

#[test]
fn test_stop_is_prompt_with_idle_workers() {
    let mut harness = TestHarness::new();
    harness.settings.enable_scheduler = true;
    harness.settings.polling_interval_secs = 3600;
    harness.settings.worker_poll_interval_ms = 50;
    let manager = harness.manager(Arc::new(RecordingRenderer::new()));
    manager.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    manager.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_start_creates_storage_directories() {
    let harness = TestHarness::new();
    let mut settings = harness.settings.clone();
    settings.storage_root = harness.temp_path().join("fresh-root");
    let manager = harness.manager_with(settings.clone(), Arc::new(RecordingRenderer::new()));

    manager.start().unwrap();
    manager.stop();

    assert!(settings.incoming_path().is_dir());
    assert!(settings.processed_path().is_dir());
    assert!(settings.quarantine_path().is_dir());
}

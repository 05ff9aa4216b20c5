use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use authledger_db::{create_pool, Connections, DbRuntimeSettings};
use authledger_jobs::{
    JobError, JobKind, JobPayload, JobRunner, JobsStore, Processor, ProcessorRegistry, RunMode,
    RunnerLimits, StopReason,
};
use authledger_store::{DataTracker, Setup, VersionedStore};
use authledger_types::{AuthenticationEvent, Protocol, Provider, User};
use chrono::Utc;
use serde_json::{json, Map, Value};

fn connections(dir: &tempfile::TempDir) -> Connections {
    let path = dir.path().join("accounting.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool");
    Connections::new(pool)
}

fn jobs_store(dir: &tempfile::TempDir) -> JobsStore {
    let store = JobsStore::new(connections(dir));
    store.run_setup().expect("job store setup should succeed");
    store
}

fn metadata(entity_id: &str) -> Map<String, Value> {
    match json!({ "entityid": entity_id }) {
        Value::Object(map) => map,
        _ => unreachable!("literal is an object"),
    }
}

fn event(user: &str) -> AuthenticationEvent {
    let mut attributes = BTreeMap::new();
    attributes.insert("uid".to_string(), vec![user.to_string()]);

    AuthenticationEvent {
        identity_provider: Provider {
            entity_id: "https://idp.example.org".to_string(),
            metadata: metadata("https://idp.example.org"),
        },
        service_provider: Provider {
            entity_id: "https://sp.example.org".to_string(),
            metadata: metadata("https://sp.example.org"),
        },
        user: User {
            identifier: user.to_string(),
            attributes,
        },
        protocol: Protocol::Oidc,
        happened_at: Utc::now(),
        client_ip_address: None,
    }
}

/// Records processed users and fails for the ones named "poison".
#[derive(Default)]
struct RecordingProcessor {
    seen: Mutex<Vec<String>>,
}

impl Processor for RecordingProcessor {
    fn process(&self, payload: &JobPayload) -> Result<(), JobError> {
        let JobPayload::AuthenticationEvent(event) = payload;
        if event.user.identifier == "poison" {
            return Err(JobError::UnknownType("poison".to_string()));
        }
        self.seen
            .lock()
            .expect("lock poisoned")
            .push(event.user.identifier.clone());
        Ok(())
    }
}

fn recording_registry() -> (ProcessorRegistry, Arc<RecordingProcessor>) {
    let processor = Arc::new(RecordingProcessor::default());
    let mut registry = ProcessorRegistry::new();
    registry.register(JobKind::AuthenticationEvent, processor.clone());
    (registry, processor)
}

#[test]
fn queued_events_reach_the_tracker() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let tracker = Arc::new(VersionedStore::new(connections(&dir)));
    tracker.run_setup().expect("tracker setup should succeed");

    store
        .enqueue(&JobPayload::from(event("alice")))
        .expect("enqueue should succeed");
    store
        .enqueue(&JobPayload::from(event("alice")))
        .expect("enqueue should succeed");

    let trackers: Vec<Arc<dyn DataTracker>> = vec![tracker.clone()];
    let runner = JobRunner::new(
        store.clone(),
        ProcessorRegistry::for_trackers(trackers),
        RunnerLimits::default(),
    );
    let summary = runner.run().expect("run should succeed");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.stop_reason, StopReason::QueueEmpty);
    assert_eq!(store.count_pending().expect("should count"), 0);
    assert_eq!(tracker.get_activity("alice", 10, 0).expect("should read").len(), 2);
}

#[test]
fn failing_job_is_dead_lettered_and_the_loop_continues() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let (registry, processor) = recording_registry();

    for user in ["alice", "poison", "bob"] {
        store
            .enqueue(&JobPayload::from(event(user)))
            .expect("enqueue should succeed");
    }

    let summary = JobRunner::new(store.clone(), registry, RunnerLimits::default())
        .run()
        .expect("run should succeed");

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        *processor.seen.lock().expect("lock poisoned"),
        vec!["alice".to_string(), "bob".to_string()]
    );
    assert_eq!(store.count_failed().expect("should count"), 1);
}

#[test]
fn unknown_and_corrupt_jobs_are_dead_lettered() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let (registry, processor) = recording_registry();

    {
        let conns = connections(&dir);
        let conn = conns.writer().expect("should get connection");
        conn.execute_batch(
            "INSERT INTO jobs (type, payload, created_at)
                VALUES ('reindex', '{}', '2022-08-01 00:00:00.000000');
             INSERT INTO jobs (type, payload, created_at)
                VALUES ('authentication_event', '{\"user\":', '2022-08-01 00:00:00.000000');",
        )
        .expect("raw insert should succeed");
    }
    store
        .enqueue(&JobPayload::from(event("carol")))
        .expect("enqueue should succeed");

    let summary = JobRunner::new(store.clone(), registry, RunnerLimits::default())
        .run()
        .expect("run should succeed");

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(*processor.seen.lock().expect("lock poisoned"), vec!["carol"]);

    let conns = connections(&dir);
    let conn = conns.reader().expect("should get connection");
    let messages: Vec<String> = conn
        .prepare("SELECT error_message FROM failed_jobs ORDER BY id")
        .expect("should prepare")
        .query_map([], |row| row.get(0))
        .expect("should query")
        .map(|r| r.expect("should read"))
        .collect();
    assert!(messages[0].contains("unknown job type"));
    assert!(messages[1].contains("corrupt payload"));
}

#[test]
fn rows_with_bad_timestamp_or_blob_payload_do_not_block_the_queue() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let (registry, processor) = recording_registry();

    let valid_payload = serde_json::to_string(&event("dave")).expect("event should serialize");
    {
        let conns = connections(&dir);
        let conn = conns.writer().expect("should get connection");
        conn.execute(
            "INSERT INTO jobs (type, payload, created_at)
             VALUES ('authentication_event', ?1, 'garbage')",
            [&valid_payload],
        )
        .expect("raw insert should succeed");
        conn.execute(
            "INSERT INTO jobs (type, payload, created_at)
             VALUES ('authentication_event', X'FF00', '2022-08-01 00:00:00.000000')",
            [],
        )
        .expect("raw insert should succeed");
    }
    store
        .enqueue(&JobPayload::from(event("erin")))
        .expect("enqueue should succeed");

    let runner = JobRunner::new(store.clone(), registry, RunnerLimits::default());
    let summary = runner.run().expect("run should succeed");

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(*processor.seen.lock().expect("lock poisoned"), vec!["erin"]);
    assert_eq!(store.count_pending().expect("should count"), 0);
    assert_eq!(store.count_failed().expect("should count"), 2);

    let conns = connections(&dir);
    let conn = conns.reader().expect("should get connection");
    let (message, created_at): (String, String) = conn
        .query_row(
            "SELECT error_message, created_at FROM failed_jobs ORDER BY id LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("should read failed job");
    assert!(message.contains("invalid created_at"));
    assert_eq!(created_at, "garbage");

    let summary = runner.run().expect("second run should succeed");
    assert_eq!(summary.processed, 0);
}

#[test]
fn runner_pauses_after_configured_job_count() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let (registry, _) = recording_registry();

    for user in ["a", "b", "c", "d", "e"] {
        store
            .enqueue(&JobPayload::from(event(user)))
            .expect("enqueue should succeed");
    }

    let limits = RunnerLimits {
        pause_after_jobs: Some(2),
        max_execution_time: None,
    };
    let summary = JobRunner::new(store.clone(), registry, limits)
        .run()
        .expect("run should succeed");

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.stop_reason, StopReason::MaxJobsReached);
    assert_eq!(store.count_pending().expect("should count"), 3);
}

#[test]
fn runner_pauses_after_max_execution_time() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let (registry, _) = recording_registry();

    store
        .enqueue(&JobPayload::from(event("a")))
        .expect("enqueue should succeed");

    let limits = RunnerLimits {
        pause_after_jobs: None,
        max_execution_time: Some(Duration::ZERO),
    };
    let summary = JobRunner::new(store.clone(), registry, limits)
        .run()
        .expect("run should succeed");

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.stop_reason, StopReason::MaxExecutionTimeReached);
    assert_eq!(store.count_pending().expect("should count"), 1);
}

#[test]
fn continuous_runner_stops_on_flag() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);
    let (registry, processor) = recording_registry();

    let runner = JobRunner::new(store.clone(), registry, RunnerLimits::default()).with_mode(
        RunMode::Continuous {
            idle_sleep: Duration::from_millis(10),
        },
    );
    let stop = runner.stop_handle();
    let handle = thread::spawn(move || runner.run());

    store
        .enqueue(&JobPayload::from(event("late")))
        .expect("enqueue should succeed");
    while store.count_pending().expect("should count") > 0 {
        thread::sleep(Duration::from_millis(5));
    }
    stop.store(true, Ordering::Relaxed);

    let summary = handle
        .join()
        .expect("runner thread panicked")
        .expect("run should succeed");
    assert_eq!(summary.stop_reason, StopReason::Stopped);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(*processor.seen.lock().expect("lock poisoned"), vec!["late"]);
}

#[test]
fn concurrent_runners_never_claim_the_same_job() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = jobs_store(&dir);

    for i in 0..40 {
        store
            .enqueue(&JobPayload::from(event(&format!("user-{i}"))))
            .expect("enqueue should succeed");
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            // Each runner gets its own pool, like separate worker processes.
            let store = JobsStore::new(connections(&dir));
            thread::spawn(move || {
                let mut claimed = Vec::new();
                while let Some(job) = store.dequeue_next().expect("dequeue should succeed") {
                    claimed.push(job.id);
                }
                claimed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.join().expect("runner thread panicked") {
            assert!(seen.insert(id), "job {id} claimed twice");
            total += 1;
        }
    }

    assert_eq!(total, 40);
    assert_eq!(store.count_pending().expect("should count"), 0);
}

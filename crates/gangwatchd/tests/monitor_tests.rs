//! Monitor tests with an in-memory scoreboard source.

use async_trait::async_trait;
use chrono_tz::Asia::Tehran;
use gangwatch_shared::{BoundaryClock, EntityRecord, ExactRewardDetector, TrackerError};
use gangwatchd::{Config, JsonStore, Monitor, SnapshotSource, Tracker, TrackerEvent};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Serves queued responses in order
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Vec<EntityRecord>, TrackerError>>>,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<Vec<EntityRecord>, TrackerError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<EntityRecord>, TrackerError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TrackerError::Fetch("script exhausted".to_string())))
    }
}

fn monitor(dir: &Path, responses: Vec<Result<Vec<EntityRecord>, TrackerError>>) -> Monitor {
    let tracker = Tracker::open(
        JsonStore::new(dir),
        BoundaryClock::new(Tehran),
        Box::new(ExactRewardDetector::default()),
    )
    .unwrap();
    Monitor::new(tracker, Arc::new(ScriptedSource::new(responses)), &Config::default())
}

fn board(vipers: u64, ravens: u64) -> Vec<EntityRecord> {
    vec![
        EntityRecord::new("Vipers", vipers, 3, 1),
        EntityRecord::new("Ravens", ravens, 2, 2),
    ]
}

#[tokio::test]
async fn test_run_once_publishes_changes() {
    let dir = tempdir().unwrap();
    let monitor = monitor(dir.path(), vec![Ok(board(1000, 900)), Ok(board(1000, 1600))]);
    let mut events = monitor.subscribe();

    let first = monitor.run_once().await.unwrap();
    assert!(first.first_cycle);

    let second = monitor.run_once().await.unwrap();
    assert_eq!(second.changes.len(), 2);

    match events.try_recv().unwrap() {
        TrackerEvent::Changes(changes) => {
            let ravens = changes.iter().find(|c| c.name == "Ravens").unwrap();
            assert_eq!(ravens.score_delta, 700);
            assert_eq!(ravens.new_rank, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let tracker = monitor.tracker();
    let tracker = tracker.lock().await;
    assert_eq!(tracker.entities()[0].name, "Ravens");
}

#[tokio::test]
async fn test_failed_fetch_leaves_state_untouched() {
    let dir = tempdir().unwrap();
    let monitor = monitor(
        dir.path(),
        vec![
            Ok(board(1000, 900)),
            Err(TrackerError::Timeout(10)),
            Err(TrackerError::MalformedPayload("missing tops".to_string())),
        ],
    );

    monitor.run_once().await.unwrap();
    let before = monitor.tracker().lock().await.status();

    let err = monitor.run_once().await.unwrap_err();
    assert!(err.is_fetch_failure());
    assert!(monitor.run_once().await.is_err());

    let after = monitor.tracker().lock().await.status();
    assert_eq!(before.last_update, after.last_update);
    assert_eq!(after.entities, 2);
}

#[tokio::test]
async fn test_catch_up_is_noop_on_fresh_state() {
    let dir = tempdir().unwrap();
    let monitor = monitor(dir.path(), Vec::new());
    assert!(monitor.catch_up().await.is_empty());
    assert!(monitor.force_daily_reset().await.is_none());
}

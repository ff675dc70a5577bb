//! Batch worker pool
//!
//! Drains leased queue items through a bounded set of workers. Each
//! worker handles its share sequentially with a delay between items,
//! keeping pressure on the public hotel API low and predictable.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use crate::config::TrackerConfig;
use crate::data::{ActivityRecord, Database, EntityId, QueueItem, QueueStatus};
use crate::error::AppError;
use crate::hotel::ProfileSource;
use crate::tracker::detector;

/// Outcome of one process_queue cycle
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CycleReport {
    /// Items completed successfully
    pub processed: usize,
    /// Activity records written across all items
    pub activities_detected: usize,
    /// Items that failed and were retried or dead-lettered
    pub failures: usize,
}

/// Per-item settings copied out of [`TrackerConfig`] so spawned
/// workers do not borrow it.
#[derive(Clone, Copy)]
struct ItemSettings {
    max_attempts: i64,
    backoff_base: ChronoDuration,
    photo_window: ChronoDuration,
    inter_item_delay: std::time::Duration,
}

/// Split items round-robin into `buckets` sequential work lists.
///
/// Round-robin keeps bucket sizes within one of each other so no
/// single worker serializes the whole batch.
fn partition_round_robin(items: Vec<QueueItem>, buckets: usize) -> Vec<Vec<QueueItem>> {
    let mut partitions: Vec<Vec<QueueItem>> = (0..buckets).map(|_| Vec::new()).collect();
    for (index, item) in items.into_iter().enumerate() {
        partitions[index % buckets].push(item);
    }
    partitions.retain(|partition| !partition.is_empty());
    partitions
}

/// Run one full cycle: reclaim expired leases, lease a batch, process
/// each item, and resolve it.
///
/// A per-item failure never aborts the cycle; the item is marked for
/// retry (or dead-lettered) and the cycle continues.
pub async fn run_cycle(
    db: Arc<Database>,
    source: Arc<dyn ProfileSource>,
    config: &TrackerConfig,
    batch_size: u32,
) -> Result<CycleReport, AppError> {
    let timer = crate::metrics::CYCLE_DURATION_SECONDS.start_timer();

    // 1. Return abandoned leases to the pending pool before leasing.
    let reclaimed = db.reclaim_expired_leases(config.lease_timeout()).await?;
    if reclaimed > 0 {
        tracing::info!(reclaimed, "Reclaimed expired leases");
    }

    // 2. Lease up to batch_size eligible items.
    let items = db.lease_batch(batch_size).await?;
    if items.is_empty() {
        timer.observe_duration();
        return Ok(CycleReport::default());
    }

    let settings = ItemSettings {
        max_attempts: config.max_attempts,
        backoff_base: ChronoDuration::seconds(config.backoff_base_seconds),
        photo_window: config.photo_window(),
        inter_item_delay: config.inter_item_delay(),
    };

    tracing::info!(
        leased = items.len(),
        workers = config.concurrency,
        "Starting queue cycle"
    );

    // 3. Fan out across a fixed number of workers. Each worker walks
    // its partition sequentially with a delay between items.
    let partitions = partition_round_robin(items, config.concurrency.max(1));

    let mut tasks = Vec::new();
    for partition in partitions {
        let db = db.clone();
        let source = source.clone();

        let task = tokio::spawn(async move {
            let mut report = CycleReport::default();

            for (index, item) in partition.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(settings.inter_item_delay).await;
                }

                match process_item(&db, source.as_ref(), item, &settings).await {
                    Ok(activities) => {
                        report.processed += 1;
                        report.activities_detected += activities;
                        crate::metrics::QUEUE_ITEMS_PROCESSED_TOTAL
                            .with_label_values(&["completed"])
                            .inc();
                    }
                    Err(e) => {
                        report.failures += 1;
                        resolve_item_failure(&db, item, &e, &settings).await;
                    }
                }
            }

            report
        });

        tasks.push(task);
    }

    // 4. Aggregate worker reports.
    let mut report = CycleReport::default();
    for task in tasks {
        if let Ok(worker_report) = task.await {
            report.processed += worker_report.processed;
            report.activities_detected += worker_report.activities_detected;
            report.failures += worker_report.failures;
        }
    }

    timer.observe_duration();

    tracing::info!(
        processed = report.processed,
        activities = report.activities_detected,
        failures = report.failures,
        "Queue cycle complete"
    );

    Ok(report)
}

/// Process a single leased item: fetch, diff, persist, resolve.
///
/// Writes happen in a fixed order: snapshot replacement first, then
/// activity inserts, then queue resolution. A crash between steps can
/// suppress a detection but never duplicates one.
async fn process_item(
    db: &Database,
    source: &dyn ProfileSource,
    item: &QueueItem,
    settings: &ItemSettings,
) -> Result<usize, AppError> {
    let candidate = source.fetch_profile(&item.friend_name, &item.hotel).await?;
    let previous = db.get_snapshot(&item.friend_name, &item.hotel).await?;

    let now = Utc::now();
    let changes = detector::diff(previous.as_ref(), &candidate, now, settings.photo_window);

    db.replace_snapshot(&candidate.into_snapshot(now)).await?;

    if !changes.is_empty() {
        let records: Vec<ActivityRecord> = changes
            .into_iter()
            .map(|change| {
                crate::metrics::ACTIVITIES_DETECTED_TOTAL
                    .with_label_values(&[change.activity_type.as_str()])
                    .inc();

                ActivityRecord {
                    id: EntityId::new().0,
                    habbo_name: item.friend_name.clone(),
                    habbo_id: item.friend_id.clone(),
                    hotel: item.hotel.clone(),
                    activity_type: change.activity_type.as_str().to_string(),
                    description: change.description,
                    old_data: change.old_data,
                    new_data: change.new_data,
                    created_at: now,
                }
            })
            .collect();

        db.insert_activities(&records).await?;

        tracing::info!(
            friend = %item.friend_name,
            hotel = %item.hotel,
            activities = records.len(),
            "Detected profile changes"
        );

        let detected = records.len();
        db.resolve_completed(&item.id).await?;
        return Ok(detected);
    }

    db.resolve_completed(&item.id).await?;
    Ok(0)
}

/// Mark a failed item for retry or dead-letter it.
///
/// Resolution errors are logged and swallowed; the lease reclaimer
/// will pick the item up if the row is left in processing.
async fn resolve_item_failure(
    db: &Database,
    item: &QueueItem,
    error: &AppError,
    settings: &ItemSettings,
) {
    tracing::warn!(
        friend = %item.friend_name,
        hotel = %item.hotel,
        error = %error,
        "Queue item failed"
    );

    match db
        .resolve_failed(
            &item.id,
            &error.to_string(),
            settings.max_attempts,
            settings.backoff_base,
        )
        .await
    {
        Ok(QueueStatus::Failed) => {
            crate::metrics::QUEUE_ITEMS_PROCESSED_TOTAL
                .with_label_values(&["failed"])
                .inc();
            tracing::warn!(
                friend = %item.friend_name,
                hotel = %item.hotel,
                "Queue item dead-lettered after retry cap"
            );
        }
        Ok(_) => {
            crate::metrics::QUEUE_ITEMS_PROCESSED_TOTAL
                .with_label_values(&["retried"])
                .inc();
        }
        Err(e) => {
            tracing::error!(
                item_id = %item.id,
                error = %e,
                "Failed to record queue item failure"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{NewQueueItem, ProfileSnapshotCandidate};
    use crate::hotel::HotelFriend;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Profile source backed by an in-memory map, mutable between cycles.
    struct MapSource {
        profiles: Mutex<HashMap<String, Result<ProfileSnapshotCandidate, String>>>,
    }

    impl MapSource {
        fn new() -> Self {
            Self {
                profiles: Mutex::new(HashMap::new()),
            }
        }

        fn set(&self, name: &str, candidate: ProfileSnapshotCandidate) {
            self.profiles
                .lock()
                .unwrap()
                .insert(name.to_string(), Ok(candidate));
        }

        fn fail(&self, name: &str, error: &str) {
            self.profiles
                .lock()
                .unwrap()
                .insert(name.to_string(), Err(error.to_string()));
        }
    }

    #[async_trait]
    impl ProfileSource for MapSource {
        async fn fetch_profile(
            &self,
            friend_name: &str,
            _hotel: &str,
        ) -> Result<ProfileSnapshotCandidate, AppError> {
            self.profiles
                .lock()
                .unwrap()
                .get(friend_name)
                .cloned()
                .unwrap_or_else(|| Err(format!("no stub profile for {friend_name}")))
                .map_err(AppError::HotelApi)
        }

        async fn fetch_friends(
            &self,
            _user_id: &str,
            _hotel: &str,
        ) -> Result<Vec<HotelFriend>, AppError> {
            Ok(Vec::new())
        }
    }

    fn candidate(name: &str, motto: &str) -> ProfileSnapshotCandidate {
        ProfileSnapshotCandidate {
            habbo_name: name.to_string(),
            habbo_id: format!("hhus-{name}"),
            hotel: "com".to_string(),
            figure_string: "hr-100".to_string(),
            motto: motto.to_string(),
            online: false,
            badge_codes: HashSet::new(),
            group_ids: HashSet::new(),
            room_ids: HashSet::new(),
            photos: Vec::new(),
            raw_profile: serde_json::Value::Null,
        }
    }

    fn queue_item(friend: &str) -> NewQueueItem {
        NewQueueItem {
            owner_name: "alice".to_string(),
            owner_id: "hhus-alice".to_string(),
            hotel: "com".to_string(),
            friend_name: friend.to_string(),
            friend_id: format!("hhus-{friend}"),
            priority: 50,
        }
    }

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            batch_size: 20,
            concurrency: 2,
            max_attempts: 3,
            lease_timeout_seconds: 300,
            backoff_base_seconds: 0,
            inter_item_delay_ms: 0,
            photo_window_hours: 24,
            scheduler_enabled: false,
            scheduler_interval_seconds: 300,
        }
    }

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (Arc::new(db), temp_dir)
    }

    #[test]
    fn round_robin_drops_empty_partitions() {
        assert!(partition_round_robin(Vec::new(), 3).is_empty());
    }

    #[tokio::test]
    async fn empty_queue_cycle_is_a_noop() {
        let (db, _temp_dir) = create_test_db().await;
        let source: Arc<dyn ProfileSource> = Arc::new(MapSource::new());

        let report = run_cycle(db, source, &test_config(), 20).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.activities_detected, 0);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn first_observation_establishes_baseline_without_activities() {
        let (db, _temp_dir) = create_test_db().await;
        let source = Arc::new(MapSource::new());
        source.set("bob", candidate("bob", "hello"));

        db.enqueue_queue_items(&[queue_item("bob")]).await.unwrap();

        let report = run_cycle(db.clone(), source, &test_config(), 20)
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.activities_detected, 0);

        let snapshot = db.get_snapshot("bob", "com").await.unwrap().unwrap();
        assert_eq!(snapshot.motto, "hello");
        assert_eq!(db.queue_stats().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn second_observation_records_changes() {
        let (db, _temp_dir) = create_test_db().await;
        let source = Arc::new(MapSource::new());
        source.set("bob", candidate("bob", "hello"));

        db.enqueue_queue_items(&[queue_item("bob")]).await.unwrap();
        run_cycle(db.clone(), source.clone(), &test_config(), 20)
            .await
            .unwrap();

        let mut changed = candidate("bob", "new motto");
        changed.badge_codes.insert("ACH_Login1".to_string());
        source.set("bob", changed);

        db.enqueue_queue_items(&[queue_item("bob")]).await.unwrap();
        let report = run_cycle(db.clone(), source, &test_config(), 20)
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.activities_detected, 2);

        let activities = db.list_activities("bob", "com", 10).await.unwrap();
        assert_eq!(activities.len(), 2);
        let types: Vec<&str> = activities
            .iter()
            .map(|a| a.activity_type.as_str())
            .collect();
        assert!(types.contains(&"motto_change"));
        assert!(types.contains(&"badge"));
    }

    #[tokio::test]
    async fn one_failing_item_does_not_abort_the_cycle() {
        let (db, _temp_dir) = create_test_db().await;
        let source = Arc::new(MapSource::new());
        source.set("bob", candidate("bob", "hello"));
        source.fail("carol", "HTTP 500");

        db.enqueue_queue_items(&[queue_item("bob"), queue_item("carol")])
            .await
            .unwrap();

        let report = run_cycle(db.clone(), source, &test_config(), 20)
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failures, 1);

        let stats = db.queue_stats().await.unwrap();
        assert_eq!(stats.completed, 1);
        // Failed item went back to pending for a retry.
        assert_eq!(stats.pending, 1);

        // The failed friend has no snapshot and no activities.
        assert!(db.get_snapshot("carol", "com").await.unwrap().is_none());
        assert!(db.list_activities("carol", "com", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_size_limits_leased_items_per_cycle() {
        let (db, _temp_dir) = create_test_db().await;
        let source = Arc::new(MapSource::new());
        source.set("bob", candidate("bob", "a"));
        source.set("carol", candidate("carol", "b"));
        source.set("dave", candidate("dave", "c"));

        db.enqueue_queue_items(&[
            queue_item("bob"),
            queue_item("carol"),
            queue_item("dave"),
        ])
        .await
        .unwrap();

        let report = run_cycle(db.clone(), source, &test_config(), 2)
            .await
            .unwrap();
        assert_eq!(report.processed, 2);

        let stats = db.queue_stats().await.unwrap();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 1);
    }
}

//! Queue population
//!
//! Expands a tracked user's friend list into queue items. This is an
//! operator-triggered action: a friend-list failure is surfaced to the
//! caller and nothing is enqueued (no partial queue mutation).

use rand::Rng;

use crate::data::{Database, NewQueueItem};
use crate::error::AppError;
use crate::hotel::ProfileSource;

/// Enqueue change-detection work for every friend of `owner_name`.
///
/// Idempotent with respect to active queue items: friends that already
/// have a pending or processing item are skipped by the store.
///
/// # Returns
/// Number of queue items actually inserted.
///
/// # Errors
/// Fails loudly if the friend list cannot be retrieved; no items are
/// enqueued in that case.
pub async fn populate(
    db: &Database,
    source: &dyn ProfileSource,
    owner_name: &str,
    owner_id: &str,
    hotel: &str,
) -> Result<usize, AppError> {
    let friends = source.fetch_friends(owner_id, hotel).await?;

    if friends.is_empty() {
        tracing::info!(owner = owner_name, hotel, "Owner has no friends to enqueue");
        return Ok(0);
    }

    let items: Vec<NewQueueItem> = {
        let mut rng = rand::thread_rng();
        friends
            .into_iter()
            .map(|friend| NewQueueItem {
                owner_name: owner_name.to_string(),
                owner_id: owner_id.to_string(),
                hotel: hotel.to_string(),
                friend_name: friend.name,
                friend_id: friend.unique_id,
                // Spread priorities so processing order interleaves across
                // owners instead of following enqueue order.
                priority: rng.gen_range(0..100),
            })
            .collect()
    };

    let total = items.len();
    let inserted = db.enqueue_queue_items(&items).await?;

    crate::metrics::QUEUE_ITEMS_ENQUEUED_TOTAL
        .with_label_values(&[hotel])
        .inc_by(inserted as u64);

    tracing::info!(
        owner = owner_name,
        hotel,
        friends = total,
        inserted,
        "Populated queue from friend list"
    );

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Database, ProfileSnapshotCandidate};
    use crate::hotel::HotelFriend;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StubSource {
        friends: Result<Vec<HotelFriend>, String>,
    }

    #[async_trait]
    impl ProfileSource for StubSource {
        async fn fetch_profile(
            &self,
            _friend_name: &str,
            _hotel: &str,
        ) -> Result<ProfileSnapshotCandidate, AppError> {
            unimplemented!("populate never fetches profiles")
        }

        async fn fetch_friends(
            &self,
            _user_id: &str,
            _hotel: &str,
        ) -> Result<Vec<HotelFriend>, AppError> {
            self.friends
                .clone()
                .map_err(AppError::HotelApi)
        }
    }

    fn friend(name: &str) -> HotelFriend {
        HotelFriend {
            unique_id: format!("hhus-{name}"),
            name: name.to_string(),
            motto: String::new(),
            online: false,
        }
    }

    async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn populate_enqueues_one_item_per_friend() {
        let (db, _temp_dir) = create_test_db().await;
        let source = StubSource {
            friends: Ok(vec![friend("bob"), friend("carol")]),
        };

        let inserted = populate(&db, &source, "alice", "hhus-alice", "com")
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let stats = db.queue_stats().await.unwrap();
        assert_eq!(stats.pending, 2);
    }

    #[tokio::test]
    async fn populate_twice_inserts_no_additional_active_rows() {
        let (db, _temp_dir) = create_test_db().await;
        let source = StubSource {
            friends: Ok(vec![friend("bob"), friend("carol")]),
        };

        populate(&db, &source, "alice", "hhus-alice", "com")
            .await
            .unwrap();
        let second = populate(&db, &source, "alice", "hhus-alice", "com")
            .await
            .unwrap();
        assert_eq!(second, 0);
        assert_eq!(db.queue_stats().await.unwrap().pending, 2);
    }

    #[tokio::test]
    async fn populate_fails_loudly_without_partial_enqueue() {
        let (db, _temp_dir) = create_test_db().await;
        let source = StubSource {
            friends: Err("HTTP 404".to_string()),
        };

        let error = populate(&db, &source, "alice", "hhus-alice", "com")
            .await
            .expect_err("friend list failure must surface");
        assert!(matches!(error, AppError::HotelApi(_)));
        assert_eq!(db.queue_stats().await.unwrap().pending, 0);
    }
}

//! SQLite database operations
//!
//! All database access goes through this module: tracked users, the
//! work queue, profile snapshots, and the activity log. The queue is
//! the only coordination primitive in the system; leasing is done with
//! single conditional UPDATE statements so concurrent callers can never
//! lease the same item.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Exponential retry backoff: base * 2^(attempts-1), capped at one hour.
///
/// `attempts` is the attempt count after the failure being recorded.
fn retry_backoff(base: Duration, attempts: i64) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    let backoff = base * 2_i32.saturating_pow(exponent);
    backoff.min(Duration::hours(1))
}

fn parse_string_set(raw: &str) -> HashSet<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_json_value(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
}

fn encode_string_set(set: &HashSet<String>) -> Result<String, AppError> {
    let mut values: Vec<&String> = set.iter().collect();
    values.sort();
    serde_json::to_string(&values).map_err(|e| AppError::Internal(e.into()))
}

/// Raw snapshot row; JSON columns are decoded into [`ProfileSnapshot`].
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    habbo_name: String,
    habbo_id: String,
    hotel: String,
    figure_string: String,
    motto: String,
    online: bool,
    badge_codes: String,
    group_ids: String,
    room_ids: String,
    photo_ids: String,
    raw_profile: String,
    updated_at: DateTime<Utc>,
}

impl From<SnapshotRow> for ProfileSnapshot {
    fn from(row: SnapshotRow) -> Self {
        ProfileSnapshot {
            habbo_name: row.habbo_name,
            habbo_id: row.habbo_id,
            hotel: row.hotel,
            figure_string: row.figure_string,
            motto: row.motto,
            online: row.online,
            badge_codes: parse_string_set(&row.badge_codes),
            group_ids: parse_string_set(&row.group_ids),
            room_ids: parse_string_set(&row.room_ids),
            photo_ids: parse_string_set(&row.photo_ids),
            raw_profile: serde_json::from_str(&row.raw_profile)
                .unwrap_or(serde_json::Value::Null),
            updated_at: row.updated_at,
        }
    }
}

/// Raw activity row; JSON columns are decoded into [`ActivityRecord`].
#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    habbo_name: String,
    habbo_id: String,
    hotel: String,
    activity_type: String,
    description: String,
    old_data: Option<String>,
    new_data: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityRecord {
    fn from(row: ActivityRow) -> Self {
        ActivityRecord {
            id: row.id,
            habbo_name: row.habbo_name,
            habbo_id: row.habbo_id,
            hotel: row.hotel,
            activity_type: row.activity_type,
            description: row.description,
            old_data: parse_json_value(row.old_data),
            new_data: parse_json_value(row.new_data),
            created_at: row.created_at,
        }
    }
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        // Create connection string
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());

        // Create connection pool
        let pool = SqlitePool::connect(&connection_string).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Tracked users
    // =========================================================================

    /// Create or reactivate a tracked user.
    ///
    /// Keyed by (habbo_name, hotel); re-registering an untracked user
    /// flips it back to active.
    pub async fn upsert_tracked_user(&self, user: &TrackedUser) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tracked_users (
                id, habbo_name, habbo_id, hotel, is_active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (habbo_name, hotel) DO UPDATE SET
                habbo_id = excluded.habbo_id,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.habbo_name)
        .bind(&user.habbo_id)
        .bind(&user.hotel)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a tracked user by name and hotel
    pub async fn get_tracked_user(
        &self,
        habbo_name: &str,
        hotel: &str,
    ) -> Result<Option<TrackedUser>, AppError> {
        let user = sqlx::query_as::<_, TrackedUser>(
            "SELECT * FROM tracked_users WHERE habbo_name = ? AND hotel = ?",
        )
        .bind(habbo_name)
        .bind(hotel)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// List all active tracked users
    pub async fn list_active_tracked_users(&self) -> Result<Vec<TrackedUser>, AppError> {
        let users = sqlx::query_as::<_, TrackedUser>(
            "SELECT * FROM tracked_users WHERE is_active = TRUE ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// Deactivate a tracked user (never hard-deleted).
    ///
    /// # Returns
    /// `true` if a row was deactivated, `false` if no such user exists.
    pub async fn deactivate_tracked_user(
        &self,
        habbo_name: &str,
        hotel: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_users
            SET is_active = FALSE, updated_at = ?
            WHERE habbo_name = ? AND hotel = ? AND is_active = TRUE
            "#,
        )
        .bind(updated_at)
        .bind(habbo_name)
        .bind(hotel)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Work queue
    // =========================================================================

    /// Idempotent upsert of queue items.
    ///
    /// An existing active (pending or processing) item for the same
    /// (owner_name, friend_name, hotel) triple is left untouched: no
    /// priority bump, no duplicate row. Terminal rows do not block
    /// re-enqueueing.
    ///
    /// The insert is guarded at the SQL statement level, so concurrent
    /// populators cannot race a duplicate past the check.
    ///
    /// # Returns
    /// Number of items actually inserted.
    pub async fn enqueue_queue_items(&self, items: &[NewQueueItem]) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for item in items {
            let result = sqlx::query(
                r#"
                INSERT INTO queue_items (
                    id, owner_name, owner_id, hotel, friend_name, friend_id,
                    priority, status, attempts, created_at
                )
                SELECT ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?
                WHERE NOT EXISTS (
                    SELECT 1 FROM queue_items
                    WHERE owner_name = ? AND friend_name = ? AND hotel = ?
                      AND status IN ('pending', 'processing')
                )
                "#,
            )
            .bind(EntityId::new().0)
            .bind(&item.owner_name)
            .bind(&item.owner_id)
            .bind(&item.hotel)
            .bind(&item.friend_name)
            .bind(&item.friend_id)
            .bind(item.priority)
            .bind(now)
            .bind(&item.owner_name)
            .bind(&item.friend_name)
            .bind(&item.hotel)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;

        Ok(inserted)
    }

    /// Atomically lease up to `n` pending items.
    ///
    /// Selects by priority desc, created_at asc, skipping items whose
    /// retry backoff has not elapsed, and transitions them to
    /// `processing` in a single conditional UPDATE. Safe under
    /// concurrent callers: two callers can never lease the same item.
    pub async fn lease_batch(&self, n: u32) -> Result<Vec<QueueItem>, AppError> {
        let now = Utc::now();

        let mut items = sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE queue_items
            SET status = 'processing', leased_at = ?
            WHERE id IN (
                SELECT id FROM queue_items
                WHERE status = 'pending'
                  AND (next_eligible_at IS NULL OR next_eligible_at <= ?)
                ORDER BY priority DESC, created_at ASC
                LIMIT ?
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING row order is unspecified; restore the lease order.
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        Ok(items)
    }

    /// Mark a leased item completed.
    ///
    /// # Returns
    /// `true` if the item was in `processing`, `false` otherwise
    /// (e.g., its lease was reclaimed while the worker was still running).
    pub async fn resolve_completed(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'completed', leased_at = NULL, last_error = NULL
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a failed attempt on a leased item.
    ///
    /// Increments `attempts`; at `max_attempts` the item becomes terminal
    /// `failed` (dead-letter, excluded from future leases), otherwise it
    /// returns to `pending` with an exponential backoff gate.
    ///
    /// # Returns
    /// The status the item ended up in.
    pub async fn resolve_failed(
        &self,
        id: &str,
        error: &str,
        max_attempts: i64,
        backoff_base: Duration,
    ) -> Result<QueueStatus, AppError> {
        let mut tx = self.pool.begin().await?;

        let attempts = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE queue_items
            SET attempts = attempts + 1, last_error = ?, leased_at = NULL
            WHERE id = ?
            RETURNING attempts
            "#,
        )
        .bind(error)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let status = if attempts >= max_attempts {
            sqlx::query("UPDATE queue_items SET status = 'failed', next_eligible_at = NULL WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            QueueStatus::Failed
        } else {
            let next_eligible_at = Utc::now() + retry_backoff(backoff_base, attempts);
            sqlx::query("UPDATE queue_items SET status = 'pending', next_eligible_at = ? WHERE id = ?")
                .bind(next_eligible_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            QueueStatus::Pending
        };

        tx.commit().await?;

        Ok(status)
    }

    /// Reset abandoned leases.
    ///
    /// Any `processing` item whose lease is older than `timeout` is
    /// returned to `pending` with `attempts` incremented exactly once.
    /// This is what prevents permanent queue starvation when a worker
    /// crashes mid-item.
    ///
    /// # Returns
    /// Number of items reclaimed.
    pub async fn reclaim_expired_leases(&self, timeout: Duration) -> Result<u64, AppError> {
        let cutoff = Utc::now() - timeout;

        let result = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'pending', leased_at = NULL, attempts = attempts + 1
            WHERE status = 'processing' AND leased_at <= ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            tracing::warn!(reclaimed, "Reclaimed expired processing leases");
            crate::metrics::LEASES_RECLAIMED_TOTAL.inc_by(reclaimed);
        }

        Ok(reclaimed)
    }

    /// Per-status queue counts.
    ///
    /// Also refreshes the queue depth gauges.
    pub async fn queue_stats(&self) -> Result<QueueStats, AppError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM queue_items GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                other => tracing::warn!(status = other, "Unknown queue item status"),
            }
        }

        use crate::metrics::QUEUE_DEPTH;
        QUEUE_DEPTH.with_label_values(&["pending"]).set(stats.pending);
        QUEUE_DEPTH
            .with_label_values(&["processing"])
            .set(stats.processing);
        QUEUE_DEPTH
            .with_label_values(&["completed"])
            .set(stats.completed);
        QUEUE_DEPTH.with_label_values(&["failed"]).set(stats.failed);

        Ok(stats)
    }

    /// Get a queue item by ID
    pub async fn get_queue_item(&self, id: &str) -> Result<Option<QueueItem>, AppError> {
        let item = sqlx::query_as::<_, QueueItem>("SELECT * FROM queue_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    // =========================================================================
    // Profile snapshots
    // =========================================================================

    /// Get the current snapshot for a profile
    ///
    /// # Returns
    /// The snapshot, or None if the profile has never been observed.
    pub async fn get_snapshot(
        &self,
        habbo_name: &str,
        hotel: &str,
    ) -> Result<Option<ProfileSnapshot>, AppError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM profile_snapshots WHERE habbo_name = ? AND hotel = ?",
        )
        .bind(habbo_name)
        .bind(hotel)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProfileSnapshot::from))
    }

    /// Replace the current snapshot for a profile.
    ///
    /// Exactly one snapshot exists per (habbo_name, hotel); this upserts.
    pub async fn replace_snapshot(&self, snapshot: &ProfileSnapshot) -> Result<(), AppError> {
        let raw_profile = serde_json::to_string(&snapshot.raw_profile)
            .map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO profile_snapshots (
                habbo_name, habbo_id, hotel, figure_string, motto, online,
                badge_codes, group_ids, room_ids, photo_ids, raw_profile, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.habbo_name)
        .bind(&snapshot.habbo_id)
        .bind(&snapshot.hotel)
        .bind(&snapshot.figure_string)
        .bind(&snapshot.motto)
        .bind(snapshot.online)
        .bind(encode_string_set(&snapshot.badge_codes)?)
        .bind(encode_string_set(&snapshot.group_ids)?)
        .bind(encode_string_set(&snapshot.room_ids)?)
        .bind(encode_string_set(&snapshot.photo_ids)?)
        .bind(raw_profile)
        .bind(snapshot.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Activity log
    // =========================================================================

    /// Append activity records (append-only, never mutated).
    pub async fn insert_activities(&self, records: &[ActivityRecord]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            let old_data = record
                .old_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| AppError::Internal(e.into()))?;
            let new_data = record
                .new_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| AppError::Internal(e.into()))?;

            sqlx::query(
                r#"
                INSERT INTO activity_records (
                    id, habbo_name, habbo_id, hotel, activity_type,
                    description, old_data, new_data, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.habbo_name)
            .bind(&record.habbo_id)
            .bind(&record.hotel)
            .bind(&record.activity_type)
            .bind(&record.description)
            .bind(old_data)
            .bind(new_data)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// List activities for a profile, newest first.
    pub async fn list_activities(
        &self,
        habbo_name: &str,
        hotel: &str,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, AppError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT * FROM activity_records
            WHERE habbo_name = ? AND hotel = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(habbo_name)
        .bind(hotel)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityRecord::from).collect())
    }
}

//! Data models
//!
//! Rust structs representing database entities and fetch results.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tracked User
// =============================================================================

/// A profile under observation
///
/// Created when a user registers or is discovered as someone's friend.
/// Deactivated (never hard-deleted) when untracked.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackedUser {
    pub id: String,
    pub habbo_name: String,
    /// Platform-assigned unique ID (e.g., "hhus-abc123...")
    pub habbo_id: String,
    /// Platform region code (e.g., "com", "de", "com.br")
    pub hotel: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Work Queue
// =============================================================================

/// One pending unit of change-detection work
///
/// At most one active (pending or processing) item exists per
/// (owner_name, friend_name, hotel) triple.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueItem {
    pub id: String,
    /// Tracked user whose friend list produced this item
    pub owner_name: String,
    pub owner_id: String,
    pub hotel: String,
    /// Friend whose profile will be fetched and diffed
    pub friend_name: String,
    pub friend_id: String,
    /// Higher priority is leased first
    pub priority: i64,
    /// Status: pending, processing, completed, failed
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// Set when leased; a stale lease is reclaimed by the next cycle
    pub leased_at: Option<DateTime<Utc>>,
    /// Retry backoff gate; a pending item is not leased before this
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Input for enqueueing one queue item
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub owner_name: String,
    pub owner_id: String,
    pub hotel: String,
    pub friend_name: String,
    pub friend_id: String,
    pub priority: i64,
}

/// Per-status queue counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

// =============================================================================
// Profile Snapshot
// =============================================================================

/// Last known state of one tracked profile
///
/// Exactly one current snapshot exists per (habbo_name, hotel);
/// it is replaced on every successful diff cycle. Absence means
/// "never observed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub habbo_name: String,
    pub habbo_id: String,
    pub hotel: String,
    pub figure_string: String,
    pub motto: String,
    pub online: bool,
    pub badge_codes: HashSet<String>,
    pub group_ids: HashSet<String>,
    pub room_ids: HashSet<String>,
    /// Photos already announced or seen; needed for the photo diff rule
    pub photo_ids: HashSet<String>,
    /// Opaque payload kept for future diffing
    pub raw_profile: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// A photo as observed during a fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoObservation {
    pub id: String,
    /// When the photo was taken, if the API reported it
    pub taken_at: Option<DateTime<Utc>>,
}

/// Freshly fetched profile state, not yet persisted
///
/// Produced by the profile fetcher; consumed by the change detector
/// and converted into a [`ProfileSnapshot`] on success.
#[derive(Debug, Clone)]
pub struct ProfileSnapshotCandidate {
    pub habbo_name: String,
    pub habbo_id: String,
    pub hotel: String,
    pub figure_string: String,
    pub motto: String,
    pub online: bool,
    pub badge_codes: HashSet<String>,
    pub group_ids: HashSet<String>,
    pub room_ids: HashSet<String>,
    pub photos: Vec<PhotoObservation>,
    pub raw_profile: serde_json::Value,
}

impl ProfileSnapshotCandidate {
    /// Convert into the snapshot that replaces the stored one.
    pub fn into_snapshot(self, now: DateTime<Utc>) -> ProfileSnapshot {
        ProfileSnapshot {
            habbo_name: self.habbo_name,
            habbo_id: self.habbo_id,
            hotel: self.hotel,
            figure_string: self.figure_string,
            motto: self.motto,
            online: self.online,
            badge_codes: self.badge_codes,
            group_ids: self.group_ids,
            room_ids: self.room_ids,
            photo_ids: self.photos.into_iter().map(|photo| photo.id).collect(),
            raw_profile: self.raw_profile,
            updated_at: now,
        }
    }
}

// =============================================================================
// Activity Log
// =============================================================================

/// One detected change, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub habbo_name: String,
    pub habbo_id: String,
    pub hotel: String,
    /// Type: motto_change, look_change, badge, status_change,
    /// group_joined, room_created, photo_posted
    pub activity_type: String,
    pub description: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Activity types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    MottoChange,
    LookChange,
    Badge,
    StatusChange,
    GroupJoined,
    RoomCreated,
    PhotoPosted,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MottoChange => "motto_change",
            Self::LookChange => "look_change",
            Self::Badge => "badge",
            Self::StatusChange => "status_change",
            Self::GroupJoined => "group_joined",
            Self::RoomCreated => "room_created",
            Self::PhotoPosted => "photo_posted",
        }
    }
}

//! API request/response DTOs
//!
//! Data Transfer Objects for the tracker invocation surface and the
//! tracked user registry.

use serde::{Deserialize, Serialize};

use crate::data::QueueStats;

/// What a `POST /tracker` invocation should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerMode {
    PopulateQueue,
    ProcessQueue,
    Stats,
}

/// POST /tracker request body
///
/// `user_habbo_name`/`hotel` narrow `populate_queue` to one owner;
/// without them every active tracked user is populated.
#[derive(Debug, Deserialize)]
pub struct TrackerRequest {
    pub mode: TrackerMode,
    #[serde(default)]
    pub user_habbo_name: Option<String>,
    #[serde(default)]
    pub user_habbo_id: Option<String>,
    #[serde(default)]
    pub hotel: Option<String>,
    /// Overrides the configured batch size for `process_queue`
    #[serde(default)]
    pub batch_size: Option<u32>,
}

/// POST /tracker response body
#[derive(Debug, Serialize)]
pub struct TrackerResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activities_detected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_stats: Option<QueueStats>,
}

impl TrackerResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            processed: None,
            activities_detected: None,
            queue_stats: None,
        }
    }
}

/// POST /api/tracked_users request body
#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub habbo_name: String,
    pub hotel: String,
}

/// Query parameters for the activity feed
#[derive(Debug, Deserialize)]
pub struct ActivityFeedQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

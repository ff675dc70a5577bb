//! Tracked user registry and activity feed endpoints
//!
//! Registration resolves the platform-assigned ID through the public
//! hotel API, so a typo'd name fails here instead of poisoning the
//! queue later. Untracking deactivates; history is never deleted.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
};
use chrono::Utc;

use crate::AppState;
use crate::api::{ActivityFeedQuery, RegisterUserRequest};
use crate::data::{ActivityRecord, EntityId, TrackedUser};
use crate::error::AppError;

const DEFAULT_FEED_LIMIT: u32 = 50;
const MAX_FEED_LIMIT: u32 = 200;

/// Create users router
///
/// Routes:
/// - POST /tracked_users - Register a user for tracking
/// - DELETE /tracked_users/:hotel/:name - Stop tracking a user
/// - GET /users/:hotel/:name/activities - Activity feed, newest first
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/tracked_users", post(register_user))
        .route("/tracked_users/:hotel/:name", delete(untrack_user))
        .route("/users/:hotel/:name/activities", get(list_activities))
}

/// POST /api/tracked_users
async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterUserRequest>,
) -> Result<Json<TrackedUser>, AppError> {
    if request.habbo_name.trim().is_empty() {
        return Err(AppError::Validation("habbo_name must not be empty".to_string()));
    }

    let user = resolve_tracked_user(&state, &request.habbo_name, None, &request.hotel).await?;
    Ok(Json(user))
}

/// DELETE /api/tracked_users/:hotel/:name
async fn untrack_user(
    State(state): State<AppState>,
    Path((hotel, name)): Path<(String, String)>,
) -> Result<(), AppError> {
    let deactivated = state
        .db
        .deactivate_tracked_user(&name, &hotel, Utc::now())
        .await?;

    if !deactivated {
        return Err(AppError::NotFound);
    }

    tracing::info!(user = %name, hotel = %hotel, "Tracked user deactivated");
    Ok(())
}

/// GET /api/users/:hotel/:name/activities
async fn list_activities(
    State(state): State<AppState>,
    Path((hotel, name)): Path<(String, String)>,
    Query(query): Query<ActivityFeedQuery>,
) -> Result<Json<Vec<ActivityRecord>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .min(MAX_FEED_LIMIT);

    let activities = state.db.list_activities(&name, &hotel, limit).await?;
    Ok(Json(activities))
}

/// Look up a tracked user, registering them if unknown.
///
/// When the registry has no row and no ID was supplied, the ID is
/// resolved through a profile fetch, which doubles as an existence
/// check against the hotel API.
pub(super) async fn resolve_tracked_user(
    state: &AppState,
    habbo_name: &str,
    habbo_id: Option<&str>,
    hotel: &str,
) -> Result<TrackedUser, AppError> {
    if let Some(existing) = state.db.get_tracked_user(habbo_name, hotel).await? {
        if existing.is_active {
            return Ok(existing);
        }
    }

    let habbo_id = match habbo_id {
        Some(id) => id.to_string(),
        None => {
            let profile = state.hotel.fetch_profile(habbo_name, hotel).await?;
            profile.habbo_id
        }
    };

    let now = Utc::now();
    let user = TrackedUser {
        id: EntityId::new().0,
        habbo_name: habbo_name.to_string(),
        habbo_id,
        hotel: hotel.to_string(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    state.db.upsert_tracked_user(&user).await?;
    tracing::info!(user = %user.habbo_name, hotel = %hotel, "Tracked user registered");

    // The upsert keeps the original row ID on conflict; re-read so the
    // caller sees the persisted row.
    state
        .db
        .get_tracked_user(habbo_name, hotel)
        .await?
        .ok_or(AppError::NotFound)
}

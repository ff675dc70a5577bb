//! Tracker invocation endpoints
//!
//! The scheduler entry point. Each `POST /tracker` invocation is
//! stateless: an external cron (or the built-in scheduler loop) calls
//! it, the work happens, and the process keeps no cycle state around.

use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};

use crate::AppState;
use crate::api::{TrackerMode, TrackerRequest, TrackerResponse};
use crate::data::QueueStats;
use crate::error::AppError;
use crate::tracker;

/// Create tracker router
///
/// Routes:
/// - POST /tracker - Run one populate/process/stats invocation
/// - GET /tracker/stats - Per-status queue counts
pub fn tracker_router() -> Router<AppState> {
    Router::new()
        .route("/tracker", post(invoke_tracker))
        .route("/tracker/stats", get(queue_stats))
}

/// POST /tracker
///
/// Dispatches on `mode`. `populate_queue` without a user name expands
/// the friend lists of every active tracked user.
async fn invoke_tracker(
    State(state): State<AppState>,
    Json(request): Json<TrackerRequest>,
) -> Result<Json<TrackerResponse>, AppError> {
    match request.mode {
        TrackerMode::PopulateQueue => populate_queue(&state, &request).await.map(Json),
        TrackerMode::ProcessQueue => process_queue(&state, &request).await.map(Json),
        TrackerMode::Stats => {
            let stats = state.db.queue_stats().await?;
            Ok(Json(stats_response(stats)))
        }
    }
}

/// GET /tracker/stats
async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, AppError> {
    Ok(Json(state.db.queue_stats().await?))
}

async fn populate_queue(
    state: &AppState,
    request: &TrackerRequest,
) -> Result<TrackerResponse, AppError> {
    if let Some(owner_name) = request.user_habbo_name.as_deref() {
        let hotel = request.hotel.as_deref().ok_or_else(|| {
            AppError::Validation("hotel is required when user_habbo_name is given".to_string())
        })?;

        let owner = crate::api::users::resolve_tracked_user(
            state,
            owner_name,
            request.user_habbo_id.as_deref(),
            hotel,
        )
        .await?;

        let inserted = tracker::populate(
            &state.db,
            state.hotel.as_ref(),
            &owner.habbo_name,
            &owner.habbo_id,
            &owner.hotel,
        )
        .await?;

        return Ok(TrackerResponse {
            processed: Some(inserted),
            ..TrackerResponse::message(format!(
                "Enqueued {} items for {}",
                inserted, owner.habbo_name
            ))
        });
    }

    // No owner given: expand every active tracked user. A failing
    // friend list skips that owner only; its enqueue stays all-or-nothing.
    let owners = state.db.list_active_tracked_users().await?;
    let mut inserted = 0usize;
    let mut failed = 0usize;

    for owner in &owners {
        match tracker::populate(
            &state.db,
            state.hotel.as_ref(),
            &owner.habbo_name,
            &owner.habbo_id,
            &owner.hotel,
        )
        .await
        {
            Ok(count) => inserted += count,
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    owner = %owner.habbo_name,
                    hotel = %owner.hotel,
                    error = %e,
                    "Skipping owner, friend list fetch failed"
                );
            }
        }
    }

    Ok(TrackerResponse {
        success: failed < owners.len() || owners.is_empty(),
        processed: Some(inserted),
        ..TrackerResponse::message(format!(
            "Enqueued {} items across {} tracked users ({} skipped)",
            inserted,
            owners.len(),
            failed
        ))
    })
}

async fn process_queue(
    state: &AppState,
    request: &TrackerRequest,
) -> Result<TrackerResponse, AppError> {
    let batch_size = request
        .batch_size
        .unwrap_or(state.config.tracker.batch_size);

    let report = tracker::run_cycle(
        state.db.clone(),
        state.hotel.clone(),
        &state.config.tracker,
        batch_size,
    )
    .await?;

    Ok(TrackerResponse {
        processed: Some(report.processed),
        activities_detected: Some(report.activities_detected),
        ..TrackerResponse::message(format!(
            "Processed {} items, {} failed",
            report.processed, report.failures
        ))
    })
}

fn stats_response(stats: QueueStats) -> TrackerResponse {
    TrackerResponse {
        queue_stats: Some(stats),
        ..TrackerResponse::message("Queue stats")
    }
}

//! API layer
//!
//! HTTP handlers for:
//! - Tracker invocation (scheduler entry point + stats)
//! - Tracked user registry and activity feed
//! - Metrics (Prometheus)

mod dto;
pub mod metrics;
mod tracker;
mod users;

pub use dto::*;

pub use metrics::metrics_router;
pub use tracker::tracker_router;
pub use users::users_router;

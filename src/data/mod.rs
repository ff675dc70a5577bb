//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations (queue, snapshots, activity log)
//! - Data models

mod database;
mod models;

pub use database::Database;
pub use models::*;

//! Public hotel API client
//!
//! Read-only, unauthenticated JSON API consumed as a black box.
//! One primary user lookup plus auxiliary badge/group/room/photo
//! fetches per profile; auxiliary failures degrade to empty facets.

mod client;
mod types;

pub use client::{HotelApiClient, ProfileSource};
pub use types::*;

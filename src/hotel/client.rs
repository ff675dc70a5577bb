//! Hotel API HTTP client

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;

use super::types::*;
use crate::data::{PhotoObservation, ProfileSnapshotCandidate};
use crate::error::AppError;

/// Hotel region codes with a public API domain.
const KNOWN_HOTELS: &[&str] = &[
    "com", "com.br", "com.tr", "de", "es", "fi", "fr", "it", "nl",
];

/// Base URL for a hotel's public API.
///
/// # Errors
/// Returns a validation error for unknown region codes.
pub fn api_base_url(hotel: &str) -> Result<String, AppError> {
    if !KNOWN_HOTELS.contains(&hotel) {
        return Err(AppError::Validation(format!(
            "Unknown hotel region code: {}",
            hotel
        )));
    }
    Ok(format!("https://www.habbo.{}/api/public", hotel))
}

/// URL for the primary user lookup.
///
/// Names can contain reserved characters (`=`, `?`, spaces), so the
/// query value is percent-encoded.
fn user_lookup_url(base: &str, name: &str) -> String {
    format!("{}/users?name={}", base, urlencoding::encode(name))
}

/// URL for a per-user resource (badges, groups, rooms, photos, friends).
fn user_resource_url(base: &str, user_id: &str, resource: &str) -> String {
    format!("{}/users/{}/{}", base, urlencoding::encode(user_id), resource)
}

/// Source of profile and friend-list data.
///
/// Implemented by [`HotelApiClient`] for production and by in-memory
/// stubs in tests, so the worker pool and populator never need live HTTP.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the current state of one profile.
    ///
    /// The primary user lookup is fatal on failure; each auxiliary
    /// facet (badges, groups, rooms, photos) degrades to an empty set.
    async fn fetch_profile(
        &self,
        friend_name: &str,
        hotel: &str,
    ) -> Result<ProfileSnapshotCandidate, AppError>;

    /// Fetch a user's friend list. Fatal on failure.
    async fn fetch_friends(&self, user_id: &str, hotel: &str)
    -> Result<Vec<HotelFriend>, AppError>;
}

/// HTTP client for the public hotel API
#[derive(Clone)]
pub struct HotelApiClient {
    http_client: Arc<reqwest::Client>,
}

impl HotelApiClient {
    /// Create new client around a shared reqwest client
    pub fn new(http_client: Arc<reqwest::Client>) -> Self {
        Self { http_client }
    }

    /// GET a JSON document, recording per-resource metrics.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T, AppError> {
        use crate::metrics::{HOTEL_API_REQUESTS_TOTAL, HOTEL_API_REQUEST_DURATION_SECONDS};

        let started = Instant::now();
        let observe = |status: &str| {
            HOTEL_API_REQUESTS_TOTAL
                .with_label_values(&[resource, status])
                .inc();
            HOTEL_API_REQUEST_DURATION_SECONDS
                .with_label_values(&[resource])
                .observe(started.elapsed().as_secs_f64());
        };

        let response = match self.http_client.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                observe("network_error");
                return Err(AppError::HotelApi(format!(
                    "Request to {} failed: {}",
                    url, error
                )));
            }
        };

        if !response.status().is_success() {
            observe("http_error");
            return Err(AppError::HotelApi(format!(
                "Hotel API returned HTTP {} for {}",
                response.status(),
                url
            )));
        }

        match response.json::<T>().await {
            Ok(body) => {
                observe("ok");
                Ok(body)
            }
            Err(error) => {
                observe("decode_error");
                Err(AppError::HotelApi(format!(
                    "Failed to decode response from {}: {}",
                    url, error
                )))
            }
        }
    }

    /// Look up a user by name. This is the primary profile request.
    pub async fn get_user_by_name(&self, name: &str, hotel: &str) -> Result<HotelUser, AppError> {
        let base = api_base_url(hotel)?;
        let url = user_lookup_url(&base, name);
        self.get_json(&url, "user").await
    }

    /// Fetch one auxiliary facet, degrading to empty on failure.
    async fn get_facet_or_empty<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: &str,
        name: &str,
    ) -> Vec<T> {
        match self.get_json::<Vec<T>>(url, resource).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    habbo_name = name,
                    resource,
                    %error,
                    "Auxiliary fetch failed, using empty facet"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ProfileSource for HotelApiClient {
    async fn fetch_profile(
        &self,
        friend_name: &str,
        hotel: &str,
    ) -> Result<ProfileSnapshotCandidate, AppError> {
        let base = api_base_url(hotel)?;

        // Primary request: fatal for this item on failure.
        let user = self.get_user_by_name(friend_name, hotel).await?;
        let raw_profile =
            serde_json::to_value(&user).map_err(|e| AppError::Internal(e.into()))?;

        // Auxiliary requests run in parallel; each is independently
        // fallible and degrades to an empty facet.
        let badges_url = user_resource_url(&base, &user.unique_id, "badges");
        let groups_url = user_resource_url(&base, &user.unique_id, "groups");
        let rooms_url = user_resource_url(&base, &user.unique_id, "rooms");
        let photos_url = user_resource_url(&base, &user.unique_id, "photos");

        let (badges, groups, rooms, photos) = tokio::join!(
            self.get_facet_or_empty::<HotelBadge>(&badges_url, "badges", friend_name),
            self.get_facet_or_empty::<HotelGroup>(&groups_url, "groups", friend_name),
            self.get_facet_or_empty::<HotelRoom>(&rooms_url, "rooms", friend_name),
            self.get_facet_or_empty::<HotelPhoto>(&photos_url, "photos", friend_name),
        );

        let badge_codes: HashSet<String> = badges.into_iter().map(|badge| badge.code).collect();
        let group_ids: HashSet<String> = groups.into_iter().map(|group| group.id).collect();
        let room_ids: HashSet<String> =
            rooms.into_iter().map(|room| room.id.to_string()).collect();
        let photos: Vec<PhotoObservation> = photos
            .into_iter()
            .map(|photo| PhotoObservation {
                id: photo.id,
                taken_at: photo
                    .time
                    .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            })
            .collect();

        Ok(ProfileSnapshotCandidate {
            habbo_name: user.name,
            habbo_id: user.unique_id,
            hotel: hotel.to_string(),
            figure_string: user.figure_string,
            motto: user.motto,
            online: user.online,
            badge_codes,
            group_ids,
            room_ids,
            photos,
            raw_profile,
        })
    }

    async fn fetch_friends(
        &self,
        user_id: &str,
        hotel: &str,
    ) -> Result<Vec<HotelFriend>, AppError> {
        let base = api_base_url(hotel)?;
        let url = user_resource_url(&base, user_id, "friends");
        self.get_json(&url, "friends").await
    }
}

#[cfg(test)]
mod tests {
    use super::{api_base_url, user_lookup_url, user_resource_url};
    use crate::error::AppError;

    #[test]
    fn api_base_url_maps_region_codes_to_domains() {
        assert_eq!(
            api_base_url("com").unwrap(),
            "https://www.habbo.com/api/public"
        );
        assert_eq!(
            api_base_url("com.br").unwrap(),
            "https://www.habbo.com.br/api/public"
        );
        assert_eq!(
            api_base_url("de").unwrap(),
            "https://www.habbo.de/api/public"
        );
    }

    #[test]
    fn api_base_url_rejects_unknown_regions() {
        let error = api_base_url("xx").expect_err("unknown hotel must be rejected");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn user_lookup_url_encodes_reserved_characters() {
        assert_eq!(
            user_lookup_url("https://www.habbo.com/api/public", "a=b?c"),
            "https://www.habbo.com/api/public/users?name=a%3Db%3Fc"
        );
        assert_eq!(
            user_lookup_url("https://www.habbo.com/api/public", "mr bob"),
            "https://www.habbo.com/api/public/users?name=mr%20bob"
        );
    }

    #[test]
    fn user_resource_url_encodes_the_id_segment() {
        assert_eq!(
            user_resource_url("https://www.habbo.de/api/public", "hhde-abc/../x", "badges"),
            "https://www.habbo.de/api/public/users/hhde-abc%2F..%2Fx/badges"
        );
    }
}

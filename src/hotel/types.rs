//! Hotel API response types
//!
//! The API omits fields freely; absence is never an error, so almost
//! everything is optional or defaulted. A non-2xx status or malformed
//! body is an error and is handled in the client.

use serde::{Deserialize, Serialize};

/// Primary user document (`GET /api/public/users?name=`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelUser {
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub figure_string: String,
    #[serde(default)]
    pub motto: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub member_since: Option<String>,
    #[serde(default)]
    pub last_access_time: Option<String>,
    #[serde(default)]
    pub profile_visible: Option<bool>,
}

/// Badge entry (`GET /api/public/users/{id}/badges`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBadge {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Group entry (`GET /api/public/users/{id}/groups`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelGroup {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub badge_code: Option<String>,
}

/// Room entry (`GET /api/public/users/{id}/rooms`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelRoom {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub creation_time: Option<String>,
}

/// Photo entry (`GET /api/public/users/{id}/photos`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelPhoto {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    /// Epoch milliseconds; the API reports when the photo was taken
    #[serde(default)]
    pub time: Option<i64>,
}

/// Friend entry (`GET /api/public/users/{id}/friends`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelFriend {
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub motto: String,
    #[serde(default)]
    pub online: bool,
}

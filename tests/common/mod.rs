//! Common test utilities for E2E tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use habwatch::data::ProfileSnapshotCandidate;
use habwatch::error::AppError;
use habwatch::hotel::{HotelFriend, ProfileSource};
use habwatch::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// In-memory hotel API, seeded per test
///
/// Profiles and friend lists are keyed by name / owner ID. Anything
/// not seeded behaves like an upstream failure.
pub struct StubHotel {
    profiles: Mutex<HashMap<String, ProfileSnapshotCandidate>>,
    friends: Mutex<HashMap<String, Vec<HotelFriend>>>,
}

impl StubHotel {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            friends: Mutex::new(HashMap::new()),
        }
    }

    pub fn seed_profile(&self, candidate: ProfileSnapshotCandidate) {
        self.profiles
            .lock()
            .unwrap()
            .insert(candidate.habbo_name.clone(), candidate);
    }

    pub fn seed_friends(&self, owner_id: &str, friends: Vec<HotelFriend>) {
        self.friends
            .lock()
            .unwrap()
            .insert(owner_id.to_string(), friends);
    }
}

#[async_trait]
impl ProfileSource for StubHotel {
    async fn fetch_profile(
        &self,
        friend_name: &str,
        _hotel: &str,
    ) -> Result<ProfileSnapshotCandidate, AppError> {
        self.profiles
            .lock()
            .unwrap()
            .get(friend_name)
            .cloned()
            .ok_or_else(|| AppError::HotelApi(format!("user {friend_name} not found")))
    }

    async fn fetch_friends(
        &self,
        user_id: &str,
        _hotel: &str,
    ) -> Result<Vec<HotelFriend>, AppError> {
        self.friends
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::HotelApi(format!("friend list for {user_id} unavailable")))
    }
}

/// Build a profile candidate with sensible defaults
pub fn profile(name: &str, motto: &str) -> ProfileSnapshotCandidate {
    ProfileSnapshotCandidate {
        habbo_name: name.to_string(),
        habbo_id: format!("hhus-{name}"),
        hotel: "com".to_string(),
        figure_string: "hr-100".to_string(),
        motto: motto.to_string(),
        online: false,
        badge_codes: HashSet::new(),
        group_ids: HashSet::new(),
        room_ids: HashSet::new(),
        photos: Vec::new(),
        raw_profile: serde_json::Value::Null,
    }
}

pub fn friend(name: &str) -> HotelFriend {
    HotelFriend {
        unique_id: format!("hhus-{name}"),
        name: name.to_string(),
        motto: String::new(),
        online: false,
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub hotel: Arc<StubHotel>,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance backed by a stub hotel API
    pub async fn new() -> Self {
        // Register metrics once per test process
        static METRICS_INIT: std::sync::Once = std::sync::Once::new();
        METRICS_INIT.call_once(habwatch::metrics::init_metrics);

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            hotel_api: config::HotelApiConfig {
                request_timeout_seconds: 10,
                user_agent: "habwatch-test/0.1".to_string(),
            },
            tracker: config::TrackerConfig {
                batch_size: 20,
                concurrency: 2,
                max_attempts: 3,
                lease_timeout_seconds: 300,
                backoff_base_seconds: 0,
                inter_item_delay_ms: 0,
                photo_window_hours: 24,
                scheduler_enabled: false,
                scheduler_interval_seconds: 300,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Connect the database directly so the stub hotel can be injected
        let db = habwatch::data::Database::connect(&db_path).await.unwrap();
        let hotel = Arc::new(StubHotel::new());

        let http_client = Arc::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap(),
        );

        let state = AppState {
            config: Arc::new(config),
            db: Arc::new(db),
            hotel: hotel.clone(),
            http_client,
        };

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = habwatch::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            hotel,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

//! Common test utilities for commutecast integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use commutecast_core::UserId;
use commutecast_service::auth::VERIFIED_USER_HEADER;
use commutecast_service::{create_router, AppState, ServiceConfig};
use commutecast_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        };

        let state = AppState::new(Arc::clone(&store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            test_user_id,
        }
    }

    /// Value for the verified-identity header.
    pub fn auth_header(&self) -> String {
        self.test_user_id.to_string()
    }

    /// The verified-identity header name.
    pub fn auth_header_name() -> &'static str {
        VERIFIED_USER_HEADER
    }

    /// A minimal valid create payload: the Dublin test route.
    pub fn create_payload() -> serde_json::Value {
        serde_json::json!({
            "title": "Home to office",
            "origin": {
                "location": { "latLng": { "latitude": 53.3498, "longitude": -6.2603 } },
                "label": "Home"
            },
            "destination": {
                "location": { "latLng": { "latitude": 53.3849, "longitude": -6.2579 } },
                "label": "Office"
            },
            "travelMode": "DRIVE",
            "staticDuration": "1500s",
            "city": "Dublin",
            "countryCode": "IE",
            "arriveBy": "08:30",
            "timezone": "Europe/Dublin",
            "daysOfWeek": ["MON", "FRI"]
        })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

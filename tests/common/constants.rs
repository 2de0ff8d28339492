//! Shared constants for end-to-end tests

/// HS256 secret the test server is configured with
pub const TEST_JWT_SECRET: &str = "e2e-test-secret";

/// Regular test user
pub const TEST_USER_ID: &str = "user-e2e-1";

/// A second user, for access-control tests
pub const OTHER_USER_ID: &str = "user-e2e-2";

/// Admin test user
pub const ADMIN_USER_ID: &str = "admin-e2e";

/// Timeout for individual HTTP requests
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval while waiting for server readiness
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

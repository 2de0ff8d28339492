//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all analytics-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client with bearer-token authentication
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Bearer token attached to every request, if any
    token: Option<String>,
}

/// Mints an HS256 token the test server accepts
pub fn mint_token(user_id: &str, roles: &[&str]) -> String {
    encode(
        &Header::default(),
        &json!({
            "sub": user_id,
            "email": format!("{}@example.com", user_id),
            "roles": roles,
            "exp": chrono::Utc::now().timestamp() + 3600
        }),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to mint test token")
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication failures and public endpoints.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Creates a client authenticated as the regular test user
    pub fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_USER_ID, &[])
    }

    /// Creates a client authenticated as the admin test user
    pub fn authenticated_admin(base_url: String) -> Self {
        Self::authenticated_as(base_url, ADMIN_USER_ID, &["admin"])
    }

    /// Creates a client authenticated as an arbitrary user with roles
    pub fn authenticated_as(base_url: String, user_id: &str, roles: &[&str]) -> Self {
        let mut client = Self::new(base_url);
        client.token = Some(mint_token(user_id, roles));
        client
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ========================================================================
    // Tracking Endpoints
    // ========================================================================

    /// POST /v1/analytics/plays
    pub async fn track_play(&self, song_id: &str, user_id: Option<&str>, duration: i64) -> Response {
        let mut body = json!({ "song_id": song_id, "duration_played": duration });
        if let Some(user_id) = user_id {
            body["user_id"] = json!(user_id);
        }
        self.track_play_raw(&body).await
    }

    /// POST /v1/analytics/plays with an arbitrary body
    pub async fn track_play_raw(&self, body: &Value) -> Response {
        self.with_auth(
            self.client
                .post(format!("{}/v1/analytics/plays", self.base_url)),
        )
        .json(body)
        .send()
        .await
        .expect("Track play request failed")
    }

    /// POST /v1/analytics/engagements
    pub async fn track_engagement(&self, body: &Value) -> Response {
        self.client
            .post(format!("{}/v1/analytics/engagements", self.base_url))
            .json(body)
            .send()
            .await
            .expect("Track engagement request failed")
    }

    // ========================================================================
    // Query Endpoints
    // ========================================================================

    /// GET /v1/analytics/songs/{song_id}
    pub async fn get_song_analytics(&self, song_id: &str, period: Option<&str>) -> Response {
        let mut url = format!("{}/v1/analytics/songs/{}", self.base_url, song_id);
        if let Some(period) = period {
            url.push_str(&format!("?period={}", period));
        }
        self.client
            .get(url)
            .send()
            .await
            .expect("Song analytics request failed")
    }

    /// GET /v1/analytics/trending
    pub async fn get_trending(&self, limit: Option<usize>, period: Option<&str>) -> Response {
        let mut url = format!("{}/v1/analytics/trending?", self.base_url);
        if let Some(limit) = limit {
            url.push_str(&format!("limit={}&", limit));
        }
        if let Some(period) = period {
            url.push_str(&format!("period={}", period));
        }
        self.client
            .get(url)
            .send()
            .await
            .expect("Trending request failed")
    }

    /// GET /v1/analytics/users/{user_id}/history
    pub async fn get_user_history(
        &self,
        user_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Response {
        let mut url = format!(
            "{}/v1/analytics/users/{}/history?",
            self.base_url, user_id
        );
        if let Some(limit) = limit {
            url.push_str(&format!("limit={}&", limit));
        }
        if let Some(offset) = offset {
            url.push_str(&format!("offset={}", offset));
        }
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("History request failed")
    }

    /// GET /v1/analytics/users/{user_id}/recommendations
    pub async fn get_recommendations(&self, user_id: &str, limit: Option<usize>) -> Response {
        let mut url = format!(
            "{}/v1/analytics/users/{}/recommendations",
            self.base_url, user_id
        );
        if let Some(limit) = limit {
            url.push_str(&format!("?limit={}", limit));
        }
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("Recommendations request failed")
    }

    /// GET /v1/analytics/platform
    pub async fn get_platform_analytics(&self, period: Option<&str>) -> Response {
        let mut url = format!("{}/v1/analytics/platform", self.base_url);
        if let Some(period) = period {
            url.push_str(&format!("?period={}", period));
        }
        self.with_auth(self.client.get(url))
            .send()
            .await
            .expect("Platform analytics request failed")
    }

    // ========================================================================
    // Operational Endpoints
    // ========================================================================

    /// GET /health
    pub async fn get_health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
    }

    /// GET /metrics
    pub async fn get_metrics(&self) -> Response {
        self.client
            .get(format!("{}/metrics", self.base_url))
            .send()
            .await
            .expect("Metrics request failed")
    }
}

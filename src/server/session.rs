use super::state::ServerState;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Claims carried by the bearer tokens the platform's auth service issues.
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

/// An authenticated caller, extracted from a verified bearer token.
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == "admin")
    }
}

pub const HEADER_AUTHORIZATION_KEY: &str = "Authorization";

pub enum SessionExtractionError {
    /// No bearer token on the request at all.
    MissingToken,
    /// A token was presented but failed verification.
    InvalidToken,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "Access token required" })),
            )
                .into_response(),
            SessionExtractionError::InvalidToken => (
                StatusCode::FORBIDDEN,
                Json(json!({ "success": false, "error": "Invalid or expired token" })),
            )
                .into_response(),
        }
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(HEADER_AUTHORIZATION_KEY)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

fn verify_token(token: &str, secret: &str) -> Option<Session> {
    let token_data = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    ) {
        Ok(data) => data,
        Err(e) => {
            debug!("Token verification failed: {}", e);
            return None;
        }
    };

    Some(Session {
        user_id: token_data.claims.sub,
        email: token_data.claims.email,
        roles: token_data.claims.roles,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).ok_or(SessionExtractionError::MissingToken)?;
        verify_token(&token, &ctx.config.jwt_secret).ok_or(SessionExtractionError::InvalidToken)
    }
}

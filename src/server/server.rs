use super::config::ServerConfig;
use super::http_layers::{log_requests, RequestsLoggingLevel};
use super::metrics::{metrics_handler, record_engagement_event, record_error, record_play_event};
use super::session::Session;
use super::state::{GuardedAnalyticsStore, GuardedQueryEngine, ServerState};
use crate::analytics::{
    AnalyticsError, EngagementEvent, EngagementStore, Period, PlayEvent, PlayEventStore,
    RefreshQueue, RefreshTask,
};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

const DEFAULT_TRENDING_LIMIT: usize = 10;
const DEFAULT_RECOMMENDATIONS_LIMIT: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 50;

fn error_response(err: AnalyticsError, endpoint: &str) -> Response {
    match err {
        AnalyticsError::Validation(msg) => {
            record_error("validation", endpoint);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": msg })),
            )
                .into_response()
        }
        AnalyticsError::NotFound(msg) => {
            record_error("not_found", endpoint);
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "error": msg })),
            )
                .into_response()
        }
        AnalyticsError::Store(e) => {
            error!("Store error on {}: {:#}", endpoint, e);
            record_error("store", endpoint);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

fn access_denied(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "success": false, "error": message })),
    )
        .into_response()
}

/// Accepts any JSON value and keeps it only if it is an integer, so a
/// malformed field degrades to the endpoint's default instead of a 422
/// from the Json extractor.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?.and_then(|v| v.as_i64()))
}

#[derive(Debug, Deserialize)]
struct TrackPlayRequest {
    song_id: Option<String>,
    user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    duration_played: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    timestamp: Option<i64>,
}

/// POST /v1/analytics/plays
///
/// The route requires a valid token but the attribution comes from the
/// request body: players submit anonymous plays through the same endpoint
/// by omitting `user_id`.
async fn track_play(
    _session: Session,
    State(store): State<GuardedAnalyticsStore>,
    State(refresh_queue): State<RefreshQueue>,
    Json(body): Json<TrackPlayRequest>,
) -> Response {
    let song_id = match body.song_id.filter(|s| !s.is_empty()) {
        Some(song_id) => song_id,
        None => {
            return error_response(
                AnalyticsError::Validation("Song ID is required".to_string()),
                "/v1/analytics/plays",
            )
        }
    };

    let event = PlayEvent {
        id: Uuid::new_v4().to_string(),
        song_id,
        user_id: body.user_id,
        duration_played: body.duration_played.unwrap_or(0).max(0) as u64,
        timestamp: body.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
    };

    if let Err(e) = store.record_play(&event) {
        return error_response(e.into(), "/v1/analytics/plays");
    }

    // The durable write is done; aggregate refreshes are queued best-effort
    refresh_queue.enqueue(RefreshTask::SongAnalytics {
        song_id: event.song_id.clone(),
        played_at: event.timestamp,
    });
    match event.listener() {
        Some(listener) => {
            record_play_event("authenticated");
            refresh_queue.enqueue(RefreshTask::UserAnalytics {
                user_id: listener.to_string(),
                played_at: event.timestamp,
            });
        }
        None => record_play_event("anonymous"),
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "play_id": event.id,
            "message": "Play tracked successfully"
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct PeriodQuery {
    period: Option<String>,
}

/// GET /v1/analytics/songs/{song_id}?period=7d
async fn get_song_analytics(
    State(query_engine): State<GuardedQueryEngine>,
    Path(song_id): Path<String>,
    Query(params): Query<PeriodQuery>,
) -> Response {
    let period = params
        .period
        .as_deref()
        .and_then(Period::parse)
        .unwrap_or(Period::Last7Days);

    match query_engine.song_analytics(&song_id, period) {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "/v1/analytics/songs"),
    }
}

#[derive(Debug, Deserialize)]
struct TrendingQuery {
    limit: Option<usize>,
    period: Option<String>,
}

/// GET /v1/analytics/trending?limit=10&period=24h
async fn get_trending(
    State(query_engine): State<GuardedQueryEngine>,
    Query(params): Query<TrendingQuery>,
) -> Response {
    let period = params
        .period
        .as_deref()
        .and_then(Period::parse)
        .unwrap_or(Period::Last24Hours);
    let limit = params.limit.unwrap_or(DEFAULT_TRENDING_LIMIT);

    match query_engine.trending(limit, period) {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "/v1/analytics/trending"),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

/// GET /v1/analytics/users/{user_id}/history?limit=50&offset=0
///
/// Users can only read their own history.
async fn get_user_history(
    session: Session,
    State(query_engine): State<GuardedQueryEngine>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Response {
    if session.user_id != user_id {
        warn!(
            "User {} tried to access history of user {}",
            session.user_id, user_id
        );
        return access_denied("Access denied to other user data");
    }

    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let offset = params.offset.unwrap_or(0);

    match query_engine.user_history(&user_id, limit, offset) {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(e, "/v1/analytics/users/history"),
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationsQuery {
    limit: Option<usize>,
}

/// GET /v1/analytics/users/{user_id}/recommendations?limit=10
///
/// Users can only read their own recommendations.
async fn get_recommendations(
    session: Session,
    State(query_engine): State<GuardedQueryEngine>,
    Path(user_id): Path<String>,
    Query(params): Query<RecommendationsQuery>,
) -> Response {
    if session.user_id != user_id {
        warn!(
            "User {} tried to access recommendations of user {}",
            session.user_id, user_id
        );
        return access_denied("Access denied to other user data");
    }

    let limit = params.limit.unwrap_or(DEFAULT_RECOMMENDATIONS_LIMIT);

    match query_engine.recommendations(&user_id, limit) {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "/v1/analytics/users/recommendations"),
    }
}

/// GET /v1/analytics/platform?period=7d, admin only
async fn get_platform_analytics(
    session: Session,
    State(query_engine): State<GuardedQueryEngine>,
    Query(params): Query<PeriodQuery>,
) -> Response {
    if !session.is_admin() {
        return access_denied("Admin access required");
    }

    let period = params
        .period
        .as_deref()
        .and_then(Period::parse)
        .unwrap_or(Period::Last7Days);

    match query_engine.platform_analytics(period) {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(e, "/v1/analytics/platform"),
    }
}

#[derive(Debug, Deserialize)]
struct EngagementRequest {
    user_id: Option<String>,
    #[serde(rename = "type")]
    engagement_type: Option<String>,
    target_id: Option<String>,
    metadata: Option<serde_json::Value>,
}

/// POST /v1/analytics/engagements
async fn track_engagement(
    State(store): State<GuardedAnalyticsStore>,
    Json(body): Json<EngagementRequest>,
) -> Response {
    let user_id = body.user_id.filter(|s| !s.is_empty());
    let engagement_type = body.engagement_type.filter(|s| !s.is_empty());
    let (user_id, engagement_type) = match (user_id, engagement_type) {
        (Some(user_id), Some(engagement_type)) => (user_id, engagement_type),
        _ => {
            return error_response(
                AnalyticsError::Validation(
                    "User ID and engagement type are required".to_string(),
                ),
                "/v1/analytics/engagements",
            )
        }
    };

    let event = EngagementEvent {
        id: Uuid::new_v4().to_string(),
        user_id,
        engagement_type,
        target_id: body.target_id.filter(|s| !s.is_empty()),
        metadata: body.metadata,
        timestamp: Utc::now().timestamp(),
    };

    match store.record_engagement(&event) {
        Ok(()) => {
            record_engagement_event(&event.engagement_type);
            (
                StatusCode::CREATED,
                Json(json!({
                    "success": true,
                    "message": "Engagement tracked successfully"
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e.into(), "/v1/analytics/engagements"),
    }
}

/// GET /health, probes the store before claiming to be alive
async fn health(State(state): State<ServerState>) -> Response {
    match state.store.ping() {
        Ok(()) => Json(json!({
            "status": "ok",
            "service": "analytics-server",
            "version": env!("CARGO_PKG_VERSION"),
            "store": "connected",
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        }))
        .into_response(),
        Err(e) => {
            error!("Health check store probe failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "service": "analytics-server",
                    "store": "disconnected",
                })),
            )
                .into_response()
        }
    }
}

pub fn make_app(
    config: ServerConfig,
    store: GuardedAnalyticsStore,
    query_engine: GuardedQueryEngine,
    refresh_queue: RefreshQueue,
) -> Result<Router> {
    let state = ServerState {
        config,
        start_time: Instant::now(),
        store,
        query_engine,
        refresh_queue,
    };

    let analytics_routes: Router<ServerState> = Router::new()
        .route("/plays", post(track_play))
        .route("/songs/{song_id}", get(get_song_analytics))
        .route("/trending", get(get_trending))
        .route("/users/{user_id}/history", get(get_user_history))
        .route(
            "/users/{user_id}/recommendations",
            get(get_recommendations),
        )
        .route("/platform", get(get_platform_analytics))
        .route("/engagements", post(track_engagement));

    let mut app = Router::new()
        .nest("/v1/analytics", analytics_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    app = app.layer(middleware::from_fn_with_state(state, log_requests));

    Ok(app)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_server(
    store: GuardedAnalyticsStore,
    query_engine: GuardedQueryEngine,
    refresh_queue: RefreshQueue,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    jwt_secret: String,
) -> Result<()> {
    let config = ServerConfig {
        requests_logging_level,
        port,
        jwt_secret,
    };

    let app = make_app(config, store, query_engine, refresh_queue)?;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

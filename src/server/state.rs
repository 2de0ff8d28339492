use axum::extract::FromRef;

use crate::analytics::{AnalyticsStore, QueryEngine, RefreshQueue};
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedAnalyticsStore = Arc<dyn AnalyticsStore>;
pub type GuardedQueryEngine = Arc<QueryEngine>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub store: GuardedAnalyticsStore,
    pub query_engine: GuardedQueryEngine,
    pub refresh_queue: RefreshQueue,
}

impl FromRef<ServerState> for GuardedAnalyticsStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedQueryEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.query_engine.clone()
    }
}

impl FromRef<ServerState> for RefreshQueue {
    fn from_ref(input: &ServerState) -> Self {
        input.refresh_queue.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

mod error;
mod models;
mod query;
mod refresh;
mod sqlite_store;
mod store;

pub use error::{AnalyticsError, AnalyticsResult};
pub use models::*;
pub use query::{
    HistoryPage, Pagination, Period, PlatformReport, QueryEngine, Recommendation,
    RecommendationsReport, SongAnalyticsReport, TrendingReport,
};
pub use refresh::{RefreshQueue, RefreshTask};
pub use sqlite_store::SqliteAnalyticsStore;
pub use store::{AggregateStore, AnalyticsStore, EngagementStore, PlayEventStore};

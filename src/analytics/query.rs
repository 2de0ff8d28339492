use crate::analytics::models::*;
use crate::analytics::sqlite_store::average_rounded;
use crate::analytics::store::AnalyticsStore;
use crate::analytics::{AnalyticsError, AnalyticsResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

const TRENDING_LIMIT_MAX: usize = 100;
const HISTORY_LIMIT_MAX: usize = 200;
const PLATFORM_POPULAR_SONGS: usize = 5;

/// A time window for analytics queries, resolved against "now" at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Last24Hours,
    Last7Days,
    Last30Days,
    AllTime,
}

impl Period {
    /// Parses the wire format ("24h", "7d", "30d", "all"). Unrecognized
    /// values resolve to None so each endpoint can apply its own default.
    pub fn parse(s: &str) -> Option<Period> {
        match s {
            "24h" => Some(Period::Last24Hours),
            "7d" => Some(Period::Last7Days),
            "30d" => Some(Period::Last30Days),
            "all" => Some(Period::AllTime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Last24Hours => "24h",
            Period::Last7Days => "7d",
            Period::Last30Days => "30d",
            Period::AllTime => "all",
        }
    }

    /// The inclusive lower timestamp bound of this period ending at `now`.
    pub fn start(&self, now: i64) -> i64 {
        match self {
            Period::Last24Hours => now - 24 * 60 * 60,
            Period::Last7Days => now - 7 * 24 * 60 * 60,
            Period::Last30Days => now - 30 * 24 * 60 * 60,
            Period::AllTime => i64::MIN,
        }
    }
}

/// Period-scoped numbers for one song, computed from the events at query
/// time. The persisted all-time counters ride along as a separate field
/// instead of being merged in, so computed and persisted values can never
/// shadow each other.
#[derive(Debug, Serialize)]
pub struct SongAnalyticsReport {
    pub song_id: String,
    pub period: String,
    pub play_count: u64,
    pub unique_listeners: u64,
    pub total_duration: u64,
    pub average_duration: u64,
    pub all_time: Option<SongAnalytics>,
}

#[derive(Debug, Serialize)]
pub struct TrendingReport {
    pub period: String,
    pub trending: Vec<TrendingSong>,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub user_id: String,
    pub history: Vec<PlayEvent>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Recommendation {
    pub song_id: String,
    pub play_count: u64,
    pub average_duration: u64,
    pub last_played: i64,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsReport {
    pub user_id: String,
    pub recommendations: Vec<Recommendation>,
    pub generated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PlatformReport {
    pub period: String,
    pub total_plays: u64,
    pub unique_users: u64,
    pub total_duration: u64,
    pub average_session_duration: u64,
    pub popular_songs: Vec<TrendingSong>,
    pub generated_at: String,
}

/// Read side of the analytics service: combines event scans with the
/// denormalized aggregates into the reports the API serves.
pub struct QueryEngine {
    store: Arc<dyn AnalyticsStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn generated_at() -> String {
        Utc::now().to_rfc3339()
    }

    pub fn song_analytics(
        &self,
        song_id: &str,
        period: Period,
    ) -> AnalyticsResult<SongAnalyticsReport> {
        if song_id.is_empty() {
            return Err(AnalyticsError::Validation("Song ID is required".to_string()));
        }

        let totals = self.store.song_period_totals(song_id, period.start(Self::now()))?;
        let all_time = self.store.get_song_analytics(song_id)?;

        Ok(SongAnalyticsReport {
            song_id: song_id.to_string(),
            period: period.as_str().to_string(),
            average_duration: average_rounded(totals.total_duration, totals.play_count),
            play_count: totals.play_count,
            unique_listeners: totals.unique_listeners,
            total_duration: totals.total_duration,
            all_time,
        })
    }

    pub fn trending(&self, limit: usize, period: Period) -> AnalyticsResult<TrendingReport> {
        let limit = limit.clamp(1, TRENDING_LIMIT_MAX);
        let trending = self.store.trending_songs(period.start(Self::now()), limit)?;
        Ok(TrendingReport {
            period: period.as_str().to_string(),
            trending,
            generated_at: Self::generated_at(),
        })
    }

    pub fn user_history(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> AnalyticsResult<HistoryPage> {
        let limit = limit.clamp(1, HISTORY_LIMIT_MAX);
        let history = self.store.get_user_history(user_id, limit, offset)?;
        let total = self.store.count_user_plays(user_id)?;
        Ok(HistoryPage {
            user_id: user_id.to_string(),
            history,
            pagination: Pagination { limit, offset, total },
        })
    }

    /// Personal recommendations from the user's own listening stats. A user
    /// with no stats, or a store failure on the personal path, degrades to
    /// the 7-day trending ranking instead of failing the request.
    pub fn recommendations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> AnalyticsResult<RecommendationsReport> {
        let limit = limit.clamp(1, TRENDING_LIMIT_MAX);

        let personal = match self.store.get_user_song_stats(user_id, limit) {
            Ok(stats) => stats,
            Err(e) => {
                warn!(
                    "Falling back to trending recommendations for user {}: {}",
                    user_id, e
                );
                Vec::new()
            }
        };

        let recommendations = if personal.is_empty() {
            self.store
                .trending_songs(Period::Last7Days.start(Self::now()), limit)?
                .into_iter()
                .map(|song| Recommendation {
                    song_id: song.song_id,
                    play_count: song.play_count,
                    average_duration: song.average_duration,
                    last_played: song.last_played,
                })
                .collect()
        } else {
            personal
                .into_iter()
                .map(|stat| Recommendation {
                    average_duration: average_rounded(stat.total_time_played, stat.play_count),
                    song_id: stat.song_id,
                    play_count: stat.play_count,
                    last_played: stat.last_played,
                })
                .collect()
        };

        Ok(RecommendationsReport {
            user_id: user_id.to_string(),
            recommendations,
            generated_at: Self::generated_at(),
        })
    }

    pub fn platform_analytics(&self, period: Period) -> AnalyticsResult<PlatformReport> {
        let since = period.start(Self::now());
        let totals = self.store.platform_totals(since)?;
        let popular_songs = self.store.trending_songs(since, PLATFORM_POPULAR_SONGS)?;

        Ok(PlatformReport {
            period: period.as_str().to_string(),
            average_session_duration: average_rounded(totals.total_duration, totals.total_plays),
            total_plays: totals.total_plays,
            unique_users: totals.unique_users,
            total_duration: totals.total_duration,
            popular_songs,
            generated_at: Self::generated_at(),
        })
    }
}

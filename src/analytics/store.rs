use crate::analytics::models::*;
use anyhow::Result;

/// Append-only play event storage plus the range scans the query engine
/// builds its period-scoped reports from.
pub trait PlayEventStore: Send + Sync {
    /// Records a play event and, when the event has an attributable
    /// listener, increments that listener's per-song stat. Both writes
    /// happen in a single transaction: either the event and the stat
    /// update land together, or neither does.
    fn record_play(&self, event: &PlayEvent) -> Result<()>;

    /// A page of a user's play events, most recent first.
    fn get_user_history(&self, user_id: &str, limit: usize, offset: usize)
        -> Result<Vec<PlayEvent>>;

    /// Total number of play events recorded for a user.
    fn count_user_plays(&self, user_id: &str) -> Result<u64>;

    /// Aggregate totals for a single song over plays with
    /// `timestamp >= since`.
    fn song_period_totals(&self, song_id: &str, since: i64) -> Result<PeriodTotals>;

    /// Songs ranked by play count over plays with `timestamp >= since`,
    /// descending, at most `limit` entries. Ties break deterministically
    /// on insertion order of the first play.
    fn trending_songs(&self, since: i64, limit: usize) -> Result<Vec<TrendingSong>>;

    /// Platform-wide totals over plays with `timestamp >= since`.
    fn platform_totals(&self, since: i64) -> Result<PlatformTotals>;

    /// Deletes play and engagement events older than the cutoff timestamp.
    /// Returns the number of deleted events.
    fn prune_events_older_than(&self, cutoff: i64) -> Result<usize>;

    /// Cheap connectivity probe for health reporting.
    fn ping(&self) -> Result<()>;
}

/// Append-only engagement event storage and its derived counters.
pub trait EngagementStore: Send + Sync {
    /// Records an engagement event and synchronously bumps both the
    /// per-target counter and the per-user engagement profile.
    fn record_engagement(&self, event: &EngagementEvent) -> Result<()>;

    fn get_engagement_analytics(
        &self,
        engagement_type: &str,
        target_id: Option<&str>,
    ) -> Result<Option<EngagementAnalytics>>;

    /// All engagement profile rows for a user, one per engagement type.
    fn get_user_engagement_profile(&self, user_id: &str) -> Result<Vec<UserEngagementProfile>>;
}

/// Denormalized all-time counters, refreshed best-effort after plays.
pub trait AggregateStore: Send + Sync {
    /// Creates the song's analytics row on its first play
    /// (`unique_listeners` seeded at 1), otherwise increments
    /// `total_plays` and bumps `last_played`.
    fn refresh_song_analytics(&self, song_id: &str, played_at: i64) -> Result<()>;

    /// Upserts the user's activity counters: increments
    /// `total_songs_played` and bumps `last_active`.
    fn refresh_user_analytics(&self, user_id: &str, played_at: i64) -> Result<()>;

    fn get_song_analytics(&self, song_id: &str) -> Result<Option<SongAnalytics>>;

    fn get_user_analytics(&self, user_id: &str) -> Result<Option<UserAnalytics>>;

    /// A user's per-song stats ordered by play count descending, at most
    /// `limit` entries. Feeds recommendations.
    fn get_user_song_stats(&self, user_id: &str, limit: usize) -> Result<Vec<UserSongStat>>;
}

/// Marker trait combining all analytics storage concerns, implemented by
/// anything that implements the individual traits.
pub trait AnalyticsStore: PlayEventStore + EngagementStore + AggregateStore {}

impl<T: PlayEventStore + EngagementStore + AggregateStore> AnalyticsStore for T {}

use serde::{Deserialize, Serialize};

/// User id used for plays that are not attributable to a real user.
/// Anonymous plays never touch user-keyed aggregates.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// An immutable playback event, the source of truth for all analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayEvent {
    /// Unique event id (uuid v4)
    pub id: String,
    /// The song that was played
    pub song_id: String,
    /// The user who played it, None for anonymous playback
    pub user_id: Option<String>,
    /// Seconds of playback, never negative
    pub duration_played: u64,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl PlayEvent {
    /// The attributable listener, if any. Absent, empty and "anonymous"
    /// user ids all count as anonymous.
    pub fn listener(&self) -> Option<&str> {
        match self.user_id.as_deref() {
            None | Some("") | Some(ANONYMOUS_USER_ID) => None,
            Some(user_id) => Some(user_id),
        }
    }
}

/// An immutable engagement event (like, share, download, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngagementEvent {
    /// Unique event id (uuid v4)
    pub id: String,
    pub user_id: String,
    /// Open set of engagement kinds, e.g. "like", "share", "download"
    pub engagement_type: String,
    /// What was engaged with (song, playlist, ...), if anything
    pub target_id: Option<String>,
    /// Arbitrary client-supplied JSON blob
    pub metadata: Option<serde_json::Value>,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

/// Per (user, song) playback counters, updated atomically with the play append.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserSongStat {
    pub user_id: String,
    pub song_id: String,
    pub play_count: u64,
    /// Cumulative seconds of playback
    pub total_time_played: u64,
    /// Unix timestamp of the most recent play
    pub last_played: i64,
}

/// All-time per-song counters, refreshed best-effort after each play.
///
/// `unique_listeners` is seeded at 1 when the row is created and never
/// recomputed afterwards; period-scoped reports compute the real distinct
/// count from the events instead.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SongAnalytics {
    pub song_id: String,
    pub total_plays: u64,
    pub unique_listeners: u64,
    pub average_duration: u64,
    pub last_played: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// All-time per-user activity counters, refreshed best-effort after each play.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserAnalytics {
    pub user_id: String,
    pub last_active: i64,
    pub total_songs_played: u64,
    pub updated_at: i64,
}

/// Per (engagement type, target) counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EngagementAnalytics {
    pub engagement_type: String,
    pub target_id: Option<String>,
    pub count: u64,
    pub last_engaged: i64,
    pub updated_at: i64,
}

/// Per (user, engagement type) counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserEngagementProfile {
    pub user_id: String,
    pub engagement_type: String,
    pub count: u64,
    pub last_engagement: i64,
}

/// One entry of a trending ranking, aggregated from play events over a period.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendingSong {
    pub song_id: String,
    pub play_count: u64,
    pub total_duration: u64,
    pub average_duration: u64,
    pub last_played: i64,
}

/// Aggregate totals of a single song's plays over a period.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PeriodTotals {
    pub play_count: u64,
    /// Distinct non-anonymous listeners within the period
    pub unique_listeners: u64,
    pub total_duration: u64,
}

/// Platform-wide totals over a period.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PlatformTotals {
    pub total_plays: u64,
    /// Distinct non-anonymous listeners within the period
    pub unique_users: u64,
    pub total_duration: u64,
}

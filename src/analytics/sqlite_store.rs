use crate::analytics::models::*;
use crate::analytics::store::{AggregateStore, EngagementStore, PlayEventStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tracing::info;

/// V 0
const PLAY_EVENT_TABLE_V_0: Table = Table {
    name: "play_event",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("song_id", &SqlType::Text, non_null = true),
        sqlite_column!("user_id", &SqlType::Text),
        sqlite_column!("duration_played", &SqlType::Integer, non_null = true),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_play_event_song_id", "song_id"),
        ("idx_play_event_user_id", "user_id"),
        ("idx_play_event_timestamp", "timestamp"),
    ],
};

const ENGAGEMENT_EVENT_TABLE_V_0: Table = Table {
    name: "engagement_event",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true, non_null = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("type", &SqlType::Text, non_null = true),
        sqlite_column!("target_id", &SqlType::Text),
        sqlite_column!("metadata", &SqlType::Text),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_engagement_event_user_id", "user_id"),
        ("idx_engagement_event_timestamp", "timestamp"),
    ],
};

const USER_SONG_STAT_TABLE_V_0: Table = Table {
    name: "user_song_stat",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_id", &SqlType::Text, non_null = true),
        sqlite_column!("play_count", &SqlType::Integer, non_null = true),
        sqlite_column!("total_time_played", &SqlType::Integer, non_null = true),
        sqlite_column!("last_played", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[&["user_id", "song_id"]],
    indices: &[("idx_user_song_stat_user_id", "user_id")],
};

const SONG_ANALYTICS_TABLE_V_0: Table = Table {
    name: "song_analytics",
    columns: &[
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("total_plays", &SqlType::Integer, non_null = true),
        sqlite_column!("unique_listeners", &SqlType::Integer, non_null = true),
        sqlite_column!("average_duration", &SqlType::Integer, non_null = true),
        sqlite_column!("last_played", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[],
};

const USER_ANALYTICS_TABLE_V_0: Table = Table {
    name: "user_analytics",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("last_active", &SqlType::Integer, non_null = true),
        sqlite_column!("total_songs_played", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[],
};

// target_id uses '' instead of NULL so that the unique constraint holds
// for target-less engagements (SQLite treats NULLs as distinct).
const ENGAGEMENT_ANALYTICS_TABLE_V_0: Table = Table {
    name: "engagement_analytics",
    columns: &[
        sqlite_column!("type", &SqlType::Text, non_null = true),
        sqlite_column!("target_id", &SqlType::Text, non_null = true),
        sqlite_column!("count", &SqlType::Integer, non_null = true),
        sqlite_column!("last_engaged", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[&["type", "target_id"]],
    indices: &[],
};

const USER_ENGAGEMENT_PROFILE_TABLE_V_0: Table = Table {
    name: "user_engagement_profile",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("type", &SqlType::Text, non_null = true),
        sqlite_column!("count", &SqlType::Integer, non_null = true),
        sqlite_column!("last_engagement", &SqlType::Integer, non_null = true),
    ],
    unique_constraints: &[&["user_id", "type"]],
    indices: &[("idx_user_engagement_profile_user_id", "user_id")],
};

const VERSIONED_SCHEMAS: [VersionedSchema; 1] = [VersionedSchema {
    version: 0,
    tables: &[
        PLAY_EVENT_TABLE_V_0,
        ENGAGEMENT_EVENT_TABLE_V_0,
        USER_SONG_STAT_TABLE_V_0,
        SONG_ANALYTICS_TABLE_V_0,
        USER_ANALYTICS_TABLE_V_0,
        ENGAGEMENT_ANALYTICS_TABLE_V_0,
        USER_ENGAGEMENT_PROFILE_TABLE_V_0,
    ],
    migration: None,
}];

#[derive(Clone)]
pub struct SqliteAnalyticsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAnalyticsStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(db_path)?;
            VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
            conn
        };

        // Read the database version
        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        if db_version >= VERSIONED_SCHEMAS.len() as i64 {
            bail!("Database version {} is too new", db_version);
        } else {
            VERSIONED_SCHEMAS
                .get(version)
                .context("Failed to get schema")?
                .validate(&conn)?;
        }

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteAnalyticsStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
        let mut latest_from = version;
        for schema in VERSIONED_SCHEMAS.iter().skip(version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating db from version {} to {}",
                    latest_from, schema.version
                );
                migration_fn(conn)?;
                latest_from = schema.version;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;

        Ok(())
    }
}

fn play_event_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlayEvent> {
    Ok(PlayEvent {
        id: row.get(0)?,
        song_id: row.get(1)?,
        user_id: row.get(2)?,
        duration_played: row.get::<_, i64>(3)?.max(0) as u64,
        timestamp: row.get(4)?,
    })
}

impl PlayEventStore for SqliteAnalyticsStore {
    fn record_play(&self, event: &PlayEvent) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO play_event (id, song_id, user_id, duration_played, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.song_id,
                event.user_id,
                event.duration_played as i64,
                event.timestamp
            ],
        )
        .with_context(|| format!("Failed to insert play event for song {}", event.song_id))?;

        if let Some(listener) = event.listener() {
            tx.execute(
                "INSERT INTO user_song_stat (user_id, song_id, play_count, total_time_played, last_played)
                 VALUES (?1, ?2, 1, ?3, ?4)
                 ON CONFLICT(user_id, song_id) DO UPDATE SET
                     play_count = play_count + 1,
                     total_time_played = total_time_played + excluded.total_time_played,
                     last_played = excluded.last_played",
                params![
                    listener,
                    event.song_id,
                    event.duration_played as i64,
                    event.timestamp
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to upsert user_song_stat for user {} song {}",
                    listener, event.song_id
                )
            })?;
        }

        tx.commit().context("Failed to commit play recording")
    }

    fn get_user_history(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PlayEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, song_id, user_id, duration_played, timestamp FROM play_event
             WHERE user_id = ?1
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let events = stmt
            .query_map(
                params![user_id, limit as i64, offset as i64],
                play_event_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn count_user_plays(&self, user_id: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM play_event WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn song_period_totals(&self, song_id: &str, since: i64) -> Result<PeriodTotals> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT
                 COUNT(*),
                 COUNT(DISTINCT CASE
                     WHEN user_id IS NOT NULL AND user_id != '' AND user_id != ?3
                     THEN user_id END),
                 COALESCE(SUM(duration_played), 0)
             FROM play_event
             WHERE song_id = ?1 AND timestamp >= ?2",
            params![song_id, since, ANONYMOUS_USER_ID],
            |row| {
                Ok(PeriodTotals {
                    play_count: row.get::<_, i64>(0)? as u64,
                    unique_listeners: row.get::<_, i64>(1)? as u64,
                    total_duration: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .with_context(|| format!("Failed to aggregate plays for song {}", song_id))
    }

    fn trending_songs(&self, since: i64, limit: usize) -> Result<Vec<TrendingSong>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT
                 song_id,
                 COUNT(*) AS play_count,
                 COALESCE(SUM(duration_played), 0) AS total_duration,
                 MAX(timestamp) AS last_played
             FROM play_event
             WHERE timestamp >= ?1
             GROUP BY song_id
             ORDER BY play_count DESC, MIN(rowid) ASC
             LIMIT ?2",
        )?;
        let songs = stmt
            .query_map(params![since, limit as i64], |row| {
                let play_count = row.get::<_, i64>(1)? as u64;
                let total_duration = row.get::<_, i64>(2)? as u64;
                Ok(TrendingSong {
                    song_id: row.get(0)?,
                    play_count,
                    total_duration,
                    average_duration: average_rounded(total_duration, play_count),
                    last_played: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn platform_totals(&self, since: i64) -> Result<PlatformTotals> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT
                 COUNT(*),
                 COUNT(DISTINCT CASE
                     WHEN user_id IS NOT NULL AND user_id != '' AND user_id != ?2
                     THEN user_id END),
                 COALESCE(SUM(duration_played), 0)
             FROM play_event
             WHERE timestamp >= ?1",
            params![since, ANONYMOUS_USER_ID],
            |row| {
                Ok(PlatformTotals {
                    total_plays: row.get::<_, i64>(0)? as u64,
                    unique_users: row.get::<_, i64>(1)? as u64,
                    total_duration: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .context("Failed to aggregate platform totals")
    }

    fn prune_events_older_than(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let plays = conn.execute(
            "DELETE FROM play_event WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let engagements = conn.execute(
            "DELETE FROM engagement_event WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(plays + engagements)
    }

    fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .context("Store connectivity probe failed")
    }
}

impl EngagementStore for SqliteAnalyticsStore {
    fn record_engagement(&self, event: &EngagementEvent) -> Result<()> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize engagement metadata")?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO engagement_event (id, user_id, type, target_id, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.user_id,
                event.engagement_type,
                event.target_id,
                metadata,
                event.timestamp
            ],
        )
        .with_context(|| {
            format!(
                "Failed to insert engagement event {} for user {}",
                event.engagement_type, event.user_id
            )
        })?;

        tx.execute(
            "INSERT INTO engagement_analytics (type, target_id, count, last_engaged, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(type, target_id) DO UPDATE SET
                 count = count + 1,
                 last_engaged = excluded.last_engaged,
                 updated_at = excluded.updated_at",
            params![
                event.engagement_type,
                event.target_id.as_deref().unwrap_or(""),
                event.timestamp
            ],
        )?;

        tx.execute(
            "INSERT INTO user_engagement_profile (user_id, type, count, last_engagement)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(user_id, type) DO UPDATE SET
                 count = count + 1,
                 last_engagement = excluded.last_engagement",
            params![event.user_id, event.engagement_type, event.timestamp],
        )?;

        tx.commit().context("Failed to commit engagement recording")
    }

    fn get_engagement_analytics(
        &self,
        engagement_type: &str,
        target_id: Option<&str>,
    ) -> Result<Option<EngagementAnalytics>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT type, target_id, count, last_engaged, updated_at
                 FROM engagement_analytics WHERE type = ?1 AND target_id = ?2",
                params![engagement_type, target_id.unwrap_or("")],
                |row| {
                    let target: String = row.get(1)?;
                    Ok(EngagementAnalytics {
                        engagement_type: row.get(0)?,
                        target_id: if target.is_empty() { None } else { Some(target) },
                        count: row.get::<_, i64>(2)? as u64,
                        last_engaged: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn get_user_engagement_profile(&self, user_id: &str) -> Result<Vec<UserEngagementProfile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, type, count, last_engagement
             FROM user_engagement_profile WHERE user_id = ?1
             ORDER BY count DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(UserEngagementProfile {
                    user_id: row.get(0)?,
                    engagement_type: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                    last_engagement: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl AggregateStore for SqliteAnalyticsStore {
    fn refresh_song_analytics(&self, song_id: &str, played_at: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM song_analytics WHERE song_id = ?1",
                params![song_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if exists {
            tx.execute(
                "UPDATE song_analytics SET
                     total_plays = total_plays + 1,
                     last_played = ?2,
                     updated_at = ?2
                 WHERE song_id = ?1",
                params![song_id, played_at],
            )?;
        } else {
            // unique_listeners is seeded once and never recomputed
            tx.execute(
                "INSERT INTO song_analytics
                     (song_id, total_plays, unique_listeners, average_duration, last_played, updated_at)
                 VALUES (?1, 1, 1, 0, ?2, ?2)",
                params![song_id, played_at],
            )?;
        }

        tx.commit()
            .with_context(|| format!("Failed to refresh song analytics for {}", song_id))
    }

    fn refresh_user_analytics(&self, user_id: &str, played_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_analytics (user_id, last_active, total_songs_played, updated_at)
             VALUES (?1, ?2, 1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET
                 total_songs_played = total_songs_played + 1,
                 last_active = excluded.last_active,
                 updated_at = excluded.updated_at",
            params![user_id, played_at],
        )
        .with_context(|| format!("Failed to refresh user analytics for {}", user_id))?;
        Ok(())
    }

    fn get_song_analytics(&self, song_id: &str) -> Result<Option<SongAnalytics>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT song_id, total_plays, unique_listeners, average_duration,
                        last_played, created_at, updated_at
                 FROM song_analytics WHERE song_id = ?1",
                params![song_id],
                |row| {
                    Ok(SongAnalytics {
                        song_id: row.get(0)?,
                        total_plays: row.get::<_, i64>(1)? as u64,
                        unique_listeners: row.get::<_, i64>(2)? as u64,
                        average_duration: row.get::<_, i64>(3)? as u64,
                        last_played: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn get_user_analytics(&self, user_id: &str) -> Result<Option<UserAnalytics>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT user_id, last_active, total_songs_played, updated_at
                 FROM user_analytics WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserAnalytics {
                        user_id: row.get(0)?,
                        last_active: row.get(1)?,
                        total_songs_played: row.get::<_, i64>(2)? as u64,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn get_user_song_stats(&self, user_id: &str, limit: usize) -> Result<Vec<UserSongStat>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, song_id, play_count, total_time_played, last_played
             FROM user_song_stat WHERE user_id = ?1
             ORDER BY play_count DESC, last_played DESC
             LIMIT ?2",
        )?;
        let stats = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(UserSongStat {
                    user_id: row.get(0)?,
                    song_id: row.get(1)?,
                    play_count: row.get::<_, i64>(2)? as u64,
                    total_time_played: row.get::<_, i64>(3)? as u64,
                    last_played: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

pub(crate) fn average_rounded(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        (total as f64 / count as f64).round() as u64
    }
}

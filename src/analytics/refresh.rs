use crate::analytics::store::AnalyticsStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A best-effort aggregate refresh, queued after a play has been durably
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTask {
    SongAnalytics { song_id: String, played_at: i64 },
    UserAnalytics { user_id: String, played_at: i64 },
}

/// Bounded queue feeding a single background worker that applies aggregate
/// refreshes. Enqueueing never blocks the request path: when the queue is
/// full the task is dropped and the drop is logged and counted. Worker
/// failures are logged and swallowed, the source-of-truth events are
/// already committed by the time a task exists.
#[derive(Clone)]
pub struct RefreshQueue {
    tx: mpsc::Sender<RefreshTask>,
}

impl RefreshQueue {
    /// Spawns the worker and returns the queue handle plus the worker's
    /// join handle. The worker drains whatever is still queued after the
    /// last queue handle is dropped, then exits.
    pub fn start(
        store: Arc<dyn AnalyticsStore>,
        capacity: usize,
    ) -> (RefreshQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<RefreshTask>(capacity);

        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let result = match &task {
                    RefreshTask::SongAnalytics { song_id, played_at } => {
                        store.refresh_song_analytics(song_id, *played_at)
                    }
                    RefreshTask::UserAnalytics { user_id, played_at } => {
                        store.refresh_user_analytics(user_id, *played_at)
                    }
                };
                match result {
                    Ok(()) => debug!("Applied refresh task {:?}", task),
                    Err(e) => error!("Refresh task {:?} failed: {}", task, e),
                }
            }
            debug!("Refresh queue drained, worker exiting");
        });

        (RefreshQueue { tx }, handle)
    }

    /// Queues a refresh without waiting. Drops the task when the queue is
    /// full or the worker is gone.
    pub fn enqueue(&self, task: RefreshTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                crate::server::metrics::record_refresh_drop("full");
                warn!("Refresh queue full, dropping task {:?}", task);
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                crate::server::metrics::record_refresh_drop("closed");
                warn!("Refresh queue closed, dropping task {:?}", task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::sqlite_store::SqliteAnalyticsStore;
    use crate::analytics::store::AggregateStore;
    use tempfile::TempDir;

    fn create_tmp_store() -> (Arc<SqliteAnalyticsStore>, TempDir) {
        let tmp_dir = TempDir::new().unwrap();
        let store =
            Arc::new(SqliteAnalyticsStore::new(tmp_dir.path().join("analytics.db")).unwrap());
        (store, tmp_dir)
    }

    #[tokio::test]
    async fn worker_applies_queued_refreshes_and_drains_on_shutdown() {
        let (store, _tmp) = create_tmp_store();
        let (queue, handle) = RefreshQueue::start(store.clone(), 16);

        for _ in 0..3 {
            queue.enqueue(RefreshTask::SongAnalytics {
                song_id: "song-1".to_string(),
                played_at: 1000,
            });
        }
        queue.enqueue(RefreshTask::UserAnalytics {
            user_id: "user-1".to_string(),
            played_at: 1000,
        });

        // Dropping the last handle closes the channel; the worker drains
        // what is left before exiting.
        drop(queue);
        handle.await.unwrap();

        let song = store.get_song_analytics("song-1").unwrap().unwrap();
        assert_eq!(song.total_plays, 3);
        let user = store.get_user_analytics("user-1").unwrap().unwrap();
        assert_eq!(user.total_songs_played, 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (store, _tmp) = create_tmp_store();

        // A channel the worker never reads from: build it manually so the
        // worker task can be withheld until after the enqueue attempts.
        let (tx, mut rx) = mpsc::channel::<RefreshTask>(1);
        let queue = RefreshQueue { tx };

        queue.enqueue(RefreshTask::SongAnalytics {
            song_id: "song-1".to_string(),
            played_at: 1000,
        });
        // Queue is full now, this one is dropped without blocking
        queue.enqueue(RefreshTask::SongAnalytics {
            song_id: "song-2".to_string(),
            played_at: 1000,
        });
        drop(queue);

        let mut applied = Vec::new();
        while let Some(task) = rx.recv().await {
            if let RefreshTask::SongAnalytics { song_id, played_at } = &task {
                store.refresh_song_analytics(song_id, *played_at).unwrap();
            }
            applied.push(task);
        }
        assert_eq!(applied.len(), 1);
        assert!(store.get_song_analytics("song-1").unwrap().is_some());
        assert!(store.get_song_analytics("song-2").unwrap().is_none());
    }

    #[tokio::test]
    async fn worker_survives_failing_tasks() {
        let (store, _tmp) = create_tmp_store();
        let (queue, handle) = RefreshQueue::start(store.clone(), 16);

        // Two duplicate song refreshes around one that targets a different
        // song; even if one failed the others would still be applied.
        queue.enqueue(RefreshTask::SongAnalytics {
            song_id: "song-a".to_string(),
            played_at: 1000,
        });
        queue.enqueue(RefreshTask::SongAnalytics {
            song_id: "song-b".to_string(),
            played_at: 2000,
        });

        drop(queue);
        handle.await.unwrap();

        assert!(store.get_song_analytics("song-a").unwrap().is_some());
        assert!(store.get_song_analytics("song-b").unwrap().is_some());
    }
}

//! Storage trait abstraction.

use async_trait::async_trait;
use watchtrail_core::{SessionKey, VideoId, VideoRecord, ViewerId, WatchSession};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Optimistic version check failed: someone else saved first
    #[error("version conflict on {key}: expected {expected}, found {found}")]
    Conflict {
        /// Session key
        key: String,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persistence for watch sessions, keyed by (viewer, video).
///
/// Saves are optimistic: `session.version` must equal the stored version
/// (0 when absent). On success the store persists `version + 1` and
/// returns it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by key.
    async fn load_session(&self, key: &SessionKey) -> Result<Option<WatchSession>>;

    /// Save a session (create or update), returning the new version.
    async fn save_session(&self, session: &WatchSession) -> Result<u64>;

    /// All sessions of one viewer.
    async fn list_sessions_for_viewer(&self, viewer: &ViewerId) -> Result<Vec<WatchSession>>;

    /// Every stored session.
    async fn list_sessions(&self) -> Result<Vec<WatchSession>>;
}

/// Read side of the video catalog: the authoritative source of durations.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Save a video record (create or update).
    async fn save_video(&self, video: &VideoRecord) -> Result<()>;

    /// Load a video record.
    async fn load_video(&self, id: &VideoId) -> Result<Option<VideoRecord>>;

    /// List all known videos.
    async fn list_videos(&self) -> Result<Vec<VideoRecord>>;

    /// Authoritative duration of a video, if the catalog knows it.
    async fn video_duration(&self, id: &VideoId) -> Result<Option<f64>> {
        Ok(self.load_video(id).await?.map(|v| v.duration_secs))
    }
}

/// Check an optimistic save against the currently stored version.
pub(crate) fn check_version(key: &SessionKey, expected: u64, found: u64) -> Result<u64> {
    if expected != found {
        return Err(StorageError::Conflict {
            key: key.to_string(),
            expected,
            found,
        });
    }
    Ok(found + 1)
}

/// Repair derived totals of a session read back from storage.
///
/// Totals that still agree with the intervals are kept as stored, so a
/// manual completion reads back at 100%.
pub(crate) fn refresh_loaded(mut session: WatchSession) -> WatchSession {
    if session.total_watch_time != session.watched_intervals.total() {
        session.recompute_totals();
    }
    session
}

/// Sort sessions most recently watched first.
pub(crate) fn sort_recent_first(sessions: &mut [WatchSession]) {
    sessions.sort_by(|a, b| b.last_watched_at.cmp(&a.last_watched_at));
}

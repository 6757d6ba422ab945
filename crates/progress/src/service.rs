//! Progress service: the tracker wired to a session store and video catalog.
//!
//! Every read-modify-write of a session happens under a per-key lock, and
//! saves use the store's optimistic version check, retrying on conflict
//! when another process won the race.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use watchtrail_core::{
    validate_duration, validate_position, CompletionStatus, SessionKey, TrackerConfig, TrackerError,
    VideoId, ViewerId, WatchSession,
};
use watchtrail_storage::{SessionStore, StorageError, VideoCatalog};

use crate::summary::{summarize, WatchSummary};
use crate::tracker::{ReportOutcome, WatchProgressTracker};

/// How many times a save is retried after losing an optimistic race.
const MAX_SAVE_ATTEMPTS: usize = 3;

/// Errors surfaced by the progress service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad input or configuration
    #[error(transparent)]
    Validation(#[from] TrackerError),

    /// Persistence or catalog failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Where a viewer can pick a video back up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    /// Video to resume
    pub video_id: VideoId,
    /// Last reported playback position
    pub position: f64,
    /// Watched percentage so far
    pub watched_percentage: f64,
    /// When the viewer last watched it
    pub last_watched_at: watchtrail_core::Time,
}

/// Tracks watch progress against persistent storage.
pub struct ProgressService<S: SessionStore, C: VideoCatalog> {
    store: Arc<S>,
    catalog: Arc<C>,
    tracker: WatchProgressTracker,
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl<S: SessionStore, C: VideoCatalog> ProgressService<S, C> {
    /// Create a service, validating the tracker configuration.
    pub fn new(store: Arc<S>, catalog: Arc<C>, config: TrackerConfig) -> Result<Self> {
        Ok(Self {
            store,
            catalog,
            tracker: WatchProgressTracker::new(config)?,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying tracker.
    pub fn tracker(&self) -> &WatchProgressTracker {
        &self.tracker
    }

    /// Per-key lock handle. Entries nobody holds are pruned on the way.
    async fn key_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Catalog duration when known, otherwise the client-reported one.
    async fn resolve_duration(&self, video: &VideoId, reported: Option<f64>) -> Result<Option<f64>> {
        let authoritative = self
            .catalog
            .video_duration(video)
            .await?
            .filter(|d| d.is_finite() && *d > 0.0);
        if let (Some(catalog), Some(client)) = (authoritative, reported) {
            if catalog != client {
                debug!(video = %video, catalog, client, "ignoring client-reported duration");
            }
        }
        Ok(authoritative.or(reported))
    }

    /// Record a playback position for a viewer and video.
    pub async fn report(
        &self,
        key: &SessionKey,
        current_time: f64,
        reported_duration: Option<f64>,
    ) -> Result<ReportOutcome> {
        validate_position(current_time)?;
        let reported_duration = reported_duration.map(validate_duration).transpose()?;

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let duration = self.resolve_duration(&key.video, reported_duration).await?;

        let mut attempt = 1;
        loop {
            let existing = self.store.load_session(key).await?;
            let mut outcome = self.tracker.report(existing.as_ref(), key, current_time, duration)?;

            match self.store.save_session(&outcome.session).await {
                Ok(version) => {
                    outcome.session.version = version;
                    debug!(
                        viewer = %key.viewer,
                        video = %key.video,
                        position = current_time,
                        total = outcome.session.total_watch_time,
                        status = %outcome.session.completion_status,
                        "recorded progress"
                    );
                    if outcome.newly_completed {
                        info!(viewer = %key.viewer, video = %key.video, "video completed");
                    }
                    return Ok(outcome);
                }
                Err(StorageError::Conflict { found, .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(key = %key, attempt, found, "concurrent update, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Mark a video completed for a viewer, creating the session if needed.
    pub async fn mark_completed(&self, key: &SessionKey) -> Result<WatchSession> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let mut attempt = 1;
        loop {
            let session = match self.store.load_session(key).await? {
                Some(session) => session,
                None => {
                    let duration = self.resolve_duration(&key.video, None).await?;
                    let mut session = WatchSession::new(key.clone(), 0.0);
                    session.video_duration = duration;
                    session
                }
            };
            let mut session = self.tracker.mark_completed(session);

            match self.store.save_session(&session).await {
                Ok(version) => {
                    session.version = version;
                    info!(viewer = %key.viewer, video = %key.video, "marked completed");
                    return Ok(session);
                }
                Err(StorageError::Conflict { found, .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    warn!(key = %key, attempt, found, "concurrent update, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Current state of one session.
    pub async fn session(&self, key: &SessionKey) -> Result<Option<WatchSession>> {
        Ok(self.store.load_session(key).await?)
    }

    /// Summary over every session of a viewer.
    pub async fn viewer_summary(&self, viewer: &ViewerId) -> Result<WatchSummary> {
        let sessions = self.store.list_sessions_for_viewer(viewer).await?;
        Ok(summarize(&sessions))
    }

    /// In-progress videos for a viewer, most recently watched first.
    pub async fn continue_watching(&self, viewer: &ViewerId, limit: usize) -> Result<Vec<ResumePoint>> {
        let mut sessions: Vec<_> = self
            .store
            .list_sessions_for_viewer(viewer)
            .await?
            .into_iter()
            .filter(|s| s.completion_status == CompletionStatus::InProgress)
            .collect();
        sessions.sort_by(|a, b| b.last_watched_at.cmp(&a.last_watched_at));

        Ok(sessions
            .into_iter()
            .take(limit)
            .map(|s| ResumePoint {
                video_id: s.video_id,
                position: s.last_reported_position,
                watched_percentage: s.watched_percentage,
                last_watched_at: s.last_watched_at,
            })
            .collect())
    }
}

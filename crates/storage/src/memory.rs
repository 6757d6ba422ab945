//! In-memory storage backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use watchtrail_core::{SessionKey, VideoId, VideoRecord, ViewerId, WatchSession};

use super::trait_::{check_version, sort_recent_first, Result, SessionStore, VideoCatalog};

/// Process-local store. Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    sessions: Arc<RwLock<HashMap<SessionKey, WatchSession>>>,
    videos: Arc<RwLock<HashMap<VideoId, VideoRecord>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStorage {
    async fn load_session(&self, key: &SessionKey) -> Result<Option<WatchSession>> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn save_session(&self, session: &WatchSession) -> Result<u64> {
        let key = session.key();
        let mut sessions = self.sessions.write().await;
        let found = sessions.get(&key).map(|s| s.version).unwrap_or(0);
        let version = check_version(&key, session.version, found)?;

        let mut stored = session.clone();
        stored.version = version;
        sessions.insert(key, stored);
        Ok(version)
    }

    async fn list_sessions_for_viewer(&self, viewer: &ViewerId) -> Result<Vec<WatchSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| &s.viewer_id == viewer)
            .cloned()
            .collect();
        sort_recent_first(&mut sessions);
        Ok(sessions)
    }

    async fn list_sessions(&self) -> Result<Vec<WatchSession>> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sort_recent_first(&mut sessions);
        Ok(sessions)
    }
}

#[async_trait]
impl VideoCatalog for MemoryStorage {
    async fn save_video(&self, video: &VideoRecord) -> Result<()> {
        self.videos.write().await.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn load_video(&self, id: &VideoId) -> Result<Option<VideoRecord>> {
        Ok(self.videos.read().await.get(id).cloned())
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let mut videos: Vec<_> = self.videos.read().await.values().cloned().collect();
        videos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(videos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    fn session(viewer: &str, video: &str) -> WatchSession {
        WatchSession::new(SessionKey::parse(viewer, video).unwrap(), 0.0)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStorage::new();
        let s = session("v1", "lecture-1");

        let version = store.save_session(&s).await.unwrap();
        assert_eq!(version, 1);

        let loaded = store.load_session(&s.key()).await.unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let store = MemoryStorage::new();
        let s = session("v1", "lecture-1");
        store.save_session(&s).await.unwrap();

        // Second writer still holds version 0
        let err = store.save_session(&s).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 0, found: 1, .. }));
    }

    #[tokio::test]
    async fn test_list_for_viewer() {
        let store = MemoryStorage::new();
        store.save_session(&session("v1", "a")).await.unwrap();
        store.save_session(&session("v1", "b")).await.unwrap();
        store.save_session(&session("v2", "a")).await.unwrap();

        let viewer = ViewerId::parse("v1").unwrap();
        assert_eq!(store.list_sessions_for_viewer(&viewer).await.unwrap().len(), 2);
        assert_eq!(store.list_sessions().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_video_duration_lookup() {
        let store = MemoryStorage::new();
        let id = VideoId::parse("lecture-1").unwrap();
        assert_eq!(store.video_duration(&id).await.unwrap(), None);

        let record = VideoRecord::new(id.clone(), "Intro", 600.0).unwrap();
        store.save_video(&record).await.unwrap();
        assert_eq!(store.video_duration(&id).await.unwrap(), Some(600.0));
    }
}

//! SQLite storage backend.
//!
//! Sessions live in `watch_sessions`, keyed by (viewer_id, video_id), with
//! the full session as a JSON `data` column next to an integer `version`
//! used for optimistic updates. Videos live in `videos`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, warn};
use watchtrail_core::{SessionKey, VideoId, VideoRecord, ViewerId, WatchSession};

use super::trait_::{refresh_loaded, sort_recent_first, Result, SessionStore, StorageError, VideoCatalog};

/// SQLite storage implementation.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Other(e.to_string())
}

impl SqliteStorage {
    /// Open (creating if missing) a database at the given sqlite URL or path.
    pub async fn new(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(db_err)?
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await.map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let url = format!("sqlite://{}", path.display());
        Self::new(&url).await
    }

    /// Create an in-memory SQLite storage for testing.
    ///
    /// Limited to one connection: every `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS watch_sessions (
                viewer_id TEXT NOT NULL,
                video_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                data TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (viewer_id, video_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS videos (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_viewer ON watch_sessions(viewer_id)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn current_version(&self, key: &SessionKey) -> Result<u64> {
        let row = sqlx::query("SELECT version FROM watch_sessions WHERE viewer_id = ? AND video_id = ?")
            .bind(key.viewer.as_str())
            .bind(key.video.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(match row {
            Some(row) => row.try_get::<i64, _>("version").map_err(db_err)? as u64,
            None => 0,
        })
    }

    fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<SqliteRow>) -> Vec<T> {
        rows.into_iter()
            .filter_map(|row| {
                let data: String = row.try_get("data").ok()?;
                match serde_json::from_str(&data) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable row");
                        None
                    }
                }
            })
            .collect()
    }

    fn decode_sessions(rows: Vec<SqliteRow>) -> Vec<WatchSession> {
        let mut sessions: Vec<WatchSession> = Self::decode_rows(rows)
            .into_iter()
            .map(refresh_loaded)
            .collect();
        sort_recent_first(&mut sessions);
        sessions
    }
}

#[async_trait]
impl SessionStore for SqliteStorage {
    async fn load_session(&self, key: &SessionKey) -> Result<Option<WatchSession>> {
        let row = sqlx::query("SELECT data FROM watch_sessions WHERE viewer_id = ? AND video_id = ?")
            .bind(key.viewer.as_str())
            .bind(key.video.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(refresh_loaded(serde_json::from_str(&data)?)))
            }
            None => Ok(None),
        }
    }

    async fn save_session(&self, session: &WatchSession) -> Result<u64> {
        let key = session.key();
        let version = session.version + 1;

        let mut stored = session.clone();
        stored.version = version;
        let data = serde_json::to_string(&stored)?;
        let now = chrono::Utc::now().to_rfc3339();

        let affected = if session.version == 0 {
            sqlx::query(
                "INSERT INTO watch_sessions (viewer_id, video_id, session_id, data, version, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (viewer_id, video_id) DO NOTHING",
            )
            .bind(key.viewer.as_str())
            .bind(key.video.as_str())
            .bind(session.id.to_string())
            .bind(data.as_str())
            .bind(version as i64)
            .bind(now.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE watch_sessions SET data = ?, version = ?, updated_at = ?
                WHERE viewer_id = ? AND video_id = ? AND version = ?",
            )
            .bind(data.as_str())
            .bind(version as i64)
            .bind(now.as_str())
            .bind(key.viewer.as_str())
            .bind(key.video.as_str())
            .bind(session.version as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected()
        };

        if affected == 0 {
            return Err(StorageError::Conflict {
                key: key.to_string(),
                expected: session.version,
                found: self.current_version(&key).await?,
            });
        }

        debug!(session = %session.id, key = %key, version, "saved session");
        Ok(version)
    }

    async fn list_sessions_for_viewer(&self, viewer: &ViewerId) -> Result<Vec<WatchSession>> {
        let rows = sqlx::query(
            "SELECT data FROM watch_sessions WHERE viewer_id = ? ORDER BY updated_at DESC",
        )
        .bind(viewer.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(Self::decode_sessions(rows))
    }

    async fn list_sessions(&self) -> Result<Vec<WatchSession>> {
        let rows = sqlx::query("SELECT data FROM watch_sessions ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(Self::decode_sessions(rows))
    }
}

#[async_trait]
impl VideoCatalog for SqliteStorage {
    async fn save_video(&self, video: &VideoRecord) -> Result<()> {
        let data = serde_json::to_string(video)?;
        sqlx::query("INSERT OR REPLACE INTO videos (id, data, updated_at) VALUES (?, ?, ?)")
            .bind(video.id.as_str())
            .bind(data)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_video(&self, id: &VideoId) -> Result<Option<VideoRecord>> {
        let row = sqlx::query("SELECT data FROM videos WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let rows = sqlx::query("SELECT data FROM videos ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(Self::decode_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtrail_core::WatchedInterval;

    fn session(viewer: &str, video: &str) -> WatchSession {
        WatchSession::new(SessionKey::parse(viewer, video).unwrap(), 0.0)
    }

    #[tokio::test]
    async fn test_session_operations() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        let mut s = session("v1", "lecture-1");
        s.watched_intervals.insert(WatchedInterval::new(0.0, 45.0).unwrap());
        s.recompute_totals();

        assert_eq!(storage.save_session(&s).await.unwrap(), 1);
        let loaded = storage.load_session(&s.key()).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.total_watch_time, 45.0);

        let v1 = ViewerId::parse("v1").unwrap();
        assert_eq!(storage.list_sessions_for_viewer(&v1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let s = session("v1", "lecture-1");
        storage.save_session(&s).await.unwrap();

        let err = storage.save_session(&s).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 0, found: 1, .. }));

        let loaded = storage.load_session(&s.key()).await.unwrap().unwrap();
        assert_eq!(storage.save_session(&loaded).await.unwrap(), 2);
        let err = storage.save_session(&loaded).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 1, found: 2, .. }));
    }

    #[tokio::test]
    async fn test_videos() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let id = VideoId::parse("lecture-1").unwrap();
        storage
            .save_video(&VideoRecord::new(id.clone(), "Lecture 1", 900.0).unwrap())
            .await
            .unwrap();
        assert_eq!(storage.video_duration(&id).await.unwrap(), Some(900.0));
    }

    #[tokio::test]
    async fn test_health_check() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.health_check().await);
    }
}

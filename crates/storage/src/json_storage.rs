//! JSON file storage implementation.
//!
//! Stores one pretty-printed JSON file per session under
//! `sessions/<viewer>/<video>.json` and one per video under
//! `videos/<id>.json`. The `version` field inside each session file is the
//! stored version; saves check and bump it while holding an advisory lock
//! on a sibling `<video>.lock` file, so separate processes sharing a data
//! directory cannot both win the same version.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use watchtrail_core::{SessionKey, VideoId, VideoRecord, ViewerId, WatchSession};

use super::trait_::{
    check_version, refresh_loaded, sort_recent_first, Result, SessionStore, StorageError,
    VideoCatalog,
};

/// File-based JSON storage backend.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    root: PathBuf,
}

/// The only part of a stored session a save needs to look at.
#[derive(Debug, Deserialize)]
struct StoredVersion {
    #[serde(default)]
    version: u64,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the directory layout.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("sessions")).await?;
        fs::create_dir_all(root.join("videos")).await?;

        debug!(root = %root.display(), "opened json storage");
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn viewer_dir(&self, viewer: &ViewerId) -> PathBuf {
        self.root.join("sessions").join(encode_component(viewer.as_str()))
    }
    fn session_path(&self, key: &SessionKey) -> PathBuf {
        self.viewer_dir(&key.viewer)
            .join(format!("{}.json", encode_component(key.video.as_str())))
    }
    fn video_path(&self, id: &VideoId) -> PathBuf {
        self.root
            .join("videos")
            .join(format!("{}.json", encode_component(id.as_str())))
    }
}

#[async_trait]
impl SessionStore for JsonStorage {
    async fn load_session(&self, key: &SessionKey) -> Result<Option<WatchSession>> {
        Ok(read_json(&self.session_path(key)).await?.map(refresh_loaded))
    }

    async fn save_session(&self, session: &WatchSession) -> Result<u64> {
        let key = session.key();
        let path = self.session_path(&key);
        let mut stored = session.clone();

        let task_key = key.clone();
        let version = blocking(move || {
            let lock_file = open_lock_file(&path)?;
            let mut lock = RwLock::new(lock_file);
            let _guard = lock.write()?;

            let found = stored_version(&path)?;
            stored.version = check_version(&task_key, stored.version, found)?;
            write_json(&path, &stored)?;
            Ok(stored.version)
        })
        .await?;

        debug!(session = %session.id, key = %key, version, "saved session");
        Ok(version)
    }

    async fn list_sessions_for_viewer(&self, viewer: &ViewerId) -> Result<Vec<WatchSession>> {
        let mut sessions: Vec<_> = list_dir(&self.viewer_dir(viewer))
            .await?
            .into_iter()
            .map(refresh_loaded)
            .collect();
        sort_recent_first(&mut sessions);
        Ok(sessions)
    }

    async fn list_sessions(&self) -> Result<Vec<WatchSession>> {
        let mut sessions = Vec::new();
        let mut rd = fs::read_dir(self.root.join("sessions")).await?;
        while let Some(entry) = rd.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                let loaded: Vec<WatchSession> = list_dir(&entry.path()).await?;
                sessions.extend(loaded.into_iter().map(refresh_loaded));
            }
        }
        sort_recent_first(&mut sessions);
        Ok(sessions)
    }
}

#[async_trait]
impl VideoCatalog for JsonStorage {
    async fn save_video(&self, video: &VideoRecord) -> Result<()> {
        let path = self.video_path(&video.id);
        let video = video.clone();
        blocking(move || write_json(&path, &video)).await
    }

    async fn load_video(&self, id: &VideoId) -> Result<Option<VideoRecord>> {
        read_json(&self.video_path(id)).await
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let mut videos: Vec<VideoRecord> = list_dir(&self.root.join("videos")).await?;
        videos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(videos)
    }
}

/// Run blocking file work off the async runtime.
async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::Other(format!("storage task failed: {e}")))?
}

/// Open (creating if needed) the lock file guarding a session file.
fn open_lock_file(session_path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = session_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(session_path.with_extension("lock"))?;
    Ok(file)
}

/// Version of the session file on disk, 0 when there is none.
fn stored_version(path: &Path) -> Result<u64> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice::<StoredVersion>(&bytes)?.version),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Make an identifier safe to use as a single path component.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes `%XX`.
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::Other(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    // Write-then-rename so readers never see a half-written file
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(items),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(items)
}

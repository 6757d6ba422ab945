//! Watch session model - one per viewer and video.

use serde::{Deserialize, Serialize};

use crate::id::{SessionId, SessionKey, VideoId, ViewerId};
use crate::interval::IntervalSet;
use crate::Time;

/// Where a viewer stands with a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Session exists but no watch time has accumulated
    NotStarted,
    /// Some unique watch time, below the completion threshold
    InProgress,
    /// Terminal: reached the threshold or was marked explicitly
    Completed,
}

impl CompletionStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [CompletionStatus; 3] = [
        CompletionStatus::NotStarted,
        CompletionStatus::InProgress,
        CompletionStatus::Completed,
    ];

    /// Completed is never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompletionStatus::Completed)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::NotStarted => "not_started",
            CompletionStatus::InProgress => "in_progress",
            CompletionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// Watched percentage crossed the configured threshold
    Threshold,
    /// Explicit override (end-of-video event, instructor action)
    Manual,
}

/// Progress of one viewer through one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSession {
    /// Surrogate identifier
    pub id: SessionId,

    /// Who is watching
    pub viewer_id: ViewerId,

    /// What is being watched
    pub video_id: VideoId,

    /// Authoritative duration in seconds, `None` while unknown
    pub video_duration: Option<f64>,

    /// Sorted, disjoint intervals already played through
    pub watched_intervals: IntervalSet,

    /// Last raw playback time reported by the client
    pub last_reported_position: f64,

    /// Unique seconds watched (sum of interval lengths)
    pub total_watch_time: f64,

    /// `100 * total / duration`, 0 while duration is unknown
    pub watched_percentage: f64,

    /// Lifecycle status
    pub completion_status: CompletionStatus,

    /// How completion was reached, if it was
    #[serde(default)]
    pub completion_source: Option<CompletionSource>,

    /// When the session was created
    pub created_at: Time,

    /// Most recent update
    pub last_watched_at: Time,

    /// Persistence version, bumped by the store on every save
    #[serde(default)]
    pub version: u64,
}

impl WatchSession {
    /// Create a fresh session positioned at `position`.
    pub fn new(key: SessionKey, position: f64) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: SessionId::new(),
            viewer_id: key.viewer,
            video_id: key.video,
            video_duration: None,
            watched_intervals: IntervalSet::new(),
            last_reported_position: position,
            total_watch_time: 0.0,
            watched_percentage: 0.0,
            completion_status: CompletionStatus::NotStarted,
            completion_source: None,
            created_at: now,
            last_watched_at: now,
            version: 0,
        }
    }

    /// The (viewer, video) key of this session.
    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.viewer_id.clone(), self.video_id.clone())
    }

    /// Known, positive duration.
    pub fn known_duration(&self) -> Option<f64> {
        self.video_duration.filter(|d| *d > 0.0)
    }

    /// Recompute `total_watch_time` and `watched_percentage` from the intervals.
    pub fn recompute_totals(&mut self) {
        self.total_watch_time = self.watched_intervals.total();
        self.watched_percentage = match self.known_duration() {
            Some(duration) => (100.0 * self.total_watch_time / duration).min(100.0),
            None => 0.0,
        };
    }

    /// Remaining seconds from the resume position, when the duration is known.
    pub fn remaining_secs(&self) -> Option<f64> {
        self.known_duration()
            .map(|d| (d - self.last_reported_position).max(0.0))
    }
}

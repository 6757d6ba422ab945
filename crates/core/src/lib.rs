//! watchtrail core data models.
//!
//! This crate defines the watch-session model: identifiers, watched
//! intervals and their consolidation, completion status, video metadata
//! and tracker configuration. It performs no I/O.

#![warn(missing_docs)]

// Identities
mod id;

// Coverage model
mod interval;
mod session;
mod video;

// Configuration and validation
mod config;
mod error;

// Re-exports
pub use id::{SessionId, SessionKey, VideoId, ViewerId};
pub use interval::{consolidate, IntervalSet, WatchedInterval};
pub use session::{CompletionSource, CompletionStatus, WatchSession};
pub use video::VideoRecord;
pub use config::{TrackerConfig, DEFAULT_COMPLETION_THRESHOLD_PCT, DEFAULT_GAP_TOLERANCE_SECS};
pub use error::{validate_duration, validate_position, Result, TrackerError};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

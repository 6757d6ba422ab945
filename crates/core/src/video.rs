//! Video metadata record.

use serde::{Deserialize, Serialize};

use crate::error::{validate_duration, Result};
use crate::id::VideoId;

/// Authoritative metadata for a video, as owned by the content catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Video identifier
    pub id: VideoId,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Duration in seconds
    pub duration_secs: f64,
}

impl VideoRecord {
    /// Create a record, validating the duration.
    pub fn new(id: VideoId, title: impl Into<String>, duration_secs: f64) -> Result<Self> {
        Ok(Self {
            id,
            title: title.into(),
            duration_secs: validate_duration(duration_secs)?,
        })
    }
}

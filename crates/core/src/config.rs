//! Tracker configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Default distance between two reports still treated as continuous playback.
pub const DEFAULT_GAP_TOLERANCE_SECS: f64 = 5.0;

/// Default watched percentage at which a video counts as completed.
pub const DEFAULT_COMPLETION_THRESHOLD_PCT: f64 = 95.0;

/// Configuration for the watch-progress tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Max jump (seconds) between reports that still extends the current interval
    pub gap_tolerance_secs: f64,
    /// Percentage (0-100] of unique watch time that promotes to completed
    pub completion_threshold_pct: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            gap_tolerance_secs: DEFAULT_GAP_TOLERANCE_SECS,
            completion_threshold_pct: DEFAULT_COMPLETION_THRESHOLD_PCT,
        }
    }
}

impl TrackerConfig {
    /// Set the gap tolerance.
    pub fn with_gap_tolerance(mut self, secs: f64) -> Self {
        self.gap_tolerance_secs = secs;
        self
    }

    /// Set the completion threshold.
    pub fn with_completion_threshold(mut self, pct: f64) -> Self {
        self.completion_threshold_pct = pct;
        self
    }

    /// Check that both values are usable.
    pub fn validate(&self) -> Result<()> {
        if !self.gap_tolerance_secs.is_finite() || self.gap_tolerance_secs < 0.0 {
            return Err(TrackerError::InvalidConfig(format!(
                "gap_tolerance_secs must be a finite value >= 0, got {}",
                self.gap_tolerance_secs
            )));
        }
        let pct = self.completion_threshold_pct;
        if !pct.is_finite() || pct <= 0.0 || pct > 100.0 {
            return Err(TrackerError::InvalidConfig(format!(
                "completion_threshold_pct must be in (0, 100], got {pct}"
            )));
        }
        Ok(())
    }
}

//! Validation errors raised by the watch-progress model.

/// Result alias for model operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors raised while validating reports, stored data or configuration.
///
/// All of these are input errors: a failing operation never leaves a
/// partially mutated session behind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    /// Playback position was below zero
    #[error("playback position must be >= 0, got {0}")]
    NegativePosition(f64),

    /// A time value was NaN or infinite
    #[error("{field} must be a finite number")]
    NonFinite {
        /// Which input carried the bad value
        field: &'static str,
    },

    /// Video duration was zero or negative
    #[error("video duration must be > 0, got {0}")]
    InvalidDuration(f64),

    /// A required identifier was empty
    #[error("missing required identifier: {0}")]
    MissingIdentifier(&'static str),

    /// An interval with start > end or negative bounds
    #[error("malformed interval [{start}, {end}]")]
    MalformedInterval {
        /// Interval start
        start: f64,
        /// Interval end
        end: f64,
    },

    /// Tracker configuration out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Reject NaN and infinities.
pub(crate) fn ensure_finite(value: f64, field: &'static str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TrackerError::NonFinite { field })
    }
}

/// Validate a playback position.
pub fn validate_position(position: f64) -> Result<f64> {
    let position = ensure_finite(position, "position")?;
    if position < 0.0 {
        return Err(TrackerError::NegativePosition(position));
    }
    Ok(position)
}

/// Validate a video duration.
pub fn validate_duration(duration: f64) -> Result<f64> {
    let duration = ensure_finite(duration, "duration")?;
    if duration <= 0.0 {
        return Err(TrackerError::InvalidDuration(duration));
    }
    Ok(duration)
}

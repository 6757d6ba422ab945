//! Identifiers for viewers, videos and watch sessions.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Result, TrackerError};

/// Unique identifier for a WatchSession
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate a new SessionId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Identifier of a viewer, as issued by the surrounding LMS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ViewerId(String);

/// Identifier of a video, as issued by the surrounding LMS.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

macro_rules! external_id {
    ($ty:ident, $label:literal) => {
        impl $ty {
            /// Parse an identifier, trimming whitespace and rejecting empty input.
            pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(TrackerError::MissingIdentifier($label));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = TrackerError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = TrackerError;

            fn try_from(value: String) -> Result<Self> {
                Self::parse(value)
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> Self {
                id.0
            }
        }
    };
}

external_id!(ViewerId, "viewer_id");
external_id!(VideoId, "video_id");

/// The unique (viewer, video) pair a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    /// Who is watching
    pub viewer: ViewerId,
    /// What is being watched
    pub video: VideoId,
}

impl SessionKey {
    /// Create a key from already-validated ids.
    pub fn new(viewer: ViewerId, video: VideoId) -> Self {
        Self { viewer, video }
    }

    /// Parse both halves of a key.
    pub fn parse(viewer: impl AsRef<str>, video: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            viewer: ViewerId::parse(viewer)?,
            video: VideoId::parse(video)?,
        })
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.viewer, self.video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_rejects_empty() {
        let viewer = ViewerId::parse("  stu-42 ").unwrap();
        assert_eq!(viewer.as_str(), "stu-42");

        assert_eq!(
            VideoId::parse("   "),
            Err(TrackerError::MissingIdentifier("video_id"))
        );
        assert!(SessionKey::parse("stu-42", "").is_err());
    }

    #[test]
    fn test_ids_deserialize_with_validation() {
        let id: ViewerId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.to_string(), "abc");
        assert!(serde_json::from_str::<VideoId>("\"\"").is_err());
    }

    #[test]
    fn test_session_id_roundtrip_str() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}

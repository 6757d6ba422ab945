//! Watch progress tracking.
//!
//! Interval consolidation, completion status, batch summaries, and the
//! storage-backed progress service.

#![warn(missing_docs)]

pub mod tracker;
pub mod summary;
pub mod service;

pub use tracker::{WatchProgressTracker, ReportOutcome, ReportKind};
pub use summary::{summarize, WatchSummary};
pub use service::{ProgressService, ResumePoint, ServiceError};

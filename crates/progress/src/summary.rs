//! Aggregation over a batch of sessions.

use std::collections::HashMap;

use watchtrail_core::{CompletionStatus, WatchSession};

/// Counts and totals over a collection of sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchSummary {
    /// Number of sessions aggregated
    pub sessions: usize,
    /// Sessions per completion status
    pub by_status: HashMap<CompletionStatus, usize>,
    /// Sum of unique watch time, in seconds
    pub total_watch_time: f64,
    /// Mean watched percentage, 0 for an empty batch
    pub average_percentage: f64,
}

impl WatchSummary {
    /// Sessions with the given status.
    pub fn count(&self, status: CompletionStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Summarize a caller-supplied batch of sessions. No I/O.
pub fn summarize<'a, I>(sessions: I) -> WatchSummary
where
    I: IntoIterator<Item = &'a WatchSession>,
{
    let mut summary = WatchSummary::default();
    let mut percentage_sum = 0.0;

    for session in sessions {
        summary.sessions += 1;
        *summary.by_status.entry(session.completion_status).or_insert(0) += 1;
        summary.total_watch_time += session.total_watch_time;
        percentage_sum += session.watched_percentage;
    }

    if summary.sessions > 0 {
        summary.average_percentage = percentage_sum / summary.sessions as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtrail_core::SessionKey;

    fn session(video: &str, status: CompletionStatus, total: f64, pct: f64) -> WatchSession {
        let mut s = WatchSession::new(SessionKey::parse("viewer-1", video).unwrap(), 0.0);
        s.completion_status = status;
        s.total_watch_time = total;
        s.watched_percentage = pct;
        s
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&Vec::new());
        assert_eq!(summary.sessions, 0);
        assert_eq!(summary.total_watch_time, 0.0);
        assert_eq!(summary.average_percentage, 0.0);
        assert_eq!(summary.count(CompletionStatus::Completed), 0);
    }

    #[test]
    fn test_summarize_counts_and_totals() {
        let sessions = vec![
            session("a", CompletionStatus::Completed, 100.0, 100.0),
            session("b", CompletionStatus::InProgress, 30.0, 25.0),
            session("c", CompletionStatus::InProgress, 20.0, 10.0),
            session("d", CompletionStatus::NotStarted, 0.0, 0.0),
        ];

        let summary = summarize(&sessions);
        assert_eq!(summary.sessions, 4);
        assert_eq!(summary.count(CompletionStatus::Completed), 1);
        assert_eq!(summary.count(CompletionStatus::InProgress), 2);
        assert_eq!(summary.count(CompletionStatus::NotStarted), 1);
        assert_eq!(summary.total_watch_time, 150.0);
        assert_eq!(summary.average_percentage, 33.75);
    }
}

//! Watch-progress tracking: turns raw playback reports into coverage.
//!
//! The tracker is a pure transformation over [`WatchSession`]: it performs
//! no I/O and holds no state besides its configuration. Callers own
//! persistence and must serialize updates to the same (viewer, video) key.

use tracing::trace;
use watchtrail_core::{
    validate_duration, validate_position, CompletionSource, CompletionStatus, Result, SessionKey,
    TrackerConfig, WatchSession, WatchedInterval,
};

/// How a report was folded into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// First interval of the session
    Started,
    /// Within the gap tolerance: the current interval was extended
    Continued,
    /// Jump beyond the tolerance: the traversed span was added as a new interval
    Seek,
}

/// Result of applying one report.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// Updated session, for the caller to persist
    pub session: WatchSession,
    /// How the report was interpreted
    pub kind: ReportKind,
    /// True when this report moved the session into `Completed`
    pub newly_completed: bool,
}

/// Consolidates playback reports into watched intervals and completion status.
#[derive(Debug, Clone, Default)]
pub struct WatchProgressTracker {
    config: TrackerConfig,
}

impl WatchProgressTracker {
    /// Create a tracker from a configuration, validating it first.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Apply a playback report and return only the updated session.
    ///
    /// `key` is used only when `session` is `None` and a session must be created.
    pub fn report_position(
        &self,
        session: Option<&WatchSession>,
        key: &SessionKey,
        current_time: f64,
        reported_duration: Option<f64>,
    ) -> Result<WatchSession> {
        self.report(session, key, current_time, reported_duration)
            .map(|outcome| outcome.session)
    }

    /// Apply a playback report.
    ///
    /// Inputs are validated before anything changes: a negative or
    /// non-finite position, or a non-positive reported duration, is rejected
    /// and the caller's session is left as it was.
    pub fn report(
        &self,
        session: Option<&WatchSession>,
        key: &SessionKey,
        current_time: f64,
        reported_duration: Option<f64>,
    ) -> Result<ReportOutcome> {
        let current_time = validate_position(current_time)?;
        let reported_duration = reported_duration.map(validate_duration).transpose()?;

        let mut session = match session {
            Some(existing) => existing.clone(),
            None => WatchSession::new(key.clone(), current_time),
        };
        let was_completed = session.completion_status.is_terminal();

        if let Some(duration) = reported_duration {
            apply_duration(&mut session, duration);
        }

        let kind = self.record_span(&mut session, current_time)?;

        session.recompute_totals();
        self.update_status(&mut session);
        session.last_reported_position = current_time;
        session.last_watched_at = chrono::Utc::now();

        trace!(
            session = %session.id,
            position = current_time,
            ?kind,
            total = session.total_watch_time,
            status = %session.completion_status,
            "applied report"
        );

        let newly_completed = !was_completed && session.completion_status.is_terminal();
        Ok(ReportOutcome {
            session,
            kind,
            newly_completed,
        })
    }

    /// Force the session to `Completed` at 100%, whatever its coverage.
    ///
    /// Idempotent. The next report derives the percentage from coverage
    /// again; the status stays `Completed`.
    pub fn mark_completed(&self, mut session: WatchSession) -> WatchSession {
        session.completion_status = CompletionStatus::Completed;
        session.completion_source = Some(CompletionSource::Manual);
        session.recompute_totals();
        session.watched_percentage = 100.0;
        session
    }

    /// Fold the span between the last and current positions into the intervals.
    fn record_span(&self, session: &mut WatchSession, current_time: f64) -> Result<ReportKind> {
        let limit = session.known_duration();
        let clamp = |t: f64| limit.map_or(t, |d| t.min(d));
        let from = clamp(session.last_reported_position);
        let to = clamp(current_time);

        let jump = (current_time - session.last_reported_position).abs();
        if jump <= self.config.gap_tolerance_secs && session.watched_intervals.extend_from(from, to) {
            return Ok(ReportKind::Continued);
        }

        let kind = if session.watched_intervals.is_empty() {
            ReportKind::Started
        } else {
            ReportKind::Seek
        };
        session
            .watched_intervals
            .insert(WatchedInterval::spanning(from, to)?);
        Ok(kind)
    }

    /// Advance the status machine. `Completed` is terminal.
    fn update_status(&self, session: &mut WatchSession) {
        if session.completion_status.is_terminal() {
            return;
        }
        if session.known_duration().is_some()
            && session.watched_percentage >= self.config.completion_threshold_pct
        {
            session.completion_status = CompletionStatus::Completed;
            session.completion_source = Some(CompletionSource::Threshold);
        } else if session.total_watch_time > 0.0 {
            session.completion_status = CompletionStatus::InProgress;
        }
    }
}

/// Set or correct the session's duration and clip coverage to it.
fn apply_duration(session: &mut WatchSession, duration: f64) {
    if session.video_duration == Some(duration) {
        return;
    }
    session.video_duration = Some(duration);
    session.watched_intervals.clamp_to(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::parse("viewer-1", "video-1").unwrap()
    }

    fn tracker() -> WatchProgressTracker {
        WatchProgressTracker::default()
    }

    fn pairs(session: &WatchSession) -> Vec<(f64, f64)> {
        session
            .watched_intervals
            .iter()
            .map(|i| (i.start(), i.end()))
            .collect()
    }

    /// Feed a sequence of positions into a fresh session.
    fn play(tracker: &WatchProgressTracker, duration: f64, positions: &[f64]) -> WatchSession {
        let mut session = None;
        for &t in positions {
            session = Some(
                tracker
                    .report_position(session.as_ref(), &key(), t, Some(duration))
                    .unwrap(),
            );
        }
        session.unwrap()
    }

    fn assert_disjoint(session: &WatchSession) {
        let intervals = session.watched_intervals.as_slice();
        for pair in intervals.windows(2) {
            assert!(pair[0].end() < pair[1].start(), "{:?} touches {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_first_report_creates_not_started_session() {
        let outcome = tracker().report(None, &key(), 0.0, Some(120.0)).unwrap();
        let s = outcome.session;
        assert_eq!(outcome.kind, ReportKind::Started);
        assert_eq!(s.completion_status, CompletionStatus::NotStarted);
        assert_eq!(s.total_watch_time, 0.0);
        assert_eq!(s.video_duration, Some(120.0));
        assert_eq!(s.last_reported_position, 0.0);
    }

    #[test]
    fn test_scenario_forward_then_jump() {
        let t = tracker();
        let s = play(&t, 120.0, &[0.0, 30.0]);
        assert_eq!(pairs(&s), vec![(0.0, 30.0)]);
        assert_eq!(s.total_watch_time, 30.0);
        assert_eq!(s.watched_percentage, 25.0);
        assert_eq!(s.completion_status, CompletionStatus::InProgress);

        let outcome = t.report(Some(&s), &key(), 80.0, None).unwrap();
        assert_eq!(outcome.kind, ReportKind::Seek);
        assert_eq!(pairs(&outcome.session), vec![(0.0, 80.0)]);
        assert_eq!(outcome.session.total_watch_time, 80.0);
    }

    #[test]
    fn test_small_steps_extend_current_interval() {
        let t = tracker();
        let s = play(&t, 600.0, &[100.0, 104.0, 108.0, 113.0]);
        assert_eq!(pairs(&s), vec![(100.0, 113.0)]);

        let outcome = t.report(Some(&s), &key(), 117.0, None).unwrap();
        assert_eq!(outcome.kind, ReportKind::Continued);
        assert_eq!(outcome.session.total_watch_time, 17.0);
    }

    #[test]
    fn test_backward_seek_does_not_double_count() {
        let s = play(&tracker(), 100.0, &[10.0, 40.0, 20.0]);
        assert_eq!(pairs(&s), vec![(10.0, 40.0)]);
        assert_eq!(s.total_watch_time, 30.0);
        assert_eq!(s.last_reported_position, 20.0);
    }

    #[test]
    fn test_backward_seek_outside_coverage_counts_span() {
        let s = play(&tracker(), 200.0, &[100.0, 104.0, 50.0]);
        assert_eq!(pairs(&s), vec![(50.0, 104.0)]);
    }

    #[test]
    fn test_forward_playback_is_monotonic() {
        let t = tracker();
        let mut session = None;
        let mut previous = 0.0;
        for step in 0..60 {
            let s = t
                .report_position(session.as_ref(), &key(), step as f64 * 4.5, Some(1000.0))
                .unwrap();
            assert!(s.total_watch_time >= previous);
            previous = s.total_watch_time;
            session = Some(s);
        }
        assert_eq!(previous, 59.0 * 4.5);
    }

    #[test]
    fn test_disjoint_after_mixed_reports() {
        let s = play(
            &tracker(),
            300.0,
            &[0.0, 3.0, 90.0, 94.0, 60.0, 62.0, 200.0, 150.0, 151.0, 5.0, 299.0],
        );
        assert_disjoint(&s);
        assert!(s.total_watch_time <= 300.0);
    }

    #[test]
    fn test_completion_promotion() {
        let t = tracker();
        let s = play(&t, 100.0, &[0.0, 4.0, 8.0]);
        assert_eq!(s.completion_status, CompletionStatus::InProgress);

        let outcome = t.report(Some(&s), &key(), 96.0, None).unwrap();
        assert_eq!(pairs(&outcome.session), vec![(0.0, 96.0)]);
        assert_eq!(outcome.session.completion_status, CompletionStatus::Completed);
        assert_eq!(outcome.session.completion_source, Some(CompletionSource::Threshold));
        assert!(outcome.newly_completed);
    }

    #[test]
    fn test_completed_is_never_demoted() {
        let t = tracker();
        let mut s = play(&t, 100.0, &[0.0, 96.0]);
        assert_eq!(s.completion_status, CompletionStatus::Completed);

        // Correcting the duration upward lowers coverage but not the status
        s = t.report_position(Some(&s), &key(), 10.0, Some(1000.0)).unwrap();
        assert!(s.watched_percentage < 95.0);
        assert_eq!(s.completion_status, CompletionStatus::Completed);

        let outcome = t.report(Some(&s), &key(), 12.0, None).unwrap();
        assert_eq!(outcome.session.completion_status, CompletionStatus::Completed);
        assert!(!outcome.newly_completed);
    }

    #[test]
    fn test_custom_threshold() {
        let config = TrackerConfig::default().with_completion_threshold(50.0);
        let t = WatchProgressTracker::new(config).unwrap();
        let s = play(&t, 100.0, &[0.0, 50.0]);
        assert_eq!(s.completion_status, CompletionStatus::Completed);
    }

    #[test]
    fn test_custom_gap_tolerance() {
        let config = TrackerConfig::default().with_gap_tolerance(0.0);
        let t = WatchProgressTracker::new(config).unwrap();
        let s = play(&t, 100.0, &[0.0, 10.0]);
        let outcome = t.report(Some(&s), &key(), 12.0, None).unwrap();
        assert_eq!(outcome.kind, ReportKind::Seek);
        assert_eq!(pairs(&outcome.session), vec![(0.0, 12.0)]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrackerConfig::default().with_completion_threshold(0.0);
        assert!(WatchProgressTracker::new(config).is_err());
    }

    #[test]
    fn test_negative_position_rejected_without_mutation() {
        let t = tracker();
        let s = play(&t, 100.0, &[0.0, 20.0]);
        let snapshot = s.clone();

        let err = t.report_position(Some(&s), &key(), -1.0, None).unwrap_err();
        assert!(matches!(err, watchtrail_core::TrackerError::NegativePosition(_)));
        let err = t.report_position(Some(&s), &key(), f64::NAN, Some(200.0)).unwrap_err();
        assert!(matches!(err, watchtrail_core::TrackerError::NonFinite { .. }));
        assert_eq!(s, snapshot);

        // The rejected reports left no trace: 20 -> 23 continues the interval
        let outcome = t.report(Some(&s), &key(), 23.0, None).unwrap();
        assert_eq!(outcome.kind, ReportKind::Continued);
        assert_eq!(pairs(&outcome.session), vec![(0.0, 23.0)]);
        assert_eq!(outcome.session.video_duration, Some(100.0));
        assert_eq!(outcome.session.watched_percentage, 23.0);
    }

    #[test]
    fn test_invalid_reported_duration_rejected() {
        assert!(tracker().report(None, &key(), 5.0, Some(0.0)).is_err());
        assert!(tracker().report(None, &key(), 5.0, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_unknown_duration_never_auto_completes() {
        let t = tracker();
        let mut session = None;
        for pos in [0.0, 50.0, 100.0, 500.0] {
            session = Some(t.report_position(session.as_ref(), &key(), pos, None).unwrap());
        }
        let s = session.unwrap();
        assert_eq!(s.watched_percentage, 0.0);
        assert_eq!(s.completion_status, CompletionStatus::InProgress);
        assert_eq!(s.total_watch_time, 500.0);
    }

    #[test]
    fn test_positions_clamped_to_duration() {
        let s = play(&tracker(), 60.0, &[0.0, 40.0, 75.0]);
        assert_eq!(pairs(&s), vec![(0.0, 60.0)]);
        assert_eq!(s.total_watch_time, 60.0);
        assert_eq!(s.watched_percentage, 100.0);
        assert_eq!(s.last_reported_position, 75.0);
    }

    #[test]
    fn test_duration_correction_reclamps() {
        let t = tracker();
        let mut session = None;
        for pos in [0.0, 100.0] {
            session = Some(t.report_position(session.as_ref(), &key(), pos, None).unwrap());
        }
        let s = t.report_position(session.as_ref(), &key(), 100.0, Some(80.0)).unwrap();
        assert_eq!(pairs(&s), vec![(0.0, 80.0)]);
        assert_eq!(s.completion_status, CompletionStatus::Completed);
    }

    #[test]
    fn test_mark_completed_is_idempotent_override() {
        let t = tracker();
        let s = play(&t, 100.0, &[0.0, 10.0]);
        let once = t.mark_completed(s);
        assert_eq!(once.completion_status, CompletionStatus::Completed);
        assert_eq!(once.watched_percentage, 100.0);
        assert_eq!(once.completion_source, Some(CompletionSource::Manual));
        assert_eq!(once.total_watch_time, 10.0);

        let twice = t.mark_completed(once.clone());
        assert_eq!(twice, once);

        // Later reports derive the percentage again; the status stays terminal
        let after = t.report_position(Some(&twice), &key(), 12.0, None).unwrap();
        assert_eq!(after.total_watch_time, 12.0);
        assert_eq!(after.watched_percentage, 12.0);
        assert_eq!(after.completion_status, CompletionStatus::Completed);
        assert_eq!(after.completion_source, Some(CompletionSource::Manual));
    }

    #[test]
    fn test_mark_completed_without_duration() {
        let t = tracker();
        let s = t.report_position(None, &key(), 0.0, None).unwrap();
        let s = t.mark_completed(s);
        assert_eq!(s.completion_status, CompletionStatus::Completed);
        assert_eq!(s.watched_percentage, 100.0);
    }
}

//! # Recording Module
//!
//! Time-bounded accumulation of calibrated loudness readings and the summary
//! [`Report`] built when a session ends.
//!
//! A session ends either through [`Recorder::stop`] or automatically once a
//! sample reaches the maximum duration. Both paths go through the same
//! finalize step and leave the report in [`Recorder::last_report`] until the
//! next session replaces it.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{MeterError, Result};

/// A single loudness reading within a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbSample {
    /// Seconds since the session started.
    pub elapsed: f64,
    pub db: f64,
}

/// An extreme value and when it occurred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremum {
    pub db: f64,
    pub elapsed: f64,
}

/// Statistics over the db values of a non-empty session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub min: Extremum,
    pub max: Extremum,
    pub mean_db: f64,
    pub median_db: f64,
    /// Population standard deviation.
    pub std_db: f64,
}

/// Immutable summary of a finished recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub started_at: DateTime<Local>,
    /// Elapsed time of the last sample, 0 for an empty session.
    pub duration: f64,
    pub count: usize,
    /// `None` when the session collected no samples.
    pub stats: Option<ReportStats>,
    /// Every stored sample, for graphing.
    pub samples: Vec<DbSample>,
}

impl Report {
    fn from_samples(started_at: DateTime<Local>, samples: Vec<DbSample>) -> Self {
        let duration = samples.last().map_or(0.0, |s| s.elapsed);
        Report {
            started_at,
            duration,
            count: samples.len(),
            stats: compute_stats(&samples),
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

fn compute_stats(samples: &[DbSample]) -> Option<ReportStats> {
    let first = *samples.first()?;
    let n = samples.len() as f64;

    // Strict comparisons keep the first occurrence on ties.
    let mut min = Extremum {
        db: first.db,
        elapsed: first.elapsed,
    };
    let mut max = min;
    let mut sum = 0.0;
    for s in samples {
        if s.db < min.db {
            min = Extremum {
                db: s.db,
                elapsed: s.elapsed,
            };
        }
        if s.db > max.db {
            max = Extremum {
                db: s.db,
                elapsed: s.elapsed,
            };
        }
        sum += s.db;
    }
    let mean_db = sum / n;
    let variance = samples.iter().map(|s| (s.db - mean_db).powi(2)).sum::<f64>() / n;

    let mut sorted: Vec<f64> = samples.iter().map(|s| s.db).collect();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median_db = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    Some(ReportStats {
        min,
        max,
        mean_db,
        median_db,
        std_db: variance.sqrt(),
    })
}

/// An active recording session. It is consumed when the session ends.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    started_at: DateTime<Local>,
    started: Instant,
    samples: Vec<DbSample>,
}

impl RecordingSession {
    fn new(now: Instant) -> Self {
        Self {
            started_at: Local::now(),
            started: now,
            samples: Vec::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn samples(&self) -> &[DbSample] {
        &self.samples
    }

    /// Seconds between the session start and `now`.
    pub fn elapsed(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.started).as_secs_f64()
    }

    fn into_report(self) -> Report {
        Report::from_samples(self.started_at, self.samples)
    }
}

/// Owns at most one [`RecordingSession`] and the most recent [`Report`].
#[derive(Debug)]
pub struct Recorder {
    max_duration: f64,
    session: Option<RecordingSession>,
    last_report: Option<Arc<Report>>,
}

impl Recorder {
    pub fn new(max_duration: Duration) -> Self {
        Self {
            max_duration: max_duration.as_secs_f64(),
            session: None,
            last_report: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    /// Opens a new session starting at `now`.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.is_recording() {
            return Err(MeterError::AlreadyRecording);
        }
        let session = RecordingSession::new(now);
        info!(started_at = %session.started_at.format("%Y-%m-%d %H:%M:%S"), "recording started");
        self.session = Some(session);
        Ok(())
    }

    /// Appends a reading taken `elapsed` seconds into the session.
    ///
    /// Non-finite readings are skipped. A reading at or past the maximum
    /// duration ends the session; the resulting report is returned and also
    /// kept as [`last_report`](Self::last_report). Readings beyond the
    /// maximum are not stored.
    pub fn append(&mut self, elapsed: f64, db: f64) -> Option<Arc<Report>> {
        let session = self.session.as_mut()?;
        if db.is_finite() && elapsed <= self.max_duration {
            session.samples.push(DbSample { elapsed, db });
        }
        if elapsed < self.max_duration {
            return None;
        }
        debug!(elapsed, max = self.max_duration, "recording reached maximum duration");
        let session = self.session.take()?;
        Some(self.finish(session))
    }

    /// Appends a reading observed at `now`, measuring elapsed time from the
    /// session start.
    pub fn append_at(&mut self, now: Instant, db: f64) -> Option<Arc<Report>> {
        let elapsed = self.session.as_ref()?.elapsed(now);
        self.append(elapsed, db)
    }

    /// Ends the active session and returns its report.
    pub fn stop(&mut self) -> Result<Arc<Report>> {
        let session = self.session.take().ok_or(MeterError::NotRecording)?;
        Ok(self.finish(session))
    }

    /// The most recent report, held until the next session finishes.
    pub fn last_report(&self) -> Option<Arc<Report>> {
        self.last_report.clone()
    }

    fn finish(&mut self, session: RecordingSession) -> Arc<Report> {
        let report = session.into_report();
        info!(
            samples = report.count,
            duration = report.duration,
            "recording finished"
        );
        let report = Arc::new(report);
        self.last_report = Some(Arc::clone(&report));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn recorder() -> Recorder {
        Recorder::new(Duration::from_secs(60))
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        assert!(matches!(rec.start(Instant::now()), Err(MeterError::AlreadyRecording)));
        assert!(rec.is_recording());
    }

    #[test]
    fn stop_without_session_is_rejected() {
        let mut rec = recorder();
        assert!(matches!(rec.stop(), Err(MeterError::NotRecording)));
    }

    #[test]
    fn append_without_session_is_a_no_op() {
        let mut rec = recorder();
        assert!(rec.append(1.0, 50.0).is_none());
        assert!(rec.session().is_none());
        assert!(rec.last_report().is_none());
    }

    #[test]
    fn empty_session_has_no_statistics() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        let report = rec.stop().unwrap();
        assert!(report.is_empty());
        assert_eq!(report.duration, 0.0);
        assert!(report.stats.is_none());
        assert!(report.samples.is_empty());
        assert!(!rec.is_recording());
    }

    #[test]
    fn non_finite_readings_are_skipped() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        rec.append(0.1, f64::NEG_INFINITY);
        rec.append(0.2, 55.0);
        rec.append(0.3, f64::NAN);
        let report = rec.stop().unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(report.duration, 0.2);
        let stats = report.stats.unwrap();
        assert_eq!(stats.std_db, 0.0);
        assert_eq!(stats.min, stats.max);
    }

    #[test]
    fn statistics_over_known_values() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        for (t, db) in [(0.5, 60.0), (1.0, 70.0), (1.5, 50.0), (2.25, 80.0)] {
            assert!(rec.append(t, db).is_none());
        }
        let report = rec.stop().unwrap();
        assert_eq!(report.count, 4);
        assert_eq!(report.duration, 2.25);

        let stats = report.stats.unwrap();
        assert_eq!(stats.min, Extremum { db: 50.0, elapsed: 1.5 });
        assert_eq!(stats.max, Extremum { db: 80.0, elapsed: 2.25 });
        assert_abs_diff_eq!(stats.mean_db, 65.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats.median_db, 65.0, epsilon = 1e-12);
        // Population variance: (25 + 25 + 225 + 225) / 4 = 125.
        assert_abs_diff_eq!(stats.std_db, 125f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn odd_count_median_is_middle_value() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        for (t, db) in [(0.1, 42.0), (0.2, 90.0), (0.3, 45.0)] {
            rec.append(t, db);
        }
        let stats = rec.stop().unwrap().stats.unwrap();
        assert_eq!(stats.median_db, 45.0);
    }

    #[test]
    fn reaching_max_duration_stops_the_session() {
        let mut rec = Recorder::new(Duration::from_secs(2));
        rec.start(Instant::now()).unwrap();

        let mut report = None;
        let mut t = 0.0;
        while report.is_none() {
            t += 0.085;
            report = rec.append(t, 60.0 + t);
        }
        let report = report.unwrap();

        assert!(!rec.is_recording());
        assert!(report.samples.iter().all(|s| s.elapsed <= 2.0));
        assert_eq!(report.duration, report.samples.last().unwrap().elapsed);
        assert!(report.duration <= 2.0);
        assert_eq!(rec.last_report().as_deref(), Some(&*report));

        // Further readings do nothing until a new session starts.
        assert!(rec.append(t + 0.1, 70.0).is_none());
        assert!(matches!(rec.stop(), Err(MeterError::NotRecording)));
    }

    #[test]
    fn ended_session_is_released() {
        let mut rec = Recorder::new(Duration::from_secs(1));
        rec.start(Instant::now()).unwrap();
        rec.append(0.4, 58.0);
        assert_eq!(rec.session().map(|s| s.samples().len()), Some(1));

        let report = rec.append(1.2, 59.0).unwrap();
        assert!(rec.session().is_none());
        assert_eq!(report.count, 1);

        rec.start(Instant::now()).unwrap();
        assert!(rec.session().is_some_and(|s| s.samples().is_empty()));
        rec.stop().unwrap();
        assert!(rec.session().is_none());
        assert!(matches!(rec.stop(), Err(MeterError::NotRecording)));
    }

    #[test]
    fn sample_exactly_at_the_cap_is_kept() {
        let mut rec = Recorder::new(Duration::from_secs(1));
        rec.start(Instant::now()).unwrap();
        rec.append(0.5, 60.0);
        let report = rec.append(1.0, 61.0).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.duration, 1.0);
    }

    #[test]
    fn new_session_supersedes_previous_report_only_when_finished() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        rec.append(0.1, 50.0);
        let first = rec.stop().unwrap();

        rec.start(Instant::now()).unwrap();
        assert_eq!(rec.last_report().unwrap().count, first.count);
        rec.append(0.1, 51.0);
        rec.append(0.2, 52.0);
        rec.stop().unwrap();
        assert_eq!(rec.last_report().unwrap().count, 2);
    }

    #[test]
    fn report_serializes_for_export() {
        let mut rec = recorder();
        rec.start(Instant::now()).unwrap();
        rec.append(0.25, 48.5);
        let report = rec.stop().unwrap();
        let json = serde_json::to_value(&*report).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["samples"][0]["db"], 48.5);
        assert_eq!(json["stats"]["max"]["elapsed"], 0.25);
    }
}

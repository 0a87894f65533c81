//! One "mark attendance" pass over a batch of query embeddings.
//!
//! For every query: match against the gallery, consult the cooldown, append
//! admitted records to the ledger. Outcomes come back in input order.
//!
//! A session assumes it is the only pass in flight against its cooldown and
//! ledger. Callers serialize passes (the session takes `&mut self`).

use crate::clock::{Clock, SystemClock};
use crate::cooldown::{CooldownController, Decision};
use crate::record::AttendanceRecord;
use crate::types::{
    Embedding, EuclideanMatcher, MatchLabel, Matcher, RegisteredIdentity, DEFAULT_MATCH_THRESHOLD,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name recorded when an admitted id is missing from the candidate list.
const FALLBACK_NAME: &str = "Unknown";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no face detected for attendance")]
    NoFaceDetected,
    /// `completed` holds the outcomes of the queries handled before the
    /// failing append; their records are already in the ledger.
    #[error("ledger append failed after {} outcome(s): {message}", completed.len())]
    Ledger {
        message: String,
        completed: Vec<Outcome>,
    },
}

/// Append-only destination for admitted records.
pub trait LedgerSink {
    type Error: fmt::Display;

    fn append(&self, record: &AttendanceRecord) -> Result<(), Self::Error>;
}

impl<T: LedgerSink + ?Sized> LedgerSink for Arc<T> {
    type Error = T::Error;

    fn append(&self, record: &AttendanceRecord) -> Result<(), Self::Error> {
        (**self).append(record)
    }
}

/// Per-query result of a session pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Admitted {
        id: String,
        name: String,
        record: AttendanceRecord,
    },
    Throttled {
        id: String,
        name: String,
        remaining_minutes: u64,
    },
    Unknown,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Admitted { id, name, .. } => {
                write!(f, "Attendance marked for: {name} (ID: {id})")
            }
            Outcome::Throttled {
                id,
                name,
                remaining_minutes,
            } => write!(
                f,
                "{name} (ID: {id}) already marked attendance recently. \
                 Please wait {remaining_minutes} minutes."
            ),
            Outcome::Unknown => f.write_str("Unknown face detected."),
        }
    }
}

/// Overall status of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSummary {
    /// At least one record was appended.
    Marked(usize),
    /// Nothing admitted and at least one face was unknown.
    UnknownFace,
    /// Every recognized face was still cooling down.
    AllThrottled,
}

/// Outcomes of one pass, in query order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<Outcome>,
}

impl BatchReport {
    pub fn admitted_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Admitted { .. }))
    }

    pub fn throttled_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Throttled { .. }))
    }

    pub fn unknown_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Unknown))
    }

    pub fn summary(&self) -> BatchSummary {
        match self.admitted_count() {
            0 if self.unknown_count() > 0 => BatchSummary::UnknownFace,
            0 => BatchSummary::AllThrottled,
            n => BatchSummary::Marked(n),
        }
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

pub struct AttendanceSession<L, C = SystemClock> {
    matcher: Box<dyn Matcher + Send + Sync>,
    threshold: f32,
    cooldown: CooldownController,
    ledger: L,
    clock: C,
}

impl<L: LedgerSink, C: Clock> AttendanceSession<L, C> {
    pub fn new(cooldown: CooldownController, ledger: L, clock: C) -> Self {
        Self {
            matcher: Box::new(EuclideanMatcher),
            threshold: DEFAULT_MATCH_THRESHOLD,
            cooldown,
            ledger,
            clock,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + Send + Sync + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn cooldown(&self) -> &CooldownController {
        &self.cooldown
    }

    pub fn cooldown_mut(&mut self) -> &mut CooldownController {
        &mut self.cooldown
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run a pass stamped with the session clock's current time.
    pub fn process_now(
        &mut self,
        batch: &[Embedding],
        candidates: &[RegisteredIdentity],
    ) -> Result<BatchReport, SessionError> {
        let now = self.clock.now();
        self.process(batch, candidates, now)
    }

    /// Run a pass over `batch` against the `candidates` snapshot.
    ///
    /// An empty batch means the provider found no faces and is reported as
    /// [`SessionError::NoFaceDetected`], distinct from "all unknown". A ledger
    /// failure aborts the pass; records appended before it stay appended,
    /// their cooldowns stay recorded, and their outcomes come back in
    /// [`SessionError::Ledger`].
    pub fn process(
        &mut self,
        batch: &[Embedding],
        candidates: &[RegisteredIdentity],
        now: DateTime<Utc>,
    ) -> Result<BatchReport, SessionError> {
        if batch.is_empty() {
            return Err(SessionError::NoFaceDetected);
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for query in batch {
            let result = self.matcher.compare(query, candidates, self.threshold);
            tracing::debug!(label = %result.label, distance = result.distance, "query matched");

            let MatchLabel::Known(id) = result.label else {
                outcomes.push(Outcome::Unknown);
                continue;
            };

            let name = candidates
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| FALLBACK_NAME.to_string());

            match self.cooldown.admit(&id, now) {
                Decision::Admit => {
                    let record = AttendanceRecord::new(&name, &id, now);
                    if let Err(e) = self.ledger.append(&record) {
                        tracing::error!(id = %id, error = %e, "attendance record not saved");
                        return Err(SessionError::Ledger {
                            message: e.to_string(),
                            completed: outcomes,
                        });
                    }
                    self.cooldown.record(&id, now);
                    tracing::info!(id = %id, name = %name, timestamp = %record.timestamp, "attendance marked");
                    outcomes.push(Outcome::Admitted { id, name, record });
                }
                Decision::Throttled(remaining_minutes) => {
                    tracing::warn!(id = %id, remaining_minutes, "attendance throttled by cooldown");
                    outcomes.push(Outcome::Throttled {
                        id,
                        name,
                        remaining_minutes,
                    });
                }
            }
        }

        Ok(BatchReport { outcomes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::test_support::{embedding, identity};
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecLedger {
        lines: Mutex<Vec<String>>,
        /// Fail every append once this many lines are stored.
        capacity: Option<usize>,
    }

    impl LedgerSink for VecLedger {
        type Error = String;

        fn append(&self, record: &AttendanceRecord) -> Result<(), String> {
            let mut lines = self.lines.lock().unwrap();
            if self.capacity.is_some_and(|cap| lines.len() >= cap) {
                return Err("disk full".into());
            }
            lines.push(record.to_string());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn gallery() -> Vec<RegisteredIdentity> {
        vec![
            identity("E1", "Alice", &[0.0]),
            identity("E2", "Bob", &[5.0]),
        ]
    }

    fn session(ledger: Arc<VecLedger>) -> AttendanceSession<Arc<VecLedger>, ManualClock> {
        AttendanceSession::new(CooldownController::new(5), ledger, ManualClock::new(t0()))
    }

    #[test]
    fn test_empty_batch_is_nothing_detected() {
        let mut s = session(Arc::default());
        let err = s.process(&[], &gallery(), t0()).unwrap_err();
        assert!(matches!(err, SessionError::NoFaceDetected));
    }

    #[test]
    fn test_outcomes_follow_input_order() {
        let ledger = Arc::new(VecLedger::default());
        let mut s = session(ledger.clone());
        let batch = vec![embedding(&[5.1]), embedding(&[40.0]), embedding(&[0.1])];

        let report = s.process(&batch, &gallery(), t0()).unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert!(matches!(&report.outcomes[0], Outcome::Admitted { id, .. } if id == "E2"));
        assert_eq!(report.outcomes[1], Outcome::Unknown);
        assert!(matches!(&report.outcomes[2], Outcome::Admitted { id, .. } if id == "E1"));
        assert_eq!(report.summary(), BatchSummary::Marked(2));

        let lines = ledger.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                "Bob - E2 - 2024-01-01T00:00:00.000Z".to_string(),
                "Alice - E1 - 2024-01-01T00:00:00.000Z".to_string(),
            ]
        );
    }

    #[test]
    fn test_second_pass_inside_window_is_throttled() {
        let ledger = Arc::new(VecLedger::default());
        let mut s = session(ledger.clone());
        let batch = vec![embedding(&[0.0])];

        s.process(&batch, &gallery(), t0()).unwrap();
        let later = t0() + Duration::minutes(2);
        let report = s.process(&batch, &gallery(), later).unwrap();

        assert_eq!(
            report.outcomes,
            vec![Outcome::Throttled {
                id: "E1".into(),
                name: "Alice".into(),
                remaining_minutes: 3,
            }]
        );
        assert_eq!(report.summary(), BatchSummary::AllThrottled);
        assert_eq!(ledger.lines.lock().unwrap().len(), 1);
        assert_eq!(s.cooldown().last_admitted("E1"), Some(t0()));
    }

    #[test]
    fn test_same_identity_twice_in_one_batch() {
        let ledger = Arc::new(VecLedger::default());
        let mut s = session(ledger.clone());
        let batch = vec![embedding(&[0.0]), embedding(&[0.05])];

        let report = s.process(&batch, &gallery(), t0()).unwrap();
        assert_eq!(report.admitted_count(), 1);
        assert_eq!(report.throttled_count(), 1);
        assert_eq!(ledger.lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_only_summary() {
        let mut s = session(Arc::default());
        let report = s.process(&[embedding(&[99.0])], &gallery(), t0()).unwrap();
        assert_eq!(report.unknown_count(), 1);
        assert_eq!(report.summary(), BatchSummary::UnknownFace);
    }

    #[test]
    fn test_ledger_failure_leaves_cooldown_untouched() {
        let ledger = Arc::new(VecLedger {
            capacity: Some(0),
            ..Default::default()
        });
        let mut s = session(ledger);
        let err = s.process(&[embedding(&[0.0])], &gallery(), t0()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Ledger { message, completed } if message == "disk full" && completed.is_empty()
        ));
        assert!(s.cooldown().last_admitted("E1").is_none());
    }

    #[test]
    fn test_ledger_failure_mid_batch_keeps_earlier_outcomes() {
        let ledger = Arc::new(VecLedger {
            capacity: Some(1),
            ..Default::default()
        });
        let mut s = session(ledger.clone());
        let batch = vec![embedding(&[0.0]), embedding(&[40.0]), embedding(&[5.0])];

        let completed = match s.process(&batch, &gallery(), t0()).unwrap_err() {
            SessionError::Ledger { completed, .. } => completed,
            other => panic!("expected ledger error, got {other:?}"),
        };
        assert_eq!(completed.len(), 2);
        assert!(matches!(&completed[0], Outcome::Admitted { id, .. } if id == "E1"));
        assert_eq!(completed[1], Outcome::Unknown);
        assert_eq!(ledger.lines.lock().unwrap().len(), 1);
        assert_eq!(s.cooldown().last_admitted("E1"), Some(t0()));
        assert!(s.cooldown().last_admitted("E2").is_none());
    }

    #[test]
    fn test_process_now_uses_injected_clock() {
        let ledger = Arc::new(VecLedger::default());
        let mut s = session(ledger.clone());
        s.clock().advance(Duration::minutes(90));

        s.process_now(&[embedding(&[0.0])], &gallery()).unwrap();
        assert_eq!(
            ledger.lines.lock().unwrap()[0],
            "Alice - E1 - 2024-01-01T01:30:00.000Z"
        );
    }

    #[test]
    fn test_configurable_threshold() {
        let mut s = session(Arc::default()).with_threshold(0.05);
        let report = s.process(&[embedding(&[0.1])], &gallery(), t0()).unwrap();
        assert_eq!(report.outcomes, vec![Outcome::Unknown]);
    }

    #[test]
    fn test_outcome_messages() {
        let throttled = Outcome::Throttled {
            id: "E1".into(),
            name: "Alice".into(),
            remaining_minutes: 3,
        };
        assert_eq!(
            throttled.to_string(),
            "Alice (ID: E1) already marked attendance recently. Please wait 3 minutes."
        );
        assert_eq!(Outcome::Unknown.to_string(), "Unknown face detected.");
    }
}

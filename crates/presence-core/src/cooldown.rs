//! Per-identity attendance cooldown.
//!
//! Tracks the last admitted timestamp per identity for the lifetime of the
//! process. Nothing here is persisted: a restart clears every cooldown.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Admission decision for a freshly matched identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    /// Still inside the cooldown window; whole minutes left, rounded up.
    Throttled(u64),
}

#[derive(Debug, Clone, Default)]
pub struct CooldownController {
    min_interval_minutes: u32,
    last_admitted: HashMap<String, DateTime<Utc>>,
}

impl CooldownController {
    pub fn new(min_interval_minutes: u32) -> Self {
        Self {
            min_interval_minutes,
            last_admitted: HashMap::new(),
        }
    }

    pub fn min_interval_minutes(&self) -> u32 {
        self.min_interval_minutes
    }

    /// Change the window length. Existing timestamps are kept.
    pub fn set_min_interval(&mut self, minutes: u32) {
        self.min_interval_minutes = minutes;
    }

    /// Decide whether `identity_id` may be admitted at `now`.
    pub fn admit(&self, identity_id: &str, now: DateTime<Utc>) -> Decision {
        let Some(last) = self.last_admitted.get(identity_id) else {
            return Decision::Admit;
        };

        // A clock that stepped backwards counts as zero elapsed time.
        let elapsed_ms = (now - *last).num_milliseconds().max(0);
        let elapsed_minutes = elapsed_ms as f64 / MILLIS_PER_MINUTE;
        let window = f64::from(self.min_interval_minutes);

        if elapsed_minutes >= window {
            Decision::Admit
        } else {
            Decision::Throttled((window - elapsed_minutes).ceil() as u64)
        }
    }

    /// Remember an admission. Call exactly once per record actually appended.
    pub fn record(&mut self, identity_id: &str, now: DateTime<Utc>) {
        self.last_admitted.insert(identity_id.to_string(), now);
    }

    pub fn last_admitted(&self, identity_id: &str) -> Option<DateTime<Utc>> {
        self.last_admitted.get(identity_id).copied()
    }

    /// Forget every cooldown, e.g. after the ledger was replaced wholesale.
    pub fn clear(&mut self) {
        self.last_admitted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_first_sighting_is_admitted() {
        let cooldown = CooldownController::new(5);
        assert_eq!(cooldown.admit("E1", t0()), Decision::Admit);
    }

    #[test]
    fn test_throttled_inside_window() {
        let mut cooldown = CooldownController::new(5);
        cooldown.record("E1", t0());

        // 4.5 minutes in: half a minute left, rounded up to 1.
        let now = t0() + Duration::seconds(270);
        assert_eq!(cooldown.admit("E1", now), Decision::Throttled(1));

        // 1 minute in: 4 minutes left exactly.
        let now = t0() + Duration::minutes(1);
        assert_eq!(cooldown.admit("E1", now), Decision::Throttled(4));

        // Just after admission the full window remains.
        let now = t0() + Duration::milliseconds(1);
        assert_eq!(cooldown.admit("E1", now), Decision::Throttled(5));
    }

    #[test]
    fn test_admitted_at_window_boundary() {
        let mut cooldown = CooldownController::new(5);
        cooldown.record("E1", t0());
        assert_eq!(cooldown.admit("E1", t0() + Duration::minutes(5)), Decision::Admit);
        assert_eq!(cooldown.admit("E1", t0() + Duration::minutes(60)), Decision::Admit);
    }

    #[test]
    fn test_cooldowns_are_per_identity() {
        let mut cooldown = CooldownController::new(5);
        cooldown.record("E1", t0());
        assert_eq!(cooldown.admit("E2", t0()), Decision::Admit);
    }

    #[test]
    fn test_zero_interval_always_admits() {
        let mut cooldown = CooldownController::new(0);
        cooldown.record("E1", t0());
        assert_eq!(cooldown.admit("E1", t0()), Decision::Admit);
    }

    #[test]
    fn test_clock_stepping_backwards_stays_bounded() {
        let mut cooldown = CooldownController::new(5);
        cooldown.record("E1", t0());
        let earlier = t0() - Duration::minutes(30);
        assert_eq!(cooldown.admit("E1", earlier), Decision::Throttled(5));
    }

    #[test]
    fn test_clear_forgets_everyone() {
        let mut cooldown = CooldownController::new(5);
        cooldown.record("E1", t0());
        cooldown.clear();
        assert!(cooldown.last_admitted("E1").is_none());
        assert_eq!(cooldown.admit("E1", t0()), Decision::Admit);
    }
}

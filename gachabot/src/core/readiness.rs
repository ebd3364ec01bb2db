//! Interval-based readiness clock for recurring stations.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Tracks when a station last completed and how often it recurs.
///
/// A clock that has never completed is due immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessClock {
    interval: Duration,
    last_completed: Option<DateTime<Utc>>,
}

impl ReadinessClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_completed: None,
        }
    }

    /// Start counting from `now`, as if the station had just completed.
    pub fn started_at(interval: Duration, now: DateTime<Utc>) -> Self {
        Self {
            interval,
            last_completed: Some(now),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_completed(&self) -> Option<DateTime<Utc>> {
        self.last_completed
    }

    /// Time since the last completion (zero if never completed or the clock went backwards).
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.last_completed
            .and_then(|last| (now - last).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// `now - last_completed >= interval`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_completed {
            None => true,
            Some(_) => self.elapsed(now) >= self.interval,
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.last_completed = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("timestamp")
    }

    #[test]
    fn never_completed_is_due() {
        let clock = ReadinessClock::new(Duration::from_secs(600));
        assert!(clock.is_due(at(0)));
        assert_eq!(clock.elapsed(at(0)), Duration::ZERO);
    }

    #[test]
    fn due_exactly_at_interval() {
        let clock = ReadinessClock::started_at(Duration::from_secs(600), at(0));
        assert!(!clock.is_due(at(599)));
        assert!(clock.is_due(at(600)));
        assert_eq!(clock.elapsed(at(650)), Duration::from_secs(650));
    }

    #[test]
    fn completion_resets_the_wait() {
        let mut clock = ReadinessClock::started_at(Duration::from_secs(60), at(0));
        assert!(clock.is_due(at(100)));
        clock.mark_completed(at(100));
        assert!(!clock.is_due(at(120)));
        assert_eq!(clock.last_completed(), Some(at(100)));
    }

    #[test]
    fn clock_skew_never_counts_as_elapsed() {
        let clock = ReadinessClock::started_at(Duration::from_secs(60), at(100));
        assert_eq!(clock.elapsed(at(0)), Duration::ZERO);
        assert!(!clock.is_due(at(0)));
    }
}

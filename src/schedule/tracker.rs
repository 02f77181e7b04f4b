use chrono::{DateTime, Duration, Utc};

use super::cadence::next_boundary;

/// Interval gate for the summary notification
///
/// Independent of the trading cadence: frames may run every minute while
/// the summary goes out every four hours.
#[derive(Debug, Clone)]
pub struct NotificationGate {
    next: DateTime<Utc>,
    period: Duration,
}

impl NotificationGate {
    /// Gate whose first trigger is the next aligned boundary after now
    pub fn new(period_secs: u64) -> Self {
        Self::starting_at(Utc::now(), period_secs)
    }

    pub fn starting_at(now: DateTime<Utc>, period_secs: u64) -> Self {
        let period_secs = period_secs.max(1);
        Self {
            next: next_boundary(now, period_secs),
            period: Duration::seconds(period_secs as i64),
        }
    }

    pub fn is_due(&mut self) -> bool {
        self.is_due_at(Utc::now())
    }

    /// Advances by exactly one period when due, even after a long pause
    pub fn is_due_at(&mut self, now: DateTime<Utc>) -> bool {
        if now >= self.next {
            self.next += self.period;
            return true;
        }
        false
    }

    pub fn next_trigger(&self) -> DateTime<Utc> {
        self.next
    }
}

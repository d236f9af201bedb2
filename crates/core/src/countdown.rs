//! Remaining-time arithmetic for timed attempts.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Derived countdown state. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountdownState {
    pub time_remaining_seconds: u64,
    pub warning_threshold_seconds: u64,
    pub total_seconds: u64,
    pub warning_fired: bool,
    pub expired: bool,
}

/// What a single observation of the clock produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountdownUpdate {
    /// Set on the one observation where remaining time first dropped to the threshold.
    pub warning: Option<u64>,
    /// Set on the one observation where remaining time first reached zero.
    pub expired: bool,
}

/// Countdown for one attempt, computed from the attempt's start time and limit.
///
/// Each observation recomputes remaining time from absolute timestamps, so a
/// suspended process or late ticks cannot cause drift. Readings never go up and
/// never go below zero.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    deadline: DateTime<Utc>,
    skew: Duration,
    state: CountdownState,
}

impl CountdownTimer {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, limit_seconds: u64, warning_threshold_seconds: u64) -> Self {
        let limit = i64::try_from(limit_seconds).unwrap_or(i64::MAX);
        let deadline = started_at
            .checked_add_signed(Duration::seconds(limit))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            deadline,
            skew: Duration::zero(),
            state: CountdownState {
                time_remaining_seconds: limit_seconds,
                warning_threshold_seconds,
                total_seconds: limit_seconds,
                warning_fired: false,
                expired: false,
            },
        }
    }

    /// Offset to add to local time to get service time.
    pub fn set_skew(&mut self, skew: Duration) {
        self.skew = skew;
    }

    #[must_use]
    pub fn state(&self) -> CountdownState {
        self.state
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state.expired
    }

    /// Recompute remaining time at local time `now`.
    pub fn observe(&mut self, now: DateTime<Utc>) -> CountdownUpdate {
        let service_now = now.checked_add_signed(self.skew).unwrap_or(now);
        let left = self.deadline.signed_duration_since(service_now);
        // whole seconds, rounded up, so zero means the deadline has passed
        let millis = left.num_milliseconds().max(0);
        let seconds = u64::try_from((millis + 999) / 1000).unwrap_or(0);

        let remaining = seconds.min(self.state.time_remaining_seconds);
        self.state.time_remaining_seconds = remaining;

        let mut update = CountdownUpdate::default();
        if !self.state.warning_fired && remaining <= self.state.warning_threshold_seconds {
            self.state.warning_fired = true;
            update.warning = Some(remaining);
        }
        if !self.state.expired && remaining == 0 {
            self.state.expired = true;
            update.expired = true;
        }
        update
    }
}

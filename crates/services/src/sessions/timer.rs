use std::time::Duration;

use chrono::{DateTime, Utc};
use quiz_core::countdown::CountdownUpdate;
use quiz_core::{CountdownState, CountdownTimer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::schedule::ScheduledTask;

/// Countdown plus the ticker that drives it.
#[derive(Debug)]
pub(crate) struct SessionTimer {
    countdown: CountdownTimer,
    ticker: Option<ScheduledTask>,
}

impl SessionTimer {
    pub(crate) fn new(started_at: DateTime<Utc>, limit_seconds: u64, warning: Duration) -> Self {
        Self {
            countdown: CountdownTimer::new(started_at, limit_seconds, warning.as_secs()),
            ticker: None,
        }
    }

    pub(crate) fn start<E, F>(
        &mut self,
        period: Duration,
        parent: &CancellationToken,
        events: mpsc::Sender<E>,
        make: F,
    ) where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        self.ticker = Some(ScheduledTask::every(period, parent, events, make));
    }

    /// Whether a tick pulled off the queue should still be acted on.
    pub(crate) fn accepts_ticks(&self) -> bool {
        !self.countdown.is_expired() && self.ticker.as_ref().is_some_and(ScheduledTask::is_active)
    }

    /// Record the offset between the service clock and ours.
    pub(crate) fn sync(&mut self, server_time: Option<DateTime<Utc>>, local_now: DateTime<Utc>) {
        if let Some(server_time) = server_time {
            self.countdown.set_skew(server_time.signed_duration_since(local_now));
        }
    }

    /// Recompute remaining time. Ticking stops once the countdown expires.
    pub(crate) fn observe(&mut self, now: DateTime<Utc>) -> CountdownUpdate {
        let update = self.countdown.observe(now);
        if update.expired {
            self.stop();
        }
        update
    }

    pub(crate) fn state(&self) -> CountdownState {
        self.countdown.state()
    }

    pub(crate) fn stop(&self) {
        if let Some(ticker) = &self.ticker {
            ticker.stop();
        }
    }
}

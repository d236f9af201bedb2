use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::state::{AttemptSession, InFlightOperation};
use crate::schedule::ScheduledTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AutosaveDecision {
    Flush,
    /// Nothing changed since the last acknowledged save.
    Clean,
    /// Another call holds the in-flight slot; try again next period.
    Busy(InFlightOperation),
    Stopped,
}

/// Periodic flush of unsaved answers.
#[derive(Debug)]
pub(crate) struct AutosaveScheduler {
    period: Duration,
    ticker: Option<ScheduledTask>,
}

impl AutosaveScheduler {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn start<E, F>(
        &mut self,
        parent: &CancellationToken,
        events: mpsc::Sender<E>,
        make: F,
    ) where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        self.ticker = Some(ScheduledTask::every(self.period, parent, events, make));
    }

    pub(crate) fn decide(&self, session: &AttemptSession) -> AutosaveDecision {
        if !self.ticker.as_ref().is_some_and(ScheduledTask::is_active) || session.is_terminal() {
            return AutosaveDecision::Stopped;
        }
        if !session.is_dirty() {
            return AutosaveDecision::Clean;
        }
        match session.in_flight() {
            InFlightOperation::None => AutosaveDecision::Flush,
            other => AutosaveDecision::Busy(other),
        }
    }

    pub(crate) fn stop(&self) {
        if let Some(ticker) = &self.ticker {
            ticker.stop();
        }
    }
}

//! Periodic and one-shot tasks that feed events into a session queue.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A background task that delivers events until its token is cancelled.
///
/// The owner keeps the token and checks it again when an event is handled, so
/// an event already sitting in the queue when `stop` runs is still ignored.
#[derive(Debug)]
pub(crate) struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Deliver `make()` every `period`, first after one full period.
    ///
    /// Ticks that find the queue full are dropped rather than queued up.
    pub(crate) fn every<E, F>(
        period: Duration,
        parent: &CancellationToken,
        events: mpsc::Sender<E>,
        make: F,
    ) -> Self
    where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        let token = parent.child_token();
        let cancel = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = ticks.tick() => {
                        match events.try_send(make()) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::debug!("event queue full, dropping tick");
                            }
                            Err(TrySendError::Closed(_)) => return,
                        }
                    }
                }
            }
        });
        Self { token, handle }
    }

    /// Deliver `event` once after `delay`.
    pub(crate) fn once<E>(
        delay: Duration,
        parent: &CancellationToken,
        events: mpsc::Sender<E>,
        event: E,
    ) -> Self
    where
        E: Send + 'static,
    {
        let token = parent.child_token();
        let cancel = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = time::sleep(delay) => {
                    let _ = events.send(event).await;
                }
            }
        });
        Self { token, handle }
    }

    #[must_use]
    pub(crate) fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub(crate) fn stop(&self) {
        self.token.cancel();
        self.handle.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.stop();
    }
}

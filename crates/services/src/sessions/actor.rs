use std::sync::Arc;
use std::time::Duration;

use assessment_client::{AssessmentService, ServiceError};
use quiz_core::model::{FieldValue, SubmissionResult};
use quiz_core::{AnswerCodec, Clock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::autosave::{AutosaveDecision, AutosaveScheduler};
use super::loader::{LoadedPage, load_page};
use super::state::{AttemptSession, InFlightOperation};
use super::timer::SessionTimer;
use super::view::SessionView;
use crate::error::{PageLoadError, SessionError};
use crate::ports::SessionNotification;
use crate::schedule::ScheduledTask;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// User requests forwarded by the controller handle.
pub(crate) enum Command {
    Navigate {
        page: usize,
        reply: Reply<SessionView>,
    },
    RecordAnswer {
        key: String,
        value: FieldValue,
        reply: Reply<()>,
    },
    Submit {
        reply: Reply<SubmissionResult>,
    },
    Cancel {
        reply: Reply<()>,
    },
}

impl Command {
    fn reject(self, err: SessionError) {
        match self {
            Command::Navigate { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::RecordAnswer { reply, .. } | Command::Cancel { reply } => {
                let _ = reply.send(Err(err));
            }
            Command::Submit { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Everything that can change a session, in the order it is handled.
pub(crate) enum Event {
    Command(Command),
    TimerTick,
    AutosaveTick,
    GraceElapsed,
    PageLoaded {
        page: usize,
        result: Result<LoadedPage, PageLoadError>,
        reply: Reply<SessionView>,
    },
    Saved {
        revision: u64,
        result: Result<(), ServiceError>,
    },
    Submitted {
        automatic: bool,
        result: Result<SubmissionResult, ServiceError>,
        reply: Option<Reply<SubmissionResult>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoSubmit {
    Idle,
    /// Expired, grace period running.
    Waiting,
    /// Grace period over but another call was in flight.
    Pending,
    Done,
}

pub(crate) struct ActorSetup {
    pub session: AttemptSession,
    pub service: Arc<dyn AssessmentService>,
    pub codec: Arc<dyn AnswerCodec>,
    pub clock: Clock,
    pub tick_period: Duration,
    pub expiry_grace: Duration,
    pub timer: Option<SessionTimer>,
    pub autosave: AutosaveScheduler,
    pub events_tx: mpsc::Sender<Event>,
    pub events: mpsc::Receiver<Event>,
    pub views: watch::Sender<Option<SessionView>>,
    pub notifications: broadcast::Sender<SessionNotification>,
    pub shutdown: CancellationToken,
}

/// Owns one `AttemptSession` and applies every event to it in arrival order.
///
/// Service calls run as separate tasks and report back through the same
/// queue, so the actor never waits on the network and edits keep flowing
/// while a save or page load is outstanding.
pub(crate) struct SessionActor {
    session: AttemptSession,
    service: Arc<dyn AssessmentService>,
    codec: Arc<dyn AnswerCodec>,
    clock: Clock,
    tick_period: Duration,
    expiry_grace: Duration,
    timer: Option<SessionTimer>,
    autosave: AutosaveScheduler,
    grace: Option<ScheduledTask>,
    auto_submit: AutoSubmit,
    queued_submit: Option<Reply<SubmissionResult>>,
    operation: Option<JoinHandle<()>>,
    events_tx: mpsc::Sender<Event>,
    events: mpsc::Receiver<Event>,
    views: watch::Sender<Option<SessionView>>,
    notifications: broadcast::Sender<SessionNotification>,
    shutdown: CancellationToken,
}

impl SessionActor {
    pub(crate) fn new(setup: ActorSetup) -> Self {
        Self {
            session: setup.session,
            service: setup.service,
            codec: setup.codec,
            clock: setup.clock,
            tick_period: setup.tick_period,
            expiry_grace: setup.expiry_grace,
            timer: setup.timer,
            autosave: setup.autosave,
            grace: None,
            auto_submit: AutoSubmit::Idle,
            queued_submit: None,
            operation: None,
            events_tx: setup.events_tx,
            events: setup.events,
            views: setup.views,
            notifications: setup.notifications,
            shutdown: setup.shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        self.start_schedules();
        // an attempt resumed close to (or past) its deadline reacts right away
        self.on_timer_tick();
        self.publish();

        loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
            self.publish();
            if self.session.is_terminal() {
                break;
            }
        }

        self.stop_schedules();
        if let Some(operation) = self.operation.take() {
            operation.abort();
        }
        self.drain();
        debug!(attempt_id = %self.session.attempt_id(), "session actor stopped");
    }

    fn start_schedules(&mut self) {
        let events = self.events_tx.clone();
        if let Some(timer) = self.timer.as_mut() {
            timer.start(self.tick_period, &self.shutdown, events.clone(), || {
                Event::TimerTick
            });
        }
        self.autosave
            .start(&self.shutdown, events, || Event::AutosaveTick);
        debug!(
            attempt_id = %self.session.attempt_id(),
            autosave = ?self.autosave.period(),
            timed = self.timer.is_some(),
            "session schedules started"
        );
    }

    fn stop_schedules(&mut self) {
        if let Some(timer) = &self.timer {
            timer.stop();
        }
        self.autosave.stop();
        if let Some(grace) = self.grace.take() {
            grace.stop();
        }
    }

    /// Answer whatever is still queued once the actor is done.
    fn drain(&mut self) {
        self.events.close();
        let state = self.session.state();
        let stopped = || {
            if state.is_terminal() {
                SessionError::Finalized(state)
            } else {
                SessionError::Closed
            }
        };
        if let Some(reply) = self.queued_submit.take() {
            let _ = reply.send(Err(stopped()));
        }
        while let Ok(event) = self.events.try_recv() {
            if let Event::Command(command) = event {
                command.reject(stopped());
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.on_command(command),
            Event::TimerTick => {
                if self.timer.as_ref().is_some_and(SessionTimer::accepts_ticks) {
                    self.on_timer_tick();
                }
            }
            Event::AutosaveTick => self.on_autosave_tick(),
            Event::GraceElapsed => self.on_grace_elapsed(),
            Event::PageLoaded {
                page,
                result,
                reply,
            } => self.on_page_loaded(page, result, reply),
            Event::Saved { revision, result } => self.on_saved(revision, result),
            Event::Submitted {
                automatic,
                result,
                reply,
            } => self.on_submitted(automatic, result, reply),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::RecordAnswer { key, value, reply } => {
                let result = self.session.record_edit(&key, value);
                if let Err(err) = &result {
                    debug!(%key, error = %err, "answer change rejected");
                }
                self.respond(reply, result);
            }
            Command::Navigate { page, reply } => self.start_navigation(page, reply),
            Command::Submit { reply } => self.request_submit(reply),
            Command::Cancel { reply } => {
                let result = self.cancel();
                self.respond(reply, result);
            }
        }
    }

    fn start_navigation(&mut self, page: usize, reply: Reply<SessionView>) {
        if self.session.is_terminal() {
            self.respond(reply, Err(SessionError::Finalized(self.session.state())));
            return;
        }
        let total = self.session.total_pages();
        if page >= total {
            self.respond(reply, Err(SessionError::PageOutOfRange { index: page, total }));
            return;
        }
        if let Err(err) = self.session.begin(InFlightOperation::LoadingPage) {
            self.respond(reply, Err(err));
            return;
        }

        let service = Arc::clone(&self.service);
        let codec = Arc::clone(&self.codec);
        let attempt_id = self.session.attempt_id();
        let events = self.events_tx.clone();
        debug!(%attempt_id, page, "loading page");
        self.operation = Some(tokio::spawn(async move {
            let result = load_page(service.as_ref(), codec.as_ref(), attempt_id, page).await;
            let _ = events
                .send(Event::PageLoaded {
                    page,
                    result,
                    reply,
                })
                .await;
        }));
    }

    fn on_page_loaded(
        &mut self,
        page: usize,
        result: Result<LoadedPage, PageLoadError>,
        reply: Reply<SessionView>,
    ) {
        self.session.finish();
        self.operation = None;
        match result {
            Ok(loaded) => {
                if let Some(timer) = self.timer.as_mut() {
                    timer.sync(loaded.server_time, self.clock.now());
                }
                self.session.replace_page(loaded.cache, &loaded.attempt);
                info!(attempt_id = %self.session.attempt_id(), page, "page loaded");
                self.notify(SessionNotification::PageChanged { page });
                self.respond(reply, Ok(self.view()));
            }
            Err(source) => {
                warn!(
                    attempt_id = %self.session.attempt_id(),
                    page,
                    error = %source,
                    "page load failed"
                );
                self.notify(SessionNotification::NavigationFailed {
                    page,
                    reason: source.to_string(),
                });
                self.respond(reply, Err(SessionError::NavigationFailed { page, source }));
            }
        }
        self.run_deferred();
    }

    fn on_autosave_tick(&mut self) {
        match self.autosave.decide(&self.session) {
            AutosaveDecision::Flush => self.start_autosave(),
            AutosaveDecision::Busy(op) => debug!(?op, "autosave skipped, call in flight"),
            AutosaveDecision::Clean | AutosaveDecision::Stopped => {}
        }
    }

    fn start_autosave(&mut self) {
        if let Err(err) = self.session.begin(InFlightOperation::Autosaving) {
            debug!(error = %err, "autosave not started");
            return;
        }
        let collected = self.session.collect();
        let service = Arc::clone(&self.service);
        let attempt_id = self.session.attempt_id();
        let events = self.events_tx.clone();
        debug!(%attempt_id, answers = collected.answers.len(), "autosaving");
        self.operation = Some(tokio::spawn(async move {
            let result = service.save_attempt(attempt_id, &collected.answers).await;
            let _ = events
                .send(Event::Saved {
                    revision: collected.revision,
                    result,
                })
                .await;
        }));
    }

    fn on_saved(&mut self, revision: u64, result: Result<(), ServiceError>) {
        self.session.finish();
        self.operation = None;
        match result {
            Ok(()) => {
                self.session.mark_saved(revision, self.clock.now());
                debug!(
                    attempt_id = %self.session.attempt_id(),
                    dirty = self.session.is_dirty(),
                    "autosave stored"
                );
                self.notify(SessionNotification::Saved);
            }
            Err(err) => {
                warn!(attempt_id = %self.session.attempt_id(), error = %err, "autosave failed");
                self.notify(SessionNotification::SaveFailed {
                    reason: err.to_string(),
                });
            }
        }
        self.run_deferred();
    }

    fn request_submit(&mut self, reply: Reply<SubmissionResult>) {
        if self.session.is_terminal() {
            self.respond(reply, Err(SessionError::Finalized(self.session.state())));
            return;
        }
        match self.session.in_flight() {
            InFlightOperation::None => self.start_submit(false, Some(reply)),
            InFlightOperation::Autosaving if self.queued_submit.is_none() => {
                debug!("submit waits for the running autosave");
                self.queued_submit = Some(reply);
            }
            op => {
                self.respond(reply, Err(SessionError::Busy(op)));
            }
        }
    }

    fn start_submit(&mut self, automatic: bool, reply: Option<Reply<SubmissionResult>>) {
        if let Err(err) = self.session.begin(InFlightOperation::Submitting) {
            if let Some(reply) = reply {
                self.respond(reply, Err(err));
            }
            return;
        }
        let collected = self.session.collect();
        let service = Arc::clone(&self.service);
        let attempt_id = self.session.attempt_id();
        let events = self.events_tx.clone();
        info!(%attempt_id, automatic, answers = collected.answers.len(), "submitting attempt");
        self.operation = Some(tokio::spawn(async move {
            let result = service.submit_attempt(attempt_id, &collected.answers).await;
            let _ = events
                .send(Event::Submitted {
                    automatic,
                    result,
                    reply,
                })
                .await;
        }));
    }

    fn on_submitted(
        &mut self,
        automatic: bool,
        result: Result<SubmissionResult, ServiceError>,
        reply: Option<Reply<SubmissionResult>>,
    ) {
        self.session.finish();
        self.operation = None;
        match result {
            Ok(result) => {
                self.session.mark_submitted();
                self.stop_schedules();
                info!(
                    attempt_id = %self.session.attempt_id(),
                    automatic,
                    grade = ?result.grade,
                    "attempt submitted"
                );
                self.notify(SessionNotification::Submitted {
                    result: result.clone(),
                    automatic,
                });
                if let Some(reply) = reply {
                    self.respond(reply, Ok(result));
                }
            }
            Err(source) => {
                error!(
                    attempt_id = %self.session.attempt_id(),
                    automatic,
                    error = %source,
                    "submission failed"
                );
                self.notify(SessionNotification::SubmitFailed {
                    reason: source.to_string(),
                    automatic,
                });
                if let Some(reply) = reply {
                    self.respond(reply, Err(SessionError::SubmitFailed { source }));
                }
            }
        }
        self.run_deferred();
    }

    fn on_timer_tick(&mut self) {
        let Some(timer) = self.timer.as_mut() else {
            return;
        };
        let update = timer.observe(self.clock.now());
        if let Some(remaining_seconds) = update.warning {
            info!(remaining_seconds, "time limit approaching");
            self.notify(SessionNotification::TimeWarning { remaining_seconds });
        }
        if update.expired && self.auto_submit == AutoSubmit::Idle {
            warn!(attempt_id = %self.session.attempt_id(), "time limit reached");
            self.notify(SessionNotification::TimeExpired);
            self.auto_submit = AutoSubmit::Waiting;
            self.grace = Some(ScheduledTask::once(
                self.expiry_grace,
                &self.shutdown,
                self.events_tx.clone(),
                Event::GraceElapsed,
            ));
        }
    }

    fn on_grace_elapsed(&mut self) {
        if !self.grace.as_ref().is_some_and(ScheduledTask::is_active) {
            return;
        }
        self.grace = None;
        if self.auto_submit != AutoSubmit::Waiting {
            return;
        }
        match self.session.in_flight() {
            InFlightOperation::None => {
                self.auto_submit = AutoSubmit::Done;
                let reply = self.queued_submit.take();
                self.start_submit(true, reply);
            }
            op => {
                info!(?op, "automatic submit waits for the call in flight");
                self.auto_submit = AutoSubmit::Pending;
            }
        }
    }

    /// Start work that was held back while another call was in flight.
    fn run_deferred(&mut self) {
        if self.session.is_terminal() || self.session.in_flight() != InFlightOperation::None {
            return;
        }
        let reply = self.queued_submit.take();
        if self.auto_submit == AutoSubmit::Pending {
            self.auto_submit = AutoSubmit::Done;
            self.start_submit(true, reply);
        } else if let Some(reply) = reply {
            self.start_submit(false, Some(reply));
        }
    }

    fn cancel(&mut self) -> Result<(), SessionError> {
        if self.session.is_terminal() {
            return Err(SessionError::Finalized(self.session.state()));
        }
        if let Some(operation) = self.operation.take() {
            operation.abort();
        }
        self.stop_schedules();
        self.session.mark_cancelled();
        if let Some(reply) = self.queued_submit.take() {
            self.respond(reply, Err(SessionError::Finalized(self.session.state())));
        }
        info!(attempt_id = %self.session.attempt_id(), "attempt session cancelled");
        self.notify(SessionNotification::Cancelled);
        Ok(())
    }

    fn view(&self) -> SessionView {
        SessionView::capture(&self.session, self.timer.as_ref().map(SessionTimer::state))
    }

    /// Publish the new snapshot before answering, so a caller that reads the
    /// view right after its reply sees the change.
    fn respond<T>(&self, reply: Reply<T>, result: Result<T, SessionError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn publish(&self) {
        self.views.send_replace(Some(self.view()));
    }

    fn notify(&self, notification: SessionNotification) {
        // no subscribers is fine
        let _ = self.notifications.send(notification);
    }
}

use std::sync::Arc;

use assessment_client::AssessmentService;
use quiz_core::model::{AccessInfo, FieldValue, QuizId, SubmissionResult};
use quiz_core::{AnswerCodec, Clock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::actor::{ActorSetup, Command, Event, Reply, SessionActor};
use super::autosave::AutosaveScheduler;
use super::loader::{LoadedPage, load_page};
use super::state::{AttemptSession, InFlightOperation, SessionState};
use super::timer::SessionTimer;
use super::view::SessionView;
use crate::error::{InitializationError, SessionError};
use crate::ports::{ConfirmationPort, ConfirmationRequest, SessionNotification};
use crate::settings::SessionSettings;

const NOTIFICATION_CAPACITY: usize = 64;

struct Running {
    events: mpsc::Sender<Event>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives one attempt of one quiz from open to submit or cancel.
///
/// `initialize` resumes an unfinished attempt when the service reports one,
/// otherwise starts a new attempt. Afterwards every operation is handed to a
/// background actor that owns the session state, the countdown and the
/// autosave schedule. Dropping the controller stops that actor.
pub struct SessionController {
    clock: Clock,
    service: Arc<dyn AssessmentService>,
    codec: Arc<dyn AnswerCodec>,
    confirmation: Arc<dyn ConfirmationPort>,
    settings: SessionSettings,
    notifications: broadcast::Sender<SessionNotification>,
    views: watch::Receiver<Option<SessionView>>,
    publisher: Option<watch::Sender<Option<SessionView>>>,
    failed: bool,
    running: Option<Running>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        clock: Clock,
        service: Arc<dyn AssessmentService>,
        codec: Arc<dyn AnswerCodec>,
        confirmation: Arc<dyn ConfirmationPort>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (publisher, views) = watch::channel(None);
        Self {
            clock,
            service,
            codec,
            confirmation,
            settings: SessionSettings::default(),
            notifications,
            views,
            publisher: Some(publisher),
            failed: false,
            running: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Receive notifications. Subscribing before `initialize` also delivers the
    /// resume and start events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifications.subscribe()
    }

    /// Follow snapshots as they change. `None` until initialized.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<SessionView>> {
        self.views.clone()
    }

    #[must_use]
    pub fn view(&self) -> Option<SessionView> {
        self.views.borrow().clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match &*self.views.borrow() {
            Some(view) => view.state,
            None if self.failed => SessionState::Failed,
            None => SessionState::Initializing,
        }
    }

    /// Open or resume an attempt and start its timers.
    ///
    /// # Errors
    ///
    /// Returns `InitializationError` if no attempt could be started or its
    /// first page could not be loaded. The controller is then unusable.
    #[instrument(skip_all, fields(quiz_id = %quiz_id))]
    pub async fn initialize(&mut self, quiz_id: QuizId) -> Result<SessionView, InitializationError> {
        let Some(publisher) = self.publisher.take() else {
            return Err(InitializationError::AlreadyStarted);
        };

        let access = match self.service.get_access_info(quiz_id).await {
            Ok(access) => Some(access),
            Err(err) => {
                warn!(%quiz_id, error = %err, "access info unavailable");
                None
            }
        };

        let (loaded, resumed) = match self.try_resume(quiz_id).await {
            Some(loaded) => (loaded, true),
            None => match self.start_fresh(quiz_id).await {
                Ok(loaded) => (loaded, false),
                Err(err) => {
                    warn!(%quiz_id, error = %err, "session initialization failed");
                    self.failed = true;
                    return Err(err);
                }
            },
        };

        self.spawn(loaded, access, resumed, publisher);

        let mut views = self.views.clone();
        let published = views
            .wait_for(Option::is_some)
            .await
            .map_err(|_| InitializationError::Interrupted)?;
        let view = (*published).clone();
        drop(published);
        view.ok_or(InitializationError::Interrupted)
    }

    async fn try_resume(&self, quiz_id: QuizId) -> Option<LoadedPage> {
        let attempt = match self.service.get_in_progress_attempt(quiz_id).await {
            Ok(Some(attempt)) if attempt.state.is_resumable() => attempt,
            Ok(Some(attempt)) => {
                debug!(attempt_id = %attempt.id, state = ?attempt.state, "ignoring closed attempt");
                return None;
            }
            Ok(None) => return None,
            Err(err) => {
                warn!(%quiz_id, error = %err, "in-progress lookup failed");
                self.notify(SessionNotification::ResumeFailed {
                    attempt_id: None,
                    reason: err.to_string(),
                });
                return None;
            }
        };

        info!(attempt_id = %attempt.id, page = attempt.current_page, "resuming attempt");
        self.notify(SessionNotification::Resuming {
            attempt_id: attempt.id,
        });

        // the stored position may point past a quiz that has since shrunk
        let page = attempt
            .current_page
            .min(attempt.total_pages.saturating_sub(1));
        match load_page(self.service.as_ref(), self.codec.as_ref(), attempt.id, page).await {
            Ok(loaded) => Some(loaded),
            Err(err) => {
                warn!(attempt_id = %attempt.id, error = %err, "resume failed, starting over");
                self.notify(SessionNotification::ResumeFailed {
                    attempt_id: Some(attempt.id),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    async fn start_fresh(&self, quiz_id: QuizId) -> Result<LoadedPage, InitializationError> {
        let attempt = self
            .service
            .start_attempt(quiz_id)
            .await
            .map_err(|source| InitializationError::Start { quiz_id, source })?;
        info!(attempt_id = %attempt.id, %quiz_id, "attempt started");
        load_page(self.service.as_ref(), self.codec.as_ref(), attempt.id, 0)
            .await
            .map_err(|source| InitializationError::Load {
                attempt_id: attempt.id,
                source,
            })
    }

    fn spawn(
        &mut self,
        loaded: LoadedPage,
        access: Option<AccessInfo>,
        resumed: bool,
        views: watch::Sender<Option<SessionView>>,
    ) {
        let settings = self
            .settings
            .clone()
            .with_autosave_override(access.as_ref().and_then(|a| a.autosave_period_seconds));
        let attempt = loaded.attempt;
        let timer = attempt
            .time_limit_seconds
            .filter(|limit| *limit > 0)
            .map(|limit| {
                let mut timer =
                    SessionTimer::new(attempt.started_at, limit, settings.warning_threshold);
                timer.sync(loaded.server_time, self.clock.now());
                timer
            });
        let session = AttemptSession::new(&attempt, loaded.cache, access);

        self.notify(SessionNotification::Started {
            attempt_id: attempt.id,
            page: session.current_page(),
            resumed,
        });

        let (events_tx, events) = mpsc::channel(settings.event_buffer.max(1));
        let shutdown = CancellationToken::new();
        let actor = SessionActor::new(ActorSetup {
            session,
            service: Arc::clone(&self.service),
            codec: Arc::clone(&self.codec),
            clock: self.clock,
            tick_period: settings.tick_period,
            expiry_grace: settings.expiry_grace,
            timer,
            autosave: AutosaveScheduler::new(settings.autosave_period),
            events_tx: events_tx.clone(),
            events,
            views,
            notifications: self.notifications.clone(),
            shutdown: shutdown.clone(),
        });
        let task = tokio::spawn(actor.run());
        self.running = Some(Running {
            events: events_tx,
            shutdown,
            task,
        });
    }

    /// Load another page. The current page stays in place if loading fails.
    ///
    /// # Errors
    ///
    /// `PageOutOfRange`, `Busy` while another call is in flight, or
    /// `NavigationFailed` when the page could not be fetched or parsed.
    #[instrument(skip_all, fields(page = page))]
    pub async fn navigate_to_page(&self, page: usize) -> Result<SessionView, SessionError> {
        self.request(|reply| Command::Navigate { page, reply }).await
    }

    /// Record one edit on the current page. Accepted while calls are in flight.
    ///
    /// # Errors
    ///
    /// `SessionError::Field` for keys not on the page or values of the wrong
    /// kind, `Finalized` once the session has ended.
    pub async fn record_answer_change(
        &self,
        key: impl Into<String>,
        value: FieldValue,
    ) -> Result<(), SessionError> {
        let key = key.into();
        self.request(|reply| Command::RecordAnswer { key, value, reply })
            .await
    }

    /// Ask for confirmation, then submit every collected answer.
    ///
    /// # Errors
    ///
    /// `NotConfirmed` if the user declined, `Busy` while a submit or page load
    /// runs, `SubmitFailed` if the service did not accept the submission. A
    /// failed submit leaves the session active.
    #[instrument(skip_all)]
    pub async fn submit(&self) -> Result<SubmissionResult, SessionError> {
        let view = self.open_view()?;
        if matches!(
            view.in_flight,
            InFlightOperation::Submitting | InFlightOperation::LoadingPage
        ) {
            return Err(SessionError::Busy(view.in_flight));
        }
        let request = ConfirmationRequest::Submit {
            attempt_id: view.attempt_id,
            unsaved_changes: view.is_dirty,
        };
        if !self.confirmation.confirm(&request).await {
            info!(attempt_id = %view.attempt_id, "submit declined");
            return Err(SessionError::NotConfirmed);
        }
        self.request(|reply| Command::Submit { reply }).await
    }

    /// Ask for confirmation, then abandon the session locally. Nothing is sent
    /// to the service and unsaved answers are dropped.
    ///
    /// # Errors
    ///
    /// `NotConfirmed` if the user declined, `Finalized` if already ended.
    #[instrument(skip_all)]
    pub async fn cancel(&self) -> Result<(), SessionError> {
        let view = self.open_view()?;
        let request = ConfirmationRequest::Cancel {
            attempt_id: view.attempt_id,
        };
        if !self.confirmation.confirm(&request).await {
            return Err(SessionError::NotConfirmed);
        }
        self.request(|reply| Command::Cancel { reply }).await
    }

    /// Stop the session actor and wait for it to exit.
    pub async fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.cancel();
            let _ = running.task.await;
        }
    }

    fn running(&self) -> Result<&Running, SessionError> {
        match &self.running {
            Some(running) => Ok(running),
            None if self.failed => Err(SessionError::Finalized(SessionState::Failed)),
            None => Err(SessionError::NotInitialized),
        }
    }

    fn open_view(&self) -> Result<SessionView, SessionError> {
        self.running()?;
        let view = self.view().ok_or(SessionError::NotInitialized)?;
        if view.state.is_terminal() {
            return Err(SessionError::Finalized(view.state));
        }
        Ok(view)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let running = self.running()?;
        let (reply, response) = oneshot::channel();
        if running.events.send(Event::Command(make(reply))).await.is_err() {
            return Err(self.stopped());
        }
        response.await.unwrap_or_else(|_| Err(self.stopped()))
    }

    fn stopped(&self) -> SessionError {
        match self.state() {
            state if state.is_terminal() => SessionError::Finalized(state),
            _ => SessionError::Closed,
        }
    }

    fn notify(&self, notification: SessionNotification) {
        let _ = self.notifications.send(notification);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}

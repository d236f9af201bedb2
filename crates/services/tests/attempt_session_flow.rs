use std::sync::Arc;
use std::time::Duration;

use assessment_client::{InMemoryAssessmentService, QuizFixture, ServiceCall, ServiceOperation};
use quiz_core::JsonFieldCodec;
use quiz_core::model::{
    AccessInfo, AnswerMap, Attempt, AttemptId, AttemptState, CollectedAnswer, FieldValue,
    QuestionId, QuestionKind, QuizId, RawQuestion,
};
use quiz_core::time::fixed_now;
use serde_json::json;
use services::{
    Clock, FixedConfirmation, InFlightOperation, InitializationError, SessionController,
    SessionError, SessionNotification, SessionSettings, SessionState,
};
use tokio::sync::broadcast;
use tokio::time::sleep;

fn quiz_id() -> QuizId {
    QuizId::new(1)
}

fn text_question(id: u64, page: usize, name: &str) -> RawQuestion {
    RawQuestion {
        id: QuestionId::new(id),
        page,
        kind: QuestionKind::Text,
        payload: json!({ "text": format!("Question {id}"), "fields": [{ "name": name, "kind": "text" }] }),
    }
}

fn checkbox_question(id: u64, page: usize, name: &str, options: &[&str]) -> RawQuestion {
    RawQuestion {
        id: QuestionId::new(id),
        page,
        kind: QuestionKind::Checkbox,
        payload: json!({
            "text": format!("Question {id}"),
            "fields": [{ "name": name, "kind": "multi", "options": options }]
        }),
    }
}

/// Three pages: a text answer plus a two-option checkbox, a three-option
/// checkbox, then a single text answer.
fn fixture() -> QuizFixture {
    QuizFixture::new(vec![
        vec![
            text_question(1, 0, "q1"),
            checkbox_question(2, 0, "q1_choice", &["a", "b"]),
        ],
        vec![checkbox_question(3, 1, "opt", &["a", "b", "c"])],
        vec![text_question(4, 2, "q3")],
    ])
}

fn service_with(fixture: QuizFixture) -> (InMemoryAssessmentService, Clock) {
    let clock = Clock::runtime(fixed_now());
    let service = InMemoryAssessmentService::new(clock);
    service.add_quiz(quiz_id(), fixture);
    (service, clock)
}

fn controller(service: &InMemoryAssessmentService, clock: Clock, confirm: bool) -> SessionController {
    SessionController::new(
        clock,
        Arc::new(service.clone()),
        Arc::new(JsonFieldCodec),
        Arc::new(FixedConfirmation(confirm)),
    )
}

fn stored_attempt(id: u64, current_page: usize) -> Attempt {
    Attempt {
        id: AttemptId::new(id),
        quiz_id: quiz_id(),
        state: AttemptState::InProgress,
        current_page,
        total_pages: 3,
        started_at: fixed_now(),
        time_limit_seconds: None,
    }
}

fn received(rx: &mut broadcast::Receiver<SessionNotification>) -> Vec<SessionNotification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

fn save_and_submit_order(service: &InMemoryAssessmentService) -> Vec<ServiceOperation> {
    service
        .calls()
        .iter()
        .map(ServiceCall::operation)
        .filter(|op| matches!(op, ServiceOperation::SaveAttempt | ServiceOperation::SubmitAttempt))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn fresh_session_starts_clean_on_first_page() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();

    assert_eq!(session.state(), SessionState::Initializing);
    let view = session.initialize(quiz_id()).await.unwrap();

    assert_eq!(view.state, SessionState::Active);
    assert_eq!(view.current_page, 0);
    assert_eq!(view.total_pages, 3);
    assert!(!view.is_dirty);
    assert_eq!(view.in_flight, InFlightOperation::None);
    assert_eq!(view.questions.len(), 2);
    assert_eq!(view.field("q1_choice_a"), Some(&FieldValue::Checked(false)));

    let attempt_id = view.attempt_id;
    assert_eq!(
        service.calls(),
        vec![
            ServiceCall::GetAccessInfo(quiz_id()),
            ServiceCall::GetInProgressAttempt(quiz_id()),
            ServiceCall::StartAttempt(quiz_id()),
            ServiceCall::GetAttemptData { attempt_id, page: 0 },
        ]
    );
    assert_eq!(
        received(&mut notes),
        vec![SessionNotification::Started {
            attempt_id,
            page: 0,
            resumed: false
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn operations_before_initialize_are_rejected() {
    let (service, clock) = service_with(fixture());
    let session = controller(&service, clock, true);

    assert!(matches!(
        session.navigate_to_page(1).await,
        Err(SessionError::NotInitialized)
    ));
    assert!(matches!(
        session
            .record_answer_change("q1", FieldValue::Text("x".into()))
            .await,
        Err(SessionError::NotInitialized)
    ));
    assert!(matches!(session.submit().await, Err(SessionError::NotInitialized)));
    assert!(session.view().is_none());
    assert!(service.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refused_start_fails_initialization() {
    let (service, clock) = service_with(fixture().with_access(AccessInfo {
        can_attempt: false,
        prevent_messages: vec!["quiz is closed".into()],
        autosave_period_seconds: None,
    }));
    let mut session = controller(&service, clock, true);

    let err = session.initialize(quiz_id()).await.unwrap_err();
    assert!(matches!(err, InitializationError::Start { .. }));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(
        session.navigate_to_page(0).await,
        Err(SessionError::Finalized(SessionState::Failed))
    ));
    assert!(matches!(
        session.initialize(quiz_id()).await,
        Err(InitializationError::AlreadyStarted)
    ));
}

#[tokio::test(start_paused = true)]
async fn resumes_in_progress_attempt_on_its_page() {
    let (service, clock) = service_with(fixture());
    service.add_attempt(stored_attempt(40, 2));
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();

    let view = session.initialize(quiz_id()).await.unwrap();

    assert_eq!(view.attempt_id, AttemptId::new(40));
    assert_eq!(view.current_page, 2);
    assert!(!view.is_dirty);
    assert_eq!(service.count(ServiceOperation::StartAttempt), 0);
    assert!(service.calls().contains(&ServiceCall::GetAttemptData {
        attempt_id: AttemptId::new(40),
        page: 2
    }));
    assert_eq!(
        received(&mut notes),
        vec![
            SessionNotification::Resuming {
                attempt_id: AttemptId::new(40)
            },
            SessionNotification::Started {
                attempt_id: AttemptId::new(40),
                page: 2,
                resumed: true
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn resume_clamps_position_past_the_last_page() {
    let (service, clock) = service_with(fixture());
    service.add_attempt(stored_attempt(40, 7));
    let mut session = controller(&service, clock, true);

    let view = session.initialize(quiz_id()).await.unwrap();
    assert_eq!(view.current_page, 2);
}

#[tokio::test(start_paused = true)]
async fn resume_failure_falls_back_to_new_attempt() {
    let (service, clock) = service_with(fixture());
    service.add_attempt(stored_attempt(40, 1));
    service.fail_next(ServiceOperation::GetAttemptData, 1);
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();

    let view = session.initialize(quiz_id()).await.unwrap();

    assert_ne!(view.attempt_id, AttemptId::new(40));
    assert_eq!(view.current_page, 0);
    assert_eq!(view.state, SessionState::Active);
    assert_eq!(service.count(ServiceOperation::StartAttempt), 1);
    let notes = received(&mut notes);
    assert!(notes.iter().any(|n| matches!(
        n,
        SessionNotification::ResumeFailed { attempt_id: Some(id), .. } if *id == AttemptId::new(40)
    )));
    assert!(matches!(
        notes.last(),
        Some(SessionNotification::Started { resumed: false, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn checkbox_options_merge_into_one_answer() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();

    session.navigate_to_page(1).await.unwrap();
    session
        .record_answer_change("opt_a", FieldValue::Checked(true))
        .await
        .unwrap();
    session
        .record_answer_change("opt_c", FieldValue::Checked(true))
        .await
        .unwrap();
    session.submit().await.unwrap();

    let mut expected = AnswerMap::new();
    expected.insert(
        "opt".into(),
        CollectedAnswer::Multiple(vec!["a".into(), "c".into()]),
    );
    assert_eq!(service.submits(), vec![expected]);
    assert_eq!(session.state(), SessionState::Submitted);
    assert!(!session.view().unwrap().is_dirty);
}

#[tokio::test(start_paused = true)]
async fn unchecked_group_is_left_out_of_autosave() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();

    session
        .record_answer_change("q1_choice_b", FieldValue::Checked(true))
        .await
        .unwrap();
    session
        .record_answer_change("q1_choice_b", FieldValue::Checked(false))
        .await
        .unwrap();
    assert!(session.view().unwrap().is_dirty);

    sleep(Duration::from_secs(31)).await;

    let saves = service.saves();
    assert_eq!(saves.len(), 1);
    assert!(!saves[0].contains_key("q1_choice"));
    assert!(!session.view().unwrap().is_dirty);
}

#[tokio::test(start_paused = true)]
async fn rejected_edits_do_not_mark_dirty() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();

    assert!(matches!(
        session
            .record_answer_change("opt_a", FieldValue::Checked(true))
            .await,
        Err(SessionError::Field(_))
    ));
    assert!(matches!(
        session
            .record_answer_change("q1", FieldValue::Checked(true))
            .await,
        Err(SessionError::Field(_))
    ));
    assert!(!session.view().unwrap().is_dirty);

    sleep(Duration::from_secs(31)).await;
    assert!(service.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_autosave_keeps_dirty_until_a_later_save_succeeds() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();
    session.initialize(quiz_id()).await.unwrap();

    session
        .record_answer_change("q1", FieldValue::Text("first draft".into()))
        .await
        .unwrap();
    service.fail_next(ServiceOperation::SaveAttempt, 1);
    assert!(session.view().unwrap().is_dirty);

    sleep(Duration::from_secs(31)).await;
    assert_eq!(service.saves().len(), 1);
    let view = session.view().unwrap();
    assert!(view.is_dirty);
    assert_eq!(view.last_autosave, None);
    assert!(received(&mut notes)
        .iter()
        .any(|n| matches!(n, SessionNotification::SaveFailed { .. })));

    sleep(Duration::from_secs(30)).await;
    assert_eq!(service.saves().len(), 2);
    let view = session.view().unwrap();
    assert!(!view.is_dirty);
    assert!(view.last_autosave.is_some());
    assert_eq!(
        service.saved_answers(view.attempt_id).unwrap().get("q1"),
        Some(&CollectedAnswer::Single("first draft".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn edit_during_autosave_stays_dirty() {
    let (service, clock) = service_with(fixture());
    let service = service.with_latency(Duration::from_secs(5));
    let mut session = controller(&service, clock, true);
    // four calls at five seconds each
    session.initialize(quiz_id()).await.unwrap();

    session
        .record_answer_change("q1", FieldValue::Text("a".into()))
        .await
        .unwrap();

    // autosave starts at +30s and is answered at +35s
    sleep(Duration::from_secs(32)).await;
    assert_eq!(session.view().unwrap().in_flight, InFlightOperation::Autosaving);
    session
        .record_answer_change("q1", FieldValue::Text("ab".into()))
        .await
        .unwrap();

    sleep(Duration::from_secs(4)).await;
    let view = session.view().unwrap();
    assert_eq!(view.in_flight, InFlightOperation::None);
    assert!(view.last_autosave.is_some());
    assert!(view.is_dirty);

    // next save at +60s carries the newer text
    sleep(Duration::from_secs(30)).await;
    assert!(!session.view().unwrap().is_dirty);
    let saves = service.saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[1].get("q1"), Some(&CollectedAnswer::Single("ab".into())));
}

#[tokio::test(start_paused = true)]
async fn access_rules_override_autosave_period() {
    let (service, clock) = service_with(fixture().with_access(AccessInfo {
        can_attempt: true,
        prevent_messages: Vec::new(),
        autosave_period_seconds: Some(5),
    }));
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("x".into()))
        .await
        .unwrap();

    sleep(Duration::from_secs(6)).await;
    assert_eq!(service.saves().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn navigation_rejects_pages_out_of_range() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();

    assert!(matches!(
        session.navigate_to_page(3).await,
        Err(SessionError::PageOutOfRange { index: 3, total: 3 })
    ));
    assert_eq!(session.view().unwrap().current_page, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_navigation_stays_on_current_page() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("kept".into()))
        .await
        .unwrap();
    service.fail_next(ServiceOperation::GetAttemptData, 1);

    let err = session.navigate_to_page(1).await.unwrap_err();
    assert!(matches!(err, SessionError::NavigationFailed { page: 1, .. }));

    let view = session.view().unwrap();
    assert_eq!(view.current_page, 0);
    assert_eq!(view.state, SessionState::Active);
    assert_eq!(view.field("q1"), Some(&FieldValue::Text("kept".into())));
    assert!(view.is_dirty);
    assert!(received(&mut notes)
        .iter()
        .any(|n| matches!(n, SessionNotification::NavigationFailed { page: 1, .. })));
}

#[tokio::test(start_paused = true)]
async fn unsaved_edits_follow_navigation() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();

    session
        .record_answer_change("q1", FieldValue::Text("draft".into()))
        .await
        .unwrap();
    let view = session.navigate_to_page(1).await.unwrap();
    assert_eq!(view.current_page, 1);
    assert!(view.is_dirty);
    assert_eq!(view.field("q1"), None);

    let view = session.navigate_to_page(0).await.unwrap();
    assert_eq!(view.field("q1"), Some(&FieldValue::Text("draft".into())));

    session.navigate_to_page(2).await.unwrap();
    sleep(Duration::from_secs(31)).await;
    let saves = service.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].get("q1"), Some(&CollectedAnswer::Single("draft".into())));
    assert!(!session.view().unwrap().is_dirty);
}

#[tokio::test(start_paused = true)]
async fn second_submit_is_rejected_while_first_runs() {
    let (service, clock) = service_with(fixture());
    let service = service.with_latency(Duration::from_secs(1));
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();
    let session = Arc::new(session);

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };
    session
        .watch()
        .wait_for(|view| {
            view.as_ref()
                .is_some_and(|v| v.in_flight == InFlightOperation::Submitting)
        })
        .await
        .unwrap();

    assert!(matches!(
        session.submit().await,
        Err(SessionError::Busy(InFlightOperation::Submitting))
    ));
    // edits are still taken while the submit is outstanding
    session
        .record_answer_change("q1", FieldValue::Text("late".into()))
        .await
        .unwrap();

    let result = first.await.unwrap().unwrap();
    assert_eq!(result.state, AttemptState::Finished);
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 1);
    assert_eq!(session.state(), SessionState::Submitted);
    assert!(matches!(
        session.submit().await,
        Err(SessionError::Finalized(SessionState::Submitted))
    ));
}

#[tokio::test(start_paused = true)]
async fn submit_during_autosave_runs_after_the_save() {
    let (service, clock) = service_with(fixture());
    let service = service.with_latency(Duration::from_secs(5));
    let mut session = controller(&service, clock, true);
    let view = session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("held".into()))
        .await
        .unwrap();

    // autosave runs +30s..+35s
    sleep(Duration::from_secs(32)).await;
    assert_eq!(session.view().unwrap().in_flight, InFlightOperation::Autosaving);

    let result = session.submit().await.unwrap();
    assert_eq!(result.state, AttemptState::Finished);
    assert_eq!(
        save_and_submit_order(&service),
        vec![ServiceOperation::SaveAttempt, ServiceOperation::SubmitAttempt]
    );
    assert_eq!(
        service.submits()[0].get("q1"),
        Some(&CollectedAnswer::Single("held".into()))
    );
    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(
        service.attempt(view.attempt_id).map(|a| a.state),
        Some(AttemptState::Finished)
    );
}

#[tokio::test(start_paused = true)]
async fn submit_during_page_load_is_busy() {
    let (service, clock) = service_with(fixture());
    let service = service.with_latency(Duration::from_secs(1));
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();
    let session = Arc::new(session);

    let navigation = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.navigate_to_page(1).await })
    };
    session
        .watch()
        .wait_for(|view| {
            view.as_ref()
                .is_some_and(|v| v.in_flight == InFlightOperation::LoadingPage)
        })
        .await
        .unwrap();

    assert!(matches!(
        session.submit().await,
        Err(SessionError::Busy(InFlightOperation::LoadingPage))
    ));

    let view = navigation.await.unwrap().unwrap();
    assert_eq!(view.current_page, 1);
    assert_eq!(view.state, SessionState::Active);
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_save_in_flight_and_held_submit() {
    let (service, clock) = service_with(fixture());
    let service = service.with_latency(Duration::from_secs(5));
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("dropped".into()))
        .await
        .unwrap();

    sleep(Duration::from_secs(32)).await;
    assert_eq!(session.view().unwrap().in_flight, InFlightOperation::Autosaving);
    let session = Arc::new(session);
    let held = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };
    // let the submit reach the actor and wait behind the save
    sleep(Duration::from_millis(100)).await;
    assert!(!held.is_finished());

    session.cancel().await.unwrap();
    assert!(matches!(
        held.await.unwrap(),
        Err(SessionError::Finalized(SessionState::Cancelled))
    ));

    sleep(Duration::from_secs(60)).await;
    // the in-memory service records a call only once its latency has passed
    assert_eq!(service.count(ServiceOperation::SaveAttempt), 0);
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 0);
    assert_eq!(session.state(), SessionState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn declined_submit_changes_nothing() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, false);
    session.initialize(quiz_id()).await.unwrap();

    assert!(matches!(session.submit().await, Err(SessionError::NotConfirmed)));
    assert!(matches!(session.cancel().await, Err(SessionError::NotConfirmed)));
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 0);
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_can_be_retried() {
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true);
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("answer".into()))
        .await
        .unwrap();
    service.fail_next(ServiceOperation::SubmitAttempt, 1);

    assert!(matches!(
        session.submit().await,
        Err(SessionError::SubmitFailed { .. })
    ));
    let view = session.view().unwrap();
    assert_eq!(view.state, SessionState::Active);
    assert!(view.is_dirty);

    session.submit().await.unwrap();
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 2);
    assert_eq!(session.state(), SessionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn expired_attempt_is_submitted_once_after_grace() {
    let (service, clock) = service_with(fixture().with_time_limit(5));
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();
    session.initialize(quiz_id()).await.unwrap();

    // expired at 5s, grace runs until 7s
    sleep(Duration::from_secs(6)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 0);
    assert_eq!(session.view().unwrap().time_remaining_seconds(), Some(0));

    sleep(Duration::from_secs(4)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 1);
    assert_eq!(service.submits(), vec![AnswerMap::new()]);
    assert_eq!(session.state(), SessionState::Submitted);

    let notes = received(&mut notes);
    let expired = notes
        .iter()
        .filter(|n| matches!(n, SessionNotification::TimeExpired))
        .count();
    assert_eq!(expired, 1);
    assert!(notes.iter().any(|n| matches!(
        n,
        SessionNotification::TimeWarning {
            remaining_seconds: 5
        }
    )));
    assert!(notes
        .iter()
        .any(|n| matches!(n, SessionNotification::Submitted { automatic: true, .. })));

    sleep(Duration::from_secs(60)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 1);
}

#[tokio::test(start_paused = true)]
async fn overdue_resumed_attempt_is_submitted_right_after_grace() {
    let (service, clock) = service_with(fixture());
    let mut attempt = stored_attempt(40, 0);
    attempt.started_at = fixed_now() - chrono::Duration::minutes(10);
    attempt.time_limit_seconds = Some(60);
    service.add_attempt(attempt);
    let mut session = controller(&service, clock, true);

    let view = session.initialize(quiz_id()).await.unwrap();
    assert_eq!(view.time_remaining_seconds(), Some(0));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 1);
    assert_eq!(session.state(), SessionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn expiry_waits_for_autosave_in_flight() {
    let (service, clock) = service_with(fixture().with_time_limit(36));
    let service = service.with_latency(Duration::from_secs(5));
    let mut session = controller(&service, clock, true);
    // started at 15s, session running from 20s
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("x".into()))
        .await
        .unwrap();

    // autosave runs 50s..55s; expiry at 51s; grace over at 53s
    sleep(Duration::from_secs(34)).await;
    assert_eq!(session.view().unwrap().in_flight, InFlightOperation::Autosaving);
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 0);

    sleep(Duration::from_secs(16)).await;
    assert_eq!(
        save_and_submit_order(&service),
        vec![ServiceOperation::SaveAttempt, ServiceOperation::SubmitAttempt]
    );
    assert_eq!(session.state(), SessionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn failed_user_submit_at_expiry_leaves_one_automatic_submit() {
    let (service, clock) = service_with(fixture().with_time_limit(10));
    let service = service.with_latency(Duration::from_secs(5));
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();
    // started at 15s, session running from 20s, expiry at 25s, grace over at 27s
    session.initialize(quiz_id()).await.unwrap();

    sleep(Duration::from_secs(4)).await;
    service.fail_next(ServiceOperation::SubmitAttempt, 1);
    // user submit runs 24s..29s and fails
    assert!(matches!(
        session.submit().await,
        Err(SessionError::SubmitFailed { .. })
    ));

    // automatic submit runs 29s..34s
    sleep(Duration::from_secs(10)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 2);
    assert_eq!(session.state(), SessionState::Submitted);

    let notes = received(&mut notes);
    assert!(notes
        .iter()
        .any(|n| matches!(n, SessionNotification::SubmitFailed { automatic: false, .. })));
    let automatic = notes
        .iter()
        .filter(|n| matches!(n, SessionNotification::Submitted { automatic: true, .. }))
        .count();
    assert_eq!(automatic, 1);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 2);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_timers_and_rejects_further_work() {
    let (service, clock) = service_with(fixture().with_time_limit(5));
    let mut session = controller(&service, clock, true);
    let mut notes = session.subscribe();
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("gone".into()))
        .await
        .unwrap();

    session.cancel().await.unwrap();
    assert_eq!(session.state(), SessionState::Cancelled);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(service.count(ServiceOperation::SubmitAttempt), 0);
    assert_eq!(service.count(ServiceOperation::SaveAttempt), 0);
    assert!(!received(&mut notes)
        .iter()
        .any(|n| matches!(n, SessionNotification::TimeExpired)));

    assert!(matches!(
        session
            .record_answer_change("q1", FieldValue::Text("more".into()))
            .await,
        Err(SessionError::Finalized(SessionState::Cancelled))
    ));
    assert!(matches!(
        session.submit().await,
        Err(SessionError::Finalized(SessionState::Cancelled))
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_background_work() {
    let settings = SessionSettings {
        autosave_period: Duration::from_secs(10),
        ..SessionSettings::default()
    };
    let (service, clock) = service_with(fixture());
    let mut session = controller(&service, clock, true).with_settings(settings);
    session.initialize(quiz_id()).await.unwrap();
    session
        .record_answer_change("q1", FieldValue::Text("x".into()))
        .await
        .unwrap();

    session.shutdown().await;
    sleep(Duration::from_secs(30)).await;
    assert!(service.saves().is_empty());
}

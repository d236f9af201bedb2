mod console;

use std::fmt;
use std::sync::Arc;

use assessment_client::{
    AssessmentService, HttpAssessmentService, HttpServiceConfig, InMemoryAssessmentService,
    QuizFixture,
};
use quiz_core::model::{FieldValue, QuestionId, QuestionKind, QuizId, RawQuestion};
use quiz_core::{Clock, JsonFieldCodec};
use serde_json::json;
use services::{SessionController, SessionSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use console::{ConsoleCommand, Input, StdinConfirmation};

const DEFAULT_LOG_FILTER: &str = "app=info,services=info,assessment_client=info";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidQuizId { raw: String },
    InvalidUrl { raw: String },
    NoService,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidQuizId { raw } => write!(f, "invalid --quiz value: {raw}"),
            ArgsError::InvalidUrl { raw } => write!(f, "invalid --url value: {raw}"),
            ArgsError::NoService => {
                write!(f, "no service configured; pass --url or --demo")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--quiz <id>] [--url <base_url>]");
    eprintln!("  cargo run -p app -- --demo   # built-in quiz, no network");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --quiz 1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_ID, QUIZ_SERVICE_URL, QUIZ_SERVICE_TOKEN, QUIZ_TIMEOUT_SECS");
    eprintln!("  QUIZ_AUTOSAVE_SECS, QUIZ_EXPIRY_GRACE_SECS, QUIZ_WARNING_SECS");
    eprintln!("  RUST_LOG (default {DEFAULT_LOG_FILTER})");
}

enum Backend {
    Http(HttpServiceConfig),
    Demo,
}

struct Args {
    quiz_id: QuizId,
    backend: Backend,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let mut quiz_id = std::env::var("QUIZ_ID")
            .ok()
            .and_then(|value| value.parse::<QuizId>().ok())
            .unwrap_or_else(|| QuizId::new(1));
        let mut http = HttpServiceConfig::from_env();
        let mut demo = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--quiz" => {
                    let value = require_value(args, "--quiz")?;
                    quiz_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidQuizId { raw: value.clone() })?;
                }
                "--url" => {
                    let value = require_value(args, "--url")?;
                    if !(value.starts_with("http://") || value.starts_with("https://")) {
                        return Err(ArgsError::InvalidUrl { raw: value });
                    }
                    let mut config = HttpServiceConfig::new(value);
                    if let Some(previous) = http.take() {
                        config.token = previous.token;
                        config.request_timeout = previous.request_timeout;
                    }
                    http = Some(config);
                }
                "--demo" => demo = true,
                "--help" | "-h" => return Ok(None),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let backend = match (demo, http) {
            (true, _) => Backend::Demo,
            (false, Some(config)) => Backend::Http(config),
            (false, None) => return Err(ArgsError::NoService),
        };
        Ok(Some(Self { quiz_id, backend }))
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn demo_question(id: u64, page: usize, kind: QuestionKind, payload: serde_json::Value) -> RawQuestion {
    RawQuestion {
        id: QuestionId::new(id),
        page,
        kind,
        payload,
    }
}

/// A small two-page quiz served from memory.
fn demo_service(clock: Clock, quiz_id: QuizId) -> InMemoryAssessmentService {
    let service = InMemoryAssessmentService::new(clock);
    let pages = vec![
        vec![
            demo_question(
                1,
                0,
                QuestionKind::Text,
                json!({ "text": "Name one ownership rule.", "fields": [{ "name": "q1", "kind": "text" }] }),
            ),
            demo_question(
                2,
                0,
                QuestionKind::Radio,
                json!({ "text": "Which keyword moves a value into a closure? (move/ref)",
                        "fields": [{ "name": "q2", "kind": "radio" }] }),
            ),
        ],
        vec![demo_question(
            3,
            1,
            QuestionKind::Checkbox,
            json!({ "text": "Which types are Copy?",
                    "fields": [{ "name": "q3", "kind": "multi", "options": ["u32", "String", "bool"] }] }),
        )],
    ];
    service.add_quiz(quiz_id, QuizFixture::new(pages).with_time_limit(600));
    service
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = match Args::parse(&mut argv) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            return Err(e.into());
        }
    };

    let clock = Clock::default_clock();
    let service: Arc<dyn AssessmentService> = match parsed.backend {
        Backend::Http(config) => {
            tracing::info!(base_url = %config.base_url, "using assessment service");
            Arc::new(HttpAssessmentService::new(config)?)
        }
        Backend::Demo => {
            tracing::info!("using built-in demo quiz");
            Arc::new(demo_service(clock, parsed.quiz_id))
        }
    };

    let input = console::stdin_lines();
    let mut controller = SessionController::new(
        clock,
        service,
        Arc::new(JsonFieldCodec),
        Arc::new(StdinConfirmation::new(Arc::clone(&input))),
    )
    .with_settings(SessionSettings::from_env());

    let mut notifications = controller.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => println!("* {}", console::describe(&notification)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let view = controller.initialize(parsed.quiz_id).await?;
    println!("{}", console::render(&view));
    console::print_help();

    command_loop(&controller, &input).await?;

    controller.shutdown().await;
    drop(controller);
    let _ = printer.await;
    Ok(())
}

async fn command_loop(
    controller: &SessionController,
    input: &Input,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut views = controller.watch();
    loop {
        if controller.state().is_terminal() {
            return Ok(());
        }
        console::print_prompt("> ");

        let line = tokio::select! {
            line = async { input.lock().await.next_line().await } => line?,
            // an automatic submit can end the session while we wait for input
            _ = views.wait_for(|v| v.as_ref().is_some_and(|v| v.state.is_terminal())) => {
                println!();
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };

        let command = match console::parse_command(&line) {
            Ok(command) => command,
            Err(console::CommandError::Empty) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            return Ok(());
        }
        if let Err(e) = execute(controller, command).await {
            println!("error: {e}");
        }
    }
}

async fn execute(
    controller: &SessionController,
    command: ConsoleCommand,
) -> Result<(), services::SessionError> {
    let current = controller.view().map_or(0, |v| v.current_page);
    match command {
        ConsoleCommand::Page(n) => {
            let view = controller.navigate_to_page(n - 1).await?;
            println!("{}", console::render(&view));
        }
        ConsoleCommand::Next => {
            let view = controller.navigate_to_page(current + 1).await?;
            println!("{}", console::render(&view));
        }
        ConsoleCommand::Prev => {
            let view = controller
                .navigate_to_page(current.saturating_sub(1))
                .await?;
            println!("{}", console::render(&view));
        }
        ConsoleCommand::Set { key, value } => {
            controller
                .record_answer_change(key, FieldValue::Text(value))
                .await?;
        }
        ConsoleCommand::Check(key) => {
            controller
                .record_answer_change(key, FieldValue::Checked(true))
                .await?;
        }
        ConsoleCommand::Uncheck(key) => {
            controller
                .record_answer_change(key, FieldValue::Checked(false))
                .await?;
        }
        ConsoleCommand::Show => {
            if let Some(view) = controller.view() {
                println!("{}", console::render(&view));
            }
        }
        ConsoleCommand::Submit => {
            controller.submit().await?;
        }
        ConsoleCommand::Cancel => {
            controller.cancel().await?;
        }
        ConsoleCommand::Help => console::print_help(),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        tracing::error!(error = %e, "quiz session ended with an error");
        std::process::exit(1);
    }
}

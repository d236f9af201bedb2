//! Line-oriented terminal front end: command parsing, confirmation prompts and
//! rendering of session snapshots.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::model::{AnswerField, FieldValue};
use services::{ConfirmationPort, ConfirmationRequest, SessionNotification, SessionView};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

pub type Input = Arc<Mutex<Lines<BufReader<Stdin>>>>;

pub fn stdin_lines() -> Input {
    Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// One-based page number as typed.
    Page(usize),
    Next,
    Prev,
    Set { key: String, value: String },
    Check(String),
    Uncheck(String),
    Show,
    Submit,
    Cancel,
    Quit,
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArgument { command: &'static str, argument: &'static str },
    InvalidPage(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "type a command, or `help`"),
            CommandError::Unknown(word) => write!(f, "unknown command: {word}"),
            CommandError::MissingArgument { command, argument } => {
                write!(f, "{command} needs a {argument}")
            }
            CommandError::InvalidPage(raw) => write!(f, "not a page number: {raw}"),
        }
    }
}

impl std::error::Error for CommandError {}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let argument = |command: &'static str, argument: &'static str| {
        if rest.is_empty() {
            Err(CommandError::MissingArgument { command, argument })
        } else {
            Ok(rest.to_string())
        }
    };

    match word {
        "" => Err(CommandError::Empty),
        "page" | "p" => {
            let raw = argument("page", "page number")?;
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => Ok(ConsoleCommand::Page(n)),
                _ => Err(CommandError::InvalidPage(raw)),
            }
        }
        "next" | "n" => Ok(ConsoleCommand::Next),
        "prev" => Ok(ConsoleCommand::Prev),
        "set" => {
            let raw = argument("set", "field key and value")?;
            // the value may contain spaces; only the key is split off
            match raw.split_once(char::is_whitespace) {
                Some((key, value)) => Ok(ConsoleCommand::Set {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                }),
                None => Err(CommandError::MissingArgument {
                    command: "set",
                    argument: "value",
                }),
            }
        }
        "check" => argument("check", "field key").map(ConsoleCommand::Check),
        "uncheck" => argument("uncheck", "field key").map(ConsoleCommand::Uncheck),
        "show" | "s" => Ok(ConsoleCommand::Show),
        "submit" => Ok(ConsoleCommand::Submit),
        "cancel" => Ok(ConsoleCommand::Cancel),
        "quit" | "q" | "exit" => Ok(ConsoleCommand::Quit),
        "help" | "?" => Ok(ConsoleCommand::Help),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

pub fn print_help() {
    println!("Commands:");
    println!("  page <n>            go to page n");
    println!("  next | prev         move one page");
    println!("  set <key> <text>    answer a text or choice field");
    println!("  check <key>         tick a checkbox option");
    println!("  uncheck <key>       clear a checkbox option");
    println!("  show                print the current page");
    println!("  submit              finish the attempt");
    println!("  cancel              abandon the attempt locally");
    println!("  quit                leave; the attempt stays open on the server");
}

/// Asks on the terminal and treats anything but `y`/`yes` as a no.
pub struct StdinConfirmation {
    input: Input,
}

impl StdinConfirmation {
    pub fn new(input: Input) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ConfirmationPort for StdinConfirmation {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let question = match request {
            ConfirmationRequest::Submit {
                unsaved_changes: true,
                ..
            } => "Submit now? Unsaved answers will be sent with it. [y/N] ",
            ConfirmationRequest::Submit { .. } => "Submit now? [y/N] ",
            ConfirmationRequest::Cancel { .. } => "Discard this session? [y/N] ",
        };
        print_prompt(question);
        let answer = self.input.lock().await.next_line().await;
        matches!(answer, Ok(Some(line)) if is_yes(&line))
    }
}

fn is_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn print_prompt(text: &str) {
    use std::io::Write;
    print!("{text}");
    let _ = std::io::stdout().flush();
}

pub fn render(view: &SessionView) -> String {
    let mut out = format!(
        "Attempt {} | page {}/{} | {:?}",
        view.attempt_id,
        view.current_page + 1,
        view.total_pages,
        view.state
    );
    if let Some(remaining) = view.time_remaining_seconds() {
        out.push_str(&format!(" | {}:{:02} left", remaining / 60, remaining % 60));
    }
    if view.is_dirty {
        out.push_str(" | unsaved");
    }
    for question in &view.questions {
        out.push_str(&format!("\n\n{}", question.text));
        for answer in &question.answers {
            match &answer.field {
                AnswerField::Scalar { .. } => {
                    let value = match view.field(&answer.name) {
                        Some(FieldValue::Text(text)) => text.as_str(),
                        _ => "",
                    };
                    out.push_str(&format!("\n  {} = {value}", answer.name));
                }
                AnswerField::MultiValued { options, .. } => {
                    for option in options {
                        let key = quiz_core::cache::option_key(&answer.name, option);
                        let mark = match view.field(&key) {
                            Some(FieldValue::Checked(true)) => 'x',
                            _ => ' ',
                        };
                        out.push_str(&format!("\n  [{mark}] {key}"));
                    }
                }
            }
        }
    }
    out
}

pub fn describe(notification: &SessionNotification) -> String {
    match notification {
        SessionNotification::Resuming { attempt_id } => {
            format!("resuming attempt {attempt_id}")
        }
        SessionNotification::ResumeFailed { reason, .. } => {
            format!("could not resume ({reason}); starting a new attempt")
        }
        SessionNotification::Started {
            attempt_id,
            page,
            resumed,
        } => {
            let how = if *resumed { "resumed" } else { "started" };
            format!("attempt {attempt_id} {how} on page {}", page + 1)
        }
        SessionNotification::PageChanged { page } => format!("now on page {}", page + 1),
        SessionNotification::NavigationFailed { page, reason } => {
            format!("could not open page {}: {reason}", page + 1)
        }
        SessionNotification::Saved => "answers saved".to_string(),
        SessionNotification::SaveFailed { reason } => {
            format!("autosave failed ({reason}); will retry")
        }
        SessionNotification::TimeWarning { remaining_seconds } => {
            format!("{remaining_seconds} seconds left")
        }
        SessionNotification::TimeExpired => "time is up; submitting shortly".to_string(),
        SessionNotification::Submitted { result, automatic } => {
            let grade = result
                .grade
                .map_or_else(|| "pending".to_string(), |g| format!("{g:.2}"));
            let how = if *automatic { "automatically " } else { "" };
            format!("attempt {} {how}submitted, grade {grade}", result.attempt_id)
        }
        SessionNotification::SubmitFailed { reason, automatic: true } => {
            format!("automatic submit failed ({reason}); type `submit` to retry")
        }
        SessionNotification::SubmitFailed { reason, .. } => format!("submit failed: {reason}"),
        SessionNotification::Cancelled => "session cancelled".to_string(),
    }
}

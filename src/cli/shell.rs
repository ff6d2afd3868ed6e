//! Interactive certification screen
//!
//! Provides a REPL with command history and tab completion. The line editor
//! runs on its own thread; the screen is owned and polled by the async loop.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Config as EditorConfig, Editor, Helper};
use tokio::sync::mpsc;

use super::commands;
use super::output::print_error;
use crate::config::Config;
use crate::form::{format_periodo, parse_periodo};
use crate::notification::ClickTarget;
use crate::screen::ConsultantPeriodScreen;
use crate::service::CertificationService;
use crate::state::ScreenEvent;

/// Command completer for the shell
#[derive(Default)]
struct ShellCompleter {
    commands: Vec<(&'static str, Vec<&'static str>)>,
    /// Codes offered after `codigo`, filled once the list loads
    codes: Arc<Mutex<Vec<String>>>,
}

impl ShellCompleter {
    fn new(codes: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            commands: vec![
                ("periodo", vec!["clear"]),
                ("codigo", vec![]),
                ("submit", vec![]),
                ("status", vec![]),
                ("codes", vec![]),
                ("click", vec!["notification", "outside"]),
                ("back", vec![]),
                ("help", vec![]),
                ("exit", vec![]),
                ("quit", vec![]),
            ],
            codes,
        }
    }

    /// Second-word candidates for a command
    fn arguments(&self, cmd: &str) -> Vec<String> {
        if cmd == "codigo" {
            return match self.codes.lock() {
                Ok(codes) => codes.clone(),
                Err(_) => Vec::new(),
            };
        }
        self.commands
            .iter()
            .find(|(c, _)| *c == cmd)
            .map(|(_, subs)| subs.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }
}

fn pairs<'a>(words: impl Iterator<Item = &'a str>) -> Vec<Pair> {
    words
        .map(|w| Pair {
            display: w.to_string(),
            replacement: w.to_string(),
        })
        .collect()
}

impl Completer for ShellCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        let words: Vec<&str> = line.split_whitespace().collect();
        let start = line.rfind(' ').map(|i| i + 1).unwrap_or(0);

        match words.len() {
            0 => Ok((0, pairs(self.commands.iter().map(|(cmd, _)| *cmd)))),
            1 if line.ends_with(' ') => {
                let args = self.arguments(words[0]);
                Ok((pos, pairs(args.iter().map(String::as_str))))
            }
            1 => {
                let prefix = words[0];
                let candidates = pairs(
                    self.commands
                        .iter()
                        .map(|(cmd, _)| *cmd)
                        .filter(|cmd| cmd.starts_with(prefix)),
                );
                Ok((start, candidates))
            }
            2 if !line.ends_with(' ') => {
                let prefix = words[1];
                let args = self.arguments(words[0]);
                let candidates = pairs(
                    args.iter()
                        .map(String::as_str)
                        .filter(|arg| arg.starts_with(prefix)),
                );
                Ok((start, candidates))
            }
            _ => Ok((pos, vec![])),
        }
    }
}

impl Hinter for ShellCompleter {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for ShellCompleter {}
impl Validator for ShellCompleter {}
impl Helper for ShellCompleter {}

/// Parse a command line into arguments, handling quotes
fn parse_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = ' ';

    for c in line.chars() {
        match c {
            '"' | '\'' if !in_quotes => {
                in_quotes = true;
                quote_char = c;
            }
            c if c == quote_char && in_quotes => {
                in_quotes = false;
            }
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    args.push(current.clone());
                    current.clear();
                }
            }
            _ => {
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Run a single command against the screen.
/// Returns Ok(true) to continue, Ok(false) to exit gracefully.
fn run_command<S: CertificationService>(
    screen: &mut ConsultantPeriodScreen<S>,
    args: &[String],
) -> Result<bool> {
    let Some(cmd) = args.first() else {
        return Ok(true);
    };
    let arg = args.get(1).map(String::as_str);

    match (cmd.as_str(), arg) {
        ("help", _) => print_help(),
        ("exit" | "quit", _) => return Ok(false),
        ("periodo", Some("clear")) => {
            screen.set_periodo(None);
            println!("periodo cleared");
        }
        ("periodo", Some(value)) => {
            let date = parse_periodo(value)?;
            let before = screen.state().status.clone();
            screen.set_periodo(Some(date));
            println!("periodo = {}", format_periodo(date));
            if !screen.form().periodo_valid() {
                println!("  (not the first day of a month)");
            }
            if screen.state().status != before {
                println!("Status: {}", screen.state().status);
            }
        }
        ("codigo", Some(value)) => {
            screen.set_codigo(value);
            let known = screen.codes().is_empty()
                || screen.codes().iter().any(|b| b.codigo == value);
            println!("codigo = {}", value);
            if !known {
                println!("  (not in the code list)");
            }
        }
        ("periodo" | "codigo", None) => anyhow::bail!("Usage: {} <value>", cmd),
        ("submit", _) => {
            let problems = screen.form().problems();
            if !problems.is_empty() {
                println!("Form incomplete: {}", problems.join(", "));
            } else if screen.submit().is_some() {
                println!("Request sent, waiting for status...");
            }
        }
        ("status", _) => print_status(screen),
        ("codes", _) => print_codes(screen),
        ("click", Some("notification")) => screen.on_click(ClickTarget::Notification),
        ("click", Some("outside") | None) => screen.on_click(ClickTarget::Elsewhere),
        ("click", Some(other)) => anyhow::bail!("Unknown click target: {}", other),
        ("back", _) => screen.on_navigation(),
        (other, _) => anyhow::bail!("Unknown command: {} (type 'help')", other),
    }

    Ok(true)
}

fn print_status<S: CertificationService>(screen: &ConsultantPeriodScreen<S>) {
    let form = screen.form();
    let state = screen.state();
    println!("Connection:   {:?}", screen.connection_state());
    println!(
        "periodo:      {}",
        form.periodo().map(format_periodo).unwrap_or_else(|| "-".to_string())
    );
    println!(
        "codigo:       {}",
        if form.codigo().is_empty() { "-" } else { form.codigo() }
    );
    println!(
        "Status:       {}",
        if state.status.is_empty() { "-" } else { state.status.as_str() }
    );
    println!("Loading:      {}", if state.loading { "yes" } else { "no" });
    if let Some(pushed) = screen.last_pushed_status() {
        println!("Last push:    {}", pushed);
    }
    let pending = screen.pending_requests();
    if pending > 0 {
        println!("Requests:     {} awaiting response", pending);
    }
    if let Some(message) = screen.notifications().current() {
        println!("Notification: {}", message);
    }
}

fn print_codes<S: CertificationService>(screen: &ConsultantPeriodScreen<S>) {
    if screen.codes().is_empty() {
        match screen.codes_error() {
            Some(err) => println!("Code list unavailable: {}", err),
            None => println!("No codes loaded"),
        }
        return;
    }
    for budget in screen.codes() {
        match &budget.descripcion {
            Some(desc) => println!("  {:<12} {}", budget.codigo, desc),
            None => println!("  {}", budget.codigo),
        }
    }
}

/// Print what the background side reported since the last poll
fn print_event(event: &ScreenEvent, verbose: bool) {
    match event {
        ScreenEvent::Connected => println!("Connected, listening for status updates"),
        ScreenEvent::ConnectionFailed(reason) => {
            print_error(&format!("Status updates unavailable: {}", reason))
        }
        ScreenEvent::ChannelClosed(reason) => {
            print_error(&format!("Status updates stopped: {}", reason))
        }
        ScreenEvent::StatusChanged(status) => println!("Status: {}", status),
        ScreenEvent::CodesLoaded(count) => {
            if verbose {
                println!("{} codes available", count)
            }
        }
        ScreenEvent::LogInfo(msg) => {
            if verbose {
                println!("{}", msg)
            }
        }
        ScreenEvent::LogError(msg) => {
            if verbose {
                print_error(msg)
            }
        }
        // The notification slot reports these
        ScreenEvent::SubmissionDispatched | ScreenEvent::SubmissionFailed(_) => {}
    }
}

fn print_help() {
    println!(
        r#"Certification screen

Commands:
  periodo <date>           Set the period (YYYY-MM-DD or DD/MM/YYYY)
  periodo clear            Clear the period
  codigo <code>            Set the budget code
  submit                   Request certification
  status                   Show form, status and notification
  codes                    List selectable codes

  click notification       Click on the notification (keeps it)
  click outside            Click elsewhere (dismisses the notification)
  back                     Navigate (dismisses the notification)

  help                     Show this help
  exit, quit               Close the screen and exit
"#
    );
}

/// Get the history file path
fn history_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("com", "periodcert", "Periodcert")
        .map(|dirs| dirs.data_dir().join("shell_history"))
}

/// Read lines on a dedicated thread. Each line waits for an acknowledgement so
/// command output is printed before the next prompt.
fn spawn_reader(
    codes: Arc<Mutex<Vec<String>>>,
    lines: mpsc::UnboundedSender<String>,
    acks: std::sync::mpsc::Receiver<()>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let editor_config = EditorConfig::builder()
            .history_ignore_space(true)
            .completion_type(rustyline::CompletionType::List)
            .build();

        let mut rl = match Editor::with_config(editor_config) {
            Ok(rl) => rl,
            Err(err) => {
                eprintln!("Error: {}", err);
                return;
            }
        };
        rl.set_helper(Some(ShellCompleter::new(codes)));

        if let Some(path) = history_path() {
            let _ = rl.load_history(&path);
        }

        loop {
            match rl.readline("periodcert> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());

                    let exit = matches!(line.as_str(), "exit" | "quit");
                    if lines.send(line).is_err() || exit || acks.recv().is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("exit");
                    let _ = lines.send("exit".to_string());
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = history_path() {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = rl.save_history(&path);
        }
    })
}

/// Run the interactive screen
pub async fn run(config: &Config, verbose: bool) -> Result<()> {
    println!("Period certification v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for available commands, 'exit' to quit.\n");

    let mut screen = commands::open_screen(config)?;
    let mut notifications = screen.notifications().subscribe();

    let codes = Arc::new(Mutex::new(Vec::new()));
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let (ack_tx, ack_rx) = std::sync::mpsc::channel();
    let reader = spawn_reader(codes.clone(), line_tx, ack_rx);

    let mut ticker = tokio::time::interval(config.screen.poll_interval());

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                let args = parse_args(&line);
                match run_command(&mut screen, &args) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => print_error(&e.to_string()),
                }
                let _ = ack_tx.send(());
            }
            _ = ticker.tick() => {
                for event in screen.poll() {
                    if let ScreenEvent::CodesLoaded(_) = event {
                        if let Ok(mut shared) = codes.lock() {
                            *shared = screen.codes().iter().map(|b| b.codigo.clone()).collect();
                        }
                    }
                    print_event(&event, verbose);
                }
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    continue;
                }
                let current = notifications.borrow_and_update().clone();
                match current {
                    Some(message) => println!("! {}", message),
                    None => println!("(notification dismissed)"),
                }
            }
        }
    }

    screen.close().await;
    drop(ack_tx);
    if reader.join().is_err() {
        tracing::warn!("Line editor thread panicked");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Notifications;
    use crate::screen::ScreenSettings;
    use crate::testing::{ScriptedService, memory_transport, settle};

    fn words(line: &str) -> Vec<String> {
        parse_args(line)
    }

    #[test]
    fn test_parse_args_handles_quotes() {
        assert_eq!(parse_args("codigo  A1 "), vec!["codigo", "A1"]);
        assert_eq!(parse_args("codigo \"A 1\""), vec!["codigo", "A 1"]);
        assert_eq!(parse_args("click 'outside'"), vec!["click", "outside"]);
        assert!(parse_args("   ").is_empty());
    }

    #[test]
    fn test_completer_offers_loaded_codes() {
        let codes = Arc::new(Mutex::new(vec!["A1".to_string(), "B2".to_string()]));
        let completer = ShellCompleter::new(codes);
        assert_eq!(completer.arguments("codigo"), vec!["A1", "B2"]);
        assert_eq!(completer.arguments("click"), vec!["notification", "outside"]);
        assert!(completer.arguments("submit").is_empty());
    }

    #[tokio::test]
    async fn test_commands_drive_the_screen() {
        let (broker, transport) = memory_transport();
        let notifications = Notifications::new();
        let mut screen = ConsultantPeriodScreen::open(
            transport,
            ScriptedService::accepting(),
            notifications.clone(),
            ScreenSettings::default(),
        );
        settle(&mut screen, |s, _| !s.codes().is_empty()).await;

        assert!(run_command(&mut screen, &words("codigo A1")).unwrap());
        assert!(run_command(&mut screen, &words("periodo 2024-01-01")).unwrap());
        assert_eq!(screen.state().status, "En curso");

        assert!(run_command(&mut screen, &words("submit")).unwrap());
        assert!(screen.state().loading);

        broker.publish_status("Completado");
        settle(&mut screen, |s, _| !s.state().loading).await;
        assert_eq!(screen.state().status, "Completado");

        notifications.set("Service unavailable");
        assert!(run_command(&mut screen, &words("click notification")).unwrap());
        assert!(notifications.current().is_some());
        assert!(run_command(&mut screen, &words("back")).unwrap());
        assert!(notifications.current().is_none());

        assert!(run_command(&mut screen, &words("periodo 2024-13-01")).is_err());
        assert!(run_command(&mut screen, &words("frobnicate")).is_err());
        assert!(!run_command(&mut screen, &words("exit")).unwrap());
    }
}

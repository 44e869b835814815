//! Interactive console for zulu-control
//!
//! Runs the console event loop with a line editor on the side: input lines
//! arrive from a blocking reader thread while status refreshes, enumeration
//! and mount replies are processed as they complete.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use tokio::sync::mpsc;

use zulu_control::api::ImageRef;
use zulu_control::config::Config;
use zulu_control::state::{DisplayMode, StateEvent};
use zulu_control::{Command, Console, ControlClient};

use super::output::{format_display, format_version, print_events, OutputFormat};

/// Command completer for the shell
#[derive(Default)]
struct ShellCompleter {
    commands: Vec<(&'static str, Vec<&'static str>)>,
}

impl ShellCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                ("refresh", vec![]),
                ("eject", vec![]),
                ("browse", vec![]),
                ("select", vec![]),
                ("cancel", vec![]),
                ("auto", vec!["on", "off"]),
                ("show", vec![]),
                ("version", vec![]),
                ("help", vec![]),
                ("exit", vec![]),
                ("quit", vec![]),
            ],
        }
    }
}

fn candidates<'a>(words: impl Iterator<Item = &'a &'static str>, prefix: &str) -> Vec<Pair> {
    words
        .filter(|word| word.starts_with(prefix))
        .map(|word| Pair {
            display: word.to_string(),
            replacement: word.to_string(),
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
        let finished = line.ends_with(' ');
        let start = line.rfind(' ').map(|i| i + 1).unwrap_or(0);
        let names = || self.commands.iter().map(|(cmd, _)| cmd);
        let args_of = |cmd: &str| {
            self.commands
                .iter()
                .find(|(name, _)| *name == cmd)
                .map(|(_, args)| args.as_slice())
                .unwrap_or_default()
        };

        let found = match (words.as_slice(), finished) {
            ([], _) => candidates(names(), ""),
            ([cmd], false) => candidates(names(), cmd),
            ([cmd], true) => candidates(args_of(*cmd).iter(), ""),
            ([cmd, arg], false) => candidates(args_of(*cmd).iter(), arg),
            _ => Vec::new(),
        };
        Ok((start, found))
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

/// One console line, parsed by clap
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true, disable_help_subcommand = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ShellCommand {
    /// Re-read the drive status now
    Refresh,
    /// Eject the mounted image
    Eject,
    /// Open the image list
    Browse,
    /// Mount an image from the list
    Select {
        /// List number (1-based) or filename
        choice: String,
    },
    /// Leave the image list
    Cancel,
    /// Turn periodic status refresh on or off
    Auto {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Redraw the console
    Show,
    /// Show client and server API versions
    Version,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

/// Resolve a `select` argument against the listed images.
fn resolve_choice(choice: &str, images: &[ImageRef]) -> Result<String, String> {
    match choice.parse::<usize>() {
        Ok(n) if (1..=images.len()).contains(&n) => Ok(images[n - 1].filename.clone()),
        Ok(n) if !images.iter().any(|i| i.filename == choice) => {
            Err(format!("No image numbered {} (1-{})", n, images.len()))
        }
        _ => Ok(choice.to_string()),
    }
}

/// Run one input line against the console. Returns the events to render.
fn run_command(console: &mut Console, args: Vec<String>) -> Vec<StateEvent> {
    if args.first().map(String::as_str) == Some("help") {
        print_help();
        return Vec::new();
    }

    let line = match ShellLine::try_parse_from(&args) {
        Ok(line) => line,
        Err(e) => {
            // Print clap's error message (includes usage hints)
            println!("{}", e);
            return Vec::new();
        }
    };

    match line.command {
        ShellCommand::Refresh => console.dispatch(Command::Refresh),
        ShellCommand::Eject => console.dispatch(Command::Eject),
        ShellCommand::Browse => console.dispatch(Command::Browse),
        ShellCommand::Cancel => console.dispatch(Command::Cancel),
        ShellCommand::Auto { state } => {
            let events = console.dispatch(Command::AutoRefresh(state == Toggle::On));
            if events.is_empty() {
                let word = if state == Toggle::On { "on" } else { "off" };
                println!("Auto-refresh is already {}.", word);
            }
            events
        }
        ShellCommand::Select { choice } => {
            if console.mode() != DisplayMode::Selection {
                println!("No image list open. Run 'browse' first.");
                return Vec::new();
            }
            match resolve_choice(&choice, console.catalog().images()) {
                Ok(filename) => console.dispatch(Command::Commit(filename)),
                Err(message) => {
                    println!("{}", message);
                    Vec::new()
                }
            }
        }
        ShellCommand::Show => {
            println!("{}", format_display(&console.display()));
            Vec::new()
        }
        ShellCommand::Version => {
            match console.version().view() {
                Some(view) => println!("{}", format_version(view)),
                None => println!("Version not loaded yet."),
            }
            Vec::new()
        }
    }
}

fn print_help() {
    println!(
        r#"ZuluIDE Control Console

Commands:
  refresh                  Re-read the drive status now
  eject                    Eject the mounted image
  browse                   List the images the service can mount
  select <n|filename>      Mount image number n (or by name) from the list
  cancel                   Leave the image list without mounting
  auto on|off              Turn periodic status refresh on or off
  show                     Redraw the console
  version                  Show client and server API versions

  help                     Show this help
  exit, quit               Exit the shell
"#
    );
}

/// Get the history file path
fn history_path() -> Option<std::path::PathBuf> {
    Config::data_dir().map(|dir| dir.join("shell_history"))
}

/// Read lines on a blocking thread until exit/quit/EOF, then save history.
/// Dropping the sender tells the console loop to stop.
fn read_lines(tx: mpsc::UnboundedSender<Vec<String>>) -> Result<()> {
    let config = rustyline::Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();

    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(ShellCompleter::new()));

    // Load history
    if let Some(path) = history_path() {
        let _ = rl.load_history(&path);
    }

    loop {
        match rl.readline("zulu> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                let args = parse_args(line);
                if matches!(args.first().map(String::as_str), Some("exit" | "quit")) {
                    break;
                }
                if tx.send(args).is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    // Save history
    if let Some(path) = history_path() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(&path);
    }

    Ok(())
}

/// Run the interactive shell
pub async fn run(client: Arc<ControlClient>, config: &Config) -> Result<()> {
    println!("ZuluIDE Control Console v{}", env!("CARGO_PKG_VERSION"));
    println!("Service: {}", client.base_url());
    println!("Type 'help' for available commands, 'exit' to quit.\n");

    let mut console = Console::new(client, config);
    console.start();

    let (tx, mut lines) = mpsc::unbounded_channel();
    let reader = tokio::task::spawn_blocking(move || read_lines(tx));

    loop {
        let events = tokio::select! {
            line = lines.recv() => match line {
                Some(args) => run_command(&mut console, args),
                None => break,
            },
            events = console.next() => match events {
                Some(events) => events,
                None => break,
            },
        };
        print_events(&events, &console.display(), OutputFormat::Text, false);
    }

    console.dispatch(Command::AutoRefresh(false));
    reader.await??;
    Ok(())
}

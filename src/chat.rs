//! Terminal front end: the interactive `acon chat` loop and the one-shot
//! `acon ask` command.
//!
//! # Chat input
//!
//! A line ending in `\` continues on the next line; the message is sent
//! when a line without the trailing backslash is entered. Lines starting
//! with `/` are commands:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `/attach <path>` | Stage a file for the next message |
//! | `/detach` | Drop the staged file |
//! | `/transcript` | Print the conversation so far |
//! | `/export <path>` | Write the transcript as JSON |
//! | `/help` | List commands |
//! | `/quit` | Leave (also `/exit` or end of input) |

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::dispatch::{Attachment, HttpDispatcher, ADVISORY_EXTENSIONS};
use crate::export;
use crate::session::{Message, Role, SendError, Session};

const HELP: &str = "\
Commands:
  /attach <path>   stage a file for the next message
  /detach          drop the staged file
  /transcript      show the conversation so far
  /export <path>   write the transcript as JSON
  /help            show this help
  /quit            leave the chat

End a line with \\ to continue the message on the next line.
Send an empty message with a file attached to just upload it.";

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Attach(PathBuf),
    Detach,
    Transcript,
    Export(PathBuf),
    Help,
    Quit,
    Unknown(String),
}

impl ChatCommand {
    /// Parse `line` as a command. Returns `None` for ordinary messages.
    pub fn parse(line: &str) -> Option<ChatCommand> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match (name, arg.is_empty()) {
            ("attach", false) => ChatCommand::Attach(PathBuf::from(arg)),
            ("export", false) => ChatCommand::Export(PathBuf::from(arg)),
            ("detach", _) => ChatCommand::Detach,
            ("transcript", _) => ChatCommand::Transcript,
            ("help", _) => ChatCommand::Help,
            ("quit", _) | ("exit", _) => ChatCommand::Quit,
            _ => ChatCommand::Unknown(line.to_string()),
        };
        Some(command)
    }
}

/// Joins `\`-continued input lines into one message.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<String>,
}

impl LineBuffer {
    /// Feed one raw input line. Returns the full message once a line
    /// without a trailing backslash arrives.
    pub fn push(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches(['\r', '\n']);
        match line.strip_suffix('\\') {
            Some(head) => {
                self.pending.push(head.to_string());
                None
            }
            None => {
                self.pending.push(line.to_string());
                Some(std::mem::take(&mut self.pending).join("\n"))
            }
        }
    }

    pub fn is_continuing(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Render a transcript entry for the terminal.
pub fn render_message(message: &Message) -> String {
    match message.role() {
        Role::System => message.content().to_string(),
        Role::User => {
            let mut out = format!("you> {}", message.content());
            if let Some(file) = message.attachment() {
                if !message.content().is_empty() {
                    out.push(' ');
                }
                out.push_str(&format!("[attached: {} ({})]", file.name, format_bytes(file.size_bytes)));
            }
            out
        }
        Role::Agent => {
            let (tag, name) = message
                .target()
                .map(|t| (t.info().tag, t.display_name()))
                .unwrap_or(("", "Agent"));
            let marker = match message.succeeded() {
                Some(true) => "✓",
                Some(false) => "✗",
                None => "",
            };
            format!("{} {} {}\n{}", tag, name, marker, message.content())
        }
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn build_session(config: &Config) -> Result<Session> {
    let dispatcher = HttpDispatcher::new(config)?;
    Ok(Session::new(Arc::new(dispatcher)))
}

fn load_attachment(path: &Path) -> Result<Attachment> {
    let file = Attachment::from_path(path)?;
    if !file.has_advisory_extension() {
        eprintln!(
            "Warning: '{}' is not one of the usual types ({}); sending anyway.",
            file.name,
            ADVISORY_EXTENSIONS.join(", ")
        );
    }
    Ok(file)
}

/// Run the `ask` command: send a single message and print the reply.
///
/// Returns whether the agent call succeeded.
pub async fn run_ask(config: &Config, text: &str, file: Option<&Path>, json: bool) -> Result<bool> {
    let session = build_session(config)?;
    if let Some(path) = file {
        session.stage_pending_file(load_attachment(path)?)?;
    }

    let report = session.send(text).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_message(&report.agent_message));
    }
    Ok(report.succeeded)
}

/// Run the interactive chat loop until `/quit` or end of input.
pub async fn run_chat(config: &Config, transcript_out: Option<&Path>) -> Result<()> {
    let session = build_session(config)?;
    let interactive = atty::is(atty::Stream::Stdin);

    for message in session.transcript().messages() {
        println!("{}", render_message(message));
    }
    if interactive {
        println!("(type /help for commands)");
    }
    println!();

    let input = BufReader::new(tokio::io::stdin());
    converse(&session, input, interactive, transcript_out).await
}

/// Drive `session` from `input` until `/quit` or end of input, then export
/// to `transcript_out`. A read error still exports before it is returned.
async fn converse<R>(
    session: &Session,
    input: R,
    interactive: bool,
    transcript_out: Option<&Path>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let read_result = read_loop(session, input, interactive).await;

    if let Some(path) = transcript_out {
        export::run_export(session, Some(path))?;
    }
    read_result
}

async fn read_loop<R>(session: &Session, input: R, interactive: bool) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut buffer = LineBuffer::default();

    loop {
        if interactive {
            let prompt = if buffer.is_continuing() { "...  " } else { "> " };
            eprint!("{}", prompt);
        }
        let Some(line) = lines
            .next_line()
            .await
            .context("failed to read chat input")?
        else {
            return Ok(());
        };
        let Some(input) = buffer.push(&line) else {
            continue;
        };

        match ChatCommand::parse(&input) {
            Some(ChatCommand::Quit) => return Ok(()),
            Some(command) => handle_command(session, command),
            None => send_and_print(session, &input).await,
        }
    }
}

fn handle_command(session: &Session, command: ChatCommand) {
    match command {
        ChatCommand::Attach(path) => match load_attachment(&path) {
            Ok(file) => {
                let name = file.name.clone();
                let size = file.size();
                match session.stage_pending_file(file) {
                    Ok(Some(old)) => {
                        println!("Replaced {} with {} ({}).", old.name, name, format_bytes(size))
                    }
                    Ok(None) => println!("Attached {} ({}).", name, format_bytes(size)),
                    Err(e) => eprintln!("{}", e),
                }
            }
            Err(e) => eprintln!("Error: {:#}", e),
        },
        ChatCommand::Detach => match session.clear_pending_file() {
            Some(file) => println!("Removed {}.", file.name),
            None => println!("No file attached."),
        },
        ChatCommand::Transcript => {
            for message in session.transcript().messages() {
                println!("{}\n", render_message(message));
            }
        }
        ChatCommand::Export(path) => {
            if let Err(e) = export::run_export(session, Some(&path)) {
                eprintln!("Error: {:#}", e);
            }
        }
        ChatCommand::Help => println!("{}", HELP),
        ChatCommand::Unknown(line) => println!("Unknown command: {} (try /help)", line),
        ChatCommand::Quit => {}
    }
}

async fn send_and_print(session: &Session, input: &str) {
    match session.send(input).await {
        Ok(report) => {
            println!("{}", render_message(&report.user_message));
            println!("{}\n", render_message(&report.agent_message));
        }
        Err(SendError::Empty) => {}
        Err(e) => eprintln!("{}", e),
    }
}

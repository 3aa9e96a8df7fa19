//! # Agent Console CLI (`acon`)
//!
//! The `acon` binary routes free-text requests to the backend agents and
//! prints their replies.
//!
//! ## Usage
//!
//! ```bash
//! acon --config ./config/acon.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `acon targets` | List the agents and their configured base URLs |
//! | `acon classify "<text>"` | Show which agent a message would go to |
//! | `acon ask "<text>"` | Send one message and print the reply |
//! | `acon chat` | Interactive conversation |
//! | `acon status` | Probe every agent's health endpoint |
//! | `acon serve` | Start the HTTP chat API |
//! | `acon completions <shell>` | Print a shell completion script |
//!
//! A missing config file is not an error: built-in defaults are used and
//! `ACON_*` environment variables still apply.

use agent_console::{chat, classify, config, health, server, target::Target};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Agent Console CLI: route requests to the scraping, knowledge, database,
/// transformer and orchestrator agents.
#[derive(Parser)]
#[command(
    name = "acon",
    about = "Agent Console: route requests to the right backend agent",
    version,
    long_about = "Agent Console classifies each message by keyword, sends it to the matching \
    backend agent over HTTP, and turns the agent's response into a readable reply."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/acon.toml`. Built-in defaults are used when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/acon.toml")]
    config: PathBuf,

    /// Log debug output to stderr (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List the agents with their tags and base URLs.
    Targets,

    /// Show which agent a message routes to, and the keyword that decided it.
    Classify {
        /// The message text.
        text: String,
    },

    /// Send a single message and print the agent's reply.
    ///
    /// Exits with a non-zero status when the agent call fails.
    Ask {
        /// The message text. May be empty when `--file` is given.
        text: String,

        /// Attach a file to the message.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Print the full send report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive conversation.
    Chat {
        /// Write the transcript as JSON to this path on exit.
        #[arg(long)]
        transcript_out: Option<PathBuf>,
    },

    /// Probe every agent's health endpoint.
    ///
    /// Exits with a non-zero status when any agent is unhealthy.
    Status {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP chat API on `[server].bind`.
    Serve,

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "agent_console=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    match &cli.command {
        Commands::Classify { text } => {
            let c = classify::explain(text);
            let keyword = c.matched_keyword.unwrap_or("(none, fallback)");
            println!("{}\t{}\tkeyword: {}", c.target, c.target.display_name(), keyword);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "acon", &mut std::io::stdout());
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let cfg = config::Config::load_or_default(&cli.config)?;

    let ok = match cli.command {
        Commands::Targets => {
            println!(
                "{:<14} {:<18} {:<9} {:<46} {}",
                "TARGET", "NAME", "TAG", "DESCRIPTION", "BASE URL"
            );
            for t in Target::ALL {
                println!(
                    "{:<14} {:<18} {:<9} {:<46} {}",
                    t.id(),
                    t.display_name(),
                    t.info().tag,
                    t.info().description,
                    cfg.targets.base_url(t)
                );
            }
            true
        }
        Commands::Ask { text, file, json } => {
            chat::run_ask(&cfg, &text, file.as_deref(), json).await?
        }
        Commands::Chat { transcript_out } => {
            chat::run_chat(&cfg, transcript_out.as_deref()).await?;
            true
        }
        Commands::Status { json } => health::run_status(&cfg, json).await?,
        Commands::Serve => {
            server::run_server(&cfg).await?;
            true
        }
        Commands::Classify { .. } | Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

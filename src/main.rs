//! kimchi-paste - clipboard history popover
//!
//! Watches the system pasteboard and keeps the last few copied text
//! snippets around so they can be copied again or thrown away.

mod app;
mod config;
mod error;
mod models;
mod screens;
mod services;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::pasteboard::MemoryPasteboard;
use crate::services::{
    HistoryStore, KeyValueStore, LaunchAgent, LoginItem, MemoryStore, Pasteboard,
    PasteboardWatcher, RecordOutcome, SqliteStore, SystemPasteboard,
};

/// kimchi-paste - clipboard history
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file path (default: ~/.config/kimchi-paste/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// History database path (overrides the config file)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Started by launchd; same as `daemon`
    #[arg(long, hide = true)]
    launchagent: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive history popover (default)
    Ui,
    /// Record copies in the background until interrupted
    Daemon,
    /// Print the history, most recent first
    List {
        /// Only show snippets containing this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Copy the snippet at INDEX back to the pasteboard
    Copy { index: usize },
    /// Delete the snippets at the given positions
    Delete {
        #[arg(required = true)]
        indices: Vec<usize>,
    },
    /// Forget the whole history
    Clear,
    /// Manage launch at login
    LoginItem {
        #[arg(value_enum)]
        action: LoginAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LoginAction {
    Enable,
    Disable,
    Status,
}

/// Set up tracing. The popover owns the terminal, so it logs to a file.
fn init_logging(debug: bool, to_file: bool) -> Result<()> {
    let filter = if debug {
        "kimchi_paste=debug,info"
    } else {
        "kimchi_paste=info,warn"
    };

    let writer = if to_file {
        let dir = Config::data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("kimchi-paste.log"))?;
        BoxMakeWriter::new(std::sync::Mutex::new(file))
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(!to_file),
        )
        .init();
    Ok(())
}

/// Open the history database, falling back to memory so the app still works.
fn open_store(path: &Path) -> Box<dyn KeyValueStore> {
    match SqliteStore::open(path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!("Failed to open {}: {}; history will not be saved", path.display(), e);
            Box::new(MemoryStore::new())
        }
    }
}

fn open_pasteboard() -> Arc<dyn Pasteboard> {
    match SystemPasteboard::new() {
        Ok(pasteboard) => Arc::new(pasteboard),
        Err(e) => {
            warn!("System pasteboard unavailable: {}", e);
            Arc::new(MemoryPasteboard::new())
        }
    }
}

/// Headless loop: apply every pasteboard change until Ctrl-C.
async fn run_daemon(config: &Config, mut history: HistoryStore, pasteboard: Arc<dyn Pasteboard>) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = PasteboardWatcher::new(pasteboard).spawn(config.poll_interval(), tx);
    info!(entries = history.len(), "Daemon started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            change = rx.recv() => match change {
                Some(text) => {
                    if let RecordOutcome::Inserted { evicted: Some(old) } = history.record_copy(&text) {
                        debug!(id = %old.id, "Evicted oldest snippet");
                    }
                }
                None => break,
            },
            _ = &mut shutdown => {
                info!("Interrupted, stopping");
                break;
            }
        }
    }

    watcher.abort();
    Ok(())
}

fn print_list(history: &HistoryStore, config: &Config, filter: Option<&str>, json: bool) -> Result<()> {
    let query = filter.unwrap_or("");

    if json {
        let matches = history.filter(query);
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    // Positions are printed against the full list so `copy`/`delete` can use them
    for (i, entry) in history.entries().iter().enumerate() {
        if !entry.matches(query) {
            continue;
        }
        println!(
            "{:>3}  {}  {}",
            i,
            entry.formatted_time(&config.display.date_format),
            entry.preview(config.display.preview_chars)
        );
    }
    println!("{}/{} items", history.len(), history.capacity());
    Ok(())
}

fn run_login_item(config: &Config, action: LoginAction) -> Result<()> {
    let agent = LaunchAgent::from_config(&config.login_item)?;
    match action {
        LoginAction::Enable => {
            agent.enable(true)?;
            println!("Launch at login enabled ({})", agent.plist_path().display());
        }
        LoginAction::Disable => {
            agent.enable(false)?;
            println!("Launch at login disabled");
        }
        LoginAction::Status => {
            let state = if agent.is_enabled() { "enabled" } else { "disabled" };
            println!("Launch at login {}", state);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let command = match args.command {
        Some(command) => command,
        None if args.launchagent => Command::Daemon,
        None => Command::Ui,
    };

    init_logging(args.debug, matches!(command, Command::Ui))?;

    // Load configuration
    let mut config = if let Some(path) = args.config {
        config::Config::from_file(&path)?
    } else {
        config::Config::load()?
    };

    // Override database if specified
    if let Some(database) = args.database {
        config.history.database = database;
    }

    let open_history = |config: &Config| {
        let pasteboard = open_pasteboard();
        let history = HistoryStore::new(
            open_store(&config.database_path()),
            pasteboard.clone(),
            config.history.capacity,
        );
        (history, pasteboard)
    };

    match command {
        Command::LoginItem { action } => run_login_item(&config, action)?,
        Command::Ui => {
            let (history, pasteboard) = open_history(&config);
            let agent = LaunchAgent::from_config(&config.login_item)
                .context("resolving LaunchAgent location")?;
            let mut app = app::App::new(Arc::new(config), history, pasteboard, Box::new(agent));
            app.run().await?;
        }
        Command::Daemon => {
            let (history, pasteboard) = open_history(&config);
            run_daemon(&config, history, pasteboard).await?;
        }
        Command::List { filter, json } => {
            let (history, _) = open_history(&config);
            print_list(&history, &config, filter.as_deref(), json)?;
        }
        Command::Copy { index } => {
            let (history, _) = open_history(&config);
            let Some(entry) = history.entries().get(index) else {
                bail!("no snippet at position {} ({} stored)", index, history.len());
            };
            let content = entry.content.clone();
            history.copy_out(&content);
            println!("Copied: {}", entry.preview(config.display.preview_chars));
        }
        Command::Delete { indices } => {
            let (mut history, _) = open_history(&config);
            let removed = history.delete_at(&indices);
            println!("Deleted {} snippet(s)", removed);
        }
        Command::Clear => {
            let (mut history, _) = open_history(&config);
            history.clear_all();
            println!("History cleared");
        }
    }

    Ok(())
}

//! Parley CLI - catalog commands and an interactive chat loop.
//!
//! ```text
//! main() -> args::parse() -> catalog call        (threads, journeys, new, rename, delete)
//!                         -> chat::run(Session)   (chat)
//! ```
//!
//! Logs go to `~/.parley/logs/parley.log` (or `./.parley/logs/parley.log`), never to the
//! terminal, so they cannot interleave with streamed replies.

mod args;
mod chat;

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use args::Command;
use parley_engine::{HttpBackend, ParleyConfig, Session, UuidIds, config_path};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_parley_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry().with(env_filter).init();
}

fn open_parley_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in parley_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn parley_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.parley/logs/parley.log
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("parley.log"));
    }

    // Fallback: ./.parley/logs/parley.log
    candidates.push(PathBuf::from(".parley").join("logs").join("parley.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let command = match args::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}\n\n{}", args::USAGE);
            std::process::exit(2);
        }
    };
    if command == Command::Help {
        println!("{}", args::USAGE);
        return Ok(());
    }

    let config = match ParleyConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(err) => {
            eprintln!("warning: {err}; using defaults");
            ParleyConfig::default()
        }
    };
    let backend =
        HttpBackend::new(&config.backend_config()).context("failed to build HTTP client")?;
    tracing::info!(base_url = backend.base_url(), ?command, "Starting");

    match command {
        Command::Threads => {
            for thread in backend.list_threads().await? {
                println!("{}\t{}", thread.id, thread.name);
            }
        }
        Command::Journeys => {
            for journey in backend.list_journeys().await? {
                if journey.description.is_empty() {
                    println!("{}\t{}", journey.id, journey.name);
                } else {
                    println!("{}\t{}\t{}", journey.id, journey.name, journey.description);
                }
            }
        }
        Command::New { name, journey } => {
            let thread = backend.create_thread(&name, journey.as_ref()).await?;
            println!("{}\t{}", thread.id, thread.name);
        }
        Command::Rename { thread, name } => {
            backend.rename_thread(&thread, &name).await?;
        }
        Command::Delete { thread } => {
            backend.delete_thread(&thread).await?;
        }
        Command::Chat { thread } => {
            let mut session = Session::with_parts(
                Arc::new(backend),
                Arc::new(UuidIds),
                config.session_settings(),
            );
            chat::run(&mut session, thread).await?;
        }
        Command::Help => {}
    }

    Ok(())
}

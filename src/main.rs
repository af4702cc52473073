// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod repl;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use clap::Parser;
use cli::{Cli, Commands};
use parley_core::{
    export::DEFAULT_EXPORT_FILE, export_session, ChatEngine, CredentialStore, ExportOutcome,
    FileSaveTarget, JsonFilePersistence, KeyFileCredentials, SessionId, SessionStore,
};
use parley_model::catalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Handle subcommands that need no configuration first
    if let Some(Commands::Completions { shell }) = &cli.command {
        cli::print_completions(*shell);
        return Ok(());
    }
    if let Some(Commands::Models { json }) = &cli.command {
        return list_models_cmd(*json);
    }

    let mut config = parley_config::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.model.name = model.clone();
    }

    match cli.command {
        None | Some(Commands::Chat) => run_chat(config).await,
        Some(Commands::Sessions { filter, json }) => list_sessions_cmd(&config, filter.as_deref(), json).await,
        Some(Commands::Export { id, output, force }) => export_cmd(&config, id, output, force).await,
        Some(Commands::SetKey { key }) => set_key_cmd(&config, key).await,
        Some(Commands::ShowConfig) => show_config_cmd(&config),
        Some(Commands::Completions { .. } | Commands::Models { .. }) => Ok(()),
    }
}

async fn run_chat(config: parley_config::Config) -> anyhow::Result<()> {
    let whole_word = config.search.whole_word;
    let (engine, events) = build_engine(config);
    repl::run(engine, events, whole_word, cli::is_stdin_tty()).await
}

fn build_engine(
    config: parley_config::Config,
) -> (ChatEngine, tokio::sync::mpsc::UnboundedReceiver<parley_core::ChatEvent>) {
    let persistence = Arc::new(JsonFilePersistence::new(config.storage.sessions_path()));
    let credentials = Arc::new(KeyFileCredentials::from_config(&config.model, config.storage.credentials_path()));
    tracing::debug!(
        sessions = %persistence.path().display(),
        model = %config.model.name,
        "starting engine"
    );
    ChatEngine::new(config.model, SessionStore::new(persistence), credentials)
}

/// Stored sessions without creating or activating any.
async fn load_store(config: &parley_config::Config) -> SessionStore {
    let mut store = SessionStore::new(Arc::new(JsonFilePersistence::new(config.storage.sessions_path())));
    store.load().await;
    store
}

/// Print the list of saved conversations to stdout.
async fn list_sessions_cmd(config: &parley_config::Config, filter: Option<&str>, as_json: bool) -> anyhow::Result<()> {
    let store = load_store(config).await;
    let rows = store.list(filter);

    if as_json {
        let rows: Vec<_> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id.to_string(),
                    "title": r.title,
                    "messages": r.message_count,
                    "created_at": r.id.created_at().map(|t| t.to_rfc3339()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No saved conversations found.");
        println!("Conversations are stored in: {}", config.storage.sessions_path().display());
        return Ok(());
    }

    println!("{:<15}  {:<16}  {:>5}  TITLE", "ID", "DATE", "MSGS");
    println!("{}", "-".repeat(80));
    for r in &rows {
        let date = r
            .id
            .created_at()
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{:<15}  {:<16}  {:>5}  {}", r.id, date, r.message_count, r.title);
    }
    println!("\nTotal: {} conversation(s)", rows.len());
    Ok(())
}

async fn export_cmd(
    config: &parley_config::Config,
    id: SessionId,
    output: Option<PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let store = load_store(config).await;
    let session = store
        .get(id)
        .with_context(|| format!("no conversation with id {id}; see `parley sessions`"))?;
    let target = FileSaveTarget::new(output.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE))).overwrite(force);
    match export_session(session, &target, &chrono::Local::now()).await? {
        ExportOutcome::Saved(path) => println!("Chat exported to {}", path.display()),
        ExportOutcome::Cancelled => anyhow::bail!("export cancelled: target exists (use --force to replace it)"),
        ExportOutcome::Failed(e) => anyhow::bail!("failed to export chat: {e}"),
    }
    Ok(())
}

async fn set_key_cmd(config: &parley_config::Config, key: Option<String>) -> anyhow::Result<()> {
    let key = match key {
        Some(k) => k,
        None => {
            if cli::is_stdin_tty() {
                print!("API key: ");
                io::stdout().flush()?;
            }
            let mut line = String::new();
            io::stdin().read_line(&mut line).context("reading API key from stdin")?;
            line
        }
    };
    let credentials = KeyFileCredentials::from_config(&config.model, config.storage.credentials_path());
    credentials.set(&key).await?;
    println!("API key saved to {}", credentials.path().display());
    Ok(())
}

fn show_config_cmd(config: &parley_config::Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.model.api_key.is_some() {
        shown.model.api_key = Some("********".into());
    }
    println!("{}", toml::to_string_pretty(&shown).context("serializing configuration")?);
    Ok(())
}

/// List the models of the built-in capability table.
fn list_models_cmd(as_json: bool) -> anyhow::Result<()> {
    let entries = catalog::static_catalog();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let id_w = entries.iter().map(|e| e.id.len()).max().unwrap_or(10).max(10);
    println!("{:<id_w$}  {:>14}  {:<9}  DESCRIPTION", "ID", "MAX OUT TOKENS", "TRANSPORT");
    println!("{}", "-".repeat(id_w + 50));
    for e in &entries {
        let transport = if e.requires_raw_transport() { "raw-sse" } else { "managed" };
        println!("{:<id_w$}  {:>14}  {:<9}  {}", e.id, e.max_output_tokens, transport, e.description);
    }
    println!(
        "\nModels not listed use {} output tokens and the managed transport.",
        catalog::DEFAULT_MAX_OUTPUT_TOKENS
    );
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

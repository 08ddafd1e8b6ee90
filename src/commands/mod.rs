// CLI command handlers
// Thin glue between the clap front end and the memory engine


use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::config::Config;
use crate::database::sqlite::models::ChannelSettingsUpdate;
use crate::database::{Collection, RecordMetadata, Scope};
use crate::engine::{ImportReport, MemoryEngine, RememberOutcome};
use crate::session::{MessageEvent, Platform};

/// File extensions picked up when a directory is imported
const IMPORTABLE_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Open the engine described by the default configuration
#[inline]
pub async fn open_engine() -> Result<MemoryEngine> {
    let config = Config::load_default().context("Failed to load configuration")?;
    MemoryEngine::open(&config)
        .await
        .with_context(|| format!("Failed to open memory store in {}", config.base_dir.display()))
}

/// Expand directories into the importable files they contain, sorted by path
#[inline]
pub fn collect_import_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_directory(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn collect_directory(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list directory {}", dir.display()))?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_directory(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMPORTABLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Import files and directories, reporting progress on an attended terminal
#[inline]
pub async fn import_paths(
    engine: &MemoryEngine,
    paths: &[PathBuf],
    collection: Collection,
) -> Result<Vec<ImportReport>> {
    let files = collect_import_paths(paths)?;
    if files.is_empty() {
        println!("No importable files found.");
        return Ok(Vec::new());
    }

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(files.len() as u64).with_style(
            ProgressStyle::with_template("{bar:30} [{pos}/{len}] Importing {msg}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };

    if let Some(first) = files.first() {
        bar.set_message(first.display().to_string());
    }
    let outcomes = engine
        .import_files_with_progress(&files, collection, |outcome| {
            if let Err(e) = &outcome.result {
                bar.println(format!("{} {}: {}", style("✗").red(), outcome.path.display(), e));
            }
            bar.inc(1);
            if let Some(next) = files.get(bar.position() as usize) {
                bar.set_message(next.display().to_string());
            }
        })
        .await;
    bar.finish_and_clear();

    let failures = outcomes.iter().filter(|o| o.result.is_err()).count();
    let reports: Vec<ImportReport> = outcomes
        .into_iter()
        .filter_map(|outcome| outcome.result.ok())
        .collect();

    let inserted: usize = reports.iter().map(|r| r.records_inserted).sum();
    let suppressed: usize = reports.iter().map(|r| r.records_suppressed).sum();
    let chunks: usize = reports.iter().map(|r| r.chunks_created).sum();
    println!(
        "Imported {} of {} files into {}",
        reports.len(),
        files.len(),
        collection
    );
    println!("  Chunks created: {}", chunks);
    println!("  Records stored: {}", inserted);
    println!("  Duplicates suppressed: {}", suppressed);
    if failures > 0 {
        println!("  Failed files: {}", style(failures).red());
    }

    Ok(reports)
}

#[inline]
pub async fn remember_text(
    engine: &MemoryEngine,
    text: &str,
    collection: Collection,
    source: Option<String>,
) -> Result<RememberOutcome> {
    let metadata = RecordMetadata {
        source,
        ..RecordMetadata::default()
    };
    let outcome = engine
        .remember(text, collection, metadata)
        .await
        .context("Failed to remember text")?;

    match &outcome {
        RememberOutcome::Stored(id) => println!("Stored in {} (ID: {})", collection, id),
        RememberOutcome::Suppressed { existing_id } => {
            println!("Already remembered (matches {})", existing_id);
        }
    }
    Ok(outcome)
}

#[inline]
pub async fn recall_memory(
    engine: &MemoryEngine,
    query: &str,
    scope: Scope,
    limit: usize,
) -> Result<()> {
    let results = engine
        .recall(query, scope, limit)
        .await
        .context("Failed to search memory")?;

    if results.is_empty() {
        println!("Nothing relevant remembered.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] {} {}",
            rank + 1,
            style(format!("{:.3}", result.score)).cyan(),
            style(result.record.collection).dim(),
            result.record.text.split_whitespace().collect::<Vec<_>>().join(" ")
        );
        if let Some(source) = &result.record.metadata.source {
            println!("   Source: {}", source);
        }
        if let Some(author) = &result.record.metadata.author {
            println!("   Author: {}", author);
        }
        println!(
            "   Stored: {}",
            result.record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Print the context a reply to `text` would be generated with
#[inline]
pub async fn show_context(
    engine: &MemoryEngine,
    author: &str,
    channel: &str,
    text: &str,
) -> Result<()> {
    let event = MessageEvent::new(Platform::Console, author, channel, text);
    let response = engine.build_context(&event).await;

    println!(
        "Persona: {}  Language: {}",
        response.settings.persona, response.settings.language
    );
    if response.degraded {
        println!("{}", style("Memory unavailable, context built without it").yellow());
    }
    if response.context.is_empty() {
        println!("(no context)");
    } else {
        println!("{}", response.context.text);
    }
    for provider in &response.provider_data {
        println!("[{}] {}", provider.provider, provider.data);
    }
    Ok(())
}

#[inline]
pub async fn show_status(engine: &MemoryEngine) -> Result<()> {
    println!("📊 Memory Status");
    println!("{}", "=".repeat(40));
    println!(
        "Embedder: {} ({} dimensions)",
        engine.embedder().model_id(),
        engine.embedder().dimension()
    );
    println!();

    for collection in Collection::ALL {
        match engine.status(collection).await {
            Ok(stats) => {
                println!("🗂️  {}: {} records", collection, stats.count);
                if let Some(updated) = stats.last_updated {
                    println!("   Last updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
                }
            }
            Err(e) => println!("❌ {}: {}", collection, e),
        }
    }

    let imports = engine
        .imports(Collection::Knowledge)
        .await
        .context("Failed to read import log")?;
    println!();
    println!("📚 Knowledge imports: {}", imports.len());
    for import in imports.iter().take(10) {
        println!(
            "   {} {} ({} stored, {} suppressed)",
            import.imported_at.format("%Y-%m-%d %H:%M"),
            import.source,
            import.records_inserted,
            import.records_suppressed
        );
        println!("      {}", style(&import.parent_id).dim());
    }

    Ok(())
}

/// Wipe the knowledge collection, asking first unless `assume_yes`
#[inline]
pub async fn purge_knowledge(engine: &MemoryEngine, assume_yes: bool) -> Result<()> {
    let stats = engine
        .status(Collection::Knowledge)
        .await
        .context("Failed to read knowledge stats")?;

    if stats.count == 0 {
        println!("Knowledge collection is already empty.");
        return Ok(());
    }

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Delete all {} knowledge records? This cannot be undone.",
                stats.count
            ))
            .default(false)
            .interact()?
    {
        println!("Purge cancelled.");
        return Ok(());
    }

    let removed = engine
        .purge_knowledge()
        .await
        .context("Failed to purge knowledge")?;
    println!("✓ Removed {} knowledge records", removed);
    Ok(())
}

/// Remove one imported document by the parent id shown in the status output
#[inline]
pub async fn forget_import(
    engine: &MemoryEngine,
    parent_id: &str,
    collection: Collection,
    assume_yes: bool,
) -> Result<u64> {
    let imports = engine
        .imports(collection)
        .await
        .context("Failed to read import log")?;
    let Some(import) = imports.iter().find(|import| import.parent_id == parent_id) else {
        println!("No import {} in {}.", parent_id, collection);
        return Ok(0);
    };

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Forget {} and its {} stored chunks?",
                import.source, import.records_inserted
            ))
            .default(false)
            .interact()?
    {
        println!("Nothing forgotten.");
        return Ok(0);
    }

    let removed = engine
        .forget_import(collection, parent_id)
        .await
        .with_context(|| format!("Failed to forget import {}", parent_id))?;
    println!("✓ Forgot {} ({} chunks removed)", import.source, removed);
    Ok(removed)
}

/// In-chat commands understood by the console connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Persona(String),
    Language(String),
    Forget,
    Status,
    Help,
}

impl ChatCommand {
    /// Parse a prefixed message; `None` when it is not a command
    #[inline]
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        let body = text.trim().strip_prefix(prefix)?;
        let (name, argument) = body
            .split_once(char::is_whitespace)
            .map_or((body, ""), |(name, rest)| (name, rest.trim()));

        Some(match (name.to_lowercase().as_str(), argument) {
            ("persona", arg) if !arg.is_empty() => Self::Persona(arg.to_string()),
            ("language", arg) if !arg.is_empty() => Self::Language(arg.to_string()),
            ("forget", _) => Self::Forget,
            ("status", _) => Self::Status,
            _ => Self::Help,
        })
    }
}

/// Run an in-chat command and return the text to show
#[inline]
pub async fn handle_chat_command(
    engine: &MemoryEngine,
    event: &MessageEvent,
    command: ChatCommand,
) -> Result<String> {
    let reply = match command {
        ChatCommand::Persona(persona) => {
            let settings = engine
                .update_channel_settings(
                    &event.channel,
                    ChannelSettingsUpdate {
                        persona: Some(persona),
                        language: None,
                    },
                )
                .await?;
            format!("Persona set to {}", settings.persona)
        }
        ChatCommand::Language(language) => {
            let settings = engine
                .update_channel_settings(
                    &event.channel,
                    ChannelSettingsUpdate {
                        persona: None,
                        language: Some(language),
                    },
                )
                .await?;
            format!("Language set to {}", settings.language)
        }
        ChatCommand::Forget => {
            engine
                .history()
                .clear_conversation(&event.author, &event.channel);
            "Short-term history cleared".to_string()
        }
        ChatCommand::Status => {
            let mut parts = Vec::new();
            for collection in Collection::ALL {
                let stats = engine.status(collection).await?;
                parts.push(format!("{}: {}", collection, stats.count));
            }
            parts.join(", ")
        }
        ChatCommand::Help => {
            "Commands: persona <name>, language <name>, forget, status, help".to_string()
        }
    };
    Ok(reply)
}

/// Console connector: every line typed is a message in `channel` from `author`.
///
/// Lines go through the same observe/build_context path as any platform;
/// the assembled context is printed in place of a generated reply.
#[inline]
pub async fn run_chat(
    engine: &MemoryEngine,
    command_prefix: &str,
    author: &str,
    channel: &str,
) -> Result<()> {
    println!(
        "Chatting as {} in #{}. {}help lists commands, Ctrl-D exits.",
        author, channel, command_prefix
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let event = MessageEvent::new(Platform::Console, author, channel, line);

        if let Some(command) = ChatCommand::parse(&event.text, command_prefix) {
            match handle_chat_command(engine, &event, command).await {
                Ok(reply) => println!("{}", style(reply).green()),
                Err(e) => println!("{}", style(format!("Command failed: {:#}", e)).red()),
            }
            continue;
        }

        if let Err(e) = engine.observe(&event).await {
            error!("Failed to remember message: {}", e);
        }

        let response = engine.build_context(&event).await;
        if response.degraded {
            println!("{}", style("(memory unavailable)").yellow());
        }
        if !response.context.is_empty() {
            println!("{}", style(&response.context.text).dim());
        }
        for provider in &response.provider_data {
            println!("{}", style(format!("[{}] {}", provider.provider, provider.data)).dim());
        }
    }

    info!("Console chat ended");
    Ok(())
}

use std::path::PathBuf;

use anyhow::Result;
use bot_memory::commands::{
    forget_import, import_paths, open_engine, purge_knowledge, recall_memory, remember_text,
    run_chat, show_context, show_status,
};
use bot_memory::config::{Config, run_interactive_config, show_config};
use bot_memory::database::{Collection, Scope};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bot-memory")]
#[command(about = "Long-term memory and context retrieval for chat bots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedder and memory settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk text files and store them as knowledge
    Import {
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Collection to import into
        #[arg(long, default_value = "knowledge")]
        collection: Collection,
    },
    /// Store a single piece of text
    Remember {
        text: String,
        #[arg(long, default_value = "knowledge")]
        collection: Collection,
        /// Optional source label shown alongside the memory
        #[arg(long)]
        source: Option<String>,
    },
    /// Search memory for text similar to a query
    Recall {
        query: String,
        /// Collection to search, or "all"
        #[arg(long, default_value = "all")]
        scope: Scope,
        /// Maximum number of results, defaults to the configured value
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the context a reply to a message would be built with
    Context {
        text: String,
        #[arg(long, default_value = "console")]
        author: String,
        #[arg(long, default_value = "console")]
        channel: String,
    },
    /// Show record counts and recent imports
    Status,
    /// Remove one imported document by the id listed in status
    ForgetImport {
        parent_id: String,
        #[arg(long, default_value = "knowledge")]
        collection: Collection,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Delete every knowledge record
    PurgeKnowledge {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Talk to the memory engine from the terminal
    Chat {
        #[arg(long, default_value = "console")]
        author: String,
        #[arg(long, default_value = "console")]
        channel: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load_default()?);
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Import { paths, collection } => {
            let engine = open_engine().await?;
            import_paths(&engine, &paths, collection).await?;
        }
        Commands::Remember {
            text,
            collection,
            source,
        } => {
            let engine = open_engine().await?;
            remember_text(&engine, &text, collection, source).await?;
        }
        Commands::Recall {
            query,
            scope,
            limit,
        } => {
            let config = Config::load_default()?;
            let engine = open_engine().await?;
            let limit = limit.unwrap_or(config.memory.max_results);
            recall_memory(&engine, &query, scope, limit).await?;
        }
        Commands::Context {
            text,
            author,
            channel,
        } => {
            let engine = open_engine().await?;
            show_context(&engine, &author, &channel, &text).await?;
        }
        Commands::Status => {
            let engine = open_engine().await?;
            show_status(&engine).await?;
        }
        Commands::ForgetImport {
            parent_id,
            collection,
            yes,
        } => {
            let engine = open_engine().await?;
            forget_import(&engine, &parent_id, collection, yes).await?;
        }
        Commands::PurgeKnowledge { yes } => {
            let engine = open_engine().await?;
            purge_knowledge(&engine, yes).await?;
        }
        Commands::Chat { author, channel } => {
            let config = Config::load_default()?;
            let engine = open_engine().await?;
            run_chat(&engine, &config.memory.command_prefix, &author, &channel).await?;
        }
    }

    Ok(())
}

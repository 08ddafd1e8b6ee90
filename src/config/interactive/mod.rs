
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbedderBackend, MemoryConfig, OllamaConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Bot Memory Configuration Setup").bold().cyan());
    eprintln!();

    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    let mut config = load_existing_config(&config_dir)?;

    eprintln!("{}", style("Embedding Backend").bold().yellow());
    let backends = &["ollama", "hashing (offline)"];
    let default_index = usize::from(config.embedder.backend == EmbedderBackend::Hashing);
    let backend_index = Select::new()
        .with_prompt("Embedder")
        .default(default_index)
        .items(backends)
        .interact()?;
    config.embedder.backend = if backend_index == 0 {
        EmbedderBackend::Ollama
    } else {
        EmbedderBackend::Hashing
    };

    if config.embedder.backend == EmbedderBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Ollama Configuration").bold().yellow());
        eprintln!("Configure your local Ollama instance for embedding generation.");
        eprintln!();

        configure_ollama(&mut config.ollama)?;

        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.ollama) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before storing memories.");
        }
    }

    eprintln!();
    eprintln!("{}", style("Memory Tuning").bold().yellow());
    configure_memory(&mut config.memory)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedder:").bold().yellow());
    eprintln!("  Model ID: {}", style(config.embedding_model_id()).cyan());
    eprintln!("  Dimension: {}", style(config.embedding_dimension()).cyan());
    if config.embedder.backend == EmbedderBackend::Ollama {
        match config.ollama_url() {
            Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
        }
        eprintln!(
            "  Max input tokens: {}",
            style(config.ollama.max_input_tokens).cyan()
        );
    }

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  Max chunk size: {} chars",
        style(config.chunking.max_chunk_size).cyan()
    );
    eprintln!(
        "  Overlap: {} chars",
        style(config.chunking.overlap_size).cyan()
    );

    let memory = &config.memory;
    eprintln!();
    eprintln!("{}", style("Memory:").bold().yellow());
    eprintln!(
        "  Similarity threshold: {}",
        style(memory.similarity_threshold).cyan()
    );
    eprintln!("  Dedup threshold: {}", style(memory.dedup_threshold).cyan());
    eprintln!("  Max results: {}", style(memory.max_results).cyan());
    eprintln!(
        "  Retrieval timeout: {} ms",
        style(memory.retrieval_timeout_ms).cyan()
    );
    eprintln!(
        "  Context budget: {} chars",
        style(memory.context_budget).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(dimension)?;

    Ok(())
}

fn configure_memory(memory: &mut MemoryConfig) -> Result<()> {
    let similarity: f32 = Input::new()
        .with_prompt("Retrieval similarity threshold (0.0-1.0)")
        .default(memory.similarity_threshold)
        .interact_text()?;

    let dedup: f32 = Input::new()
        .with_prompt("Deduplication threshold (0.0-1.0, keep this high)")
        .default(memory.dedup_threshold)
        .interact_text()?;

    let budget: usize = Input::new()
        .with_prompt("Context budget in characters")
        .default(memory.context_budget)
        .interact_text()?;

    memory.set_similarity_threshold(similarity)?;
    memory.set_dedup_threshold(dedup)?;
    memory.set_context_budget(budget)?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}

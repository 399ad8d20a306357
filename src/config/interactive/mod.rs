#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::settings::DEFAULT_OLLAMA_EMBEDDING_DIMENSION;
use super::{Config, ConfigError, EmbeddingBackend, EmbeddingConfig, GenerationConfig};
use crate::embeddings::local::DEFAULT_LOCAL_DIMENSION;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Smartfix Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Embedding Configuration").bold().yellow());
    eprintln!("Choose how queries and knowledge base entries are embedded.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Generation Configuration").bold().yellow());
    eprintln!("An optional local model can rephrase retrieved solutions.");
    eprintln!();

    configure_generation(&mut config.generation)?;

    eprintln!();
    configure_thresholds(&mut config)?;

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
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    let backend = match config.embedding.backend {
        EmbeddingBackend::Local => "local (offline feature hashing)",
        EmbeddingBackend::Ollama => "ollama",
    };
    eprintln!("  Backend: {}", style(backend).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    if config.embedding.backend == EmbeddingBackend::Ollama {
        eprintln!("  Model: {}", style(&config.embedding.model).cyan());
        match config.embedding.ollama_url() {
            Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
        }
    }

    eprintln!();
    eprintln!("{}", style("Generation:").bold().yellow());
    if config.generation.enabled {
        eprintln!("  Model: {}", style(&config.generation.model).cyan());
        eprintln!(
            "  Max tokens: {}",
            style(config.generation.max_tokens).cyan()
        );
        eprintln!(
            "  Timeout: {}s",
            style(config.generation.timeout_seconds).cyan()
        );
    } else {
        eprintln!("  {}", style("Disabled (retrieval-only mode)").dim());
    }

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!("  Top k: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  High confidence: {}",
        style(config.retrieval.high_confidence).cyan()
    );
    eprintln!(
        "  Low confidence: {}",
        style(config.retrieval.low_confidence).cyan()
    );
    eprintln!(
        "  Cache TTL: {}s",
        style(config.retrieval.cache_ttl_seconds).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config::default())
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let backends = &["local (offline, no services needed)", "ollama"];
    let default_index = match embedding.backend {
        EmbeddingBackend::Local => 0,
        EmbeddingBackend::Ollama => 1,
    };

    let backend_index = Select::new()
        .with_prompt("Embedding backend")
        .default(default_index)
        .items(backends)
        .interact()?;

    if backend_index == 0 {
        embedding.backend = EmbeddingBackend::Local;
        embedding.dimension = DEFAULT_LOCAL_DIMENSION;
        return Ok(());
    }

    embedding.backend = EmbeddingBackend::Ollama;
    if embedding.dimension == DEFAULT_LOCAL_DIMENSION {
        embedding.dimension = DEFAULT_OLLAMA_EMBEDDING_DIMENSION;
    }

    embedding.host = Input::new()
        .with_prompt("Ollama host")
        .default(embedding.host.clone())
        .interact_text()?;

    embedding.port = Input::new()
        .with_prompt("Ollama port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), ConfigError> {
            if *input == 0 {
                Err(ConfigError::InvalidPort(*input))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.model = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            if input.trim().is_empty() {
                Err(ConfigError::InvalidModel(input.clone()))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    embedding.dimension = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            if (16..=4096).contains(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidDimension(*input))
            }
        })
        .interact_text()?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    generation.enabled = Confirm::new()
        .with_prompt("Enable the local generative model?")
        .default(generation.enabled)
        .interact()?;

    if !generation.enabled {
        return Ok(());
    }

    generation.model = Input::new()
        .with_prompt("Generation model")
        .default(generation.model.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            if input.trim().is_empty() {
                Err(ConfigError::InvalidModel(input.clone()))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    generation.timeout_seconds = Input::new()
        .with_prompt("Generation timeout (seconds)")
        .default(generation.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), ConfigError> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidTimeout(*input))
            }
        })
        .interact_text()?;

    Ok(())
}

fn configure_thresholds(config: &mut Config) -> Result<()> {
    eprintln!("{}", style("Retrieval Thresholds").bold().yellow());

    config.retrieval.high_confidence = Input::new()
        .with_prompt("High confidence threshold (return match directly)")
        .default(config.retrieval.high_confidence)
        .validate_with(|input: &f32| -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err(ConfigError::InvalidThreshold("high_confidence", *input))
            }
        })
        .interact_text()?;

    let high = config.retrieval.high_confidence;
    config.retrieval.low_confidence = Input::new()
        .with_prompt("Low confidence threshold (below this, fall back to templates)")
        .default(config.retrieval.low_confidence)
        .validate_with(move |input: &f32| -> Result<(), ConfigError> {
            if !(0.0..=1.0).contains(input) {
                Err(ConfigError::InvalidThreshold("low_confidence", *input))
            } else if *input >= high {
                Err(ConfigError::ThresholdOrder(*input, high))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    Ok(())
}

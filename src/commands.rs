use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingBackend};
use crate::embeddings::{EmbeddingModel, HashEmbedder, OllamaEmbedder};
use crate::generation::{GenerativeModel, OllamaGenerator};
use crate::index::VectorIndex;
use crate::pipeline::{ContextTurn, Query, RetrievalPipeline, RetrievalStage};
use crate::store::KnowledgeBase;
use crate::synthesis::{AnswerSource, AnswerSynthesizer};

/// Build the vector index from a knowledge base file and persist it
#[inline]
pub async fn build_index(corpus: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let embedder = embedder_from_config(&config)?;

    info!("Building index from corpus {}", corpus.display());

    let kb = KnowledgeBase::load(&corpus).context("Failed to load knowledge base")?;
    if kb.is_empty() {
        println!("Knowledge base is empty; nothing to index.");
        return Ok(());
    }

    println!(
        "Embedding {} entries with model {}...",
        kb.len(),
        embedder.model_id()
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .context("Failed to build progress style")?,
    );
    spinner.set_message("Computing embeddings");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let entries = kb.list_entries().to_vec();
    let build_embedder = Arc::clone(&embedder);
    let index =
        tokio::task::spawn_blocking(move || VectorIndex::build(build_embedder, &entries))
            .await
            .context("Index build task failed")??;

    spinner.finish_and_clear();

    let index_path = output.unwrap_or_else(|| config.index_path());
    index.save(&index_path).context("Failed to save index")?;

    println!("✅ Index built successfully");
    println!("  Entries: {}", index.len());
    println!("  Dimension: {}", index.dimension());
    println!("  Model: {}", index.model_id());
    println!("  Saved to: {}", index_path.display());

    let by_category = kb
        .list_entries()
        .iter()
        .filter_map(|e| e.device_category.as_deref())
        .counts();
    if !by_category.is_empty() {
        println!("  Categories:");
        for (category, count) in by_category.iter().sorted() {
            println!("    {}: {}", category, count);
        }
    }

    Ok(())
}

/// Answer a single question and print the result
#[inline]
pub async fn ask(query_text: String, device: Option<String>, json_output: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let pipeline = build_pipeline(&config)?;

    let mut query = Query::new(query_text.clone());
    if let Some(device) = device {
        query = query.with_device(device);
    }

    let result = pipeline.retrieve(&query).await?;

    if json_output {
        let payload = json!({
            "query": query_text,
            "answer": result.answer.text,
            "solution_steps": result.answer.steps,
            "confidence": result.answer.confidence,
            "source": result.answer.source,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    print_answer(&result.answer.text, &result.answer.steps);
    println!();
    println!(
        "{}",
        style(format!(
            "confidence: {:.0}%  source: {}",
            result.answer.confidence * 100.0,
            result.answer.source
        ))
        .dim()
    );

    Ok(())
}

/// Interactive chat loop over the pipeline, with conversation context and
/// solution feedback
#[inline]
pub async fn chat() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let pipeline = build_pipeline(&config)?;
    let readiness = pipeline.is_ready();

    println!("{}", style("Smartfix Troubleshooting Assistant").bold().cyan());
    if readiness.model_loaded {
        println!("Running with a local generative model for enhanced answers");
    } else {
        println!("Running in retrieval-only mode (no generative model)");
    }
    if !readiness.index_loaded {
        println!(
            "{}",
            style("⚠ No index loaded; answers will be generic templates").yellow()
        );
    }
    println!("Ask a troubleshooting question ('exit' to quit, '/clear' to reset the cache)");
    println!();

    let mut history: Vec<ContextTurn> = Vec::new();

    loop {
        let input: String = Input::new().with_prompt("You").interact_text()?;
        let trimmed = input.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }
        if trimmed == "/clear" {
            pipeline.clear_cache();
            println!("{}", style("Cache cleared.").dim());
            continue;
        }

        let query = Query::new(trimmed).with_context(history.clone());
        let result = match pipeline.retrieve(&query).await {
            Ok(result) => result,
            Err(e) => {
                println!("{}", style(format!("Error: {}", e)).red());
                continue;
            }
        };

        println!();
        print_answer(&result.answer.text, &result.answer.steps);
        println!(
            "{}",
            style(format!(
                "confidence: {:.0}%  source: {}",
                result.answer.confidence * 100.0,
                result.answer.source
            ))
            .dim()
        );
        println!();

        history.push(ContextTurn {
            user: trimmed.to_string(),
            assistant: result.answer.text.clone(),
        });

        // Feedback loop: solved/unsolved counters feed back into ranking
        if result.stage != RetrievalStage::Fallback
            && result.answer.source != AnswerSource::Cache
        {
            if let Some(best) = result.candidates.first() {
                let choice = Select::new()
                    .with_prompt("Did this solve your problem?")
                    .items(&["yes", "no", "skip"])
                    .default(2)
                    .interact()?;
                match choice {
                    0 => pipeline.record_feedback(&best.entry.id, true),
                    1 => pipeline.record_feedback(&best.entry.id, false),
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// Show detailed status of the assistant's resources
#[inline]
pub fn show_status() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("📊 Smartfix Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🧠 Embedding Backend:");
    match embedder_from_config(&config) {
        Ok(embedder) => {
            println!("   Model: {}", embedder.model_id());
            println!("   Dimension: {}", embedder.dimension());
            if embedder.is_ready() {
                println!("   ✅ Ready");
            } else {
                println!("   ❌ Not reachable");
            }
        }
        Err(e) => {
            println!("   ❌ Failed to initialize: {}", e);
        }
    }

    println!();
    println!("🔍 Vector Index:");
    let index_path = config.index_path();
    if index_path.exists() {
        let loaded = embedder_from_config(&config)
            .and_then(|embedder| VectorIndex::load(&index_path, embedder).map_err(Into::into));
        match loaded {
            Ok(index) => {
                println!("   ✅ Loaded from {}", index_path.display());
                println!("   Entries: {}", index.len());
                println!("   Model: {}", index.model_id());
            }
            Err(e) => {
                println!("   ❌ Failed to load: {}", e);
                println!("   Run 'smartfix build <corpus>' to rebuild the index");
            }
        }
    } else {
        println!("   📭 No index at {}", index_path.display());
        println!("   Run 'smartfix build <corpus>' to create one");
    }

    println!();
    println!("🤖 Generative Model:");
    if config.generation.enabled {
        match OllamaGenerator::new(&config.generation) {
            Ok(generator) => {
                println!("   Model: {}", generator.model_id());
                if generator.is_ready() {
                    println!("   ✅ Ready");
                } else {
                    println!("   ⚠️  Configured but not reachable; answers fall back to retrieval");
                }
            }
            Err(e) => {
                println!("   ❌ Failed to initialize: {}", e);
            }
        }
    } else {
        println!("   💤 Disabled (retrieval-only mode)");
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'smartfix build <corpus>' to (re)build the index");
    println!("   • Use 'smartfix ask \"<question>\"' for a one-shot answer");
    println!("   • Use 'smartfix chat' for an interactive session");

    Ok(())
}

fn print_answer(text: &str, steps: &[String]) {
    println!("{}", text);
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
}

/// Construct the embedding backend selected in the configuration
fn embedder_from_config(config: &Config) -> Result<Arc<dyn EmbeddingModel>> {
    match config.embedding.backend {
        EmbeddingBackend::Local => Ok(Arc::new(HashEmbedder::new(config.embedding.dimension))),
        EmbeddingBackend::Ollama => {
            let embedder = OllamaEmbedder::new(&config.embedding)
                .context("Failed to create Ollama embedder")?;
            Ok(Arc::new(embedder))
        }
    }
}

/// Wire up the full pipeline: embedder, persisted index (if any), optional
/// generator, thresholds. A missing or unloadable index degrades to the
/// template path rather than failing.
fn build_pipeline(config: &Config) -> Result<RetrievalPipeline> {
    let embedder = embedder_from_config(config)?;

    let index = match VectorIndex::load(config.index_path(), Arc::clone(&embedder)) {
        Ok(index) => Some(Arc::new(index)),
        Err(e) => {
            warn!("Index unavailable ({}), serving template answers only", e);
            None
        }
    };

    let generator: Option<Arc<dyn GenerativeModel>> = if config.generation.enabled {
        match OllamaGenerator::new(&config.generation) {
            Ok(generator) => Some(Arc::new(generator)),
            Err(e) => {
                warn!("Generative model unavailable ({}), continuing without it", e);
                None
            }
        }
    } else {
        None
    };

    let synthesizer = AnswerSynthesizer::new(
        generator,
        config.generation.max_tokens,
        Duration::from_secs(config.generation.timeout_seconds),
    );

    Ok(RetrievalPipeline::new(index, synthesizer, config.retrieval))
}

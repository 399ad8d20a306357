// Answer synthesis module
// Turns ranked retrieval candidates into a final answer, optionally
// rewritten by a local generative model constrained to the retrieved steps


pub mod template;

pub use template::TemplateAnswerer;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generation::GenerativeModel;
use crate::pipeline::{ContextTurn, Query, RankedCandidate};
use crate::{AssistError, Result};

/// Where an answer came from, in decreasing order of specificity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Cache,
    Index,
    Llm,
    Template,
}

impl std::fmt::Display for AnswerSource {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cache => "cache",
            Self::Index => "index",
            Self::Llm => "llm",
            Self::Template => "template",
        };
        f.write_str(name)
    }
}

/// Final answer returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Natural-language answer text
    pub text: String,
    /// Remediation steps cited from the grounding solution, verbatim
    pub steps: Vec<String>,
    /// Normalized retrieval confidence in [0, 1]
    pub confidence: f32,
    pub source: AnswerSource,
}

/// Minimum token-overlap ratio for a generated step to count as a
/// rephrasing of a retrieved step rather than an invention
const GROUNDING_OVERLAP_THRESHOLD: f32 = 0.5;

/// Generated steps shorter than this many content tokens are treated as
/// connective phrasing and exempt from the overlap check
const MIN_CHECKED_STEP_TOKENS: usize = 3;

const MAX_CONTEXT_TURNS: usize = 3;

/// Rewrites retrieved solutions with an optional local generative model.
///
/// Generation is an enhancement, never a dependency: with no model
/// configured, on timeout, on failure, or when the output fails the
/// grounding check, the top candidate's solution is returned verbatim.
pub struct AnswerSynthesizer {
    generator: Option<Arc<dyn GenerativeModel>>,
    max_tokens: u32,
    timeout: Duration,
}

impl AnswerSynthesizer {
    #[inline]
    pub fn new(
        generator: Option<Arc<dyn GenerativeModel>>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            max_tokens,
            timeout,
        }
    }

    /// Whether a generative model is configured and currently loadable
    #[inline]
    pub fn model_ready(&self) -> bool {
        self.generator.as_ref().is_some_and(|g| g.is_ready())
    }

    /// Produce an answer from the ranked candidates.
    ///
    /// The top candidate grounds the answer; prior conversation turns are
    /// additional prompt context but never override the retrieved steps.
    #[inline]
    pub async fn synthesize(&self, query: &Query, candidates: &[RankedCandidate]) -> Answer {
        let Some(best) = candidates.first() else {
            // Callers route empty candidate lists to the template path;
            // answering here keeps the contract total anyway.
            return Answer {
                text: "I couldn't find any relevant solutions for your problem.".to_string(),
                steps: Vec::new(),
                confidence: 0.0,
                source: AnswerSource::Index,
            };
        };

        let Some(generator) = &self.generator else {
            debug!("No generative model configured, returning retrieved solution verbatim");
            return direct_answer(best);
        };

        if !generator.is_ready() {
            debug!("Generative model not ready, returning retrieved solution verbatim");
            return direct_answer(best);
        }

        let prompt = Self::build_prompt(query, candidates);
        match self.generate_with_timeout(Arc::clone(generator), prompt).await {
            Ok(text) => {
                if Self::is_grounded(&text, best) {
                    Answer {
                        text,
                        steps: best.entry.solution.steps.clone(),
                        confidence: best.confidence,
                        source: AnswerSource::Llm,
                    }
                } else {
                    warn!(
                        "Generated answer failed grounding check for entry {}, using verbatim solution",
                        best.entry.id
                    );
                    direct_answer(best)
                }
            }
            Err(e) => {
                warn!("Synthesis failed ({}), using verbatim solution", e);
                direct_answer(best)
            }
        }
    }

    async fn generate_with_timeout(
        &self,
        generator: Arc<dyn GenerativeModel>,
        prompt: String,
    ) -> Result<String> {
        let max_tokens = self.max_tokens;
        let timeout_secs = self.timeout.as_secs();

        // Generation is slow and blocking; run it on the blocking pool so
        // concurrent queries keep being served, and bound it with a timeout.
        let task = tokio::task::spawn_blocking(move || generator.generate(&prompt, max_tokens));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AssistError::SynthesisFailure(format!(
                "Generation task panicked: {}",
                join_error
            ))),
            Err(_) => Err(AssistError::SynthesisTimeout(timeout_secs)),
        }
    }

    fn build_prompt(query: &Query, candidates: &[RankedCandidate]) -> String {
        let mut context = String::new();
        for (i, candidate) in candidates.iter().take(3).enumerate() {
            let entry = &candidate.entry;
            context.push_str(&format!("\n### Doc {}\n", i + 1));
            context.push_str(&format!("Problem: {}\n", entry.problem_text));
            if let Some(category) = &entry.device_category {
                context.push_str(&format!("Device: {}\n", category));
            }
            if let Some(symptoms) = &entry.symptoms {
                context.push_str(&format!("Symptoms: {}\n", symptoms));
            }
            if !entry.error_codes.is_empty() {
                context.push_str(&format!("Error codes: {}\n", entry.error_codes.join(", ")));
            }
            context.push_str("Steps:\n");
            for (j, step) in entry.solution.steps.iter().enumerate() {
                context.push_str(&format!("{}. {}\n", j + 1, step));
            }
        }

        let history = Self::format_history(&query.context);

        format!(
            "You are a technical troubleshooting assistant. Use ONLY the information in the \
             CONTEXT section to help solve the user's problem. Do not invent steps that are not \
             listed in the context.\n\
             {history}\n\
             CONTEXT:\n{context}\n\
             User issue: {query}\n\n\
             Respond with a friendly, concise answer that walks through the numbered steps.",
            history = history,
            context = context,
            query = query.text,
        )
    }

    fn format_history(turns: &[ContextTurn]) -> String {
        if turns.is_empty() {
            return String::new();
        }

        let mut history = String::from("\nPrevious conversation:\n");
        let start = turns.len().saturating_sub(MAX_CONTEXT_TURNS);
        for turn in &turns[start..] {
            history.push_str(&format!("User: {}\n", turn.user));
            history.push_str(&format!("Assistant: {}\n", turn.assistant));
        }
        history
    }

    /// Check that every step-like line in the generated text traces back to
    /// the grounding candidate's solution. Short connective lines pass; a
    /// substantive line passes when enough of its content tokens appear in
    /// some retrieved step (or the problem summary).
    fn is_grounded(generated: &str, candidate: &RankedCandidate) -> bool {
        let mut source_token_sets: Vec<Vec<String>> = candidate
            .entry
            .solution
            .steps
            .iter()
            .map(|s| content_tokens(s))
            .collect();
        source_token_sets.push(content_tokens(&candidate.entry.solution.summary));
        source_token_sets.push(content_tokens(&candidate.entry.problem_text));

        for line in extract_step_lines(generated) {
            let tokens = content_tokens(&line);
            if tokens.len() < MIN_CHECKED_STEP_TOKENS {
                continue;
            }

            let grounded = source_token_sets.iter().any(|source| {
                let matched = tokens.iter().filter(|t| source.contains(*t)).count();
                matched as f32 / tokens.len() as f32 >= GROUNDING_OVERLAP_THRESHOLD
            });

            if !grounded {
                debug!("Ungrounded generated step: {}", line);
                return false;
            }
        }

        true
    }
}

/// The retrieved solution formatted without any generation. Used for the
/// high-confidence direct path and as the fallback whenever generation is
/// absent, fails, or produces ungrounded output.
#[inline]
pub fn direct_answer(candidate: &RankedCandidate) -> Answer {
    let entry = &candidate.entry;
    let mut text = format!(
        "I've found a solution for your issue: {}.",
        entry.solution.summary
    );
    if let Some(symptoms) = &entry.symptoms {
        text.push_str(&format!("\nCommon symptoms: {}", symptoms));
    }
    text.push_str("\nHere are the recommended steps to fix it:");

    Answer {
        text,
        steps: entry.solution.steps.clone(),
        confidence: candidate.confidence,
        source: AnswerSource::Index,
    }
}

/// Lines of the generated text that look like remediation steps
/// (numbered or bulleted)
fn extract_step_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let rest = trimmed
                .strip_prefix('-')
                .or_else(|| trimmed.strip_prefix('*'))
                .or_else(|| {
                    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
                    if digits > 0 {
                        trimmed
                            .get(digits..)
                            .and_then(|r| r.strip_prefix('.').or_else(|| r.strip_prefix(')')))
                    } else {
                        None
                    }
                })?;
            let step = rest.trim();
            if step.is_empty() {
                None
            } else {
                Some(step.to_string())
            }
        })
        .collect()
}

fn content_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(ToString::to_string)
        .collect()
}

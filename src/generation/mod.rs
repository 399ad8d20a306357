// Generation module
// Optional local generative model used to rewrite retrieved solutions.
// Absence of a generator is a normal, expected condition, not an error.

pub mod ollama;

pub use ollama::OllamaGenerator;

use crate::Result;

/// A local text-generation backend. The synthesizer checks `is_ready()`
/// before invoking and falls back to verbatim retrieval on any failure, so
/// implementations should fail fast rather than retry aggressively.
pub trait GenerativeModel: Send + Sync {
    /// Versioned identifier of the underlying model
    fn model_id(&self) -> String;

    /// Generate a completion for the prompt, bounded by `max_tokens`
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;

    /// Whether the backend can currently serve generate calls
    fn is_ready(&self) -> bool;
}

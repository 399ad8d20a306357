
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::GenerationConfig;
use crate::generation::GenerativeModel;
use crate::{AssistError, Result};

/// Text generation backend served by a local Ollama instance.
///
/// Unlike the embedding client this does not retry: generation calls are
/// slow, the synthesizer applies its own timeout, and a failed call falls
/// back to the verbatim retrieved solution anyway.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    base_url: Url,
    model: String,
    temperature: f32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| AssistError::Config(format!("Invalid generation URL: {}", e)))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            agent,
        })
    }
}

impl GenerativeModel for OllamaGenerator {
    #[inline]
    fn model_id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    #[inline]
    fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        debug!(
            "Generating completion with {} (prompt length: {}, max tokens: {})",
            self.model,
            prompt.len(),
            max_tokens
        );

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerateOptions {
                num_predict: max_tokens,
                temperature: self.temperature,
            },
        };

        let url = self.base_url.join("/api/generate").map_err(|e| {
            AssistError::SynthesisFailure(format!("Failed to build generate URL: {}", e))
        })?;

        let request_json = serde_json::to_string(&request).map_err(|e| {
            AssistError::SynthesisFailure(format!("Failed to serialize generate request: {}", e))
        })?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| {
                warn!("Generation request failed: {}", e);
                AssistError::SynthesisFailure(format!("Generation request failed: {}", e))
            })?;

        let response: GenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            AssistError::SynthesisFailure(format!("Failed to parse generate response: {}", e))
        })?;

        debug!("Generated {} characters", response.response.len());
        Ok(response.response.trim().to_string())
    }

    #[inline]
    fn is_ready(&self) -> bool {
        let Ok(url) = self.base_url.join("/api/tags") else {
            return false;
        };

        let listed = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .ok()
            .and_then(|text| serde_json::from_str::<ModelsResponse>(&text).ok());

        match listed {
            Some(tags) => tags.models.iter().any(|m| m.name == self.model),
            None => false,
        }
    }
}

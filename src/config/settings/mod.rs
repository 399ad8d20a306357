
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::local::DEFAULT_LOCAL_DIMENSION;

pub const DEFAULT_OLLAMA_EMBEDDING_DIMENSION: usize = 768;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Which embedding backend produces index and query vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Built-in feature-hashed embedder; works fully offline
    Local,
    /// Ollama embedding endpoint
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Local,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            dimension: DEFAULT_LOCAL_DIMENSION,
        }
    }
}

impl EmbeddingConfig {
    /// Defaults suitable for the Ollama backend
    #[inline]
    pub fn default_ollama() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            dimension: DEFAULT_OLLAMA_EMBEDDING_DIMENSION,
            ..Self::default()
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        self.ollama_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(16..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidDimension(self.dimension));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// When false the synthesizer never invokes a model; retrieval results
    /// are returned verbatim
    pub enabled: bool,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: false,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "llama3:8b".to_string(),
            max_tokens: 512,
            timeout_seconds: 30,
            temperature: 0.2,
        }
    }
}

impl GenerationConfig {
    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.max_tokens == 0 || self.max_tokens > 8192 {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        if self.timeout_seconds == 0 || self.timeout_seconds > 600 {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }
}

/// Tunable thresholds of the decision policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates fetched per search
    pub top_k: usize,
    /// At or above: return the retrieved solution directly
    pub high_confidence: f32,
    /// Between low and high: hand candidates to the synthesizer.
    /// Below low: template fallback.
    pub low_confidence: f32,
    /// Distance at which confidence reaches zero
    pub distance_ceiling: f32,
    pub cache_ttl_seconds: u64,
    /// Confidence assigned to template answers; low but never zero
    pub fallback_confidence: f32,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 5,
            high_confidence: 0.75,
            low_confidence: 0.35,
            distance_ceiling: 1.0,
            cache_ttl_seconds: 1800,
            fallback_confidence: 0.1,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > 100 {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        for (name, value) in [
            ("high_confidence", self.high_confidence),
            ("low_confidence", self.low_confidence),
            ("fallback_confidence", self.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold(name, value));
            }
        }

        if self.low_confidence >= self.high_confidence {
            return Err(ConfigError::ThresholdOrder(
                self.low_confidence,
                self.high_confidence,
            ));
        }

        if self.distance_ceiling <= 0.0 || self.distance_ceiling > 2.0 {
            return Err(ConfigError::InvalidDistanceCeiling(self.distance_ceiling));
        }

        if self.cache_ttl_seconds == 0 || self.cache_ttl_seconds > 86_400 {
            return Err(ConfigError::InvalidCacheTtl(self.cache_ttl_seconds));
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 16 and 4096)")]
    InvalidDimension(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid {0}: {1} (must be between 0.0 and 1.0)")]
    InvalidThreshold(&'static str, f32),
    #[error("low_confidence ({0}) must be below high_confidence ({1})")]
    ThresholdOrder(f32, f32),
    #[error("Invalid distance ceiling: {0} (must be in (0.0, 2.0])")]
    InvalidDistanceCeiling(f32),
    #[error("Invalid cache TTL: {0} (must be between 1 and 86400 seconds)")]
    InvalidCacheTtl(u64),
    #[error("Invalid generation timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid max tokens: {0} (must be between 1 and 8192)")]
    InvalidMaxTokens(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Config {
    /// The default configuration directory
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("smartfix"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load configuration from the default directory
    #[inline]
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_dir()?)
    }

    /// Load configuration from an explicit directory. A missing file yields
    /// defaults bound to that directory.
    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.generation.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Where the persisted vector index lives
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.json")
    }
}

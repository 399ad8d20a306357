use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistError>;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Synthesis timed out after {0}s")]
    SynthesisTimeout(u64),

    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod store;
pub mod synthesis;

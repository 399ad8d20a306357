use super::load_existing_config as load_existing_config_impl;
use super::*;

#[test]
fn load_existing_config() {
    let config = load_existing_config_impl().expect("config loaded successfully");
    assert!(!config.embedding.host.is_empty());
    assert!(config.embedding.port > 0);
    assert!(config.embedding.dimension >= 16);
    assert!(config.retrieval.low_confidence < config.retrieval.high_confidence);
}

#[test]
fn local_backend_uses_local_dimension_default() {
    let config = Config::default();
    assert_eq!(config.embedding.backend, EmbeddingBackend::Local);
    assert_eq!(config.embedding.dimension, DEFAULT_LOCAL_DIMENSION);
}

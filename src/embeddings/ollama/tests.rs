use super::*;
use crate::config::{EmbeddingBackend, EmbeddingConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, dimension: usize) -> EmbeddingConfig {
    let url = Url::parse(&server.uri()).expect("mock server uri should parse");
    EmbeddingConfig {
        backend: EmbeddingBackend::Ollama,
        protocol: url.scheme().to_string(),
        host: url.host_str().expect("should have host").to_string(),
        port: url.port().expect("should have port"),
        model: "nomic-embed-text:latest".to_string(),
        dimension,
    }
}

#[test]
fn client_configuration() {
    let config = EmbeddingConfig {
        backend: EmbeddingBackend::Ollama,
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        dimension: 768,
    };
    let embedder = OllamaEmbedder::new(&config).expect("should create embedder");

    assert_eq!(embedder.model, "test-model");
    assert_eq!(embedder.dimension(), 768);
    assert_eq!(embedder.base_url.host_str(), Some("test-host"));
    assert_eq!(embedder.base_url.port(), Some(1234));
    assert_eq!(embedder.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn builder_methods() {
    let config = EmbeddingConfig::default_ollama();
    let embedder = OllamaEmbedder::new(&config)
        .expect("should create embedder")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(embedder.retry_attempts, 5);
}

#[test]
fn model_id_includes_model_name() {
    let config = EmbeddingConfig::default_ollama();
    let embedder = OllamaEmbedder::new(&config).expect("should create embedder");
    assert_eq!(embedder.model_id(), format!("ollama:{}", config.model));
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_parses_and_normalizes_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text:latest"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [3.0, 4.0, 0.0]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, 3);
    let embedder = OllamaEmbedder::new(&config).expect("should create embedder");

    let vector = tokio::task::spawn_blocking(move || embedder.embed("wifi down"))
        .await
        .expect("task should join")
        .expect("embed should succeed");

    assert_eq!(vector.len(), 3);
    // [3,4,0] normalized is [0.6, 0.8, 0.0]
    assert!((vector[0] - 0.6).abs() < 1e-6);
    assert!((vector[1] - 0.8).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_rejects_dimension_mismatch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [1.0, 2.0]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, 5);
    let embedder = OllamaEmbedder::new(&config).expect("should create embedder");

    let result = tokio::task::spawn_blocking(move || embedder.embed("query"))
        .await
        .expect("task should join");

    assert!(matches!(result, Err(AssistError::Embedding(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, 3);
    let embedder = OllamaEmbedder::new(&config)
        .expect("should create embedder")
        .with_retry_attempts(3);

    let result = tokio::task::spawn_blocking(move || embedder.embed("query"))
        .await
        .expect("task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_checks_availability() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "nomic-embed-text:latest", "size": 274302450, "digest": "abc123"}
            ]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, 768);
    let embedder = OllamaEmbedder::new(&config).expect("should create embedder");

    let result = tokio::task::spawn_blocking(move || embedder.validate_model())
        .await
        .expect("task should join");

    assert!(result.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn validate_model_fails_for_missing_model() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "some-other-model"}]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server, 768);
    let embedder = OllamaEmbedder::new(&config).expect("should create embedder");

    let result = tokio::task::spawn_blocking(move || embedder.validate_model())
        .await
        .expect("task should join");

    assert!(matches!(result, Err(AssistError::Embedding(_))));
}

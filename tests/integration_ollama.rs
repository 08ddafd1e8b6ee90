#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama-backed engine tests. The mock server tests always run; the ones
// against a local Ollama instance are ignored by default.
// Run those with: cargo test --test integration_ollama -- --ignored

use std::env;
use std::path::Path;
use std::time::Duration;

use bot_memory::config::{Config, EmbedderBackend, OllamaConfig};
use bot_memory::database::{Collection, RecordMetadata, Scope};
use bot_memory::embeddings::{Embedder, OllamaClient};
use bot_memory::engine::{MemoryEngine, RememberOutcome};
use bot_memory::session::{MessageEvent, Platform};
use serde_json::json;
use tempfile::TempDir;
use tracing::info;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MOCK_DIMENSION: usize = 8;
const TEST_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

fn axis(index: usize) -> Vec<f32> {
    let mut vector = vec![0.0; MOCK_DIMENSION];
    vector[index] = 1.0;
    vector
}

fn ollama_config(dir: &Path, server: &MockServer) -> Config {
    let address = server.address();
    Config {
        base_dir: dir.to_path_buf(),
        ollama: OllamaConfig {
            host: address.ip().to_string(),
            port: address.port(),
            model: "mock-embed".to_string(),
            embedding_dimension: MOCK_DIMENSION as u32,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

/// Texts mentioning tyres map to one axis, weather to another
async fn mount_topic_embeddings(server: &MockServer) {
    for (topic, index) in [("tyres", 0), ("weather", 1)] {
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_string_contains(topic))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [axis(index)] })),
            )
            .with_priority(1)
            .mount(server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [axis(7)] })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_remembers_and_recalls_through_ollama() {
    init_test_tracing();

    let server = MockServer::start().await;
    mount_topic_embeddings(&server).await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = ollama_config(temp_dir.path(), &server);
    assert_eq!(config.embedder.backend, EmbedderBackend::Ollama);

    let engine = MemoryEngine::open(&config).await.expect("should open engine");
    assert_eq!(engine.embedder().model_id(), "ollama:mock-embed");

    for text in ["soft tyres wear quickly", "the weather turns wet later"] {
        let outcome = engine
            .remember(text, Collection::Knowledge, RecordMetadata::default())
            .await
            .expect("should remember");
        assert!(matches!(outcome, RememberOutcome::Stored(_)));
    }

    let duplicate = engine
        .remember(
            "tyres degrade fast in the heat",
            Collection::Knowledge,
            RecordMetadata::default(),
        )
        .await
        .expect("should remember");
    assert!(matches!(duplicate, RememberOutcome::Suppressed { .. }));

    let results = engine
        .recall("how long do the tyres last", Scope::All, 5)
        .await
        .expect("should recall");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.text, "soft tyres wear quickly");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_model_degrades_replies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let engine = MemoryEngine::open(&ollama_config(temp_dir.path(), &server))
        .await
        .expect("should open engine");

    let event = MessageEvent::new(Platform::Discord, "alice", "general", "anyone there");
    let outcome = engine.observe(&event).await.expect("observe should degrade");
    assert_eq!(outcome, None);

    let response = engine.build_context(&event).await;
    assert!(response.degraded);
    assert_eq!(response.settings.language, "english");

    let recall = engine.recall("anyone there", Scope::All, 5).await;
    assert!(recall.is_err(), "embedding failures are reported to callers");
}

fn local_ollama_client() -> OllamaClient {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    let config = OllamaConfig {
        host,
        port,
        model,
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60)) // Longer timeout for model loading
        .with_retry_attempts(3)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_health_check() {
    init_test_tracing();

    let client = local_ollama_client();
    info!("Testing health check against real Ollama instance");
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_embedding_is_deterministic() {
    init_test_tracing();

    let client = local_ollama_client();
    let text = "The safety car leaves the track at the end of this lap.";

    let first = client.embed(text).await.expect("embedding should succeed");
    let second = client.embed(text).await.expect("embedding should succeed");

    assert_eq!(first.len(), client.dimension());
    assert_eq!(first, second);
    info!("Generated embedding with {} dimensions", first.len());
}

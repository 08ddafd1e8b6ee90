#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests of the memory engine over an on-disk store

use std::path::Path;

use bot_memory::MemoryError;
use bot_memory::config::{Config, EmbedderBackend};
use bot_memory::database::{Collection, Scope};
use bot_memory::engine::MemoryEngine;
use bot_memory::session::{MessageEvent, Platform};
use tempfile::TempDir;

fn hashing_config(dir: &Path, dimension: u32) -> Config {
    let mut config = Config {
        base_dir: dir.to_path_buf(),
        ..Config::default()
    };
    config.embedder.backend = EmbedderBackend::Hashing;
    config.embedder.hashing_dimension = dimension;
    config.chunking.max_chunk_size = 200;
    config.chunking.overlap_size = 30;
    config
}

const HANDBOOK: &str = "\
Every team brings two cars to each race weekend. The cars must pass scrutineering before practice.

Practice sessions run on Friday. Teams test set-up changes and long run pace on different compounds.

Qualifying on Saturday sets the grid. The slowest cars are eliminated after each of the three parts.

Points go to the top ten finishers on Sunday. An extra point is sometimes awarded for the fastest lap.
";

#[tokio::test]
async fn imported_knowledge_survives_restart() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let handbook = temp_dir.path().join("handbook.md");
    std::fs::write(&handbook, HANDBOOK).expect("should write handbook");
    let config = hashing_config(temp_dir.path(), 256);

    let report = {
        let engine = MemoryEngine::open(&config).await.expect("should open engine");
        engine
            .import_file(&handbook, Collection::Knowledge)
            .await
            .expect("should import")
    };
    assert!(report.chunks_created >= 2);

    let engine = MemoryEngine::open(&config).await.expect("should reopen engine");
    let stats = engine
        .status(Collection::Knowledge)
        .await
        .expect("should read stats");
    assert_eq!(stats.count, report.records_inserted as u64);

    let results = engine
        .recall("points go to the top ten finishers on Sunday", Scope::All, 3)
        .await
        .expect("should recall");
    assert!(!results.is_empty());
    assert!(results[0].record.text.contains("Points go to the top ten"));

    let imports = engine
        .imports(Collection::Knowledge)
        .await
        .expect("should list imports");
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].parent_id, report.parent_id);
}

#[tokio::test]
async fn changing_the_embedder_refuses_to_open() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    {
        let engine = MemoryEngine::open(&hashing_config(temp_dir.path(), 64))
            .await
            .expect("should open engine");
        engine
            .observe(&MessageEvent::new(
                Platform::Discord,
                "alice",
                "general",
                "the first thing ever remembered",
            ))
            .await
            .expect("should observe");
    }

    let result = MemoryEngine::open(&hashing_config(temp_dir.path(), 128)).await;
    assert!(matches!(result, Err(MemoryError::Configuration(_))));
}

#[tokio::test]
async fn channel_context_and_settings_flow_into_replies() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = hashing_config(temp_dir.path(), 256);
    let engine = MemoryEngine::open(&config).await.expect("should open engine");

    engine
        .update_channel_settings(
            "paddock",
            bot_memory::database::sqlite::models::ChannelSettingsUpdate {
                persona: Some("race engineer".to_string()),
                language: Some("german".to_string()),
            },
        )
        .await
        .expect("should update settings");

    let bob = MessageEvent::new(Platform::Twitch, "bob", "paddock", "box this lap for mediums");
    engine.observe(&bob).await.expect("should observe");

    let alice = MessageEvent::new(
        Platform::Discord,
        "alice",
        "paddock",
        "should we pit now or stay out",
    );
    engine.observe(&alice).await.expect("should observe");

    let response = engine.build_context(&alice).await;
    assert!(!response.degraded);
    assert_eq!(response.settings.persona, "race engineer");
    assert_eq!(response.settings.language, "german");
    assert_eq!(response.context.channel_used, 1);
    assert!(response.context.text.contains("bob: box this lap for mediums"));
    assert!(!response.context.text.contains("should we pit now"));

    engine
        .record_reply(&alice, "Stay out, the tyres have five more laps")
        .await
        .expect("should record reply");
    let stats = engine
        .status(Collection::Conversation)
        .await
        .expect("should read stats");
    assert_eq!(stats.count, 3);

    // settings live in the store, not in the process
    drop(engine);
    let engine = MemoryEngine::open(&config).await.expect("should reopen engine");
    let settings = engine
        .channel_settings("paddock")
        .await
        .expect("should read settings");
    assert_eq!(settings.persona, "race engineer");
}

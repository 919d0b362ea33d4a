mod support;

use memtier::models::{ForcedRelationship, CATEGORY_CORE_MEMORIES, NO_RELATIONAL_ROW};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{classify_body, completion_body, significance_body, Harness};

/// Routes every chat completion through one response regardless of prompt
/// content; used for scenarios where every `analyzer` call in the save path
/// should see the same classification.
async fn mock_chat_once(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A procedural memory always discards from the relational store and never
/// enters short-memory, but is still stored in the vector and graph stores.
#[tokio::test]
async fn s1_procedural_memory_discards_from_relational() {
    let server = MockServer::start().await;
    mock_chat_once(&server, completion_body(&classify_body("procedural"))).await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    let receipt = harness
        .pipeline
        .save("notes", "How to deploy", "Run the deploy script, then verify health.", &[])
        .await
        .expect("save");

    assert_eq!(receipt.memory_id, NO_RELATIONAL_ROW);
    assert!(!receipt.kept_in_relational);
    assert!(!receipt.in_short_memory);
    assert!(receipt.stored_in_vector);
    assert!(receipt.stored_in_graph);

    assert!(harness
        .relational
        .get_by_id(NO_RELATIONAL_ROW)
        .await
        .expect("get_by_id")
        .is_none());
}

/// The reserved `core_memories` category always keeps its row and is always
/// added to short-memory (Path A), independent of classification.
#[tokio::test]
async fn s2_core_memory_is_always_kept() {
    let server = MockServer::start().await;
    mock_chat_once(&server, completion_body(&classify_body("factual"))).await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    let receipt = harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Anniversary", "We started this project a year ago today.", &[])
        .await
        .expect("save");

    assert!(receipt.kept_in_relational);
    assert!(receipt.memory_id > 0);
    assert!(receipt.in_short_memory);

    let rows = harness
        .relational
        .by_category(CATEGORY_CORE_MEMORIES, 10)
        .await
        .expect("by_category");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, receipt.memory_id);
}

/// A non-significant experience is discarded from the relational store but
/// lands in short-memory so it can still be recalled for a while.
#[tokio::test]
async fn s3_non_significant_experience_goes_to_short_memory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_string_contains("memory_type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&classify_body("experience"))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_string_contains("significant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&significance_body(false, "routine update"))))
        .mount(&server)
        .await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    let receipt = harness
        .pipeline
        .save("journal", "Tuesday stand-up", "Nothing unusual happened at today's stand-up.", &[])
        .await
        .expect("save");

    assert!(!receipt.kept_in_relational);
    assert!(receipt.in_short_memory);
    assert_eq!(receipt.memory_id, NO_RELATIONAL_ROW);
    assert!(receipt.significance_reason.is_some());

    let short = harness.relational.list_short_memory(10).await.expect("list_short_memory");
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].topic, "Tuesday stand-up");
}

/// Short-memory is a FIFO cache capped at the configured capacity; saving
/// past the cap evicts the oldest entries first.
#[tokio::test]
async fn s4_short_memory_evicts_oldest_past_capacity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_string_contains("memory_type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&classify_body("humor"))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_string_contains("significant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&significance_body(false, "just a pun"))))
        .mount(&server)
        .await;

    let harness = Harness::build(Some(server.uri()), 10).await;

    for i in 0..11 {
        harness
            .pipeline
            .save("jokes", &format!("pun #{i}"), &format!("Why did the memory bank run out? Reason {i}."), &[])
            .await
            .expect("save");
    }

    let short = harness.relational.list_short_memory(20).await.expect("list_short_memory");
    assert_eq!(short.len(), 10);
    assert!(short.iter().all(|m| m.topic != "pun #0"));
    assert!(short.iter().any(|m| m.topic == "pun #10"));
}

/// `force_relationships` links are created alongside the discovered ones and
/// creating the same edge twice does not duplicate it (idempotent upsert).
#[tokio::test]
async fn forced_relationship_creation_is_idempotent() {
    let server = MockServer::start().await;
    mock_chat_once(&server, completion_body(&classify_body("factual"))).await;

    let harness = Harness::build(Some(server.uri()), 10).await;

    let first = harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Origin story", "The project began as a weekend hack.", &[])
        .await
        .expect("save first");

    let forced = ForcedRelationship {
        target_memory_id: first.memory_id,
        edge_type: memtier::models::GraphEdgeType::RelatedTo,
        strength: Some(0.9),
    };

    let second = harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Follow-up", "We revisited the origin story a year later.", std::slice::from_ref(&forced))
        .await
        .expect("save second");
    let third = harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Follow-up again", "We revisited it once more.", std::slice::from_ref(&forced))
        .await
        .expect("save third");

    assert!(second.stored_in_graph);
    assert!(third.stored_in_graph);

    let stats = harness.pipeline.graph_stats().await.expect("graph_stats");
    assert!(stats.total_nodes >= 3);
}

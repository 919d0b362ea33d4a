mod support;

use memtier::models::{MemoryType, CATEGORY_CORE_MEMORIES};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{classify_body, completion_body, Harness};

/// With no LLM configured, `save` still succeeds: classification degrades to
/// `factual` (always discarded from relational) rather than failing the call.
#[tokio::test]
async fn save_degrades_to_factual_fallback_without_llm() {
    let harness = Harness::build(None, 10).await;
    let receipt = harness
        .pipeline
        .save("notes", "Unclassified note", "Some content with no model available to classify it.", &[])
        .await
        .expect("save");

    assert_eq!(receipt.memory_type, MemoryType::Factual);
    assert!(!receipt.kept_in_relational);
    assert!(!receipt.in_short_memory);
}

/// `search_intelligent(rerank=true)` returns a reranked list whose length
/// matches the combined results, without failing when the embedder and
/// relevance ordering disagree on exact scores.
#[tokio::test]
async fn reranked_search_preserves_result_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&classify_body("factual"))))
        .mount(&server)
        .await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Rust ownership", "Ownership and borrowing are Rust's core memory safety rules.", &[])
        .await
        .expect("save first");
    harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Garbage collection", "Garbage collected languages trace reachability at runtime.", &[])
        .await
        .expect("save second");

    let result = harness
        .pipeline
        .search_intelligent("Rust ownership and borrowing rules", &[], true, None)
        .await;

    assert!(result.success);
    let reranked = result.reranked_results.expect("rerank should have run");
    assert_eq!(reranked.len(), result.combined_results.len());
    assert!(reranked[0].rerank_score >= reranked.last().unwrap().rerank_score);
}

/// `by_category` and `list_categories` reflect every `core_memories` save
/// made through the pipeline, in addition to the dedicated category row.
#[tokio::test]
async fn by_category_and_list_categories_track_core_saves() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&classify_body("factual"))))
        .mount(&server)
        .await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    for topic in ["First", "Second", "Third"] {
        harness
            .pipeline
            .save(CATEGORY_CORE_MEMORIES, topic, &format!("{topic} core memory content."), &[])
            .await
            .expect("save");
    }

    let rows = harness
        .relational
        .by_category(CATEGORY_CORE_MEMORIES, 10)
        .await
        .expect("by_category");
    assert_eq!(rows.len(), 3);

    let categories = harness.relational.list_categories().await.expect("list_categories");
    let core_count = categories
        .iter()
        .find(|(name, _)| name == CATEGORY_CORE_MEMORIES)
        .map(|(_, count)| *count);
    assert_eq!(core_count, Some(3));
}

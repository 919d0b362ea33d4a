mod support;

use memtier::models::{SearchStrategy, CATEGORY_CORE_MEMORIES};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{classify_body, completion_body, Harness};

async fn mock_factual_classification(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&classify_body("factual"))))
        .mount(server)
        .await;
}

/// When the relational store returns nothing for a query but the vector
/// store has a match, `search_intelligent` degrades to `VectorOnly` and
/// still surfaces the vector hit.
#[tokio::test]
async fn s5_adaptive_search_falls_back_to_vector_only() {
    let server = MockServer::start().await;
    mock_factual_classification(&server).await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    harness
        .pipeline
        .save(
            "research",
            "Photosynthesis overview",
            "Plants convert sunlight into chemical energy through photosynthesis.",
            &[],
        )
        .await
        .expect("save");

    let result = harness
        .pipeline
        .search_intelligent("photosynthesis sunlight energy", &[], false, None)
        .await;

    assert!(result.success);
    assert_eq!(result.search_strategy, Some(SearchStrategy::VectorOnly));
    assert!(!result.combined_results.is_empty());
}

/// Two `core_memories` saves sharing vocabulary should link in the graph;
/// searching for the second surfaces the first as a graph-enhanced neighbor.
#[tokio::test]
async fn s6_search_with_graph_surfaces_related_neighbor() {
    let server = MockServer::start().await;
    mock_factual_classification(&server).await;

    let harness = Harness::build(Some(server.uri()), 10).await;

    let first = harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Kickoff meeting", "We held the project kickoff meeting on a Monday.", &[])
        .await
        .expect("save first");

    let second = harness
        .pipeline
        .save(CATEGORY_CORE_MEMORIES, "Kickoff follow-up", "We followed up on the project kickoff meeting decisions.", &[])
        .await
        .expect("save second");

    let result = harness
        .pipeline
        .search_with_graph("kickoff meeting decisions", &[], true, 2)
        .await;

    assert!(result.success);
    assert!(result.combined_results.iter().any(|r| r.memory.id == second.memory_id));

    let has_graph_neighbor = result
        .combined_results
        .iter()
        .any(|r| r.graph_enhanced && r.memory.id == first.memory_id);
    assert!(has_graph_neighbor, "expected the first save to surface as a graph-enhanced neighbor");
}

/// A significant experience is kept in the relational store instead of being
/// routed to short-memory, mirroring S3's non-significant counterpart.
#[tokio::test]
async fn significant_experience_is_kept_in_relational() {
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
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(&support::significance_body(
            true,
            "first time we shipped to production together",
        ))))
        .mount(&server)
        .await;

    let harness = Harness::build(Some(server.uri()), 10).await;
    let receipt = harness
        .pipeline
        .save("milestones", "First production deploy", "We shipped to production together for the first time today.", &[])
        .await
        .expect("save");

    assert!(receipt.kept_in_relational);
    assert!(!receipt.in_short_memory);
    assert!(receipt.memory_id > 0);
    assert_eq!(receipt.significance_reason.as_deref(), Some("first time we shipped to production together"));
}

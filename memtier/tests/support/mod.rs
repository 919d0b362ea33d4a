use std::sync::Arc;

use memtier::analyzer::SemanticAnalyzer;
use memtier::config::{EmbeddingsConfig, GraphConfig, LlmConfig, RelationalBackendKind, RelationalConfig, VectorConfig};
use memtier::db::{EmbeddedBackend, RelationalStore};
use memtier::embeddings::EmbeddingProvider;
use memtier::graph::GraphStore;
use memtier::llm::LlmProvider;
use memtier::pipeline::Pipeline;
use memtier::vector::VectorStore;

/// A fully-wired pipeline backed by tempfile-scoped embedded stores and a
/// mocked chat endpoint. Each harness owns its own `TempDir`; every path
/// derived from it is unique per test, so two harnesses never collide in
/// the process-wide connection pool registry even when tests run in
/// parallel.
pub struct Harness {
    pub pipeline: Pipeline,
    pub relational: Arc<dyn RelationalStore>,
    _dir: tempfile::TempDir,
}

/// Dimensions for the local embedder used throughout the suite. Matches
/// `BAAI/bge-small-en-v1.5`'s native output size.
pub const EMBED_DIMENSIONS: usize = 384;

impl Harness {
    /// Builds a harness whose LLM calls are routed to `mock_base_url`
    /// (typically a `wiremock::MockServer::uri()`). Pass `None` to leave
    /// the LLM unconfigured, exercising the documented no-LLM fallbacks.
    pub async fn build(mock_base_url: Option<String>, short_memory_capacity: u32) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");

        let relational_config = RelationalConfig {
            backend: RelationalBackendKind::Embedded,
            embedded_db_path: dir.path().join("relational.db").to_string_lossy().into_owned(),
            db_host: String::new(),
            db_port: 0,
            db_name: String::new(),
            db_user: String::new(),
            db_password: String::new(),
            db_max_conn: 1,
            db_idle_ms: 0,
            db_conn_timeout_ms: 0,
        };
        let relational: Arc<dyn RelationalStore> = Arc::new(
            EmbeddedBackend::new(&relational_config, short_memory_capacity)
                .await
                .expect("embedded backend"),
        );

        let embeddings_config = EmbeddingsConfig {
            model: "BAAI/bge-small-en-v1.5".to_string(),
            dimensions: EMBED_DIMENSIONS,
            batch_size: 32,
            openai_api_key: None,
        };
        let embedder = Arc::new(EmbeddingProvider::new(&embeddings_config).expect("embedding provider"));

        let vector_config = VectorConfig {
            url: dir.path().join("vector.db").to_string_lossy().into_owned(),
            collection: "test-memories".to_string(),
        };
        let vector = Arc::new(
            VectorStore::new(&vector_config, embedder.dimensions())
                .await
                .expect("vector store"),
        );

        let graph_config = GraphConfig {
            url: dir.path().join("graph.db").to_string_lossy().into_owned(),
            user: None,
            password: None,
            db: None,
        };
        let graph = Arc::new(GraphStore::new(&graph_config).await.expect("graph store"));

        let llm_config = mock_base_url.map(|base_url| LlmConfig {
            model: "test-model".to_string(),
            api_key: None,
            base_url: Some(base_url),
            timeout_secs: 5,
            max_retries: 0,
        });
        let llm = LlmProvider::new(llm_config.as_ref());
        let analyzer = Arc::new(SemanticAnalyzer::new(llm));

        let pipeline = Pipeline::new(
            relational.clone(),
            vector,
            graph,
            analyzer,
            embedder,
        );

        Self { pipeline, relational, _dir: dir }
    }
}

/// Builds the `CreateChatCompletionResponse`-shaped JSON body `async-openai`
/// expects, wrapping `content` (itself a JSON-encoded classify/significance
/// payload) as the assistant message.
pub fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2 }
    })
}

/// A classify response naming `memory_type` with a single concept.
pub fn classify_body(memory_type: &str) -> String {
    serde_json::json!({
        "memory_type": memory_type,
        "concepts": [{
            "title": "test concept",
            "description": "",
            "confidence": 0.8,
            "mood": null,
            "keywords": [],
            "extracted_concepts": []
        }]
    })
    .to_string()
}

/// A significance verdict response.
pub fn significance_body(significant: bool, reason: &str) -> String {
    serde_json::json!({ "significant": significant, "reason": reason }).to_string()
}

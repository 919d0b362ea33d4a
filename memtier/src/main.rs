use std::sync::Arc;

use axum::middleware;
use axum::Router;
use clap::Parser;

use memtier::analyzer::SemanticAnalyzer;
use memtier::config::Config;
use memtier::db::build_relational_store;
use memtier::embeddings::EmbeddingProvider;
use memtier::graph::GraphStore;
use memtier::jobs::JobManager;
use memtier::llm::LlmProvider;
use memtier::logging;
use memtier::pipeline::Pipeline;
use memtier::tools::{streamable_http_service, tool_auth_middleware, AppState};
use memtier::vector::VectorStore;

/// CLI surface (§1, §2: out of scope for the pipeline core — a thin
/// collaborator). Deliberately minimal; everything else is configured
/// through the environment (§6.2).
#[derive(Parser)]
#[command(name = "memtier")]
#[command(about = "Tiered memory orchestrator: classifies, routes, and reranks memories across relational, vector, and graph stores behind an MCP tool surface.")]
struct Args {}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args = Args::parse();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Held for the process lifetime: dropping it early would silently lose
    // buffered log lines written to `config.log_path`.
    let _log_guard = logging::init(&config.log_path)?;

    if config.server.tool_api_keys.is_empty() {
        tracing::warn!(
            "TOOL_API_KEYS is not set - the MCP tool endpoint is locked. Set TOOL_API_KEYS to enable tool access."
        );
    }

    tracing::info!(backend = ?config.relational.backend, "Initializing relational store");
    let relational = Arc::from(build_relational_store(&config).await?);

    tracing::info!(
        model = %config.embeddings.model,
        "Initializing embedding provider"
    );
    let embedder = Arc::new(EmbeddingProvider::new(&config.embeddings)?);

    tracing::info!(url = %config.vector.url, collection = %config.vector.collection, "Initializing vector store");
    let vector = Arc::new(VectorStore::new(&config.vector, embedder.dimensions()).await?);

    tracing::info!(url = %config.graph.url, "Initializing graph store");
    let graph = Arc::new(GraphStore::new(&config.graph).await?);

    if let Some(llm_config) = &config.llm {
        tracing::info!(model = %llm_config.model, "Initializing LLM provider");
    } else {
        tracing::warn!("CHAT_MODEL not set - LLM features degrade to documented defaults (§4.5, §7)");
    }
    let llm = LlmProvider::new(config.llm.as_ref());

    let analyzer = Arc::new(SemanticAnalyzer::new(llm.clone()));

    let pipeline = Arc::new(Pipeline::new(
        relational.clone(),
        vector,
        graph,
        analyzer.clone(),
        embedder,
    ));

    let jobs = JobManager::new(relational.clone(), analyzer);

    let state = AppState::new(
        pipeline,
        jobs,
        llm,
        config.server.tool_api_keys.clone(),
        config.log_path.clone(),
        config.directive_file_path.clone(),
    );

    let mcp_path = "/mcp";
    let mcp_service = streamable_http_service(state.clone());

    let app: Router<()> = Router::new()
        .nest_service(mcp_path, mcp_service)
        .layer(middleware::from_fn_with_state(state.clone(), tool_auth_middleware));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("memtier starting on http://{}", addr);
    tracing::info!("  MCP endpoint: http://{}{}", addr, mcp_path);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;

    Ok(())
}

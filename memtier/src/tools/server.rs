use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::tower::StreamableHttpService;
use rmcp::transport::StreamableHttpServerConfig;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::models::{ForcedRelationship, GraphEdgeType, MemoryUpdate};
use crate::reranker::RerankStrategy;

use super::AppState;

#[derive(Clone)]
pub struct MemTierMcpServer {
    state: AppState,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct MemoryStatusArgs {
    #[serde(default)]
    autostart: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ForceRelationshipArg {
    target_memory_id: i64,
    edge_type: String,
    strength: Option<f32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SaveMemoryFullArgs {
    category: String,
    topic: String,
    content: String,
    #[serde(default)]
    force_relationships: Vec<ForceRelationshipArg>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SaveMemorySqlArgs {
    category: String,
    topic: String,
    content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct UpdateMemorySqlArgs {
    id: i64,
    topic: Option<String>,
    content: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct MoveMemorySqlArgs {
    id: i64,
    new_category: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RecallCategoryArgs {
    category: String,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GetRecentMemoriesArgs {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListCategoriesArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SearchIntelligentArgs {
    query: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    enable_reranking: bool,
    rerank_strategy: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SearchWithGraphArgs {
    query: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default = "default_true")]
    include_related: bool,
    #[serde(default = "default_depth")]
    max_relationship_depth: u32,
}

fn default_true() -> bool {
    true
}

fn default_depth() -> u32 {
    2
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct GraphContextArgs {
    memory_id: i64,
    #[serde(default = "default_depth")]
    relationship_depth: u32,
    relationship_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GraphStatisticsArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct RetrieveMemoryAdvancedArgs {
    memory_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct BatchAnalyzeArgs {
    memory_ids: Vec<i64>,
    #[serde(default)]
    background: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct JobIdArgs {
    job_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TestLlmConnectionArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
struct ReadSystemLogsArgs {
    lines: Option<usize>,
    filter: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExecuteSpecialDirectiveArgs {}

const DEFAULT_LOG_LINES: usize = 100;

impl MemTierMcpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    fn internal_error(context: &'static str, error: impl std::fmt::Display) -> McpError {
        tracing::error!(error = %error, "{context}");
        McpError::internal_error(context, None)
    }

    fn invalid(message: impl Into<String>) -> McpError {
        McpError::invalid_params(message.into(), None)
    }

    fn json_text(value: &impl serde::Serialize) -> CallToolResult {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string());
        CallToolResult::success(vec![Content::text(body)])
    }

    fn force_relationships(args: Vec<ForceRelationshipArg>) -> Result<Vec<ForcedRelationship>, McpError> {
        args.into_iter()
            .map(|arg| {
                let edge_type = arg
                    .edge_type
                    .parse::<GraphEdgeType>()
                    .map_err(Self::invalid)?;
                Ok(ForcedRelationship {
                    target_memory_id: arg.target_memory_id,
                    edge_type,
                    strength: arg.strength,
                })
            })
            .collect()
    }
}

#[tool_router]
impl MemTierMcpServer {
    #[tool(name = "memory_status", description = "Report relational/vector/graph health and counts.")]
    async fn memory_status(&self, Parameters(args): Parameters<MemoryStatusArgs>) -> Result<CallToolResult, McpError> {
        if args.autostart {
            tracing::info!("memory_status: autostart requested, no-op in this deployment");
        }

        let stats = self
            .state
            .pipeline
            .relational()
            .stats()
            .await
            .map_err(|e| Self::internal_error("failed to read relational stats", e))?;
        let relational_health = self
            .state
            .pipeline
            .relational()
            .health()
            .await
            .map_err(|e| Self::internal_error("failed to check relational health", e))?;
        let graph_health = self.state.pipeline.graph_store().health().await;

        Ok(Self::json_text(&json!({
            "relational": { "stats": stats, "health": relational_health },
            "graph": { "healthy": graph_health },
        })))
    }

    #[tool(name = "save_memory_full", description = "Run the full memory pipeline: classify, route, vectorize, link.")]
    async fn save_memory_full(&self, Parameters(args): Parameters<SaveMemoryFullArgs>) -> Result<CallToolResult, McpError> {
        let forced = Self::force_relationships(args.force_relationships)?;
        let receipt = self
            .state
            .pipeline
            .save(&args.category, &args.topic, &args.content, &forced)
            .await
            .map_err(|e| Self::invalid(e.to_string()))?;

        Ok(Self::json_text(&receipt))
    }

    #[tool(name = "save_memory_sql", description = "Write a memory row directly, bypassing the pipeline.")]
    async fn save_memory_sql(&self, Parameters(args): Parameters<SaveMemorySqlArgs>) -> Result<CallToolResult, McpError> {
        if args.category.trim().is_empty() || args.topic.trim().is_empty() || args.content.trim().is_empty() {
            return Err(Self::invalid("category, topic, and content are required"));
        }

        let memory = self
            .state
            .pipeline
            .relational()
            .save_memory(&args.category, &args.topic, &args.content)
            .await
            .map_err(|e| Self::internal_error("failed to save memory", e))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Saved memory (id: {}) in {}",
            memory.id, memory.category
        ))]))
    }

    #[tool(name = "update_memory_sql", description = "Update topic/content/category on an existing memory.")]
    async fn update_memory_sql(&self, Parameters(args): Parameters<UpdateMemorySqlArgs>) -> Result<CallToolResult, McpError> {
        let update = MemoryUpdate {
            topic: args.topic,
            content: args.content,
            category: args.category,
        };

        let outcome = self
            .state
            .pipeline
            .update(args.id, &update)
            .await
            .map_err(|e| Self::invalid(e.to_string()))?;

        Ok(Self::json_text(&outcome))
    }

    #[tool(name = "move_memory_sql", description = "Move a memory to a different category.")]
    async fn move_memory_sql(&self, Parameters(args): Parameters<MoveMemorySqlArgs>) -> Result<CallToolResult, McpError> {
        let outcome = self
            .state
            .pipeline
            .move_memory(args.id, &args.new_category)
            .await
            .map_err(|e| Self::invalid(e.to_string()))?;

        Ok(Self::json_text(&outcome))
    }

    #[tool(name = "recall_category", description = "List memories in a category, most recent first.")]
    async fn recall_category(&self, Parameters(args): Parameters<RecallCategoryArgs>) -> Result<CallToolResult, McpError> {
        if args.category.trim().is_empty() {
            return Err(Self::invalid("category is required"));
        }

        let memories = self
            .state
            .pipeline
            .relational()
            .by_category(&args.category, args.limit.unwrap_or(20))
            .await
            .map_err(|e| Self::internal_error("failed to recall category", e))?;

        Ok(Self::json_text(&memories))
    }

    #[tool(name = "get_recent_memories", description = "List the most recently saved memories across all categories.")]
    async fn get_recent_memories(&self, Parameters(args): Parameters<GetRecentMemoriesArgs>) -> Result<CallToolResult, McpError> {
        let memories = self
            .state
            .pipeline
            .relational()
            .recent(args.limit.unwrap_or(20))
            .await
            .map_err(|e| Self::internal_error("failed to list recent memories", e))?;

        Ok(Self::json_text(&memories))
    }

    #[tool(name = "list_categories", description = "List categories with their memory counts.")]
    async fn list_categories(&self, Parameters(_args): Parameters<ListCategoriesArgs>) -> Result<CallToolResult, McpError> {
        let categories = self
            .state
            .pipeline
            .relational()
            .list_categories()
            .await
            .map_err(|e| Self::internal_error("failed to list categories", e))?;

        Ok(Self::json_text(&categories))
    }

    #[tool(name = "search_memories_intelligent", description = "Fan out to relational and vector search, merge, optionally rerank.")]
    async fn search_memories_intelligent(
        &self,
        Parameters(args): Parameters<SearchIntelligentArgs>,
    ) -> Result<CallToolResult, McpError> {
        if args.query.trim().is_empty() {
            return Err(Self::invalid("query is required"));
        }

        let strategy = args
            .rerank_strategy
            .map(|s| s.parse::<RerankStrategy>())
            .transpose()
            .map_err(Self::invalid)?;

        let result = self
            .state
            .pipeline
            .search_intelligent(&args.query, &args.categories, args.enable_reranking, strategy)
            .await;

        Ok(Self::json_text(&result))
    }

    #[tool(name = "search_memories_with_graph", description = "search_memories_intelligent, enriched with BFS graph neighbors.")]
    async fn search_memories_with_graph(
        &self,
        Parameters(args): Parameters<SearchWithGraphArgs>,
    ) -> Result<CallToolResult, McpError> {
        if args.query.trim().is_empty() {
            return Err(Self::invalid("query is required"));
        }

        let result = self
            .state
            .pipeline
            .search_with_graph(&args.query, &args.categories, args.include_related, args.max_relationship_depth)
            .await;

        Ok(Self::json_text(&result))
    }

    #[tool(name = "get_graph_context_for_memory", description = "Fetch a memory's graph neighborhood up to a given depth.")]
    async fn get_graph_context_for_memory(
        &self,
        Parameters(args): Parameters<GraphContextArgs>,
    ) -> Result<CallToolResult, McpError> {
        let edge_types = args
            .relationship_types
            .map(|types| {
                types
                    .into_iter()
                    .map(|t| t.parse::<GraphEdgeType>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(Self::invalid)?;

        let data = self
            .state
            .pipeline
            .graph_context(args.memory_id, args.relationship_depth, edge_types.as_deref())
            .await
            .map_err(|e| Self::invalid(e.to_string()))?;

        Ok(Self::json_text(&data))
    }

    #[tool(name = "get_graph_statistics", description = "Report total graph node/edge counts by edge type.")]
    async fn get_graph_statistics(&self, Parameters(_args): Parameters<GraphStatisticsArgs>) -> Result<CallToolResult, McpError> {
        let stats = self
            .state
            .pipeline
            .graph_stats()
            .await
            .map_err(|e| Self::internal_error("failed to read graph statistics", e))?;

        Ok(Self::json_text(&stats))
    }

    #[tool(name = "retrieve_memory_advanced", description = "Fetch a memory plus its immediate graph neighborhood.")]
    async fn retrieve_memory_advanced(
        &self,
        Parameters(args): Parameters<RetrieveMemoryAdvancedArgs>,
    ) -> Result<CallToolResult, McpError> {
        let memory = self
            .state
            .pipeline
            .relational()
            .get_by_id(args.memory_id)
            .await
            .map_err(|e| Self::internal_error("failed to load memory", e))?;

        let neighborhood = self
            .state
            .pipeline
            .graph_context(args.memory_id, 1, None)
            .await
            .map_err(|e| Self::invalid(e.to_string()))?;

        Ok(Self::json_text(&json!({
            "memory": memory,
            "graph_neighborhood": neighborhood,
        })))
    }

    #[tool(name = "batch_analyze_memories", description = "Submit an asynchronous analysis job over a list of memory ids.")]
    async fn batch_analyze_memories(&self, Parameters(args): Parameters<BatchAnalyzeArgs>) -> Result<CallToolResult, McpError> {
        if args.memory_ids.is_empty() {
            return Err(Self::invalid("memory_ids must not be empty"));
        }
        if !args.background {
            tracing::debug!("batch_analyze_memories: background=false requested, job still runs asynchronously");
        }

        let job_id = self
            .state
            .jobs
            .submit(self.state.pipeline.relational(), "batch_analyze", args.memory_ids)
            .await
            .map_err(|e| Self::internal_error("failed to submit analysis job", e))?;

        Ok(Self::json_text(&json!({ "job_id": job_id })))
    }

    #[tool(name = "get_analysis_status", description = "Report an analysis job's status and progress.")]
    async fn get_analysis_status(&self, Parameters(args): Parameters<JobIdArgs>) -> Result<CallToolResult, McpError> {
        let job_id = parse_job_id(&args.job_id)?;

        let job = self
            .state
            .pipeline
            .relational()
            .get_job(job_id)
            .await
            .map_err(|e| Self::internal_error("failed to read job status", e))?;

        match job {
            Some(job) => Ok(Self::json_text(&job)),
            None => Err(Self::invalid("job not found")),
        }
    }

    #[tool(name = "get_analysis_result", description = "Fetch the per-memory analysis results for a completed job.")]
    async fn get_analysis_result(&self, Parameters(args): Parameters<JobIdArgs>) -> Result<CallToolResult, McpError> {
        let job_id = parse_job_id(&args.job_id)?;

        let results = self
            .state
            .pipeline
            .relational()
            .list_analysis_results(job_id)
            .await
            .map_err(|e| Self::internal_error("failed to read job results", e))?;

        Ok(Self::json_text(&results))
    }

    #[tool(name = "test_llm_connection", description = "Round-trip a minimal prompt to confirm the configured LLM is reachable.")]
    async fn test_llm_connection(&self, Parameters(_args): Parameters<TestLlmConnectionArgs>) -> Result<CallToolResult, McpError> {
        let result = self.state.llm.test_connection().await;
        Ok(Self::json_text(&result))
    }

    #[tool(name = "read_system_logs", description = "Tail the log file, optionally filtered by a case-insensitive substring.")]
    async fn read_system_logs(&self, Parameters(args): Parameters<ReadSystemLogsArgs>) -> Result<CallToolResult, McpError> {
        let lines = args.lines.unwrap_or(DEFAULT_LOG_LINES);
        let tail = crate::logging::tail_log(&self.state.log_path, lines, args.filter.as_deref())
            .map_err(|e| Self::internal_error("failed to read log file", e))?;

        Ok(CallToolResult::success(vec![Content::text(tail.join("\n"))]))
    }

    #[tool(name = "execute_special_directive", description = "Return the contents of the configured directive file verbatim.")]
    async fn execute_special_directive(
        &self,
        Parameters(_args): Parameters<ExecuteSpecialDirectiveArgs>,
    ) -> Result<CallToolResult, McpError> {
        let contents = std::fs::read_to_string(&self.state.directive_file_path)
            .map_err(|e| Self::internal_error("failed to read directive file", e))?;

        Ok(CallToolResult::success(vec![Content::text(contents)]))
    }
}

fn parse_job_id(raw: &str) -> Result<uuid::Uuid, McpError> {
    raw.parse::<uuid::Uuid>()
        .map_err(|_| MemTierMcpServer::invalid("job_id is not a valid uuid"))
}

#[tool_handler]
impl ServerHandler for MemTierMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "memtier".to_string(),
                title: Some("Tiered Memory Orchestrator".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use save_memory_full to route memories through classification and enrichment; \
                 search_memories_intelligent / search_memories_with_graph to retrieve them."
                    .to_string(),
            ),
        }
    }
}

pub fn streamable_http_service(state: AppState) -> StreamableHttpService<MemTierMcpServer, LocalSessionManager> {
    StreamableHttpService::new(
        move || Ok(MemTierMcpServer::new(state.clone())),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    )
}

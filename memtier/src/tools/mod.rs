pub mod auth;
pub mod server;

use std::sync::Arc;

use crate::jobs::JobManager;
use crate::llm::LlmProvider;
use crate::pipeline::Pipeline;

pub use auth::{tool_auth_middleware, ToolAuthContext};
pub use server::{streamable_http_service, MemTierMcpServer};

/// Shared application state handed to every tool call (C9, §4.10). Cheap to
/// clone — everything inside is already reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub jobs: JobManager,
    pub llm: LlmProvider,
    pub api_keys: Arc<Vec<String>>,
    pub log_path: Arc<String>,
    pub directive_file_path: Arc<String>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        jobs: JobManager,
        llm: LlmProvider,
        api_keys: Vec<String>,
        log_path: String,
        directive_file_path: String,
    ) -> Self {
        Self {
            pipeline,
            jobs,
            llm,
            api_keys: Arc::new(api_keys),
            log_path: Arc::new(log_path),
            directive_file_path: Arc::new(directive_file_path),
        }
    }
}

use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        Err(_) => None,
    }
}

fn parse_csv(var: &str) -> Vec<String> {
    env::var(var)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub relational: RelationalConfig,
    pub vector: VectorConfig,
    pub graph: GraphConfig,
    pub llm: Option<LlmConfig>,
    pub embeddings: EmbeddingsConfig,
    pub memory: MemoryConfig,
    pub log_path: String,
    pub directive_file_path: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tool_api_keys: Vec<String>,
}

/// `RELATIONAL_BACKEND` selects between the two backends of C1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalBackendKind {
    Embedded,
    Networked,
}

#[derive(Debug, Clone)]
pub struct RelationalConfig {
    pub backend: RelationalBackendKind,
    pub embedded_db_path: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_max_conn: u32,
    pub db_idle_ms: u64,
    pub db_conn_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct VectorConfig {
    pub url: String,
    pub collection: String,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub db: Option<String>,
}

/// LLM configuration for chat/completion models.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub short_memory_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let backend = match env::var("RELATIONAL_BACKEND")
            .unwrap_or_else(|_| "embedded".to_string())
            .to_lowercase()
            .as_str()
        {
            "networked" => RelationalBackendKind::Networked,
            _ => RelationalBackendKind::Embedded,
        };

        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("PORT", 8787),
                tool_api_keys: parse_csv("TOOL_API_KEYS"),
            },
            relational: RelationalConfig {
                backend,
                embedded_db_path: env::var("EMBEDDED_DB_PATH")
                    .unwrap_or_else(|_| "./memory.db".to_string()),
                db_host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                db_port: parse_env_or("DB_PORT", 5432),
                db_name: env::var("DB_NAME").unwrap_or_else(|_| "memtier".to_string()),
                db_user: env::var("DB_USER").unwrap_or_else(|_| "memtier".to_string()),
                db_password: env::var("DB_PASSWORD").unwrap_or_default(),
                db_max_conn: parse_env_or("DB_MAX_CONN", 20),
                db_idle_ms: parse_env_or("DB_IDLE_MS", 30000),
                db_conn_timeout_ms: parse_env_or("DB_CONN_TIMEOUT_MS", 2000),
            },
            vector: VectorConfig {
                url: env::var("VECTOR_URL").unwrap_or_else(|_| "./vector.db".to_string()),
                collection: env::var("VECTOR_COLLECTION")
                    .unwrap_or_else(|_| "memory-main".to_string()),
            },
            graph: GraphConfig {
                url: env::var("GRAPH_URL").unwrap_or_else(|_| "./graph.db".to_string()),
                user: env::var("GRAPH_USER").ok(),
                password: env::var("GRAPH_PASSWORD").ok(),
                db: env::var("GRAPH_DB").ok(),
            },
            llm: env::var("CHAT_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("CHAT_API_KEY").ok(),
                base_url: env::var("CHAT_BASE_URL").ok(),
                timeout_secs: parse_env_or("CHAT_TIMEOUT_SECS", 30),
                max_retries: parse_env_or("CHAT_MAX_RETRIES", 1),
            }),
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 256),
                openai_api_key: env::var("OPENAI_API_KEY").ok(),
            },
            memory: MemoryConfig {
                short_memory_capacity: parse_env_or("SHORT_MEMORY_CAPACITY", 10),
            },
            log_path: env::var("LOG_PATH").unwrap_or_else(|_| "./memory.log".to_string()),
            directive_file_path: env::var("DIRECTIVE_FILE_PATH")
                .unwrap_or_else(|_| "./directive.txt".to_string()),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known chat/embedding providers that use OpenAI-compatible APIs.
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a chat model string into a `(provider, model)` tuple by prefix, e.g.
/// `"openai/gpt-4o-mini"` -> `("openai", "gpt-4o-mini")`. Falls back to
/// treating the whole string as a local/OpenAI-compatible model id.
pub fn parse_llm_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("local", model)
}

/// Selects the embedding backend: `"openai"` routes to the OpenAI embeddings
/// endpoint, any other value (including the default) routes to the local
/// fastembed backend.
pub fn is_openai_embedding_model(model: &str) -> bool {
    model.eq_ignore_ascii_case("openai")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_relational_backend_defaults_to_embedded() {
        let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
        env::remove_var("RELATIONAL_BACKEND");
        let config = Config::default();
        assert_eq!(config.relational.backend, RelationalBackendKind::Embedded);
    }

    #[test]
    fn test_relational_backend_networked() {
        let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
        env::set_var("RELATIONAL_BACKEND", "networked");
        let config = Config::default();
        assert_eq!(config.relational.backend, RelationalBackendKind::Networked);
        env::remove_var("RELATIONAL_BACKEND");
    }

    #[test]
    fn test_short_memory_capacity_default() {
        let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
        env::remove_var("SHORT_MEMORY_CAPACITY");
        let config = Config::default();
        assert_eq!(config.memory.short_memory_capacity, 10);
    }

    #[test]
    fn test_directive_file_path_default() {
        let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
        env::remove_var("DIRECTIVE_FILE_PATH");
        let config = Config::default();
        assert_eq!(config.directive_file_path, "./directive.txt");
    }

    #[test]
    fn test_tool_api_keys_parsing() {
        let _guard = CONFIG_TEST_MUTEX.lock().unwrap();
        env::set_var("TOOL_API_KEYS", "abc, def ,ghi");
        let config = Config::default();
        assert_eq!(config.server.tool_api_keys, vec!["abc", "def", "ghi"]);
        env::remove_var("TOOL_API_KEYS");
    }

    #[test]
    fn test_is_openai_embedding_model() {
        assert!(is_openai_embedding_model("openai"));
        assert!(is_openai_embedding_model("OpenAI"));
        assert!(!is_openai_embedding_model("BAAI/bge-small-en-v1.5"));
    }

    #[test]
    fn test_parse_llm_provider_model_known_prefix() {
        assert_eq!(parse_llm_provider_model("openai/gpt-4o-mini"), ("openai", "gpt-4o-mini"));
        assert_eq!(parse_llm_provider_model("ollama/llama3"), ("ollama", "llama3"));
    }

    #[test]
    fn test_parse_llm_provider_model_unknown_prefix_is_local() {
        assert_eq!(parse_llm_provider_model("local/some-model"), ("local", "local/some-model"));
    }
}

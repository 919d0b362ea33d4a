use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{is_openai_embedding_model, EmbeddingsConfig};
use crate::embeddings::api::{ApiConfig, EmbeddingApiClient};
use crate::error::{PipelineError, Result};

/// Two embedding backends (§4.4): the local ONNX models this store already
/// ran via `fastembed`, plus an OpenAI-compatible HTTP backend selected when
/// `EMBEDDING_MODEL == "openai"` (§6.2).
enum EmbeddingBackend {
    Local {
        model: Arc<Mutex<TextEmbedding>>,
        batch_size: usize,
    },
    OpenAi {
        client: EmbeddingApiClient,
    },
}

pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        if is_openai_embedding_model(&config.model) {
            return Self::new_openai(config);
        }
        Self::new_local(config)
    }

    fn new_openai(config: &EmbeddingsConfig) -> Result<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            PipelineError::Llm("OPENAI_API_KEY required for embedding model \"openai\"".to_string())
        })?;

        let client = EmbeddingApiClient::new(ApiConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: Some(api_key),
            model: "text-embedding-3-small".to_string(),
            timeout_secs: 10,
            max_retries: 1,
        })?;

        Ok(Self {
            backend: EmbeddingBackend::OpenAi { client },
            dimensions: config.dimensions,
        })
    }

    fn new_local(config: &EmbeddingsConfig) -> Result<Self> {
        let embedding_model = match config.model.as_str() {
            "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                EmbeddingModel::AllMiniLML6V2
            }
            "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
                EmbeddingModel::AllMiniLML12V2
            }
            "nomic-embed-text-v1" | "nomic-ai/nomic-embed-text-v1" => EmbeddingModel::NomicEmbedTextV1,
            "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
                EmbeddingModel::NomicEmbedTextV15
            }
            _ => EmbeddingModel::BGESmallENV15,
        };

        let model = TextEmbedding::try_new(
            InitOptions::new(embedding_model).with_show_download_progress(true),
        )
        .map_err(|e| PipelineError::Llm(e.to_string()))?;

        Ok(Self {
            backend: EmbeddingBackend::Local {
                model: Arc::new(Mutex::new(model)),
                batch_size: config.batch_size,
            },
            dimensions: config.dimensions,
        })
    }

    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.backend {
            EmbeddingBackend::Local { model, batch_size } => {
                let mut model = model.lock().await;
                model
                    .embed(texts, Some(*batch_size))
                    .map_err(|e| PipelineError::Llm(e.to_string()))
            }
            EmbeddingBackend::OpenAi { client } => {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                client.embed(&refs).await
            }
        }
    }

    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(vec![text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Llm("No embedding generated".to_string()))
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_openai(&self) -> bool {
        matches!(self.backend, EmbeddingBackend::OpenAi { .. })
    }
}

impl Clone for EmbeddingProvider {
    fn clone(&self) -> Self {
        match &self.backend {
            EmbeddingBackend::Local { model, batch_size } => Self {
                backend: EmbeddingBackend::Local {
                    model: Arc::clone(model),
                    batch_size: *batch_size,
                },
                dimensions: self.dimensions,
            },
            EmbeddingBackend::OpenAi { client } => Self {
                backend: EmbeddingBackend::OpenAi { client: client.clone() },
                dimensions: self.dimensions,
            },
        }
    }
}

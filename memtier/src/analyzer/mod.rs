mod prompts;

use serde::Deserialize;
use std::collections::HashSet;

use crate::llm::LlmProvider;
use crate::models::{Concept, Memory, MemoryType};

/// Semantic classification + concept extraction result (§4.5).
pub struct ClassifyResult {
    pub memory_type: MemoryType,
    pub concepts: Vec<Concept>,
}

/// Significance evaluation result (§4.5). Only consulted for
/// significance-gated memory types.
pub struct SignificanceResult {
    pub significant: bool,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    memory_type: String,
    concepts: Vec<RawConcept>,
}

#[derive(Debug, Deserialize)]
struct RawConcept {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    extracted_concepts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawSignificance {
    significant: bool,
    #[serde(default)]
    reason: String,
}

/// Classifies memories and extracts concepts via the LLM (C5, §4.5). On LLM
/// failure or malformed output, operations degrade to documented defaults
/// rather than failing the save.
pub struct SemanticAnalyzer {
    llm: LlmProvider,
}

impl SemanticAnalyzer {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    /// One LLM call producing structured JSON. Enforces: `memory_type` is one
    /// of the six taxonomy values, `concepts.len() in [1,4]`, each concept has
    /// a non-empty title (empty descriptions are allowed — they're dropped at
    /// vector-write time, §4.2). Retries once with a stricter prompt on
    /// malformed output, then falls back to `factual` + a single concept built
    /// from the memory's own topic/content.
    pub async fn classify_and_extract(&self, memory: &Memory) -> ClassifyResult {
        if !self.llm.is_available() {
            return Self::fallback(memory);
        }

        let prompt = prompts::classify_prompt(memory);
        match self.try_classify(&prompt).await {
            Ok(result) => result,
            Err(first_error) => {
                tracing::warn!(error = %first_error, "classification failed, retrying with stricter prompt");
                let strict_prompt = prompts::classify_prompt_strict(memory);
                match self.try_classify(&strict_prompt).await {
                    Ok(result) => result,
                    Err(second_error) => {
                        tracing::warn!(error = %second_error, "classification retry failed, using factual default");
                        Self::fallback(memory)
                    }
                }
            }
        }
    }

    async fn try_classify(&self, prompt: &str) -> crate::error::Result<ClassifyResult> {
        let raw: RawClassification = self.llm.complete_structured(prompt).await?;

        let memory_type: MemoryType = raw
            .memory_type
            .parse()
            .map_err(|_| crate::error::PipelineError::Data(format!("unknown memory_type: {}", raw.memory_type)))?;

        if raw.concepts.is_empty() || raw.concepts.len() > 4 {
            return Err(crate::error::PipelineError::Data(format!(
                "concepts length {} out of range [1,4]",
                raw.concepts.len()
            )));
        }

        let mut concepts = Vec::with_capacity(raw.concepts.len());
        for c in raw.concepts {
            if c.title.trim().is_empty() {
                return Err(crate::error::PipelineError::Data("concept title is empty".to_string()));
            }
            concepts.push(Concept {
                title: c.title,
                description: c.description,
                memory_type,
                confidence: c.confidence.clamp(0.0, 1.0),
                mood: c.mood,
                keywords: c.keywords.into_iter().collect::<HashSet<_>>(),
                extracted_concepts: c.extracted_concepts,
            });
        }

        Ok(ClassifyResult { memory_type, concepts })
    }

    fn fallback(memory: &Memory) -> ClassifyResult {
        ClassifyResult {
            memory_type: MemoryType::Factual,
            concepts: vec![Concept::fallback(&memory.topic, &memory.content)],
        }
    }

    /// One LLM call. Significance criteria (first-times, trust/partnership
    /// milestones, paradigm shifts, meta-cognitive jumps, collaboration-pattern
    /// breakthroughs) are encoded in the prompt, not in code, per §4.5 — test
    /// suites should mock this rather than rely on a specific model's
    /// judgment (SPEC_FULL.md §9, Open Question 3).
    pub async fn evaluate_significance(&self, memory: &Memory, memory_type: MemoryType) -> SignificanceResult {
        if !self.llm.is_available() {
            return SignificanceResult {
                significant: false,
                reason: "LLM unavailable; defaulting to non-significant".to_string(),
            };
        }

        let prompt = prompts::significance_prompt(memory, memory_type);
        match self.llm.complete_structured::<RawSignificance>(&prompt).await {
            Ok(raw) => SignificanceResult {
                significant: raw.significant,
                reason: raw.reason,
            },
            Err(error) => {
                tracing::warn!(%error, "significance evaluation failed, defaulting to non-significant");
                SignificanceResult {
                    significant: false,
                    reason: format!("evaluation failed: {error}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_memory() -> Memory {
        Memory::new(1, "daily", "Routine sync", "Nothing special today.")
    }

    #[tokio::test]
    async fn test_classify_falls_back_when_llm_unavailable() {
        let analyzer = SemanticAnalyzer::new(LlmProvider::unavailable("no config"));
        let result = analyzer.classify_and_extract(&test_memory()).await;
        assert_eq!(result.memory_type, MemoryType::Factual);
        assert_eq!(result.concepts.len(), 1);
    }

    #[tokio::test]
    async fn test_significance_defaults_false_when_llm_unavailable() {
        let analyzer = SemanticAnalyzer::new(LlmProvider::unavailable("no config"));
        let result = analyzer.evaluate_significance(&test_memory(), MemoryType::Experience).await;
        assert!(!result.significant);
    }
}

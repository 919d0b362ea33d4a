use crate::models::{Memory, MemoryType};

const TAXONOMY_GUIDE: &str = r#"Classify the memory into exactly one of these six types:
- factual: objective information, facts, definitions, reference material
- procedural: how-to knowledge, step-by-step instructions, workflows
- experience: a specific lived event or interaction worth remembering
- self_reflection: introspection, self-assessment, meta-cognitive observation
- humor: jokes, wordplay, comedic moments
- collaboration: notes about how two or more parties work together"#;

pub fn classify_prompt(memory: &Memory) -> String {
    format!(
        r#"{taxonomy}

Given the memory below, respond with ONLY a JSON object of this exact shape:
{{
  "memory_type": "<one of: factual, procedural, experience, self_reflection, humor, collaboration>",
  "concepts": [
    {{
      "title": "<short concept title, required>",
      "description": "<one to three sentence description, may be empty>",
      "confidence": <float 0.0 to 1.0>,
      "mood": "<optional single word or null>",
      "keywords": ["<keyword>", ...],
      "extracted_concepts": ["<related idea>", ...]
    }}
  ]
}}

Extract between 1 and 4 concepts. Every concept must have a non-empty title.

Topic: {topic}
Category: {category}
Content:
{content}"#,
        taxonomy = TAXONOMY_GUIDE,
        topic = memory.topic,
        category = memory.category,
        content = memory.content,
    )
}

/// Used on retry after a malformed first response. Repeats the schema more
/// bluntly and asks for nothing but the JSON object.
pub fn classify_prompt_strict(memory: &Memory) -> String {
    format!(
        r#"Your previous response did not match the required JSON schema. Respond with ONLY the JSON object below, no prose, no markdown fences, no explanation.

{taxonomy}

Schema:
{{"memory_type": "<taxonomy value>", "concepts": [{{"title": "<required, non-empty>", "description": "<may be empty>", "confidence": <0.0-1.0>, "mood": null, "keywords": [], "extracted_concepts": []}}]}}

concepts must contain between 1 and 4 entries.

Topic: {topic}
Content:
{content}"#,
        taxonomy = TAXONOMY_GUIDE,
        topic = memory.topic,
        content = memory.content,
    )
}

pub fn significance_prompt(memory: &Memory, memory_type: MemoryType) -> String {
    format!(
        r#"This memory was classified as "{memory_type}", a type that is only kept in the relational store when it is significant.

A memory is significant when it represents: a first-time occurrence, a trust or partnership milestone, a paradigm shift in understanding, a meta-cognitive jump, or a breakthrough in how two parties collaborate. Routine or repetitive content is not significant.

Respond with ONLY a JSON object of this exact shape:
{{"significant": <true or false>, "reason": "<one sentence explaining the judgment>"}}

Topic: {topic}
Content:
{content}"#,
        memory_type = memory_type,
        topic = memory.topic,
        content = memory.content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_memory() -> Memory {
        Memory::new(1, "conversation", "First pairing session", "We paired for the first time today.")
    }

    #[test]
    fn test_classify_prompt_includes_content() {
        let prompt = classify_prompt(&test_memory());
        assert!(prompt.contains("We paired for the first time today."));
        assert!(prompt.contains("memory_type"));
    }

    #[test]
    fn test_significance_prompt_names_the_type() {
        let prompt = significance_prompt(&test_memory(), MemoryType::Collaboration);
        assert!(prompt.contains("collaboration"));
    }
}

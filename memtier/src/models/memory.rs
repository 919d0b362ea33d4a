use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::MemoryType;

/// The primary entity (§3). `id` is monotonically increasing and stable
/// within one deployment; once written, it never changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub category: String,
    pub topic: String,
    pub content: String,
}

impl Memory {
    pub fn new(id: i64, category: impl Into<String>, topic: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            date: now.date_naive(),
            category: category.into(),
            topic: topic.into(),
            content: content.into(),
        }
    }
}

/// Aggregate counters over `memories(category)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalStats {
    pub total: i64,
    pub by_category: std::collections::HashMap<String, i64>,
    pub db_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub detail: String,
}

/// Partial update accepted by `RelationalStore::update` (§4.1). `None` fields
/// are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub topic: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.topic.is_none() && self.content.is_none() && self.category.is_none()
    }
}

/// Return value of `save` (§4.7.1), shaped differently for the two save
/// paths. Path A (`core_memories`) only ever populates a subset of fields;
/// Path B (the advanced pipeline) populates all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub memory_id: i64,
    pub memory_type: MemoryType,
    pub kept_in_relational: bool,
    pub in_short_memory: bool,
    pub stored_in_vector: bool,
    pub stored_in_graph: bool,
    pub relationships_created: u32,
    pub significance_reason: Option<String>,
}

/// Return value of `update`/`move` (§4.7.5). These touch only the
/// relational store; vector/graph records are never rewritten in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub ok: bool,
    pub warning: Option<String>,
}

impl UpdateOutcome {
    pub fn applied() -> Self {
        Self {
            ok: true,
            warning: Some("vector/graph not synchronized".to_string()),
        }
    }

    pub fn not_found() -> Self {
        Self { ok: false, warning: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_new_sets_date_from_created_at() {
        let m = Memory::new(1, "debug", "TLS fix", "Rotated cert.");
        assert_eq!(m.date, m.created_at.date_naive());
        assert_eq!(m.id, 1);
    }

    #[test]
    fn test_memory_update_is_empty() {
        assert!(MemoryUpdate::default().is_empty());
        let update = MemoryUpdate {
            topic: Some("new topic".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}

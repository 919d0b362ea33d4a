use serde::{Deserialize, Serialize};

/// The six-value classification taxonomy the analyzer assigns. `category` is
/// caller-supplied and advisory; `MemoryType` is authoritative for routing
/// decisions in the pipeline (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    #[default]
    Factual,
    Procedural,
    Experience,
    SelfReflection,
    Humor,
    Collaboration,
}

impl MemoryType {
    /// `factual`/`procedural` are always discarded from the relational store.
    pub fn always_discards_from_relational(self) -> bool {
        matches!(self, MemoryType::Factual | MemoryType::Procedural)
    }

    /// `experience`/`self_reflection`/`humor`/`collaboration` are kept only
    /// if the analyzer judges the memory significant.
    pub fn is_significance_gated(self) -> bool {
        matches!(
            self,
            MemoryType::Experience
                | MemoryType::SelfReflection
                | MemoryType::Humor
                | MemoryType::Collaboration
        )
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factual => write!(f, "factual"),
            Self::Procedural => write!(f, "procedural"),
            Self::Experience => write!(f, "experience"),
            Self::SelfReflection => write!(f, "self_reflection"),
            Self::Humor => write!(f, "humor"),
            Self::Collaboration => write!(f, "collaboration"),
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "factual" => Ok(Self::Factual),
            "procedural" => Ok(Self::Procedural),
            "experience" => Ok(Self::Experience),
            "self_reflection" => Ok(Self::SelfReflection),
            "humor" => Ok(Self::Humor),
            "collaboration" => Ok(Self::Collaboration),
            _ => Err(format!("Unknown memory type: {s}")),
        }
    }
}

/// Reserved category names with special pipeline semantics (§3).
pub const CATEGORY_CORE_MEMORIES: &str = "core_memories";
pub const CATEGORY_SHORT_MEMORY: &str = "short_memory";
pub const CATEGORY_FORGOTTEN_MEMORIES: &str = "forgotten_memories";

/// Sentinel id meaning "no relational backing row". Both relational backends
/// start autoincrement ids at 1, so this value is never assigned to a real
/// row and `get_by_id(0)` always resolves to "not found".
pub const NO_RELATIONAL_ROW: i64 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_default() {
        assert_eq!(MemoryType::default(), MemoryType::Factual);
    }

    #[test]
    fn test_memory_type_routing_classes() {
        assert!(MemoryType::Factual.always_discards_from_relational());
        assert!(MemoryType::Procedural.always_discards_from_relational());
        assert!(!MemoryType::Experience.always_discards_from_relational());

        assert!(MemoryType::Experience.is_significance_gated());
        assert!(MemoryType::SelfReflection.is_significance_gated());
        assert!(MemoryType::Humor.is_significance_gated());
        assert!(MemoryType::Collaboration.is_significance_gated());
        assert!(!MemoryType::Factual.is_significance_gated());
        assert!(!MemoryType::Procedural.is_significance_gated());
    }

    #[test]
    fn test_memory_type_display_and_from_str_round_trip() {
        for t in [
            MemoryType::Factual,
            MemoryType::Procedural,
            MemoryType::Experience,
            MemoryType::SelfReflection,
            MemoryType::Humor,
            MemoryType::Collaboration,
        ] {
            let s = t.to_string();
            assert_eq!(s.parse::<MemoryType>().unwrap(), t);
        }
    }

    #[test]
    fn test_memory_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MemoryType::SelfReflection).unwrap(),
            "\"self_reflection\""
        );
    }

    #[test]
    fn test_memory_type_from_str_invalid() {
        assert!("nonsense".parse::<MemoryType>().is_err());
    }
}

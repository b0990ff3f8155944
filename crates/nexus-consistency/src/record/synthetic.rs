//! Synthetic records derived from secondary structures
//!
//! None of these are physically stored as records; they describe what an
//! index, a token scan store or the counts store claims, so the checker can
//! diff that claim against the primary records.

use super::{EntityKind, LabelId, TypeId, Value};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

/// One entry of a property index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Index rule id
    pub index: u64,
    /// Indexed node or relationship id
    pub entity: u64,
    /// Indexed values, in the index's property order
    pub values: Vec<Value>,
}

/// Token membership of one entity in a label or relationship type scan store
#[derive(Debug, Clone, PartialEq)]
pub struct TokenScanDocument {
    /// Nodes (label scan) or relationships (type scan)
    pub entity_kind: EntityKind,
    /// Entity id
    pub entity: u64,
    /// Token ids the scan store lists for this entity
    pub tokens: RoaringBitmap,
}

impl TokenScanDocument {
    /// Document listing `tokens` for `entity`
    pub fn new(entity_kind: EntityKind, entity: u64, tokens: &[u32]) -> Self {
        Self {
            entity_kind,
            entity,
            tokens: tokens.iter().copied().collect(),
        }
    }
}

/// Key of an aggregate count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountsKey {
    /// Nodes with a label; `None` counts all nodes
    Nodes {
        /// Label, or every node
        label: Option<LabelId>,
    },
    /// Relationships of a type
    Relationships {
        /// Relationship type
        rel_type: TypeId,
    },
}

impl CountsKey {
    /// Stable synthetic id for reporting
    pub fn synthetic_id(&self) -> u64 {
        match self {
            CountsKey::Nodes { label: None } => 0,
            CountsKey::Nodes { label: Some(label) } => 1 + u64::from(*label) * 2,
            CountsKey::Relationships { rel_type } => 2 + u64::from(*rel_type) * 2,
        }
    }
}

/// Stored aggregate count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsEntry {
    /// What is being counted
    pub key: CountsKey,
    /// Count found in the counts store (0 when absent)
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_counts_synthetic_ids_are_distinct() {
        let mut ids = HashSet::new();
        ids.insert(CountsKey::Nodes { label: None }.synthetic_id());
        for token in 0..50u32 {
            assert!(ids.insert(CountsKey::Nodes { label: Some(token) }.synthetic_id()));
            assert!(ids.insert(CountsKey::Relationships { rel_type: token }.synthetic_id()));
        }
    }

    #[test]
    fn test_scan_document_tokens() {
        let doc = TokenScanDocument::new(EntityKind::Node, 5, &[3, 1, 3]);
        assert_eq!(doc.tokens.len(), 2);
        assert!(doc.tokens.contains(1));
    }
}

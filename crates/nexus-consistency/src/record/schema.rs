//! Token and schema records
//!
//! Tokens map label / relationship type / property key ids to names stored in
//! dynamic chains. Schema records hold index and constraint rules; constraint
//! rules that need a backing index reference it, and the index references the
//! constraint back.

use super::{EntityKind, KeyId, NULL_REF, TokenKind, link};
use serde::{Deserialize, Serialize};

/// Token record (label, relationship type or property key)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Token ID
    pub id: u32,
    /// Whether the token is live
    pub in_use: bool,
    /// Token store
    pub kind: TokenKind,
    /// First block of the name chain
    pub name_block: u64,
}

impl TokenRecord {
    /// Create an in-use token whose name starts at `name_block`
    pub fn new(kind: TokenKind, id: u32, name_block: u64) -> Self {
        Self {
            id,
            in_use: true,
            kind,
            name_block,
        }
    }

    /// Create a record for an unused slot
    pub fn unused(kind: TokenKind, id: u32) -> Self {
        Self {
            id,
            in_use: false,
            kind,
            name_block: NULL_REF,
        }
    }

    /// Name chain head, if any
    pub fn name_block(&self) -> Option<u64> {
        link(self.name_block)
    }
}

/// What a schema rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Node or relationship schema
    pub entity: EntityKind,
    /// Label id (nodes) or relationship type id (relationships)
    pub token: u32,
    /// Property keys, in index order
    pub properties: Vec<KeyId>,
}

impl SchemaDescriptor {
    /// Node schema on `label` over `properties`
    pub fn node(label: u32, properties: Vec<KeyId>) -> Self {
        Self {
            entity: EntityKind::Node,
            token: label,
            properties,
        }
    }

    /// Relationship schema on `rel_type` over `properties`
    pub fn relationship(rel_type: u32, properties: Vec<KeyId>) -> Self {
        Self {
            entity: EntityKind::Relationship,
            token: rel_type,
            properties,
        }
    }
}

/// Index type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Plain range index
    General,
    /// Index backing a uniqueness constraint
    Unique,
}

/// Population state of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Fully populated and serving reads
    Online,
    /// Still being populated
    Populating,
    /// Population failed
    Failed,
}

/// Index rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRule {
    /// Rule name, unique across the schema
    pub name: String,
    /// Indexed schema
    pub schema: SchemaDescriptor,
    /// Index type
    pub kind: IndexKind,
    /// Population state
    pub state: IndexState,
    /// Constraint owning this index (unique indexes only)
    pub owning_constraint: Option<u64>,
}

/// Constraint type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// UNIQUE constraint - property value must be unique across all entities with the token
    Unique,
    /// EXISTS constraint - property must exist on all entities with the token
    Exists,
    /// NODE KEY - unique and mandatory
    NodeKey,
}

impl ConstraintKind {
    /// Constraint kinds enforced through a backing unique index
    pub fn needs_index(self) -> bool {
        matches!(self, ConstraintKind::Unique | ConstraintKind::NodeKey)
    }

    /// Constraint kinds that make properties mandatory
    pub fn is_mandatory(self) -> bool {
        matches!(self, ConstraintKind::Exists | ConstraintKind::NodeKey)
    }
}

/// Constraint rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRule {
    /// Rule name, unique across the schema
    pub name: String,
    /// Constrained schema
    pub schema: SchemaDescriptor,
    /// Constraint type
    pub kind: ConstraintKind,
    /// Backing index (unique and node key constraints only)
    pub owned_index: Option<u64>,
}

/// Decoded content of a schema record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaRule {
    /// Index definition
    Index(IndexRule),
    /// Constraint definition
    Constraint(ConstraintRule),
    /// Rule type this engine version does not know
    Unsupported(String),
}

impl SchemaRule {
    /// Rule name, `None` for unsupported rules
    pub fn name(&self) -> Option<&str> {
        match self {
            SchemaRule::Index(index) => Some(&index.name),
            SchemaRule::Constraint(constraint) => Some(&constraint.name),
            SchemaRule::Unsupported(_) => None,
        }
    }

    /// Schema the rule applies to
    pub fn schema(&self) -> Option<&SchemaDescriptor> {
        match self {
            SchemaRule::Index(index) => Some(&index.schema),
            SchemaRule::Constraint(constraint) => Some(&constraint.schema),
            SchemaRule::Unsupported(_) => None,
        }
    }

    /// Stable description of the rule's content, ignoring name and id
    pub fn content_key(&self) -> Option<String> {
        match self {
            SchemaRule::Index(index) => Some(format!("index:{:?}:{:?}", index.kind, index.schema)),
            SchemaRule::Constraint(constraint) => Some(format!(
                "constraint:{:?}:{:?}",
                constraint.kind, constraint.schema
            )),
            SchemaRule::Unsupported(_) => None,
        }
    }
}

/// Schema record in schema.store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    /// Rule ID
    pub id: u64,
    /// Whether the record is live
    pub in_use: bool,
    /// Decoded rule, `None` if the bytes could not be decoded
    pub rule: Option<SchemaRule>,
}

impl SchemaRecord {
    /// Create an in-use record holding `rule`
    pub fn new(id: u64, rule: SchemaRule) -> Self {
        Self {
            id,
            in_use: true,
            rule: Some(rule),
        }
    }

    /// Create a record for an unused slot
    pub fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            rule: None,
        }
    }

    /// Index rule, if this record holds one
    pub fn index(&self) -> Option<&IndexRule> {
        match &self.rule {
            Some(SchemaRule::Index(index)) => Some(index),
            _ => None,
        }
    }

    /// Constraint rule, if this record holds one
    pub fn constraint(&self) -> Option<&ConstraintRule> {
        match &self.rule {
            Some(SchemaRule::Constraint(constraint)) => Some(constraint),
            _ => None,
        }
    }
}

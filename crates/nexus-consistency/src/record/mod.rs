//! Record model - typed snapshots of the fixed-size record stores
//!
//! Neo4j-inspired stores, one record type per store:
//! - `nodes.store`: label field, relationship head (chain or group chain), first property
//! - `rels.store`: type, source/target, four chain pointers, first property
//! - `groups.store`: per-(node, type) heads for dense nodes, singly linked by ascending type
//! - `props.store`: doubly linked property chains, up to 4 blocks per record
//! - dynamic stores: singly linked overflow blocks (strings, arrays, label sets, token names)
//! - token and schema stores
//!
//! Records are immutable snapshots of on-disk state at read time. Pointers use
//! the store-wide NULL sentinels (`NULL_REF`, `NULL_TOKEN`); every record
//! exposes `Option` accessors over them.

mod primitive;
mod property;
mod schema;
mod synthetic;

pub use primitive::{
    GroupDirection, LabelField, NodeRecord, RelationshipGroupRecord, RelationshipHead,
    RelationshipRecord,
};
pub use property::{BlockValue, DynamicRecord, PropertyBlock, PropertyRecord, Value};
pub use schema::{
    ConstraintKind, ConstraintRule, IndexKind, IndexRule, IndexState, SchemaDescriptor,
    SchemaRecord, SchemaRule, TokenRecord,
};
pub use synthetic::{CountsEntry, CountsKey, IndexEntry, TokenScanDocument};

use serde::{Deserialize, Serialize};

/// NULL pointer for record references
pub const NULL_REF: u64 = u64::MAX;

/// NULL token id (labels, relationship types, property keys)
pub const NULL_TOKEN: u32 = u32::MAX;

/// Maximum number of property blocks held by one property record
pub const PROPERTY_BLOCKS_PER_RECORD: usize = 4;

/// Label ID type
pub type LabelId = u32;

/// Relationship type ID
pub type TypeId = u32;

/// Property key ID
pub type KeyId = u32;

/// Convert a raw pointer into an optional reference
#[inline]
pub fn link(ptr: u64) -> Option<u64> {
    (ptr != NULL_REF).then_some(ptr)
}

/// Every kind of record the checker can report against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    /// Node record
    Node,
    /// Relationship record
    Relationship,
    /// Relationship group record
    RelationshipGroup,
    /// Property record
    Property,
    /// Dynamic (overflow) block
    DynamicRecord,
    /// Label name token
    LabelToken,
    /// Relationship type name token
    RelationshipTypeToken,
    /// Property key name token
    PropertyKeyToken,
    /// Schema rule record
    SchemaRule,
    /// Synthetic index entry
    IndexEntry,
    /// Synthetic counts entry
    CountsEntry,
    /// Synthetic label / relationship type scan document
    ScanDocument,
}

impl RecordCategory {
    /// All categories, in pass order
    pub const ALL: [RecordCategory; 12] = [
        RecordCategory::SchemaRule,
        RecordCategory::LabelToken,
        RecordCategory::RelationshipTypeToken,
        RecordCategory::PropertyKeyToken,
        RecordCategory::Node,
        RecordCategory::Relationship,
        RecordCategory::RelationshipGroup,
        RecordCategory::Property,
        RecordCategory::DynamicRecord,
        RecordCategory::IndexEntry,
        RecordCategory::ScanDocument,
        RecordCategory::CountsEntry,
    ];

    /// Token category for a token kind
    pub fn for_token(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Label => RecordCategory::LabelToken,
            TokenKind::RelationshipType => RecordCategory::RelationshipTypeToken,
            TokenKind::PropertyKey => RecordCategory::PropertyKeyToken,
        }
    }

    /// Token kind of a token category
    pub fn token_kind(self) -> Option<TokenKind> {
        match self {
            RecordCategory::LabelToken => Some(TokenKind::Label),
            RecordCategory::RelationshipTypeToken => Some(TokenKind::RelationshipType),
            RecordCategory::PropertyKeyToken => Some(TokenKind::PropertyKey),
            _ => None,
        }
    }
}

/// Entity kinds that can own properties, labels/types and index entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Node entity
    Node,
    /// Relationship entity
    Relationship,
}

impl EntityKind {
    /// Record category of this entity kind
    pub fn category(self) -> RecordCategory {
        match self {
            EntityKind::Node => RecordCategory::Node,
            EntityKind::Relationship => RecordCategory::Relationship,
        }
    }
}

/// Token stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Node labels
    Label,
    /// Relationship types
    RelationshipType,
    /// Property keys
    PropertyKey,
}

impl TokenKind {
    /// All token kinds
    pub const ALL: [TokenKind; 3] = [
        TokenKind::Label,
        TokenKind::RelationshipType,
        TokenKind::PropertyKey,
    ];

    /// Dynamic store holding the names of this token kind
    pub fn name_store(self) -> DynamicStoreKind {
        match self {
            TokenKind::Label => DynamicStoreKind::LabelName,
            TokenKind::RelationshipType => DynamicStoreKind::RelationshipTypeName,
            TokenKind::PropertyKey => DynamicStoreKind::PropertyKeyName,
        }
    }
}

/// Dynamic (overflow) stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicStoreKind {
    /// Long string property values
    String,
    /// Array property values
    Array,
    /// Node label sets too large to inline
    NodeLabels,
    /// Label token names
    LabelName,
    /// Relationship type token names
    RelationshipTypeName,
    /// Property key token names
    PropertyKeyName,
}

impl DynamicStoreKind {
    /// All dynamic stores
    pub const ALL: [DynamicStoreKind; 6] = [
        DynamicStoreKind::String,
        DynamicStoreKind::Array,
        DynamicStoreKind::NodeLabels,
        DynamicStoreKind::LabelName,
        DynamicStoreKind::RelationshipTypeName,
        DynamicStoreKind::PropertyKeyName,
    ];

    /// Default payload capacity of one block in this store
    pub fn default_block_size(self) -> usize {
        match self {
            DynamicStoreKind::String | DynamicStoreKind::Array => 120,
            DynamicStoreKind::NodeLabels => 60,
            DynamicStoreKind::LabelName
            | DynamicStoreKind::RelationshipTypeName
            | DynamicStoreKind::PropertyKeyName => 30,
        }
    }
}

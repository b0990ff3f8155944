//! Store access contract
//!
//! The checker and the scan never touch pages or files; they read typed
//! record snapshots through [`StoreAccess`]. Reading an id at or beyond a
//! store's high id yields an unused record, the same as reading a freed slot.
//!
//! [`MemoryStore`] is the in-memory implementation used by tests and tools,
//! and [`TxState`] holds the uncommitted node additions seen by the scan.

mod memory;
mod read;
mod tx_state;

pub use memory::{MAX_PUT_ID, MemoryStore};
pub use read::{ChainStep, DynamicChain, read_dynamic_chain, read_entity_values, resolve_value};
pub use tx_state::TxState;

use crate::error::Result;
use crate::record::{
    CountsEntry, DynamicRecord, DynamicStoreKind, EntityKind, IndexEntry, NodeRecord,
    PropertyRecord, RelationshipGroupRecord, RelationshipRecord, SchemaRecord, TokenKind,
    TokenRecord, TokenScanDocument, Value,
};
use crate::scan::AllNodeScan;
use serde::{Deserialize, Serialize};

/// Physical record stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFile {
    /// nodes.store
    Nodes,
    /// rels.store
    Relationships,
    /// groups.store
    RelationshipGroups,
    /// props.store
    Properties,
    /// schema.store
    Schema,
    /// Token stores
    Tokens(TokenKind),
    /// Dynamic stores
    Dynamic(DynamicStoreKind),
}

/// Read-only view over the record stores and their secondary structures
pub trait StoreAccess: Send + Sync {
    /// One past the highest id ever used in a store
    fn high_id(&self, file: StoreFile) -> u64;

    /// Payload capacity of one block of a dynamic store
    fn block_size(&self, store: DynamicStoreKind) -> usize {
        store.default_block_size()
    }

    /// Read a node record
    fn node(&self, id: u64) -> Result<NodeRecord>;

    /// Read a relationship record
    fn relationship(&self, id: u64) -> Result<RelationshipRecord>;

    /// Read a relationship group record
    fn group(&self, id: u64) -> Result<RelationshipGroupRecord>;

    /// Read a property record
    fn property(&self, id: u64) -> Result<PropertyRecord>;

    /// Read a block of a dynamic store
    fn dynamic(&self, store: DynamicStoreKind, id: u64) -> Result<DynamicRecord>;

    /// Read a token record
    fn token(&self, kind: TokenKind, id: u32) -> Result<TokenRecord>;

    /// Read a schema record
    fn schema(&self, id: u64) -> Result<SchemaRecord>;

    /// Batch reservation over every committed node
    fn all_node_scan(&self) -> Box<dyn AllNodeScan + '_>;

    /// Every entry of an index
    fn index_entries(&self, index: u64) -> Result<Vec<IndexEntry>>;

    /// Entities an index lists for exactly `values` (one id per entry)
    fn index_lookup(&self, index: u64, values: &[Value]) -> Result<Vec<u64>>;

    /// Whether an index was left dirty by an unclean shutdown
    fn index_is_dirty(&self, index: u64) -> Result<bool>;

    /// Every document of the label (nodes) or type (relationships) scan store
    fn scan_documents(&self, kind: EntityKind) -> Result<Vec<TokenScanDocument>>;

    /// Whether the scan store lists `token` for `entity`
    fn scan_contains(&self, kind: EntityKind, entity: u64, token: u32) -> Result<bool>;

    /// Whether a scan store was left dirty by an unclean shutdown
    fn scan_is_dirty(&self, kind: EntityKind) -> Result<bool>;

    /// Every count held by the counts store
    fn stored_counts(&self) -> Result<Vec<CountsEntry>>;
}

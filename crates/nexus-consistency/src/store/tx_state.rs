//! Uncommitted node changes of one transaction

use crate::record::NodeRecord;
use std::collections::{BTreeMap, BTreeSet};

/// Pending node additions and removals
///
/// Additions are kept ordered by id so a scan snapshot is deterministic.
#[derive(Debug, Clone, Default)]
pub struct TxState {
    added: BTreeMap<u64, NodeRecord>,
    removed: BTreeSet<u64>,
}

impl TxState {
    /// Empty transaction state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node created by the transaction
    pub fn add_node(&mut self, record: NodeRecord) {
        self.removed.remove(&record.id);
        self.added.insert(record.id, record);
    }

    /// Record a node deleted by the transaction
    ///
    /// Deleting a node the transaction created just forgets the addition.
    pub fn remove_node(&mut self, id: u64) {
        if self.added.remove(&id).is_none() {
            self.removed.insert(id);
        }
    }

    /// Ids of pending additions, ascending
    pub fn added_ids(&self) -> Vec<u64> {
        self.added.keys().copied().collect()
    }

    /// Pending addition by id
    pub fn added_node(&self, id: u64) -> Option<&NodeRecord> {
        self.added.get(&id)
    }

    /// Whether the transaction deleted a committed node
    pub fn is_removed(&self, id: u64) -> bool {
        self.removed.contains(&id)
    }

    /// Whether any node was added
    pub fn has_additions(&self) -> bool {
        !self.added.is_empty()
    }

    /// Number of pending additions
    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

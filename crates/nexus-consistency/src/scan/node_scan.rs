//! Batch reservation over committed nodes plus pending additions

use super::AllNodeScan;
use crate::error::{Error, Result};
use crate::record::NodeRecord;
use crate::store::{StoreAccess, TxState};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// [`AllNodeScan`] over `[0, high_id)` with one atomic cursor
pub struct StoreNodeScan {
    next: AtomicU64,
    high_id: u64,
}

impl StoreNodeScan {
    /// Scan over every id below `high_id`
    pub fn new(high_id: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            high_id,
        }
    }
}

impl AllNodeScan for StoreNodeScan {
    fn reserve(&self, size_hint: usize) -> Option<Range<u64>> {
        let hint = size_hint as u64;
        let start = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |start| {
                (start < self.high_id).then(|| start.saturating_add(hint).min(self.high_id))
            })
            .ok()?;
        Some(start..start.saturating_add(hint).min(self.high_id))
    }
}

/// Shared scan over committed nodes and a transaction's pending additions
pub struct NodeCursorScan<'a> {
    base: Box<dyn AllNodeScan + 'a>,
    added: Vec<u64>,
    added_offset: AtomicUsize,
    added_consumed: AtomicBool,
}

impl<'a> NodeCursorScan<'a> {
    /// Scan `base` plus the additions pending in `tx` right now
    ///
    /// Additions made to `tx` later are not visible to this scan.
    pub fn new(base: Box<dyn AllNodeScan + 'a>, tx: &'a TxState) -> Self {
        let added = tx.added_ids();
        Self {
            base,
            added_consumed: AtomicBool::new(added.is_empty()),
            added,
            added_offset: AtomicUsize::new(0),
        }
    }

    /// Number of pending additions in the snapshot
    pub fn pending_count(&self) -> usize {
        self.added.len()
    }

    /// Reserve the next batch of at most `size_hint` ids into `cursor`
    ///
    /// Returns `Ok(false)` once both the pending additions and the base
    /// store are exhausted.
    pub fn reserve_batch(&self, cursor: &mut NodeCursor<'_>, size_hint: usize) -> Result<bool> {
        if size_hint == 0 {
            return Err(Error::invalid_argument("batch size hint must be positive"));
        }

        let mut remaining = size_hint;
        let mut pending: &[u64] = &[];
        if !self.added_consumed.load(Ordering::Acquire) {
            let start = self.added_offset.fetch_add(size_hint, Ordering::AcqRel);
            if start < self.added.len() {
                let batch = size_hint.min(self.added.len() - start);
                pending = &self.added[start..start + batch];
                remaining -= batch;
            } else {
                self.added_consumed.store(true, Ordering::Release);
            }
        }

        let base = if remaining > 0 {
            self.base.reserve(remaining).unwrap_or(0..0)
        } else {
            0..0
        };

        tracing::debug!(
            pending = pending.len(),
            base_start = base.start,
            base_end = base.end,
            "reserved node scan batch"
        );
        let reserved = !pending.is_empty() || !base.is_empty();
        cursor.reset(pending.to_vec(), base);
        Ok(reserved)
    }
}

/// Per-thread cursor over one reserved batch
pub struct NodeCursor<'a> {
    store: &'a dyn StoreAccess,
    tx: &'a TxState,
    pending: Vec<u64>,
    pending_pos: usize,
    base: Range<u64>,
    current: Option<NodeRecord>,
}

impl<'a> NodeCursor<'a> {
    /// Empty cursor reading committed records from `store`
    pub fn new(store: &'a dyn StoreAccess, tx: &'a TxState) -> Self {
        Self {
            store,
            tx,
            pending: Vec::new(),
            pending_pos: 0,
            base: 0..0,
            current: None,
        }
    }

    fn reset(&mut self, pending: Vec<u64>, base: Range<u64>) {
        self.pending = pending;
        self.pending_pos = 0;
        self.base = base;
        self.current = None;
    }

    /// Move to the next visible node of the batch
    ///
    /// Skips committed slots that are not in use and nodes the transaction
    /// deleted.
    pub fn advance(&mut self) -> Result<bool> {
        while let Some(id) = self.pending.get(self.pending_pos).copied() {
            self.pending_pos += 1;
            if let Some(record) = self.tx.added_node(id) {
                self.current = Some(record.clone());
                return Ok(true);
            }
        }
        while let Some(id) = self.base.next() {
            if self.tx.is_removed(id) {
                continue;
            }
            let record = self.store.node(id)?;
            if record.in_use {
                self.current = Some(record);
                return Ok(true);
            }
        }
        self.current = None;
        Ok(false)
    }

    /// Node the cursor is positioned on
    pub fn node(&self) -> Option<&NodeRecord> {
        self.current.as_ref()
    }

    /// Id of the node the cursor is positioned on
    pub fn node_id(&self) -> Option<u64> {
        self.current.as_ref().map(|node| node.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn drain(scan: &NodeCursorScan<'_>, cursor: &mut NodeCursor<'_>, hint: usize) -> Vec<u64> {
        let mut seen = Vec::new();
        while scan.reserve_batch(cursor, hint).unwrap() {
            while cursor.advance().unwrap() {
                seen.extend(cursor.node_id());
            }
        }
        seen
    }

    #[test]
    fn test_store_scan_reservations_cover_range() {
        let scan = StoreNodeScan::new(10);
        assert_eq!(scan.reserve(4), Some(0..4));
        assert_eq!(scan.reserve(4), Some(4..8));
        assert_eq!(scan.reserve(4), Some(8..10));
        assert_eq!(scan.reserve(4), None);
    }

    #[test]
    fn test_pending_first_then_base() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store.create_node(&[]).unwrap();
        }
        let mut tx = TxState::new();
        tx.add_node(NodeRecord::new(5));
        tx.add_node(NodeRecord::new(6));

        let scan = NodeCursorScan::new(store.all_node_scan(), &tx);
        let mut cursor = NodeCursor::new(&store, &tx);

        assert!(scan.reserve_batch(&mut cursor, 3).unwrap());
        let mut first = Vec::new();
        while cursor.advance().unwrap() {
            first.extend(cursor.node_id());
        }
        assert_eq!(first, vec![5, 6, 0]);

        let rest = drain(&scan, &mut cursor, 3);
        assert_eq!(rest, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_size_hint_is_rejected() {
        let store = MemoryStore::new();
        let tx = TxState::new();
        let scan = NodeCursorScan::new(store.all_node_scan(), &tx);
        let mut cursor = NodeCursor::new(&store, &tx);
        assert!(matches!(
            scan.reserve_batch(&mut cursor, 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_skips_unused_and_removed() {
        let store = MemoryStore::new();
        for _ in 0..4 {
            store.create_node(&[]).unwrap();
        }
        store.put_node(NodeRecord::unused(1)).unwrap();
        let mut tx = TxState::new();
        tx.remove_node(2);

        let scan = NodeCursorScan::new(store.all_node_scan(), &tx);
        let mut cursor = NodeCursor::new(&store, &tx);
        assert_eq!(drain(&scan, &mut cursor, 10), vec![0, 3]);
    }

    #[test]
    fn test_later_additions_are_invisible() {
        let store = MemoryStore::new();
        let mut tx = TxState::new();
        tx.add_node(NodeRecord::new(0));
        let snapshot = tx.clone();
        let scan = NodeCursorScan::new(store.all_node_scan(), &snapshot);
        tx.add_node(NodeRecord::new(1));

        assert_eq!(scan.pending_count(), 1);
        let mut cursor = NodeCursor::new(&store, &snapshot);
        assert_eq!(drain(&scan, &mut cursor, 8), vec![0]);
    }
}

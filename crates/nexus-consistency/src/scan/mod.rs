//! Concurrent node scan
//!
//! Many threads iterate "all nodes" together: each repeatedly reserves a
//! batch into its own [`NodeCursor`] and drains it. Pending transaction
//! additions are handed out first, from a snapshot taken when the scan is
//! created; once they are used up every reservation goes to the committed
//! store. Every id is handed to exactly one batch.
//!
//! [`RelationshipCache`] covers the second half of the read path: iterating a
//! node's relationships of one type while writers add new types.

mod node_scan;
mod relationships;

pub use node_scan::{NodeCursor, NodeCursorScan, StoreNodeScan};
pub use relationships::{RelationshipCache, SchedulingPoint, TypedBucket, TypedRelationships};

use std::ops::Range;

/// Batch reservation over the committed node store
///
/// Implementations synchronise internally; `reserve` is called from many
/// threads at once and must never hand out an id twice.
pub trait AllNodeScan: Send + Sync {
    /// Reserve up to `size_hint` ids, `None` once the store is exhausted
    fn reserve(&self, size_hint: usize) -> Option<Range<u64>>;
}

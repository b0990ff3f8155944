//! Type-local relationship iteration under concurrent writers
//!
//! A node's relationships are bucketed by type and direction in a
//! copy-on-write array.
//! Writers build a new array and publish it; readers load the current
//! array once per step and bound every index by that array's own length.
//! A reader therefore never combines a length read from one publication
//! with an array from another.

use crate::error::Result;
use crate::record::{GroupDirection, NULL_REF, RelationshipHead, TypeId, link};
use crate::store::StoreAccess;
use parking_lot::{Mutex, RwLock};
use roaring::RoaringTreemap;
use std::sync::Arc;

/// Relationships of one type and direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedBucket {
    /// Relationship type
    pub rel_type: TypeId,
    /// Direction seen from the cached node
    pub direction: GroupDirection,
    /// Relationship ids, in insertion order
    pub relationships: Vec<u64>,
}

impl TypedBucket {
    fn holds(&self, rel_type: TypeId, direction: GroupDirection) -> bool {
        self.rel_type == rel_type && self.direction == direction
    }
}

type Buckets = Arc<Vec<Arc<TypedBucket>>>;

/// Hook fired each time an iterator has loaded the bucket array
pub trait SchedulingPoint: Send + Sync {
    /// Called with the length of the array just loaded
    fn observed(&self, buckets: usize);
}

/// Relationships of one node, bucketed by type and direction
pub struct RelationshipCache {
    node: u64,
    buckets: RwLock<Buckets>,
    writer: Mutex<()>,
}

impl RelationshipCache {
    /// Empty cache for `node`
    pub fn new(node: u64) -> Self {
        Self {
            node,
            buckets: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(()),
        }
    }

    /// Cache filled from the node's chain or groups in `store`
    pub fn load(store: &dyn StoreAccess, node: u64) -> Result<Self> {
        let cache = Self::new(node);
        let record = store.node(node)?;
        let mut visited = RoaringTreemap::new();

        let mut visit_chain = |first: u64, cache: &Self| -> Result<()> {
            let mut current = link(first);
            while let Some(id) = current {
                if !visited.insert(id) {
                    break;
                }
                let rel = store.relationship(id)?;
                if !rel.in_use {
                    break;
                }
                if let Some(direction) = rel.direction_for(node) {
                    cache.add(rel.rel_type, direction, id);
                }
                current = rel.next_for(node).and_then(link);
            }
            Ok(())
        };

        match record.relationships {
            RelationshipHead::None => {}
            RelationshipHead::Chain(first) => visit_chain(first, &cache)?,
            RelationshipHead::Groups(first) => {
                let mut groups = RoaringTreemap::new();
                let mut current = link(first);
                while let Some(id) = current {
                    if !groups.insert(id) {
                        break;
                    }
                    let group = store.group(id)?;
                    if !group.in_use {
                        break;
                    }
                    for head in [group.first_out, group.first_in, group.first_loop] {
                        if head != NULL_REF {
                            visit_chain(head, &cache)?;
                        }
                    }
                    current = group.next_group();
                }
            }
        }
        Ok(cache)
    }

    /// Node this cache belongs to
    pub fn node(&self) -> u64 {
        self.node
    }

    /// Current bucket array
    pub fn snapshot(&self) -> Arc<Vec<Arc<TypedBucket>>> {
        Arc::clone(&self.buckets.read())
    }

    /// Add a relationship, creating its bucket when the type and direction are new
    pub fn add(&self, rel_type: TypeId, direction: GroupDirection, relationship: u64) {
        let _writer = self.writer.lock();
        let current = self.snapshot();
        let mut next: Vec<Arc<TypedBucket>> = current.as_ref().clone();
        match next.iter().position(|b| b.holds(rel_type, direction)) {
            Some(index) => {
                let mut bucket = next[index].as_ref().clone();
                bucket.relationships.push(relationship);
                next[index] = Arc::new(bucket);
            }
            None => next.push(Arc::new(TypedBucket {
                rel_type,
                direction,
                relationships: vec![relationship],
            })),
        }
        *self.buckets.write() = Arc::new(next);
    }

    /// Types present, in order of first appearance
    pub fn types(&self) -> Vec<TypeId> {
        let mut types = Vec::new();
        for bucket in self.snapshot().iter() {
            if !types.contains(&bucket.rel_type) {
                types.push(bucket.rel_type);
            }
        }
        types
    }

    /// Number of relationships across every bucket
    pub fn len(&self) -> usize {
        self.snapshot().iter().map(|b| b.relationships.len()).sum()
    }

    /// Whether the node has no cached relationships
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the relationships of one type and direction
    pub fn relationships(
        &self,
        rel_type: TypeId,
        direction: GroupDirection,
    ) -> TypedRelationships<'_> {
        TypedRelationships::new(self, rel_type, only(direction))
    }

    /// Iterate the relationships of one type: outgoing, then incoming, then loops
    pub fn relationships_of_type(&self, rel_type: TypeId) -> TypedRelationships<'_> {
        TypedRelationships::new(self, rel_type, &GroupDirection::ALL)
    }
}

fn only(direction: GroupDirection) -> &'static [GroupDirection] {
    match direction {
        GroupDirection::Outgoing => &[GroupDirection::Outgoing],
        GroupDirection::Incoming => &[GroupDirection::Incoming],
        GroupDirection::Loop => &[GroupDirection::Loop],
    }
}

/// Iterator over one type's relationships of a [`RelationshipCache`]
///
/// Buckets are read one direction at a time. Relationships added to a bucket
/// while iterating may or may not be seen; every id yielded has the requested
/// type and one of the requested directions.
pub struct TypedRelationships<'c> {
    cache: &'c RelationshipCache,
    rel_type: TypeId,
    directions: &'static [GroupDirection],
    bucket_index: Option<usize>,
    position: usize,
    hook: Option<Arc<dyn SchedulingPoint>>,
}

impl<'c> TypedRelationships<'c> {
    fn new(
        cache: &'c RelationshipCache,
        rel_type: TypeId,
        directions: &'static [GroupDirection],
    ) -> Self {
        Self {
            cache,
            rel_type,
            directions,
            bucket_index: None,
            position: 0,
            hook: None,
        }
    }

    /// Fire `hook` every time the iterator loads the bucket array
    pub fn with_scheduling_point(mut self, hook: Arc<dyn SchedulingPoint>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn next_direction(&mut self) {
        self.directions = self.directions.get(1..).unwrap_or_default();
        self.bucket_index = None;
        self.position = 0;
    }
}

impl Iterator for TypedRelationships<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        loop {
            let direction = *self.directions.first()?;
            let buckets = self.cache.snapshot();
            if let Some(hook) = &self.hook {
                hook.observed(buckets.len());
            }

            // The index is only trusted against the array it was just loaded with
            let found = match self.bucket_index {
                Some(index)
                    if index < buckets.len() && buckets[index].holds(self.rel_type, direction) =>
                {
                    Some(index)
                }
                _ => buckets
                    .iter()
                    .position(|b| b.holds(self.rel_type, direction)),
            };
            let Some(index) = found else {
                self.next_direction();
                continue;
            };
            self.bucket_index = Some(index);

            match buckets[index].relationships.get(self.position) {
                Some(&id) => {
                    self.position += 1;
                    return Some(id);
                }
                None => self.next_direction(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TokenKind;
    use crate::store::MemoryStore;

    const OUT: GroupDirection = GroupDirection::Outgoing;
    const IN: GroupDirection = GroupDirection::Incoming;

    #[test]
    fn test_add_buckets_by_type() {
        let cache = RelationshipCache::new(0);
        cache.add(2, OUT, 10);
        cache.add(1, OUT, 11);
        cache.add(2, OUT, 12);

        assert_eq!(cache.types(), vec![2, 1]);
        assert_eq!(cache.relationships_of_type(2).collect::<Vec<_>>(), vec![10, 12]);
        assert_eq!(cache.relationships_of_type(1).collect::<Vec<_>>(), vec![11]);
        assert_eq!(cache.relationships_of_type(7).count(), 0);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_directions_are_separate_buckets() {
        let cache = RelationshipCache::new(0);
        cache.add(1, IN, 20);
        cache.add(1, OUT, 21);
        cache.add(1, GroupDirection::Loop, 22);
        cache.add(1, IN, 23);
        cache.add(2, OUT, 24);

        assert_eq!(cache.snapshot().len(), 4);
        assert_eq!(cache.types(), vec![1, 2]);
        assert_eq!(cache.relationships(1, OUT).collect::<Vec<_>>(), vec![21]);
        assert_eq!(cache.relationships(1, IN).collect::<Vec<_>>(), vec![20, 23]);
        assert_eq!(cache.relationships(2, IN).count(), 0);
        assert_eq!(
            cache.relationships_of_type(1).collect::<Vec<_>>(),
            vec![21, 20, 23, 22]
        );
    }

    #[test]
    fn test_old_snapshots_are_unchanged() {
        let cache = RelationshipCache::new(0);
        cache.add(0, OUT, 1);
        let before = cache.snapshot();
        cache.add(0, OUT, 2);
        cache.add(1, OUT, 3);
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].relationships, vec![1]);
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[test]
    fn test_load_from_store_chains() {
        let store = MemoryStore::with_dense_threshold(3);
        let a = store.create_token(TokenKind::RelationshipType, "A").unwrap();
        let b = store.create_token(TokenKind::RelationshipType, "B").unwrap();
        let hub = store.create_node(&[]).unwrap();
        let leaf = store.create_node(&[]).unwrap();
        for i in 0..6 {
            let t = if i % 2 == 0 { a } else { b };
            store.create_relationship(hub, leaf, t).unwrap();
        }
        store.create_relationship(hub, hub, a).unwrap();

        let dense = RelationshipCache::load(&store, hub).unwrap();
        assert_eq!(dense.len(), 7);
        assert_eq!(dense.relationships_of_type(a).count(), 4);
        assert_eq!(dense.relationships(a, OUT).count(), 3);
        assert_eq!(dense.relationships(a, GroupDirection::Loop).count(), 1);

        let leaf_cache = RelationshipCache::load(&store, leaf).unwrap();
        assert_eq!(leaf_cache.relationships_of_type(b).count(), 3);
        assert_eq!(leaf_cache.relationships(b, IN).count(), 3);
        assert_eq!(leaf_cache.relationships(b, OUT).count(), 0);
    }
}

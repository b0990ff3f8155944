//! Tolerant chain readers
//!
//! These follow chains that may be corrupt: every walk is bounded by the
//! store's high id and a visited set, and stops at the first block that is
//! not in use instead of failing.

use super::{StoreAccess, StoreFile};
use crate::error::Result;
use crate::record::{BlockValue, DynamicRecord, DynamicStoreKind, KeyId, Value};
use roaring::RoaringTreemap;
use std::collections::BTreeMap;

/// How a chain walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStep {
    /// Reached a NULL next pointer
    Complete,
    /// Reached a block that is not in use
    NotInUse(u64),
    /// Came back to an already visited block
    Cycle(u64),
    /// Walked more blocks than the store holds
    Overrun,
}

/// Blocks of a dynamic chain read up to the first problem
#[derive(Debug, Clone)]
pub struct DynamicChain {
    /// In-use blocks, in chain order
    pub blocks: Vec<DynamicRecord>,
    /// Why the walk stopped
    pub end: ChainStep,
}

impl DynamicChain {
    /// The walk reached the end of the chain
    pub fn is_complete(&self) -> bool {
        self.end == ChainStep::Complete
    }

    /// Concatenated payload of the blocks read
    pub fn bytes(&self) -> Vec<u8> {
        self.blocks.iter().flat_map(|b| b.data.iter().copied()).collect()
    }
}

/// Follow a dynamic chain starting at `first`
pub fn read_dynamic_chain(
    store: &dyn StoreAccess,
    kind: DynamicStoreKind,
    first: u64,
) -> Result<DynamicChain> {
    let bound = store.high_id(StoreFile::Dynamic(kind));
    let mut visited = RoaringTreemap::new();
    let mut blocks = Vec::new();
    let mut current = Some(first);

    while let Some(id) = current {
        if visited.contains(id) {
            return Ok(DynamicChain {
                blocks,
                end: ChainStep::Cycle(id),
            });
        }
        if visited.len() > bound {
            return Ok(DynamicChain {
                blocks,
                end: ChainStep::Overrun,
            });
        }
        visited.insert(id);

        let block = store.dynamic(kind, id)?;
        if !block.in_use {
            return Ok(DynamicChain {
                blocks,
                end: ChainStep::NotInUse(id),
            });
        }
        current = block.next_block();
        blocks.push(block);
    }

    Ok(DynamicChain {
        blocks,
        end: ChainStep::Complete,
    })
}

/// Decode a property block value, `None` when it cannot be decoded
pub fn resolve_value(store: &dyn StoreAccess, value: &BlockValue) -> Result<Option<Value>> {
    let decoded = match value {
        BlockValue::Inline(value) => Some(value.clone()),
        BlockValue::String { first_block } => {
            let chain = read_dynamic_chain(store, DynamicStoreKind::String, *first_block)?;
            if chain.is_complete() {
                Value::decode_string(&chain.bytes())
            } else {
                None
            }
        }
        BlockValue::Array { first_block } => {
            let chain = read_dynamic_chain(store, DynamicStoreKind::Array, *first_block)?;
            if chain.is_complete() {
                Value::decode_int_array(&chain.bytes())
            } else {
                None
            }
        }
        BlockValue::Invalid { .. } => None,
    };
    Ok(decoded)
}

/// Decoded property values of an entity; the first occurrence of a key wins
pub fn read_entity_values(
    store: &dyn StoreAccess,
    first_property: Option<u64>,
) -> Result<BTreeMap<KeyId, Value>> {
    let bound = store.high_id(StoreFile::Properties);
    let mut visited = RoaringTreemap::new();
    let mut values = BTreeMap::new();
    let mut current = first_property;

    while let Some(id) = current {
        if visited.contains(id) || visited.len() > bound {
            break;
        }
        visited.insert(id);

        let record = store.property(id)?;
        if !record.in_use {
            break;
        }
        for block in &record.blocks {
            if values.contains_key(&block.key) {
                continue;
            }
            if let Some(value) = resolve_value(store, &block.value)? {
                values.insert(block.key, value);
            }
        }
        current = record.next_record();
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PropertyBlock, PropertyRecord, TokenKind};
    use crate::store::MemoryStore;

    #[test]
    fn test_chain_cycle_stops() {
        let store = MemoryStore::new();
        let mut a = DynamicRecord::new(0, vec![1; 120]);
        a.next = 1;
        let mut b = DynamicRecord::new(1, vec![2; 10]);
        b.next = 0;
        store.put_dynamic(DynamicStoreKind::String, a).unwrap();
        store.put_dynamic(DynamicStoreKind::String, b).unwrap();

        let chain = read_dynamic_chain(&store, DynamicStoreKind::String, 0).unwrap();
        assert_eq!(chain.end, ChainStep::Cycle(0));
        assert_eq!(chain.blocks.len(), 2);
    }

    #[test]
    fn test_chain_stops_at_unused() {
        let store = MemoryStore::new();
        let mut a = DynamicRecord::new(0, vec![1; 120]);
        a.next = 5;
        store.put_dynamic(DynamicStoreKind::Array, a).unwrap();

        let chain = read_dynamic_chain(&store, DynamicStoreKind::Array, 0).unwrap();
        assert_eq!(chain.end, ChainStep::NotInUse(5));
        assert!(!chain.is_complete());
    }

    #[test]
    fn test_entity_values_resolve_dynamic_strings() {
        let store = MemoryStore::new();
        let key = store.create_token(TokenKind::PropertyKey, "bio").unwrap();
        let node = store.create_node(&[]).unwrap();
        let long = "x".repeat(300);
        store
            .set_property(crate::record::EntityKind::Node, node, key, Value::String(long.clone()))
            .unwrap();

        let record = store.node(node).unwrap();
        let values = read_entity_values(&store, record.first_property()).unwrap();
        assert_eq!(values.get(&key), Some(&Value::String(long)));
    }

    #[test]
    fn test_entity_values_first_key_wins() {
        let store = MemoryStore::new();
        let mut first = PropertyRecord::new(0, vec![PropertyBlock::inline(1, Value::Int(1))]);
        first.next = 1;
        let mut second = PropertyRecord::new(1, vec![PropertyBlock::inline(1, Value::Int(2))]);
        second.prev = 0;
        store.put_property(first).unwrap();
        store.put_property(second).unwrap();

        let values = read_entity_values(&store, Some(0)).unwrap();
        assert_eq!(values.get(&1), Some(&Value::Int(1)));
    }
}

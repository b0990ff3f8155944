//! In-memory record stores
//!
//! `MemoryStore` keeps every store as a vector of record snapshots behind one
//! `RwLock`. The writer API (`create_*`, `set_property`, `delete_*`) keeps all
//! chains, groups, indexes, scan stores and counts consistent with each other.
//! The `put_*` operations overwrite single records with no bookkeeping and are
//! how tests inject corruption.

use super::{StoreAccess, StoreFile};
use crate::error::{Error, Result};
use crate::record::{
    BlockValue, ConstraintKind, ConstraintRule, CountsEntry, CountsKey, DynamicRecord,
    DynamicStoreKind, EntityKind, GroupDirection, IndexEntry, IndexKind, IndexRule, IndexState,
    KeyId, LabelField, LabelId, NULL_REF, NodeRecord, PROPERTY_BLOCKS_PER_RECORD, PropertyBlock,
    PropertyRecord, RelationshipGroupRecord, RelationshipHead, RelationshipRecord,
    SchemaDescriptor, SchemaRecord, SchemaRule, TokenKind, TokenRecord, TokenScanDocument,
    TypeId, Value, link,
};
use crate::scan::{AllNodeScan, StoreNodeScan};
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Strings up to this many bytes are stored inline in the property block
pub const SHORT_STRING_MAX: usize = 24;

/// Default relationship count above which a node switches to groups
pub const DEFAULT_DENSE_THRESHOLD: usize = 50;

/// Raw `put_*` writes are limited to ids below this
pub const MAX_PUT_ID: u64 = 1 << 24;

#[derive(Debug, Default)]
struct IndexData {
    entries: Vec<IndexEntry>,
    dirty: bool,
}

#[derive(Debug, Default)]
struct ScanData {
    documents: BTreeMap<u64, RoaringBitmap>,
    dirty: bool,
}

#[derive(Debug, Default)]
struct Tables {
    nodes: Vec<NodeRecord>,
    relationships: Vec<RelationshipRecord>,
    groups: Vec<RelationshipGroupRecord>,
    properties: Vec<PropertyRecord>,
    dynamic: HashMap<DynamicStoreKind, Vec<DynamicRecord>>,
    tokens: HashMap<TokenKind, Vec<TokenRecord>>,
    schema: Vec<SchemaRecord>,
    indexes: BTreeMap<u64, IndexData>,
    scans: HashMap<EntityKind, ScanData>,
    counts: BTreeMap<CountsKey, u64>,
    failures: HashSet<(StoreFile, u64)>,
}

fn slot<T: Clone>(records: &[T], id: u64, unused: impl FnOnce(u64) -> T) -> T {
    usize::try_from(id)
        .ok()
        .and_then(|index| records.get(index))
        .cloned()
        .unwrap_or_else(|| unused(id))
}

fn place<T>(
    records: &mut Vec<T>,
    id: u64,
    record: T,
    unused: impl Fn(u64) -> T,
) -> Result<()> {
    // Gaps up to `id` are filled with unused records
    let index = usize::try_from(id)
        .ok()
        .filter(|_| id < MAX_PUT_ID)
        .ok_or_else(|| {
            Error::invalid_argument(format!("record id {id} is above {MAX_PUT_ID}"))
        })?;
    while records.len() < index {
        let gap = records.len() as u64;
        records.push(unused(gap));
    }
    if index == records.len() {
        records.push(record);
    } else {
        records[index] = record;
    }
    Ok(())
}

fn entity_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Node => "node",
        EntityKind::Relationship => "relationship",
    }
}

impl Tables {
    fn node_mut(&mut self, id: u64) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(id as usize)
            .ok_or_else(|| Error::not_found(format!("node {id}")))
    }

    fn relationship_mut(&mut self, id: u64) -> Result<&mut RelationshipRecord> {
        self.relationships
            .get_mut(id as usize)
            .ok_or_else(|| Error::not_found(format!("relationship {id}")))
    }

    fn group_mut(&mut self, id: u64) -> Result<&mut RelationshipGroupRecord> {
        self.groups
            .get_mut(id as usize)
            .ok_or_else(|| Error::not_found(format!("relationship group {id}")))
    }

    fn property_mut(&mut self, id: u64) -> Result<&mut PropertyRecord> {
        self.properties
            .get_mut(id as usize)
            .ok_or_else(|| Error::not_found(format!("property {id}")))
    }

    fn token_in_use(&self, kind: TokenKind, id: u32) -> bool {
        self.tokens
            .get(&kind)
            .and_then(|tokens| tokens.get(id as usize))
            .is_some_and(|token| token.in_use)
    }

    fn require_token(&self, kind: TokenKind, id: u32) -> Result<()> {
        if self.token_in_use(kind, id) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!("{kind:?} token {id} is not in use")))
        }
    }

    fn entity_in_use(&self, kind: EntityKind, id: u64) -> bool {
        match kind {
            EntityKind::Node => self.nodes.get(id as usize).is_some_and(|n| n.in_use),
            EntityKind::Relationship => {
                self.relationships.get(id as usize).is_some_and(|r| r.in_use)
            }
        }
    }

    fn require_entity(&self, kind: EntityKind, id: u64) -> Result<()> {
        if self.entity_in_use(kind, id) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "{} {id} is not in use",
                entity_name(kind)
            )))
        }
    }

    fn first_property_of(&self, kind: EntityKind, id: u64) -> u64 {
        match kind {
            EntityKind::Node => self.nodes[id as usize].first_property,
            EntityKind::Relationship => self.relationships[id as usize].first_property,
        }
    }

    fn set_first_property(&mut self, kind: EntityKind, id: u64, first: u64) {
        match kind {
            EntityKind::Node => self.nodes[id as usize].first_property = first,
            EntityKind::Relationship => self.relationships[id as usize].first_property = first,
        }
    }

    // Dynamic chains

    fn write_chain(&mut self, kind: DynamicStoreKind, bytes: &[u8]) -> u64 {
        let blocks = self.dynamic.entry(kind).or_default();
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(kind.default_block_size()).collect()
        };
        let first = blocks.len() as u64;
        for (offset, chunk) in chunks.iter().enumerate() {
            let id = first + offset as u64;
            let mut block = DynamicRecord::new(id, chunk.to_vec());
            if offset + 1 < chunks.len() {
                block.next = id + 1;
            }
            blocks.push(block);
        }
        first
    }

    fn chain_bytes(&self, kind: DynamicStoreKind, first: u64) -> Option<Vec<u8>> {
        let blocks = self.dynamic.get(&kind)?;
        let mut visited = HashSet::new();
        let mut bytes = Vec::new();
        let mut current = Some(first);
        while let Some(id) = current {
            if !visited.insert(id) {
                return None;
            }
            let block = blocks.get(id as usize).filter(|b| b.in_use)?;
            bytes.extend_from_slice(&block.data);
            current = block.next_block();
        }
        Some(bytes)
    }

    fn free_chain(&mut self, kind: DynamicStoreKind, first: u64) {
        let Some(blocks) = self.dynamic.get_mut(&kind) else {
            return;
        };
        let mut current = Some(first);
        while let Some(id) = current {
            match blocks.get_mut(id as usize) {
                Some(block) if block.in_use => {
                    current = block.next_block();
                    *block = DynamicRecord::unused(id);
                }
                _ => break,
            }
        }
    }

    // Labels

    fn node_labels(&self, node: &NodeRecord) -> Vec<LabelId> {
        match &node.labels {
            LabelField::Inline(labels) => labels.clone(),
            LabelField::Dynamic(first) => self
                .chain_bytes(DynamicStoreKind::NodeLabels, *first)
                .and_then(|bytes| LabelField::decode_dynamic(&bytes))
                .map(|(_, labels)| labels)
                .unwrap_or_default(),
        }
    }

    // Properties

    fn encode_value(&mut self, value: Value) -> BlockValue {
        match &value {
            Value::String(s) if s.len() > SHORT_STRING_MAX => BlockValue::String {
                first_block: self.write_chain(DynamicStoreKind::String, s.as_bytes()),
            },
            Value::IntArray(items) if !items.is_empty() => {
                let bytes = value.to_dynamic_bytes().unwrap_or_default();
                BlockValue::Array {
                    first_block: self.write_chain(DynamicStoreKind::Array, &bytes),
                }
            }
            _ => BlockValue::Inline(value),
        }
    }

    fn free_value(&mut self, value: &BlockValue) {
        match value {
            BlockValue::String { first_block } => {
                self.free_chain(DynamicStoreKind::String, *first_block)
            }
            BlockValue::Array { first_block } => {
                self.free_chain(DynamicStoreKind::Array, *first_block)
            }
            BlockValue::Inline(_) | BlockValue::Invalid { .. } => {}
        }
    }

    fn decode_value(&self, value: &BlockValue) -> Option<Value> {
        match value {
            BlockValue::Inline(value) => Some(value.clone()),
            BlockValue::String { first_block } => self
                .chain_bytes(DynamicStoreKind::String, *first_block)
                .and_then(|bytes| Value::decode_string(&bytes)),
            BlockValue::Array { first_block } => self
                .chain_bytes(DynamicStoreKind::Array, *first_block)
                .and_then(|bytes| Value::decode_int_array(&bytes)),
            BlockValue::Invalid { .. } => None,
        }
    }

    fn property_chain(&self, first: u64) -> Vec<u64> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = link(first);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            match self.properties.get(id as usize) {
                Some(record) if record.in_use => {
                    chain.push(id);
                    current = record.next_record();
                }
                _ => break,
            }
        }
        chain
    }

    fn entity_values(&self, kind: EntityKind, id: u64) -> BTreeMap<KeyId, Value> {
        let mut values = BTreeMap::new();
        for record_id in self.property_chain(self.first_property_of(kind, id)) {
            for block in &self.properties[record_id as usize].blocks {
                if values.contains_key(&block.key) {
                    continue;
                }
                if let Some(value) = self.decode_value(&block.value) {
                    values.insert(block.key, value);
                }
            }
        }
        values
    }

    fn set_property(&mut self, kind: EntityKind, id: u64, key: KeyId, value: Value) -> Result<()> {
        let first = self.first_property_of(kind, id);
        let chain = self.property_chain(first);

        for record_id in &chain {
            let position = self.properties[*record_id as usize]
                .blocks
                .iter()
                .position(|b| b.key == key);
            if let Some(position) = position {
                let encoded = self.encode_value(value);
                let record = self.property_mut(*record_id)?;
                let old = std::mem::replace(&mut record.blocks[position].value, encoded);
                self.free_value(&old);
                return Ok(());
            }
        }

        let encoded = self.encode_value(value);
        let block = PropertyBlock { key, value: encoded };
        if let Some(head) = link(first) {
            let record = self.property_mut(head)?;
            if record.blocks.len() < PROPERTY_BLOCKS_PER_RECORD {
                record.blocks.push(block);
                return Ok(());
            }
        }

        let new_id = self.properties.len() as u64;
        let mut record = PropertyRecord::new(new_id, vec![block]);
        if let Some(head) = link(first) {
            record.next = head;
            self.property_mut(head)?.prev = new_id;
        }
        self.properties.push(record);
        self.set_first_property(kind, id, new_id);
        Ok(())
    }

    fn remove_property(&mut self, kind: EntityKind, id: u64, key: KeyId) -> Result<bool> {
        let chain = self.property_chain(self.first_property_of(kind, id));
        for record_id in chain {
            let record = self.property_mut(record_id)?;
            let Some(position) = record.blocks.iter().position(|b| b.key == key) else {
                continue;
            };
            let removed = record.blocks.remove(position);
            let now_empty = record.blocks.is_empty();
            let (prev, next) = (record.prev, record.next);
            self.free_value(&removed.value);

            if now_empty {
                match link(prev) {
                    Some(prev) => self.property_mut(prev)?.next = next,
                    None => self.set_first_property(kind, id, next),
                }
                if let Some(next) = link(next) {
                    self.property_mut(next)?.prev = prev;
                }
                self.properties[record_id as usize] = PropertyRecord::unused(record_id);
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn free_properties(&mut self, kind: EntityKind, id: u64) {
        for record_id in self.property_chain(self.first_property_of(kind, id)) {
            let blocks = std::mem::take(&mut self.properties[record_id as usize].blocks);
            for block in &blocks {
                self.free_value(&block.value);
            }
            self.properties[record_id as usize] = PropertyRecord::unused(record_id);
        }
        self.set_first_property(kind, id, NULL_REF);
    }

    // Indexes and scan stores

    fn index_rules(&self, kind: EntityKind) -> Vec<(u64, SchemaDescriptor)> {
        self.schema
            .iter()
            .filter(|record| record.in_use)
            .filter_map(|record| record.index().map(|index| (record.id, index.schema.clone())))
            .filter(|(_, schema)| schema.entity == kind)
            .collect()
    }

    fn entity_has_token(&self, kind: EntityKind, id: u64, token: u32) -> bool {
        match kind {
            EntityKind::Node => {
                let node = &self.nodes[id as usize];
                self.node_labels(node).contains(&token)
            }
            EntityKind::Relationship => self.relationships[id as usize].rel_type == token,
        }
    }

    fn index_values(
        &self,
        kind: EntityKind,
        id: u64,
        schema: &SchemaDescriptor,
    ) -> Option<Vec<Value>> {
        if !self.entity_in_use(kind, id) || !self.entity_has_token(kind, id, schema.token) {
            return None;
        }
        let values = self.entity_values(kind, id);
        schema
            .properties
            .iter()
            .map(|key| values.get(key).cloned())
            .collect()
    }

    fn reindex_one(&mut self, index: u64, kind: EntityKind, id: u64, schema: &SchemaDescriptor) {
        let values = self.index_values(kind, id, schema);
        let data = self.indexes.entry(index).or_default();
        data.entries.retain(|entry| entry.entity != id);
        if let Some(values) = values {
            data.entries.push(IndexEntry {
                index,
                entity: id,
                values,
            });
        }
    }

    fn reindex(&mut self, kind: EntityKind, id: u64) {
        for (index, schema) in self.index_rules(kind) {
            self.reindex_one(index, kind, id, &schema);
        }
    }

    fn populate(&mut self, index: u64, schema: &SchemaDescriptor) {
        let high = match schema.entity {
            EntityKind::Node => self.nodes.len(),
            EntityKind::Relationship => self.relationships.len(),
        };
        for id in 0..high as u64 {
            self.reindex_one(index, schema.entity, id, schema);
        }
    }

    fn scan_add(&mut self, kind: EntityKind, id: u64, tokens: &[u32]) {
        if tokens.is_empty() {
            return;
        }
        let scan = self.scans.entry(kind).or_default();
        scan.documents.insert(id, tokens.iter().copied().collect());
    }

    fn scan_remove(&mut self, kind: EntityKind, id: u64) {
        if let Some(scan) = self.scans.get_mut(&kind) {
            scan.documents.remove(&id);
        }
    }

    fn count_add(&mut self, key: CountsKey, delta: i64) {
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add_signed(delta);
    }

    // Relationship chains

    fn find_or_create_group(&mut self, node: u64, rel_type: TypeId) -> Result<u64> {
        let mut prev = None;
        let mut current = match self.nodes[node as usize].relationships {
            RelationshipHead::Groups(first) => link(first),
            RelationshipHead::None => None,
            RelationshipHead::Chain(_) => {
                return Err(Error::internal(format!("node {node} is not dense")));
            }
        };
        while let Some(id) = current {
            let group = &self.groups[id as usize];
            if group.rel_type == rel_type {
                return Ok(id);
            }
            if group.rel_type > rel_type {
                break;
            }
            prev = Some(id);
            current = group.next_group();
        }

        let id = self.groups.len() as u64;
        let mut group = RelationshipGroupRecord::new(id, node, rel_type);
        group.next = current.unwrap_or(NULL_REF);
        self.groups.push(group);
        match prev {
            Some(prev) => self.group_mut(prev)?.next = id,
            None => self.node_mut(node)?.relationships = RelationshipHead::Groups(id),
        }
        Ok(id)
    }

    fn find_group(&self, node: u64, rel_type: TypeId) -> Option<(Option<u64>, u64)> {
        let RelationshipHead::Groups(first) = self.nodes[node as usize].relationships else {
            return None;
        };
        let mut prev = None;
        let mut current = link(first);
        while let Some(id) = current {
            let group = &self.groups[id as usize];
            if group.rel_type == rel_type {
                return Some((prev, id));
            }
            prev = Some(id);
            current = group.next_group();
        }
        None
    }

    fn link_dense(&mut self, node: u64, rel: u64) -> Result<()> {
        let record = self.relationships[rel as usize].clone();
        let direction = record
            .direction_for(node)
            .ok_or_else(|| Error::internal(format!("relationship {rel} does not touch {node}")))?;
        let group = self.find_or_create_group(node, record.rel_type)?;
        let old = self.groups[group as usize].first(direction);
        if let Some(old) = link(old) {
            self.relationship_mut(rel)?.set_next_for(node, old);
            self.relationship_mut(old)?.set_prev_for(node, rel);
        }
        *self.group_mut(group)?.first_mut(direction) = rel;
        Ok(())
    }

    fn link(&mut self, node: u64, rel: u64) -> Result<()> {
        match self.nodes[node as usize].relationships {
            RelationshipHead::None => {
                self.node_mut(node)?.relationships = RelationshipHead::Chain(rel);
            }
            RelationshipHead::Chain(head) => {
                self.relationship_mut(rel)?.set_next_for(node, head);
                self.relationship_mut(head)?.set_prev_for(node, rel);
                self.node_mut(node)?.relationships = RelationshipHead::Chain(rel);
            }
            RelationshipHead::Groups(_) => self.link_dense(node, rel)?,
        }
        Ok(())
    }

    fn sparse_chain(&self, node: u64) -> Vec<u64> {
        let RelationshipHead::Chain(head) = self.nodes[node as usize].relationships else {
            return Vec::new();
        };
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = link(head);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let Some(rel) = self.relationships.get(id as usize) else {
                break;
            };
            chain.push(id);
            current = rel.next_for(node).and_then(link);
        }
        chain
    }

    fn densify(&mut self, node: u64) -> Result<()> {
        let chain = self.sparse_chain(node);
        self.node_mut(node)?.relationships = RelationshipHead::None;
        for rel in &chain {
            let record = self.relationship_mut(*rel)?;
            record.set_prev_for(node, NULL_REF);
            record.set_next_for(node, NULL_REF);
        }
        for rel in chain.into_iter().rev() {
            self.link_dense(node, rel)?;
        }
        Ok(())
    }

    fn unlink(&mut self, node: u64, rel: u64) -> Result<()> {
        let record = self.relationships[rel as usize].clone();
        let prev = record.prev_for(node).unwrap_or(NULL_REF);
        let next = record.next_for(node).unwrap_or(NULL_REF);

        match link(prev) {
            Some(prev) => self.relationship_mut(prev)?.set_next_for(node, next),
            None => match self.nodes[node as usize].relationships {
                RelationshipHead::Chain(_) => {
                    self.node_mut(node)?.relationships =
                        link(next).map_or(RelationshipHead::None, RelationshipHead::Chain);
                }
                RelationshipHead::Groups(_) => {
                    if let (Some((group_prev, group)), Some(direction)) = (
                        self.find_group(node, record.rel_type),
                        record.direction_for(node),
                    ) {
                        *self.group_mut(group)?.first_mut(direction) = next;
                        let empty = GroupDirection::ALL
                            .iter()
                            .all(|d| self.groups[group as usize].first(*d) == NULL_REF);
                        if empty {
                            let after = self.groups[group as usize].next;
                            match group_prev {
                                Some(p) => self.group_mut(p)?.next = after,
                                None => {
                                    self.node_mut(node)?.relationships = link(after)
                                        .map_or(RelationshipHead::None, RelationshipHead::Groups);
                                }
                            }
                            self.groups[group as usize] = RelationshipGroupRecord::unused(group);
                        }
                    }
                }
                RelationshipHead::None => {}
            },
        }
        if let Some(next) = link(next) {
            self.relationship_mut(next)?.set_prev_for(node, prev);
        }
        Ok(())
    }
}

/// In-memory implementation of [`StoreAccess`]
///
/// # Examples
///
/// ```
/// use nexus_consistency::record::TokenKind;
/// use nexus_consistency::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let person = store.create_token(TokenKind::Label, "Person").unwrap();
/// let knows = store.create_token(TokenKind::RelationshipType, "KNOWS").unwrap();
/// let alice = store.create_node(&[person]).unwrap();
/// let bob = store.create_node(&[person]).unwrap();
/// store.create_relationship(alice, bob, knows).unwrap();
/// ```
pub struct MemoryStore {
    inner: RwLock<Tables>,
    dense_threshold: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the default dense node threshold
    pub fn new() -> Self {
        Self::with_dense_threshold(DEFAULT_DENSE_THRESHOLD)
    }

    /// Empty store where nodes with more than `threshold` relationships use groups
    pub fn with_dense_threshold(threshold: usize) -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
            dense_threshold: threshold,
        }
    }

    fn check(&self, tables: &Tables, file: StoreFile, id: u64) -> Result<()> {
        if tables.failures.contains(&(file, id)) {
            return Err(Error::storage(format!("read of {file:?} record {id} failed")));
        }
        Ok(())
    }

    // Consistent writes

    /// Create a token whose name is stored in the token's name store
    pub fn create_token(&self, kind: TokenKind, name: &str) -> Result<u32> {
        let mut tables = self.inner.write();
        let id = u32::try_from(tables.tokens.get(&kind).map_or(0, Vec::len))
            .map_err(|_| Error::storage(format!("{kind:?} token ids exhausted")))?;
        let name_block = tables.write_chain(kind.name_store(), name.as_bytes());
        tables
            .tokens
            .entry(kind)
            .or_default()
            .push(TokenRecord::new(kind, id, name_block));
        Ok(id)
    }

    /// Create a node carrying `labels`
    pub fn create_node(&self, labels: &[LabelId]) -> Result<u64> {
        let mut tables = self.inner.write();
        let mut labels = labels.to_vec();
        labels.sort_unstable();
        labels.dedup();
        for label in &labels {
            tables.require_token(TokenKind::Label, *label)?;
        }

        let id = tables.nodes.len() as u64;
        let mut node = NodeRecord::new(id);
        node.labels = if labels.len() <= LabelField::INLINE_CAPACITY {
            LabelField::Inline(labels.clone())
        } else {
            let payload = LabelField::encode_dynamic(id, &labels);
            LabelField::Dynamic(tables.write_chain(DynamicStoreKind::NodeLabels, &payload))
        };
        tables.nodes.push(node);

        tables.count_add(CountsKey::Nodes { label: None }, 1);
        for label in &labels {
            tables.count_add(CountsKey::Nodes { label: Some(*label) }, 1);
        }
        tables.scan_add(EntityKind::Node, id, &labels);
        tables.reindex(EntityKind::Node, id);
        Ok(id)
    }

    /// Create a relationship, linking it at the head of both node chains
    pub fn create_relationship(&self, source: u64, target: u64, rel_type: TypeId) -> Result<u64> {
        let mut tables = self.inner.write();
        tables.require_entity(EntityKind::Node, source)?;
        tables.require_entity(EntityKind::Node, target)?;
        tables.require_token(TokenKind::RelationshipType, rel_type)?;

        let id = tables.relationships.len() as u64;
        tables
            .relationships
            .push(RelationshipRecord::new(id, source, target, rel_type));
        tables.link(source, id)?;
        if target != source {
            tables.link(target, id)?;
        }

        for node in [source, target] {
            if tables.sparse_chain(node).len() > self.dense_threshold {
                tables.densify(node)?;
            }
        }

        tables.count_add(CountsKey::Relationships { rel_type }, 1);
        tables.scan_add(EntityKind::Relationship, id, &[rel_type]);
        tables.reindex(EntityKind::Relationship, id);
        Ok(id)
    }

    /// Set (or replace) a property of a node or relationship
    pub fn set_property(&self, kind: EntityKind, id: u64, key: KeyId, value: Value) -> Result<()> {
        let mut tables = self.inner.write();
        tables.require_entity(kind, id)?;
        tables.require_token(TokenKind::PropertyKey, key)?;
        tables.set_property(kind, id, key, value)?;
        tables.reindex(kind, id);
        Ok(())
    }

    /// Remove a property; returns whether it was present
    pub fn remove_property(&self, kind: EntityKind, id: u64, key: KeyId) -> Result<bool> {
        let mut tables = self.inner.write();
        tables.require_entity(kind, id)?;
        let removed = tables.remove_property(kind, id, key)?;
        tables.reindex(kind, id);
        Ok(removed)
    }

    /// Delete a relationship, unlinking it from every chain
    ///
    /// With `update_counts == false` the counts store is left untouched,
    /// which leaves it inconsistent on purpose.
    pub fn delete_relationship(&self, id: u64, update_counts: bool) -> Result<()> {
        let mut tables = self.inner.write();
        tables.require_entity(EntityKind::Relationship, id)?;
        let record = tables.relationships[id as usize].clone();

        tables.unlink(record.source, id)?;
        if !record.is_loop() {
            tables.unlink(record.target, id)?;
        }
        tables.free_properties(EntityKind::Relationship, id);
        tables.relationships[id as usize] = RelationshipRecord::unused(id);
        tables.scan_remove(EntityKind::Relationship, id);
        tables.reindex(EntityKind::Relationship, id);
        if update_counts {
            tables.count_add(
                CountsKey::Relationships {
                    rel_type: record.rel_type,
                },
                -1,
            );
        }
        Ok(())
    }

    /// Delete a node that has no relationships
    pub fn delete_node(&self, id: u64) -> Result<()> {
        let mut tables = self.inner.write();
        tables.require_entity(EntityKind::Node, id)?;
        let node = tables.nodes[id as usize].clone();
        if node.relationships != RelationshipHead::None {
            return Err(Error::invalid_argument(format!(
                "node {id} still has relationships"
            )));
        }

        let labels = tables.node_labels(&node);
        if let LabelField::Dynamic(first) = node.labels {
            tables.free_chain(DynamicStoreKind::NodeLabels, first);
        }
        tables.free_properties(EntityKind::Node, id);
        tables.nodes[id as usize] = NodeRecord::unused(id);
        tables.scan_remove(EntityKind::Node, id);
        tables.reindex(EntityKind::Node, id);

        tables.count_add(CountsKey::Nodes { label: None }, -1);
        for label in labels {
            tables.count_add(CountsKey::Nodes { label: Some(label) }, -1);
        }
        Ok(())
    }

    /// Create an online general index and populate it
    pub fn create_index(&self, name: &str, schema: SchemaDescriptor) -> Result<u64> {
        let mut tables = self.inner.write();
        Self::validate_schema(&tables, name, &schema)?;

        let id = tables.schema.len() as u64;
        tables.schema.push(SchemaRecord::new(
            id,
            SchemaRule::Index(IndexRule {
                name: name.to_string(),
                schema: schema.clone(),
                kind: IndexKind::General,
                state: IndexState::Online,
                owning_constraint: None,
            }),
        ));
        tables.indexes.insert(id, IndexData::default());
        tables.populate(id, &schema);
        Ok(id)
    }

    /// Create a constraint, with its backing unique index when it needs one
    pub fn create_constraint(
        &self,
        name: &str,
        schema: SchemaDescriptor,
        kind: ConstraintKind,
    ) -> Result<u64> {
        let mut tables = self.inner.write();
        Self::validate_schema(&tables, name, &schema)?;
        if kind.needs_index() && schema.entity == EntityKind::Relationship {
            return Err(Error::invalid_argument(
                "uniqueness constraints on relationships are not supported",
            ));
        }

        let id = tables.schema.len() as u64;
        let owned_index = kind.needs_index().then_some(id + 1);
        tables.schema.push(SchemaRecord::new(
            id,
            SchemaRule::Constraint(ConstraintRule {
                name: name.to_string(),
                schema: schema.clone(),
                kind,
                owned_index,
            }),
        ));
        if let Some(index) = owned_index {
            tables.schema.push(SchemaRecord::new(
                index,
                SchemaRule::Index(IndexRule {
                    name: name.to_string(),
                    schema: schema.clone(),
                    kind: IndexKind::Unique,
                    state: IndexState::Online,
                    owning_constraint: Some(id),
                }),
            ));
            tables.indexes.insert(index, IndexData::default());
            tables.populate(index, &schema);
        }
        Ok(id)
    }

    fn validate_schema(tables: &Tables, name: &str, schema: &SchemaDescriptor) -> Result<()> {
        if tables
            .schema
            .iter()
            .filter(|r| r.in_use)
            .any(|r| r.rule.as_ref().and_then(SchemaRule::name) == Some(name))
        {
            return Err(Error::invalid_argument(format!(
                "schema rule '{name}' already exists"
            )));
        }
        let token_kind = match schema.entity {
            EntityKind::Node => TokenKind::Label,
            EntityKind::Relationship => TokenKind::RelationshipType,
        };
        tables.require_token(token_kind, schema.token)?;
        for key in &schema.properties {
            tables.require_token(TokenKind::PropertyKey, *key)?;
        }
        Ok(())
    }

    /// Change the population state of an index
    pub fn set_index_state(&self, index: u64, state: IndexState) -> Result<()> {
        let mut tables = self.inner.write();
        let record = tables
            .schema
            .get_mut(index as usize)
            .ok_or_else(|| Error::not_found(format!("schema rule {index}")))?;
        match &mut record.rule {
            Some(SchemaRule::Index(rule)) => {
                rule.state = state;
                Ok(())
            }
            _ => Err(Error::invalid_argument(format!("schema rule {index} is not an index"))),
        }
    }

    /// Flag an index as left dirty by an unclean shutdown
    pub fn mark_index_dirty(&self, index: u64, dirty: bool) {
        self.inner.write().indexes.entry(index).or_default().dirty = dirty;
    }

    /// Flag a scan store as left dirty by an unclean shutdown
    pub fn mark_scan_dirty(&self, kind: EntityKind, dirty: bool) {
        self.inner.write().scans.entry(kind).or_default().dirty = dirty;
    }

    // Raw record access

    /// Overwrite a node record
    ///
    /// Fails with [`Error::InvalidArgument`] for ids at or above [`MAX_PUT_ID`].
    pub fn put_node(&self, record: NodeRecord) -> Result<()> {
        let id = record.id;
        place(&mut self.inner.write().nodes, id, record, NodeRecord::unused)
    }

    /// Overwrite a relationship record
    pub fn put_relationship(&self, record: RelationshipRecord) -> Result<()> {
        let id = record.id;
        place(
            &mut self.inner.write().relationships,
            id,
            record,
            RelationshipRecord::unused,
        )
    }

    /// Overwrite a relationship group record
    pub fn put_group(&self, record: RelationshipGroupRecord) -> Result<()> {
        let id = record.id;
        place(
            &mut self.inner.write().groups,
            id,
            record,
            RelationshipGroupRecord::unused,
        )
    }

    /// Overwrite a property record
    pub fn put_property(&self, record: PropertyRecord) -> Result<()> {
        let id = record.id;
        place(
            &mut self.inner.write().properties,
            id,
            record,
            PropertyRecord::unused,
        )
    }

    /// Overwrite a dynamic block
    pub fn put_dynamic(&self, store: DynamicStoreKind, record: DynamicRecord) -> Result<()> {
        let id = record.id;
        let mut tables = self.inner.write();
        place(
            tables.dynamic.entry(store).or_default(),
            id,
            record,
            DynamicRecord::unused,
        )
    }

    /// Overwrite a token record
    pub fn put_token(&self, record: TokenRecord) -> Result<()> {
        let kind = record.kind;
        let id = u64::from(record.id);
        let mut tables = self.inner.write();
        place(tables.tokens.entry(kind).or_default(), id, record, |gap| {
            TokenRecord::unused(kind, gap as u32)
        })
    }

    /// Overwrite a schema record
    pub fn put_schema(&self, record: SchemaRecord) -> Result<()> {
        let id = record.id;
        place(&mut self.inner.write().schema, id, record, SchemaRecord::unused)
    }

    /// Add an index entry
    pub fn put_index_entry(&self, entry: IndexEntry) {
        let mut tables = self.inner.write();
        tables.indexes.entry(entry.index).or_default().entries.push(entry);
    }

    /// Drop every entry of `entity` from an index
    pub fn remove_index_entries(&self, index: u64, entity: u64) {
        if let Some(data) = self.inner.write().indexes.get_mut(&index) {
            data.entries.retain(|entry| entry.entity != entity);
        }
    }

    /// Overwrite a scan store document
    pub fn put_scan_document(&self, document: TokenScanDocument) {
        let mut tables = self.inner.write();
        tables
            .scans
            .entry(document.entity_kind)
            .or_default()
            .documents
            .insert(document.entity, document.tokens);
    }

    /// Drop a scan store document
    pub fn remove_scan_document(&self, kind: EntityKind, entity: u64) {
        self.inner.write().scan_remove(kind, entity);
    }

    /// Overwrite a stored count
    pub fn set_count(&self, key: CountsKey, count: u64) {
        self.inner.write().counts.insert(key, count);
    }

    /// Make every read of one record fail with a storage error
    pub fn fail_reads_of(&self, file: StoreFile, id: u64) {
        self.inner.write().failures.insert((file, id));
    }

    /// Remove every injected read failure
    pub fn clear_failures(&self) {
        self.inner.write().failures.clear();
    }
}

impl StoreAccess for MemoryStore {
    fn high_id(&self, file: StoreFile) -> u64 {
        let tables = self.inner.read();
        let len = match file {
            StoreFile::Nodes => tables.nodes.len(),
            StoreFile::Relationships => tables.relationships.len(),
            StoreFile::RelationshipGroups => tables.groups.len(),
            StoreFile::Properties => tables.properties.len(),
            StoreFile::Schema => tables.schema.len(),
            StoreFile::Tokens(kind) => tables.tokens.get(&kind).map_or(0, Vec::len),
            StoreFile::Dynamic(kind) => tables.dynamic.get(&kind).map_or(0, Vec::len),
        };
        len as u64
    }

    fn node(&self, id: u64) -> Result<NodeRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::Nodes, id)?;
        Ok(slot(&tables.nodes, id, NodeRecord::unused))
    }

    fn relationship(&self, id: u64) -> Result<RelationshipRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::Relationships, id)?;
        Ok(slot(&tables.relationships, id, RelationshipRecord::unused))
    }

    fn group(&self, id: u64) -> Result<RelationshipGroupRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::RelationshipGroups, id)?;
        Ok(slot(&tables.groups, id, RelationshipGroupRecord::unused))
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::Properties, id)?;
        Ok(slot(&tables.properties, id, PropertyRecord::unused))
    }

    fn dynamic(&self, store: DynamicStoreKind, id: u64) -> Result<DynamicRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::Dynamic(store), id)?;
        let blocks = tables.dynamic.get(&store).map_or(&[][..], Vec::as_slice);
        Ok(slot(blocks, id, DynamicRecord::unused))
    }

    fn token(&self, kind: TokenKind, id: u32) -> Result<TokenRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::Tokens(kind), u64::from(id))?;
        let tokens = tables.tokens.get(&kind).map_or(&[][..], Vec::as_slice);
        Ok(slot(tokens, u64::from(id), |_| TokenRecord::unused(kind, id)))
    }

    fn schema(&self, id: u64) -> Result<SchemaRecord> {
        let tables = self.inner.read();
        self.check(&tables, StoreFile::Schema, id)?;
        Ok(slot(&tables.schema, id, SchemaRecord::unused))
    }

    fn all_node_scan(&self) -> Box<dyn AllNodeScan + '_> {
        Box::new(StoreNodeScan::new(self.high_id(StoreFile::Nodes)))
    }

    fn index_entries(&self, index: u64) -> Result<Vec<IndexEntry>> {
        Ok(self
            .inner
            .read()
            .indexes
            .get(&index)
            .map(|data| data.entries.clone())
            .unwrap_or_default())
    }

    fn index_lookup(&self, index: u64, values: &[Value]) -> Result<Vec<u64>> {
        Ok(self
            .inner
            .read()
            .indexes
            .get(&index)
            .map(|data| {
                data.entries
                    .iter()
                    .filter(|entry| entry.values == values)
                    .map(|entry| entry.entity)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn index_is_dirty(&self, index: u64) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .indexes
            .get(&index)
            .is_some_and(|data| data.dirty))
    }

    fn scan_documents(&self, kind: EntityKind) -> Result<Vec<TokenScanDocument>> {
        Ok(self
            .inner
            .read()
            .scans
            .get(&kind)
            .map(|scan| {
                scan.documents
                    .iter()
                    .map(|(entity, tokens)| TokenScanDocument {
                        entity_kind: kind,
                        entity: *entity,
                        tokens: tokens.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn scan_contains(&self, kind: EntityKind, entity: u64, token: u32) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .scans
            .get(&kind)
            .and_then(|scan| scan.documents.get(&entity))
            .is_some_and(|tokens| tokens.contains(token)))
    }

    fn scan_is_dirty(&self, kind: EntityKind) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .scans
            .get(&kind)
            .is_some_and(|scan| scan.dirty))
    }

    fn stored_counts(&self) -> Result<Vec<CountsEntry>> {
        Ok(self
            .inner
            .read()
            .counts
            .iter()
            .map(|(key, count)| CountsEntry {
                key: *key,
                count: *count,
            })
            .collect())
    }
}

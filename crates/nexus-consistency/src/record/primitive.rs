//! Node, relationship and relationship group records

use super::{LabelId, NULL_REF, NULL_TOKEN, TypeId, link};
use serde::{Deserialize, Serialize};

/// Label set of a node: inlined in the record or spilled into a dynamic chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelField {
    /// Label ids stored directly in the node record
    Inline(Vec<LabelId>),
    /// First block of a `NodeLabels` dynamic chain
    Dynamic(u64),
}

impl Default for LabelField {
    fn default() -> Self {
        LabelField::Inline(Vec::new())
    }
}

impl LabelField {
    /// Maximum number of labels kept inline
    pub const INLINE_CAPACITY: usize = 4;

    /// Payload of a dynamic label chain: owner id, then label ids (little endian)
    pub fn encode_dynamic(owner: u64, labels: &[LabelId]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + labels.len() * 4);
        bytes.extend_from_slice(&owner.to_le_bytes());
        for label in labels {
            bytes.extend_from_slice(&label.to_le_bytes());
        }
        bytes
    }

    /// Decode a dynamic label chain payload into owner and labels
    pub fn decode_dynamic(bytes: &[u8]) -> Option<(u64, Vec<LabelId>)> {
        if bytes.len() < 8 || (bytes.len() - 8) % 4 != 0 {
            return None;
        }
        let (head, rest) = bytes.split_at(8);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(head);
        let labels = rest
            .chunks_exact(4)
            .map(|chunk| {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(chunk);
                u32::from_le_bytes(raw)
            })
            .collect();
        Some((u64::from_le_bytes(raw), labels))
    }
}

/// Head of a node's relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationshipHead {
    /// Node has no relationships
    #[default]
    None,
    /// Sparse node: first relationship of its single chain
    Chain(u64),
    /// Dense node: first relationship group
    Groups(u64),
}

/// Node record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Node ID
    pub id: u64,
    /// Whether the record holds a live node
    pub in_use: bool,
    /// Label ids or pointer to the label chain
    pub labels: LabelField,
    /// Relationship chain or group chain head
    pub relationships: RelationshipHead,
    /// Pointer to property chain
    pub first_property: u64,
}

impl NodeRecord {
    /// Create an in-use node without labels, relationships or properties
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            labels: LabelField::default(),
            relationships: RelationshipHead::None,
            first_property: NULL_REF,
        }
    }

    /// Create a record for an unused slot
    pub fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id)
        }
    }

    /// First property record, if any
    pub fn first_property(&self) -> Option<u64> {
        link(self.first_property)
    }

    /// Dense nodes keep relationships behind group records
    pub fn is_dense(&self) -> bool {
        matches!(self.relationships, RelationshipHead::Groups(_))
    }

    /// Inline labels, `None` when labels live in a dynamic chain
    pub fn inline_labels(&self) -> Option<&[LabelId]> {
        match &self.labels {
            LabelField::Inline(labels) => Some(labels),
            LabelField::Dynamic(_) => None,
        }
    }
}

/// Direction of a relationship seen from one of its nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDirection {
    /// Node is the source
    Outgoing,
    /// Node is the target
    Incoming,
    /// Node is both source and target
    Loop,
}

impl GroupDirection {
    /// All directions, in group field order
    pub const ALL: [GroupDirection; 3] = [
        GroupDirection::Outgoing,
        GroupDirection::Incoming,
        GroupDirection::Loop,
    ];
}

/// Relationship record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// Relationship ID
    pub id: u64,
    /// Whether the record holds a live relationship
    pub in_use: bool,
    /// Relationship type ID
    pub rel_type: TypeId,
    /// Source node ID
    pub source: u64,
    /// Target node ID
    pub target: u64,
    /// Previous relationship in the source node's chain
    pub source_prev: u64,
    /// Next relationship in the source node's chain
    pub source_next: u64,
    /// Previous relationship in the target node's chain
    pub target_prev: u64,
    /// Next relationship in the target node's chain
    pub target_next: u64,
    /// Pointer to property chain
    pub first_property: u64,
}

impl RelationshipRecord {
    /// Create an in-use relationship that is alone in both of its chains
    pub fn new(id: u64, source: u64, target: u64, rel_type: TypeId) -> Self {
        Self {
            id,
            in_use: true,
            rel_type,
            source,
            target,
            source_prev: NULL_REF,
            source_next: NULL_REF,
            target_prev: NULL_REF,
            target_next: NULL_REF,
            first_property: NULL_REF,
        }
    }

    /// Create a record for an unused slot
    pub fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NULL_REF, NULL_REF, NULL_TOKEN)
        }
    }

    /// First property record, if any
    pub fn first_property(&self) -> Option<u64> {
        link(self.first_property)
    }

    /// Source and target are the same node
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }

    /// Whether `node` is one of the endpoints
    pub fn touches(&self, node: u64) -> bool {
        self.source == node || self.target == node
    }

    /// Direction of this relationship from `node`'s point of view
    pub fn direction_for(&self, node: u64) -> Option<GroupDirection> {
        match (self.source == node, self.target == node) {
            (true, true) => Some(GroupDirection::Loop),
            (true, false) => Some(GroupDirection::Outgoing),
            (false, true) => Some(GroupDirection::Incoming),
            (false, false) => None,
        }
    }

    /// Raw previous pointer in `node`'s chain; loops use the source side
    pub fn prev_for(&self, node: u64) -> Option<u64> {
        if self.source == node {
            Some(self.source_prev)
        } else if self.target == node {
            Some(self.target_prev)
        } else {
            None
        }
    }

    /// Raw next pointer in `node`'s chain; loops use the source side
    pub fn next_for(&self, node: u64) -> Option<u64> {
        if self.source == node {
            Some(self.source_next)
        } else if self.target == node {
            Some(self.target_next)
        } else {
            None
        }
    }

    /// True when this relationship heads `node`'s chain
    pub fn is_first_for(&self, node: u64) -> bool {
        self.prev_for(node) == Some(NULL_REF)
    }

    /// Set the previous pointer on every side touching `node`
    pub fn set_prev_for(&mut self, node: u64, prev: u64) {
        if self.source == node {
            self.source_prev = prev;
        }
        if self.target == node {
            self.target_prev = prev;
        }
    }

    /// Set the next pointer on every side touching `node`
    pub fn set_next_for(&mut self, node: u64, next: u64) {
        if self.source == node {
            self.source_next = next;
        }
        if self.target == node {
            self.target_next = next;
        }
    }
}

/// Relationship group record (dense nodes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipGroupRecord {
    /// Group ID
    pub id: u64,
    /// Whether the record holds a live group
    pub in_use: bool,
    /// Relationship type of every relationship behind this group
    pub rel_type: TypeId,
    /// Node owning this group
    pub owner: u64,
    /// Next group of the same node, higher type
    pub next: u64,
    /// First outgoing relationship
    pub first_out: u64,
    /// First incoming relationship
    pub first_in: u64,
    /// First loop relationship
    pub first_loop: u64,
}

impl RelationshipGroupRecord {
    /// Create an in-use empty group
    pub fn new(id: u64, owner: u64, rel_type: TypeId) -> Self {
        Self {
            id,
            in_use: true,
            rel_type,
            owner,
            next: NULL_REF,
            first_out: NULL_REF,
            first_in: NULL_REF,
            first_loop: NULL_REF,
        }
    }

    /// Create a record for an unused slot
    pub fn unused(id: u64) -> Self {
        Self {
            in_use: false,
            ..Self::new(id, NULL_REF, NULL_TOKEN)
        }
    }

    /// Next group, if any
    pub fn next_group(&self) -> Option<u64> {
        link(self.next)
    }

    /// Raw first relationship pointer for a direction
    pub fn first(&self, direction: GroupDirection) -> u64 {
        match direction {
            GroupDirection::Outgoing => self.first_out,
            GroupDirection::Incoming => self.first_in,
            GroupDirection::Loop => self.first_loop,
        }
    }

    /// Mutable first relationship pointer for a direction
    pub fn first_mut(&mut self, direction: GroupDirection) -> &mut u64 {
        match direction {
            GroupDirection::Outgoing => &mut self.first_out,
            GroupDirection::Incoming => &mut self.first_in,
            GroupDirection::Loop => &mut self.first_loop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pointers() {
        let node = NodeRecord::new(1);
        assert_eq!(node.first_property, NULL_REF);
        assert_eq!(node.relationships, RelationshipHead::None);
        assert!(node.in_use);

        let rel = RelationshipRecord::new(3, 1, 2, 0);
        assert_eq!(rel.source_prev, NULL_REF);
        assert_eq!(rel.target_next, NULL_REF);
        assert!(rel.is_first_for(1));
        assert!(rel.is_first_for(2));
        assert!(!rel.is_first_for(9));
    }

    #[test]
    fn test_chain_pointers_per_side() {
        let mut rel = RelationshipRecord::new(5, 10, 20, 1);
        rel.source_next = 6;
        rel.target_prev = 4;

        assert_eq!(rel.next_for(10), Some(6));
        assert_eq!(rel.prev_for(20), Some(4));
        assert_eq!(rel.next_for(30), None);
        assert!(rel.is_first_for(10));
        assert!(!rel.is_first_for(20));
    }

    #[test]
    fn test_direction_for() {
        let rel = RelationshipRecord::new(0, 1, 2, 0);
        assert_eq!(rel.direction_for(1), Some(GroupDirection::Outgoing));
        assert_eq!(rel.direction_for(2), Some(GroupDirection::Incoming));
        assert_eq!(rel.direction_for(3), None);

        let looped = RelationshipRecord::new(1, 4, 4, 0);
        assert!(looped.is_loop());
        assert_eq!(looped.direction_for(4), Some(GroupDirection::Loop));
    }

    #[test]
    fn test_group_first_by_direction() {
        let mut group = RelationshipGroupRecord::new(0, 7, 2);
        *group.first_mut(GroupDirection::Incoming) = 11;
        assert_eq!(group.first(GroupDirection::Incoming), 11);
        assert_eq!(group.first(GroupDirection::Outgoing), NULL_REF);
        assert_eq!(group.next_group(), None);
    }

    #[test]
    fn test_set_pointers_on_loops() {
        let mut looped = RelationshipRecord::new(1, 4, 4, 0);
        looped.set_next_for(4, 9);
        looped.set_prev_for(4, 2);
        assert_eq!(looped.source_next, 9);
        assert_eq!(looped.target_next, 9);
        assert_eq!(looped.source_prev, 2);
        assert_eq!(looped.target_prev, 2);

        let mut rel = RelationshipRecord::new(2, 1, 3, 0);
        rel.set_next_for(3, 8);
        assert_eq!(rel.target_next, 8);
        assert_eq!(rel.source_next, NULL_REF);
    }

    #[test]
    fn test_dynamic_label_payload() {
        let bytes = LabelField::encode_dynamic(12, &[1, 5, 9]);
        assert_eq!(bytes.len(), 20);
        assert_eq!(LabelField::decode_dynamic(&bytes), Some((12, vec![1, 5, 9])));
        assert_eq!(LabelField::decode_dynamic(&bytes[..10]), None);
        assert_eq!(LabelField::decode_dynamic(&bytes[..3]), None);
    }

    #[test]
    fn test_unused_records() {
        assert!(!NodeRecord::unused(3).in_use);
        assert!(!RelationshipRecord::unused(3).in_use);
        assert!(!RelationshipGroupRecord::unused(3).in_use);
    }
}

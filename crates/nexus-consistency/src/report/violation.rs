//! Violation taxonomy
//!
//! One enum per record category, one variant per invariant. Variants carry
//! the ids of the records that explain the violation and, where it makes
//! sense, the expected and the actually stored value. Invariants shared by
//! nodes and relationships live once in [`EntityViolation`] and are tagged
//! with the [`EntityKind`] they were found on.

use crate::record::{
    DynamicStoreKind, EntityKind, GroupDirection, IndexState, KeyId, LabelId, RecordCategory,
    TypeId, Value,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// How bad a violation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Legal but discouraged state
    Warning,
    /// Broken structural invariant
    Error,
}

/// A record that takes part in a violation, used for owners and conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Category of the owning record
    pub category: RecordCategory,
    /// Owning record id
    pub id: u64,
}

impl OwnerRef {
    /// Owner reference
    pub fn new(category: RecordCategory, id: u64) -> Self {
        Self { category, id }
    }
}

/// One of the four relationship chain pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainPointer {
    /// Previous in source chain
    SourcePrev,
    /// Next in source chain
    SourceNext,
    /// Previous in target chain
    TargetPrev,
    /// Next in target chain
    TargetNext,
}

impl ChainPointer {
    /// All pointers
    pub const ALL: [ChainPointer; 4] = [
        ChainPointer::SourcePrev,
        ChainPointer::SourceNext,
        ChainPointer::TargetPrev,
        ChainPointer::TargetNext,
    ];

    fn name(self) -> &'static str {
        match self {
            ChainPointer::SourcePrev => "source_prev",
            ChainPointer::SourceNext => "source_next",
            ChainPointer::TargetPrev => "target_prev",
            ChainPointer::TargetNext => "target_next",
        }
    }
}

/// Schema rule obligations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    /// A constraint index expects its constraint to reference it
    UniquenessConstraint,
    /// A constraint expects its index to reference it back
    ConstraintIndexRule,
}

/// Export-friendly breakdown of a violation
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationDetail {
    /// Snake-case violation kind
    pub kind: String,
    /// Ids of the other records involved
    pub context: Vec<u64>,
    /// Expected value, where the check derived one
    pub expected: Option<serde_json::Value>,
    /// Value actually found
    pub actual: Option<serde_json::Value>,
}

impl ViolationDetail {
    fn named(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            context: Vec::new(),
            expected: None,
            actual: None,
        }
    }

    fn with(mut self, id: u64) -> Self {
        self.context.push(id);
        self
    }

    fn expected(mut self, value: serde_json::Value) -> Self {
        self.expected = Some(value);
        self
    }

    fn actual(mut self, value: serde_json::Value) -> Self {
        self.actual = Some(value);
        self
    }
}

fn values_json(values: &[Value]) -> serde_json::Value {
    serde_json::Value::Array(values.iter().map(Value::to_json).collect())
}

fn entity_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Node => "node",
        EntityKind::Relationship => "relationship",
    }
}

fn direction_name(direction: GroupDirection) -> &'static str {
    match direction {
        GroupDirection::Outgoing => "outgoing",
        GroupDirection::Incoming => "incoming",
        GroupDirection::Loop => "loop",
    }
}

/// Invariants shared by nodes and relationships
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityViolation {
    /// The first property record is not in use
    PropertyNotInUse {
        /// Property record id
        property: u64,
    },
    /// The first property record has a predecessor
    PropertyNotFirstInChain {
        /// Property record id
        property: u64,
    },
    /// The property chain is also claimed by another owner
    MultipleOwners {
        /// Owner that keeps the chain
        other: OwnerRef,
    },
    /// The same property key occurs more than once in the chain
    PropertyKeyNotUniqueInChain {
        /// Duplicated key
        key: KeyId,
    },
    /// A constraint makes a property mandatory and it is missing
    MissingMandatoryProperty {
        /// Missing key
        key: KeyId,
    },
    /// The property chain loops back on itself
    PropertyChainContainsCircularReference {
        /// Property record where the loop was detected
        property: u64,
    },
    /// The entity should be in an index and is not
    NotIndexed {
        /// Index rule id
        index: u64,
        /// Values the entry should carry
        values: Vec<Value>,
    },
    /// The entity is in an index more than once
    IndexedMultipleTimes {
        /// Index rule id
        index: u64,
        /// Indexed values
        values: Vec<Value>,
        /// Number of entries found
        count: u64,
    },
    /// A unique index holds the same values for another entity
    UniqueIndexNotUnique {
        /// Index rule id
        index: u64,
        /// Indexed values
        values: Vec<Value>,
        /// The other entity with the same values
        duplicate: u64,
    },
}

impl EntityViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            EntityViolation::PropertyNotInUse { property } => {
                ViolationDetail::named("property_not_in_use").with(*property)
            }
            EntityViolation::PropertyNotFirstInChain { property } => {
                ViolationDetail::named("property_not_first_in_chain").with(*property)
            }
            EntityViolation::MultipleOwners { other } => {
                ViolationDetail::named("multiple_owners").with(other.id)
            }
            EntityViolation::PropertyKeyNotUniqueInChain { key } => {
                ViolationDetail::named("property_key_not_unique_in_chain").actual(json!(key))
            }
            EntityViolation::MissingMandatoryProperty { key } => {
                ViolationDetail::named("missing_mandatory_property").expected(json!(key))
            }
            EntityViolation::PropertyChainContainsCircularReference { property } => {
                ViolationDetail::named("property_chain_contains_circular_reference")
                    .with(*property)
            }
            EntityViolation::NotIndexed { index, values } => ViolationDetail::named("not_indexed")
                .with(*index)
                .expected(values_json(values)),
            EntityViolation::IndexedMultipleTimes {
                index,
                values,
                count,
            } => ViolationDetail::named("indexed_multiple_times")
                .with(*index)
                .expected(json!(1))
                .actual(json!({ "values": values_json(values), "count": count })),
            EntityViolation::UniqueIndexNotUnique {
                index,
                values,
                duplicate,
            } => ViolationDetail::named("unique_index_not_unique")
                .with(*index)
                .with(*duplicate)
                .actual(values_json(values)),
        }
    }
}

/// Node record invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeViolation {
    /// Referenced first relationship is not in use
    RelationshipNotInUse {
        /// Relationship id
        relationship: u64,
    },
    /// Referenced first relationship does not touch this node
    RelationshipForOtherNode {
        /// Relationship id
        relationship: u64,
    },
    /// Node is the source of its first relationship, which has a source predecessor
    RelationshipNotFirstInSourceChain {
        /// Relationship id
        relationship: u64,
    },
    /// Node is the target of its first relationship, which has a target predecessor
    RelationshipNotFirstInTargetChain {
        /// Relationship id
        relationship: u64,
    },
    /// Relationship chain loops back on itself
    RelationshipChainContainsCircularReference {
        /// Relationship where the loop was detected
        relationship: u64,
    },
    /// Label token is not in use
    LabelNotInUse {
        /// Label id
        label: LabelId,
    },
    /// Label occurs twice
    LabelDuplicate {
        /// Label id
        label: LabelId,
    },
    /// Labels are not sorted ascending
    LabelsOutOfOrder {
        /// Label seen first
        largest: LabelId,
        /// Smaller label seen after it
        smallest: LabelId,
    },
    /// Block of the dynamic label chain is not in use
    DynamicLabelRecordNotInUse {
        /// Block id
        block: u64,
    },
    /// Dynamic label chain loops back on itself
    DynamicRecordChainCycle {
        /// Block where the loop was detected
        block: u64,
    },
    /// First relationship group is not in use
    RelationshipGroupNotInUse {
        /// Group id
        group: u64,
    },
    /// First relationship group belongs to another node
    RelationshipGroupHasOtherOwner {
        /// Group id
        group: u64,
    },
    /// First block of the dynamic label chain is also claimed by another owner
    DynamicLabelRecordMultipleOwners {
        /// Owner that keeps the block
        other: OwnerRef,
    },
    /// Label field holds an illegal label id or undecodable bytes
    IllegalLabel,
    /// Node has a label the label scan store does not list
    LabelNotInScanStore {
        /// Label id
        label: LabelId,
    },
}

impl NodeViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            NodeViolation::RelationshipNotInUse { relationship } => {
                ViolationDetail::named("relationship_not_in_use").with(*relationship)
            }
            NodeViolation::RelationshipForOtherNode { relationship } => {
                ViolationDetail::named("relationship_for_other_node").with(*relationship)
            }
            NodeViolation::RelationshipNotFirstInSourceChain { relationship } => {
                ViolationDetail::named("relationship_not_first_in_source_chain")
                    .with(*relationship)
            }
            NodeViolation::RelationshipNotFirstInTargetChain { relationship } => {
                ViolationDetail::named("relationship_not_first_in_target_chain")
                    .with(*relationship)
            }
            NodeViolation::RelationshipChainContainsCircularReference { relationship } => {
                ViolationDetail::named("relationship_chain_contains_circular_reference")
                    .with(*relationship)
            }
            NodeViolation::LabelNotInUse { label } => {
                ViolationDetail::named("label_not_in_use").actual(json!(label))
            }
            NodeViolation::LabelDuplicate { label } => {
                ViolationDetail::named("label_duplicate").actual(json!(label))
            }
            NodeViolation::LabelsOutOfOrder { largest, smallest } => {
                ViolationDetail::named("labels_out_of_order")
                    .expected(json!([smallest, largest]))
                    .actual(json!([largest, smallest]))
            }
            NodeViolation::DynamicLabelRecordNotInUse { block } => {
                ViolationDetail::named("dynamic_label_record_not_in_use").with(*block)
            }
            NodeViolation::DynamicRecordChainCycle { block } => {
                ViolationDetail::named("dynamic_record_chain_cycle").with(*block)
            }
            NodeViolation::RelationshipGroupNotInUse { group } => {
                ViolationDetail::named("relationship_group_not_in_use").with(*group)
            }
            NodeViolation::RelationshipGroupHasOtherOwner { group } => {
                ViolationDetail::named("relationship_group_has_other_owner").with(*group)
            }
            NodeViolation::DynamicLabelRecordMultipleOwners { other } => {
                ViolationDetail::named("dynamic_label_record_multiple_owners").with(other.id)
            }
            NodeViolation::IllegalLabel => ViolationDetail::named("illegal_label"),
            NodeViolation::LabelNotInScanStore { label } => {
                ViolationDetail::named("node_label_not_in_index").expected(json!(label))
            }
        }
    }
}

/// Relationship record invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipViolation {
    /// A chain pointer leads to a relationship that is not in use
    NotUsedRelationshipReferencedInChain {
        /// Pointer that was followed
        pointer: ChainPointer,
        /// Relationship it leads to
        relationship: u64,
    },
    /// Type id is the NULL token
    IllegalRelationshipType,
    /// Type token is not in use
    RelationshipTypeNotInUse {
        /// Type id
        rel_type: TypeId,
    },
    /// Source is the NULL reference
    IllegalSourceNode,
    /// Target is the NULL reference
    IllegalTargetNode,
    /// Source node is not in use
    SourceNodeNotInUse {
        /// Node id
        node: u64,
    },
    /// Target node is not in use
    TargetNodeNotInUse {
        /// Node id
        node: u64,
    },
    /// Relationship heads the source chain but the source node points elsewhere
    SourceNodeDoesNotReferenceBack {
        /// Node id
        node: u64,
    },
    /// Relationship heads the target chain but the target node points elsewhere
    TargetNodeDoesNotReferenceBack {
        /// Node id
        node: u64,
    },
    /// Source node claims to have no relationships
    SourceNodeHasNoRelationships {
        /// Node id
        node: u64,
    },
    /// Target node claims to have no relationships
    TargetNodeHasNoRelationships {
        /// Node id
        node: u64,
    },
    /// A chain neighbour does not touch the node the chain belongs to
    ReferencesOtherNodes {
        /// Pointer that was followed
        pointer: ChainPointer,
        /// Neighbour relationship
        relationship: u64,
    },
    /// A chain neighbour does not point back to this relationship
    DoesNotReferenceBack {
        /// Pointer that was followed
        pointer: ChainPointer,
        /// Neighbour relationship
        relationship: u64,
    },
    /// Relationship has a type the type scan store does not list
    TypeNotInScanStore {
        /// Type id
        rel_type: TypeId,
    },
}

impl RelationshipViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            RelationshipViolation::NotUsedRelationshipReferencedInChain {
                pointer,
                relationship,
            } => ViolationDetail::named(format!(
                "not_used_relationship_referenced_in_{}_chain",
                pointer.name()
            ))
            .with(*relationship),
            RelationshipViolation::IllegalRelationshipType => {
                ViolationDetail::named("illegal_relationship_type")
            }
            RelationshipViolation::RelationshipTypeNotInUse { rel_type } => {
                ViolationDetail::named("relationship_type_not_in_use").actual(json!(rel_type))
            }
            RelationshipViolation::IllegalSourceNode => {
                ViolationDetail::named("illegal_source_node")
            }
            RelationshipViolation::IllegalTargetNode => {
                ViolationDetail::named("illegal_target_node")
            }
            RelationshipViolation::SourceNodeNotInUse { node } => {
                ViolationDetail::named("source_node_not_in_use").with(*node)
            }
            RelationshipViolation::TargetNodeNotInUse { node } => {
                ViolationDetail::named("target_node_not_in_use").with(*node)
            }
            RelationshipViolation::SourceNodeDoesNotReferenceBack { node } => {
                ViolationDetail::named("source_node_does_not_reference_back").with(*node)
            }
            RelationshipViolation::TargetNodeDoesNotReferenceBack { node } => {
                ViolationDetail::named("target_node_does_not_reference_back").with(*node)
            }
            RelationshipViolation::SourceNodeHasNoRelationships { node } => {
                ViolationDetail::named("source_node_has_no_relationships").with(*node)
            }
            RelationshipViolation::TargetNodeHasNoRelationships { node } => {
                ViolationDetail::named("target_node_has_no_relationships").with(*node)
            }
            RelationshipViolation::ReferencesOtherNodes {
                pointer,
                relationship,
            } => ViolationDetail::named(format!("{}_references_other_nodes", pointer.name()))
                .with(*relationship),
            RelationshipViolation::DoesNotReferenceBack {
                pointer,
                relationship,
            } => ViolationDetail::named(format!("{}_does_not_reference_back", pointer.name()))
                .with(*relationship),
            RelationshipViolation::TypeNotInScanStore { rel_type } => {
                ViolationDetail::named("relationship_type_not_in_index").expected(json!(rel_type))
            }
        }
    }
}

/// Property record invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// Block key is the NULL token
    InvalidPropertyKey {
        /// Index of the block in the record
        block: usize,
    },
    /// Block key token is not in use
    KeyNotInUse {
        /// Key id
        key: KeyId,
    },
    /// Previous record is not in use
    PrevNotInUse {
        /// Previous record id
        property: u64,
    },
    /// Next record is not in use
    NextNotInUse {
        /// Next record id
        property: u64,
    },
    /// Previous record's next pointer does not lead back here
    PreviousDoesNotReferenceBack {
        /// Previous record id
        property: u64,
    },
    /// Next record's previous pointer does not lead back here
    NextDoesNotReferenceBack {
        /// Next record id
        property: u64,
    },
    /// Block has an undecodable type tag
    InvalidPropertyType {
        /// Key id
        key: KeyId,
        /// Raw tag
        type_tag: u8,
    },
    /// Value bytes cannot be decoded
    InvalidPropertyValue {
        /// Key id
        key: KeyId,
    },
    /// First string block is not in use
    StringNotInUse {
        /// Key id
        key: KeyId,
        /// Block id
        block: u64,
    },
    /// First array block is not in use
    ArrayNotInUse {
        /// Key id
        key: KeyId,
        /// Block id
        block: u64,
    },
    /// First string block is empty
    StringEmpty {
        /// Key id
        key: KeyId,
        /// Block id
        block: u64,
    },
    /// First array block is empty
    ArrayEmpty {
        /// Key id
        key: KeyId,
        /// Block id
        block: u64,
    },
    /// String chain is also claimed by another owner
    StringMultipleOwners {
        /// Owner that keeps the chain
        other: OwnerRef,
    },
    /// Array chain is also claimed by another owner
    ArrayMultipleOwners {
        /// Owner that keeps the chain
        other: OwnerRef,
    },
    /// Chain head that no node, relationship or schema rule points to
    OrphanPropertyChain,
}

impl PropertyViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            PropertyViolation::InvalidPropertyKey { block } => {
                ViolationDetail::named("invalid_property_key").actual(json!(block))
            }
            PropertyViolation::KeyNotInUse { key } => {
                ViolationDetail::named("key_not_in_use").actual(json!(key))
            }
            PropertyViolation::PrevNotInUse { property } => {
                ViolationDetail::named("prev_not_in_use").with(*property)
            }
            PropertyViolation::NextNotInUse { property } => {
                ViolationDetail::named("next_not_in_use").with(*property)
            }
            PropertyViolation::PreviousDoesNotReferenceBack { property } => {
                ViolationDetail::named("previous_does_not_reference_back").with(*property)
            }
            PropertyViolation::NextDoesNotReferenceBack { property } => {
                ViolationDetail::named("next_does_not_reference_back").with(*property)
            }
            PropertyViolation::InvalidPropertyType { key, type_tag } => {
                ViolationDetail::named("invalid_property_type")
                    .actual(json!({ "key": key, "type_tag": type_tag }))
            }
            PropertyViolation::InvalidPropertyValue { key } => {
                ViolationDetail::named("invalid_property_value").actual(json!(key))
            }
            PropertyViolation::StringNotInUse { key, block } => {
                ViolationDetail::named("string_not_in_use")
                    .with(*block)
                    .actual(json!(key))
            }
            PropertyViolation::ArrayNotInUse { key, block } => {
                ViolationDetail::named("array_not_in_use")
                    .with(*block)
                    .actual(json!(key))
            }
            PropertyViolation::StringEmpty { key, block } => ViolationDetail::named("string_empty")
                .with(*block)
                .actual(json!(key)),
            PropertyViolation::ArrayEmpty { key, block } => ViolationDetail::named("array_empty")
                .with(*block)
                .actual(json!(key)),
            PropertyViolation::StringMultipleOwners { other } => {
                ViolationDetail::named("string_multiple_owners").with(other.id)
            }
            PropertyViolation::ArrayMultipleOwners { other } => {
                ViolationDetail::named("array_multiple_owners").with(other.id)
            }
            PropertyViolation::OrphanPropertyChain => {
                ViolationDetail::named("orphan_property_chain")
            }
        }
    }
}

/// Dynamic block invariants (all dynamic stores)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicViolation {
    /// Next block is not in use
    NextNotInUse {
        /// Next block id
        next: u64,
    },
    /// Block is not full yet references a next block
    RecordNotFullReferencesNext,
    /// Payload exceeds the store's block size
    InvalidLength {
        /// Bytes held
        length: usize,
        /// Store block size
        capacity: usize,
    },
    /// Block holds no payload
    EmptyBlock,
    /// Next block holds no payload
    EmptyNextBlock {
        /// Next block id
        next: u64,
    },
    /// Following next pointers comes back to an earlier block
    CircularReferenceNext {
        /// Next block id
        next: u64,
    },
    /// Next block is also claimed by another owner
    NextMultipleOwners {
        /// Owner that keeps the block
        other: OwnerRef,
    },
    /// In-use block nothing points to
    OrphanDynamicRecord,
    /// Label block whose owner node does not point to it
    OrphanDynamicLabelRecordDueToInvalidOwner {
        /// Node the chain claims to belong to
        owner: u64,
    },
    /// Label block with no owning node
    OrphanDynamicLabelRecord,
}

impl DynamicViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            DynamicViolation::NextNotInUse { next } => {
                ViolationDetail::named("next_not_in_use").with(*next)
            }
            DynamicViolation::RecordNotFullReferencesNext => {
                ViolationDetail::named("record_not_full_references_next")
            }
            DynamicViolation::InvalidLength { length, capacity } => {
                ViolationDetail::named("invalid_length")
                    .expected(json!(capacity))
                    .actual(json!(length))
            }
            DynamicViolation::EmptyBlock => ViolationDetail::named("empty_block"),
            DynamicViolation::EmptyNextBlock { next } => {
                ViolationDetail::named("empty_next_block").with(*next)
            }
            DynamicViolation::CircularReferenceNext { next } => {
                ViolationDetail::named("circular_reference_next").with(*next)
            }
            DynamicViolation::NextMultipleOwners { other } => {
                ViolationDetail::named("next_multiple_owners").with(other.id)
            }
            DynamicViolation::OrphanDynamicRecord => {
                ViolationDetail::named("orphan_dynamic_record")
            }
            DynamicViolation::OrphanDynamicLabelRecordDueToInvalidOwner { owner } => {
                ViolationDetail::named("orphan_dynamic_label_record_due_to_invalid_owner")
                    .with(*owner)
            }
            DynamicViolation::OrphanDynamicLabelRecord => {
                ViolationDetail::named("orphan_dynamic_label_record")
            }
        }
    }
}

/// Token name invariants (labels, relationship types, property keys)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameViolation {
    /// First name block is not in use
    NameBlockNotInUse {
        /// Block id
        block: u64,
    },
    /// Name is empty
    EmptyName {
        /// Block id
        block: u64,
    },
    /// Name chain is also claimed by another token
    NameMultipleOwners {
        /// Owner that keeps the chain
        other: OwnerRef,
    },
}

impl NameViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            NameViolation::NameBlockNotInUse { block } => {
                ViolationDetail::named("name_block_not_in_use").with(*block)
            }
            NameViolation::EmptyName { block } => ViolationDetail::named("empty_name").with(*block),
            NameViolation::NameMultipleOwners { other } => {
                ViolationDetail::named("name_multiple_owners").with(other.id)
            }
        }
    }
}

/// Schema rule invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// Referenced label is not in use
    LabelNotInUse {
        /// Label id
        label: LabelId,
    },
    /// Referenced relationship type is not in use
    RelationshipTypeNotInUse {
        /// Type id
        rel_type: TypeId,
    },
    /// Referenced property key is not in use
    PropertyKeyNotInUse {
        /// Key id
        key: KeyId,
    },
    /// Constraint does not reference the index that claims to back it
    UniquenessConstraintNotReferencingBack {
        /// Index rule id
        index: u64,
    },
    /// Constraint references an index that is not a unique index
    UniquenessConstraintReferencingIndexOfWrongType {
        /// Index rule id
        index: u64,
    },
    /// Index does not reference the constraint that claims it
    ConstraintIndexRuleNotReferencingBack {
        /// Constraint rule id
        constraint: u64,
    },
    /// Backing index and constraint disagree on the name
    ConstraintIndexNameDoesNotMatchConstraintName {
        /// Index rule id
        index: u64,
        /// Name of the index
        index_name: String,
        /// Name of the constraint
        constraint_name: String,
    },
    /// Nothing claims this rule although its kind requires a partner
    MissingObligation {
        /// Expected obligation
        kind: ObligationKind,
    },
    /// Two rules impose the same obligation on this rule
    DuplicateObligation {
        /// Rule imposing the conflicting obligation
        other: u64,
    },
    /// Another rule has the same content
    DuplicateRuleContent {
        /// Rule with the same content
        other: u64,
    },
    /// Another rule has the same name
    DuplicateRuleName {
        /// Rule with the same name
        other: u64,
        /// Shared name
        name: String,
    },
    /// Record bytes could not be decoded
    MalformedSchemaRule,
    /// Rule type is unknown
    UnsupportedSchemaRuleType {
        /// Type name found in the record
        rule_type: String,
    },
    /// Index is not online
    SchemaRuleNotOnline {
        /// Current state
        state: IndexState,
    },
}

impl SchemaViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            SchemaViolation::LabelNotInUse { label } => {
                ViolationDetail::named("label_not_in_use").actual(json!(label))
            }
            SchemaViolation::RelationshipTypeNotInUse { rel_type } => {
                ViolationDetail::named("relationship_type_not_in_use").actual(json!(rel_type))
            }
            SchemaViolation::PropertyKeyNotInUse { key } => {
                ViolationDetail::named("property_key_not_in_use").actual(json!(key))
            }
            SchemaViolation::UniquenessConstraintNotReferencingBack { index } => {
                ViolationDetail::named("uniqueness_constraint_not_referencing_back").with(*index)
            }
            SchemaViolation::UniquenessConstraintReferencingIndexOfWrongType { index } => {
                ViolationDetail::named("uniqueness_constraint_referencing_index_of_wrong_type")
                    .with(*index)
            }
            SchemaViolation::ConstraintIndexRuleNotReferencingBack { constraint } => {
                ViolationDetail::named("constraint_index_rule_not_referencing_back")
                    .with(*constraint)
            }
            SchemaViolation::ConstraintIndexNameDoesNotMatchConstraintName {
                index,
                index_name,
                constraint_name,
            } => ViolationDetail::named("constraint_index_name_does_not_match_constraint_name")
                .with(*index)
                .expected(json!(constraint_name))
                .actual(json!(index_name)),
            SchemaViolation::MissingObligation { kind } => {
                ViolationDetail::named("missing_obligation").expected(json!(kind))
            }
            SchemaViolation::DuplicateObligation { other } => {
                ViolationDetail::named("duplicate_obligation").with(*other)
            }
            SchemaViolation::DuplicateRuleContent { other } => {
                ViolationDetail::named("duplicate_rule_content").with(*other)
            }
            SchemaViolation::DuplicateRuleName { other, name } => {
                ViolationDetail::named("duplicate_rule_name")
                    .with(*other)
                    .actual(json!(name))
            }
            SchemaViolation::MalformedSchemaRule => {
                ViolationDetail::named("malformed_schema_rule")
            }
            SchemaViolation::UnsupportedSchemaRuleType { rule_type } => {
                ViolationDetail::named("unsupported_schema_rule_type").actual(json!(rule_type))
            }
            SchemaViolation::SchemaRuleNotOnline { state } => {
                ViolationDetail::named("schema_rule_not_online")
                    .expected(json!(IndexState::Online))
                    .actual(json!(state))
            }
        }
    }
}

/// Relationship group invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupViolation {
    /// Type id is the NULL token
    IllegalRelationshipType,
    /// Type token is not in use
    RelationshipTypeNotInUse {
        /// Type id
        rel_type: TypeId,
    },
    /// Next group is not in use
    NextGroupNotInUse {
        /// Next group id
        next: u64,
    },
    /// Next group's type is not strictly greater
    InvalidTypeSortOrder {
        /// Next group id
        next: u64,
    },
    /// First relationship for a direction is not in use
    FirstRelationshipNotInUse {
        /// Direction
        direction: GroupDirection,
        /// Relationship id
        relationship: u64,
    },
    /// First relationship for a direction has a predecessor
    FirstRelationshipNotFirstInChain {
        /// Direction
        direction: GroupDirection,
        /// Relationship id
        relationship: u64,
    },
    /// First relationship for a direction has another type
    FirstRelationshipOfOtherType {
        /// Direction
        direction: GroupDirection,
        /// Relationship id
        relationship: u64,
    },
    /// First relationship for a direction does not have the owner on the right side
    FirstRelationshipDoesNotShareNodeWithGroup {
        /// Direction
        direction: GroupDirection,
        /// Relationship id
        relationship: u64,
    },
    /// Owner node is not in use
    OwnerNotInUse {
        /// Node id
        owner: u64,
    },
    /// Owner is the NULL reference
    IllegalOwner,
    /// Next group belongs to another node
    NextHasOtherOwner {
        /// Next group id
        next: u64,
    },
    /// Owner node has more than one group with no next group
    MultipleLastGroups {
        /// Owner node
        node: u64,
        /// The other terminal group
        other: u64,
    },
}

impl GroupViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            GroupViolation::IllegalRelationshipType => {
                ViolationDetail::named("illegal_relationship_type")
            }
            GroupViolation::RelationshipTypeNotInUse { rel_type } => {
                ViolationDetail::named("relationship_type_not_in_use").actual(json!(rel_type))
            }
            GroupViolation::NextGroupNotInUse { next } => {
                ViolationDetail::named("next_group_not_in_use").with(*next)
            }
            GroupViolation::InvalidTypeSortOrder { next } => {
                ViolationDetail::named("invalid_type_sort_order").with(*next)
            }
            GroupViolation::FirstRelationshipNotInUse {
                direction,
                relationship,
            } => ViolationDetail::named(format!(
                "first_{}_relationship_not_in_use",
                direction_name(*direction)
            ))
            .with(*relationship),
            GroupViolation::FirstRelationshipNotFirstInChain {
                direction,
                relationship,
            } => ViolationDetail::named(format!(
                "first_{}_relationship_not_first_in_chain",
                direction_name(*direction)
            ))
            .with(*relationship),
            GroupViolation::FirstRelationshipOfOtherType {
                direction,
                relationship,
            } => ViolationDetail::named(format!(
                "first_{}_relationship_of_other_type",
                direction_name(*direction)
            ))
            .with(*relationship),
            GroupViolation::FirstRelationshipDoesNotShareNodeWithGroup {
                direction,
                relationship,
            } => ViolationDetail::named(format!(
                "first_{}_relationship_does_not_share_node_with_group",
                direction_name(*direction)
            ))
            .with(*relationship),
            GroupViolation::OwnerNotInUse { owner } => {
                ViolationDetail::named("owner_not_in_use").with(*owner)
            }
            GroupViolation::IllegalOwner => ViolationDetail::named("illegal_owner"),
            GroupViolation::NextHasOtherOwner { next } => {
                ViolationDetail::named("next_has_other_owner").with(*next)
            }
            GroupViolation::MultipleLastGroups { node, other } => {
                ViolationDetail::named("multiple_last_groups")
                    .with(*node)
                    .with(*other)
            }
        }
    }
}

/// Label scan and relationship type scan invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScanViolation {
    /// Scanned entity is not in use
    EntityNotInUse {
        /// Nodes or relationships
        kind: EntityKind,
        /// Entity id
        entity: u64,
    },
    /// Scanned entity does not carry a token the document lists
    EntityDoesNotHaveExpectedToken {
        /// Nodes or relationships
        kind: EntityKind,
        /// Entity id
        entity: u64,
        /// Listed token
        token: u32,
    },
    /// Scan store was not shut down cleanly
    DirtyIndex {
        /// Nodes or relationships
        kind: EntityKind,
    },
}

impl TokenScanViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            TokenScanViolation::EntityNotInUse { kind, entity } => {
                ViolationDetail::named(format!("{}_not_in_use", entity_name(*kind))).with(*entity)
            }
            TokenScanViolation::EntityDoesNotHaveExpectedToken {
                kind,
                entity,
                token,
            } => {
                let what = match kind {
                    EntityKind::Node => "node_does_not_have_expected_label",
                    EntityKind::Relationship => {
                        "relationship_does_not_have_expected_relationship_type"
                    }
                };
                ViolationDetail::named(what)
                    .with(*entity)
                    .expected(json!(token))
            }
            TokenScanViolation::DirtyIndex { .. } => ViolationDetail::named("dirty_index"),
        }
    }
}

/// Property index entry invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexViolation {
    /// Indexed entity is not in use
    EntityNotInUse {
        /// Nodes or relationships
        kind: EntityKind,
        /// Entity id
        entity: u64,
    },
    /// Indexed entity lacks the index's label or type
    EntityDoesNotHaveExpectedToken {
        /// Nodes or relationships
        kind: EntityKind,
        /// Entity id
        entity: u64,
        /// Index label or type
        token: u32,
    },
    /// Indexed entity lacks one of the indexed properties
    IndexedWhenShouldNot {
        /// Nodes or relationships
        kind: EntityKind,
        /// Entity id
        entity: u64,
    },
    /// Indexed values differ from the entity's property values
    IndexedWithWrongValues {
        /// Nodes or relationships
        kind: EntityKind,
        /// Entity id
        entity: u64,
        /// Values held by the entity
        expected: Vec<Value>,
        /// Values held by the index entry
        indexed: Vec<Value>,
    },
    /// Index was not shut down cleanly
    DirtyIndex,
    /// Unique index over relationships, which this engine cannot enforce
    RelationshipConstraintIndex,
}

impl IndexViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            IndexViolation::EntityNotInUse { kind, entity } => {
                ViolationDetail::named(format!("{}_not_in_use", entity_name(*kind))).with(*entity)
            }
            IndexViolation::EntityDoesNotHaveExpectedToken {
                kind,
                entity,
                token,
            } => {
                let what = match kind {
                    EntityKind::Node => "node_does_not_have_expected_label",
                    EntityKind::Relationship => {
                        "relationship_does_not_have_expected_relationship_type"
                    }
                };
                ViolationDetail::named(what)
                    .with(*entity)
                    .expected(json!(token))
            }
            IndexViolation::IndexedWhenShouldNot { kind, entity } => {
                ViolationDetail::named(format!("{}_indexed_when_should_not", entity_name(*kind)))
                    .with(*entity)
            }
            IndexViolation::IndexedWithWrongValues {
                kind,
                entity,
                expected,
                indexed,
            } => ViolationDetail::named(format!(
                "{}_indexed_with_wrong_values",
                entity_name(*kind)
            ))
            .with(*entity)
            .expected(values_json(expected))
            .actual(values_json(indexed)),
            IndexViolation::DirtyIndex => ViolationDetail::named("dirty_index"),
            IndexViolation::RelationshipConstraintIndex => {
                ViolationDetail::named("relationship_constraint_index")
            }
        }
    }
}

/// Counts store invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountsViolation {
    /// Stored node count differs from the recomputed one
    InconsistentNodeCount {
        /// Recomputed count
        expected: u64,
        /// Stored count
        actual: u64,
    },
    /// Stored relationship count differs from the recomputed one
    InconsistentRelationshipCount {
        /// Recomputed count
        expected: u64,
        /// Stored count
        actual: u64,
    },
}

impl CountsViolation {
    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            CountsViolation::InconsistentNodeCount { expected, actual } => {
                ViolationDetail::named("inconsistent_node_count")
                    .expected(json!(expected))
                    .actual(json!(actual))
            }
            CountsViolation::InconsistentRelationshipCount { expected, actual } => {
                ViolationDetail::named("inconsistent_relationship_count")
                    .expected(json!(expected))
                    .actual(json!(actual))
            }
        }
    }
}

/// Any violation, grouped by record category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Shared node/relationship invariant
    Entity {
        /// Entity the violation was found on
        kind: EntityKind,
        /// The violation
        violation: EntityViolation,
    },
    /// Node invariant
    Node(NodeViolation),
    /// Relationship invariant
    Relationship(RelationshipViolation),
    /// Relationship group invariant
    Group(GroupViolation),
    /// Property invariant
    Property(PropertyViolation),
    /// Dynamic block invariant
    Dynamic(DynamicViolation),
    /// Token name invariant
    Name(NameViolation),
    /// Schema rule invariant
    Schema(SchemaViolation),
    /// Index entry invariant
    Index(IndexViolation),
    /// Token scan document invariant
    TokenScan(TokenScanViolation),
    /// Counts invariant
    Counts(CountsViolation),
}

impl Violation {
    /// Severity of this violation
    pub fn severity(&self) -> Severity {
        let advisory = matches!(
            self,
            Violation::Name(NameViolation::EmptyName { .. })
                | Violation::Dynamic(
                    DynamicViolation::RecordNotFullReferencesNext
                        | DynamicViolation::EmptyBlock
                        | DynamicViolation::EmptyNextBlock { .. }
                )
                | Violation::Schema(SchemaViolation::SchemaRuleNotOnline { .. })
                | Violation::Index(IndexViolation::DirtyIndex)
                | Violation::TokenScan(TokenScanViolation::DirtyIndex { .. })
        );
        if advisory {
            Severity::Warning
        } else {
            Severity::Error
        }
    }

    /// Export breakdown
    pub fn detail(&self) -> ViolationDetail {
        match self {
            Violation::Entity { violation, .. } => violation.detail(),
            Violation::Node(v) => v.detail(),
            Violation::Relationship(v) => v.detail(),
            Violation::Group(v) => v.detail(),
            Violation::Property(v) => v.detail(),
            Violation::Dynamic(v) => v.detail(),
            Violation::Name(v) => v.detail(),
            Violation::Schema(v) => v.detail(),
            Violation::Index(v) => v.detail(),
            Violation::TokenScan(v) => v.detail(),
            Violation::Counts(v) => v.detail(),
        }
    }
}

macro_rules! into_violation {
    ($($kind:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$kind> for Violation {
                fn from(violation: $kind) -> Self {
                    Violation::$variant(violation)
                }
            }
        )*
    };
}

into_violation! {
    NodeViolation => Node,
    RelationshipViolation => Relationship,
    GroupViolation => Group,
    PropertyViolation => Property,
    DynamicViolation => Dynamic,
    NameViolation => Name,
    SchemaViolation => Schema,
    IndexViolation => Index,
    TokenScanViolation => TokenScan,
    CountsViolation => Counts,
}

/// Extra qualifier for record ids that are only unique within a sub-store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordScope {
    /// Id is unique within its category
    Global,
    /// Dynamic block id within a dynamic store
    Store(DynamicStoreKind),
    /// Entity id within an index
    Index(u64),
    /// Entity id within a label or relationship type scan store
    Scan(EntityKind),
}

/// Record a violation was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record category
    pub category: RecordCategory,
    /// Record id
    pub id: u64,
    /// Sub-store qualifier
    pub scope: RecordScope,
}

impl RecordRef {
    /// Reference to a record whose id is unique within its category
    pub fn new(category: RecordCategory, id: u64) -> Self {
        Self {
            category,
            id,
            scope: RecordScope::Global,
        }
    }

    /// Reference qualified by a sub-store
    pub fn scoped(category: RecordCategory, id: u64, scope: RecordScope) -> Self {
        Self {
            category,
            id,
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_variants() {
        assert_eq!(
            Violation::from(NameViolation::EmptyName { block: 1 }).severity(),
            Severity::Warning
        );
        assert_eq!(
            Violation::from(DynamicViolation::RecordNotFullReferencesNext).severity(),
            Severity::Warning
        );
        assert_eq!(
            Violation::from(IndexViolation::DirtyIndex).severity(),
            Severity::Warning
        );
        assert_eq!(
            Violation::from(SchemaViolation::SchemaRuleNotOnline {
                state: IndexState::Populating
            })
            .severity(),
            Severity::Warning
        );
    }

    #[test]
    fn test_error_variants() {
        assert_eq!(
            Violation::from(GroupViolation::InvalidTypeSortOrder { next: 2 }).severity(),
            Severity::Error
        );
        assert_eq!(
            Violation::Entity {
                kind: EntityKind::Node,
                violation: EntityViolation::PropertyNotInUse { property: 3 },
            }
            .severity(),
            Severity::Error
        );
    }

    #[test]
    fn test_detail_names_parameterised_variants() {
        let detail = Violation::from(RelationshipViolation::DoesNotReferenceBack {
            pointer: ChainPointer::TargetNext,
            relationship: 9,
        })
        .detail();
        assert_eq!(detail.kind, "target_next_does_not_reference_back");
        assert_eq!(detail.context, vec![9]);

        let detail = Violation::from(GroupViolation::FirstRelationshipOfOtherType {
            direction: GroupDirection::Loop,
            relationship: 4,
        })
        .detail();
        assert_eq!(detail.kind, "first_loop_relationship_of_other_type");
    }

    #[test]
    fn test_counts_detail_carries_expected_and_actual() {
        let detail = Violation::from(CountsViolation::InconsistentRelationshipCount {
            expected: 4,
            actual: 5,
        })
        .detail();
        assert_eq!(detail.kind, "inconsistent_relationship_count");
        assert_eq!(detail.expected, Some(json!(4)));
        assert_eq!(detail.actual, Some(json!(5)));
    }
}

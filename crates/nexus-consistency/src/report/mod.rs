//! Violation reporting
//!
//! Checks never return findings; they push them through typed report handles
//! into a [`ReportSink`]. A handle is bound to one record, so a node check can
//! only report node violations (plus the shared [`EntityViolation`]s through
//! [`EntityReport`]) against that node.
//!
//! ```text
//! Reporter ──for_node(&node)──▶ NodeReport ──report(v)──▶ ReportSink
//!                                     │                    ├─ CollectingSink
//!                                     └─ EntityReport      ├─ TracingSink
//!                                                          └─ NoReport
//! ```

mod record;
mod sink;
mod violation;

pub use record::ViolationRecord;
pub use sink::{
    CategoryCounts, CollectingSink, ConfiguredSink, NoReport, ReportSink, ReportSummary,
    TracingSink,
};
pub use violation::{
    ChainPointer, CountsViolation, DynamicViolation, EntityViolation, GroupViolation,
    IndexViolation, NameViolation, NodeViolation, ObligationKind, OwnerRef, PropertyViolation,
    RecordRef, RecordScope, RelationshipViolation, SchemaViolation, Severity, TokenScanViolation,
    Violation, ViolationDetail,
};

use crate::record::{
    CountsKey, DynamicRecord, DynamicStoreKind, EntityKind, IndexEntry, NULL_REF, NodeRecord,
    PropertyRecord, RecordCategory, RelationshipGroupRecord, RelationshipRecord, SchemaRecord,
    TokenRecord, TokenScanDocument,
};
use std::fmt;
use std::marker::PhantomData;

/// A violation found on a specific record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedViolation {
    /// Record the violation was found on
    pub record: RecordRef,
    /// What is wrong with it
    pub violation: Violation,
}

impl ReportedViolation {
    /// Severity of the violation
    pub fn severity(&self) -> Severity {
        self.violation.severity()
    }

    /// Serializable export form
    pub fn to_record(&self) -> ViolationRecord {
        ViolationRecord::from_reported(self)
    }
}

impl fmt::Display for ReportedViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let detail = self.violation.detail();
        write!(
            f,
            "{:?} {:?}[{}]: {}",
            self.severity(),
            self.record.category,
            self.record.id,
            detail.kind
        )?;
        if !detail.context.is_empty() {
            write!(f, " {:?}", detail.context)?;
        }
        Ok(())
    }
}

/// Report handle bound to one record
pub struct Report<'r, V> {
    sink: &'r dyn ReportSink,
    record: RecordRef,
    _violations: PhantomData<fn(V)>,
}

impl<'r, V: Into<Violation>> Report<'r, V> {
    fn new(sink: &'r dyn ReportSink, record: RecordRef) -> Self {
        Self {
            sink,
            record,
            _violations: PhantomData,
        }
    }

    /// Report a violation against the bound record
    pub fn report(&self, violation: V) {
        self.emit(violation.into());
    }

    /// Record this handle reports against
    pub fn record(&self) -> RecordRef {
        self.record
    }

    fn emit(&self, violation: Violation) {
        self.sink.report(ReportedViolation {
            record: self.record,
            violation,
        });
    }
}

/// Node report handle
pub type NodeReport<'r> = Report<'r, NodeViolation>;
/// Relationship report handle
pub type RelationshipReport<'r> = Report<'r, RelationshipViolation>;
/// Relationship group report handle
pub type GroupReport<'r> = Report<'r, GroupViolation>;
/// Property report handle
pub type PropertyReport<'r> = Report<'r, PropertyViolation>;
/// Dynamic block report handle
pub type DynamicReport<'r> = Report<'r, DynamicViolation>;
/// Token report handle
pub type NameReport<'r> = Report<'r, NameViolation>;
/// Schema rule report handle
pub type SchemaReport<'r> = Report<'r, SchemaViolation>;
/// Index report handle
pub type IndexReport<'r> = Report<'r, IndexViolation>;
/// Token scan report handle
pub type TokenScanReport<'r> = Report<'r, TokenScanViolation>;
/// Counts report handle
pub type CountsReport<'r> = Report<'r, CountsViolation>;

/// Capability shared by node and relationship handles
pub trait EntityReport {
    /// Entity kind the handle is bound to
    fn entity_kind(&self) -> EntityKind;

    /// Report a shared entity violation
    fn report_entity(&self, violation: EntityViolation);
}

impl EntityReport for Report<'_, NodeViolation> {
    fn entity_kind(&self) -> EntityKind {
        EntityKind::Node
    }

    fn report_entity(&self, violation: EntityViolation) {
        self.emit(Violation::Entity {
            kind: EntityKind::Node,
            violation,
        });
    }
}

impl EntityReport for Report<'_, RelationshipViolation> {
    fn entity_kind(&self) -> EntityKind {
        EntityKind::Relationship
    }

    fn report_entity(&self, violation: EntityViolation) {
        self.emit(Violation::Entity {
            kind: EntityKind::Relationship,
            violation,
        });
    }
}

/// Hands out report handles over a sink
#[derive(Clone, Copy)]
pub struct Reporter<'s> {
    sink: &'s dyn ReportSink,
}

impl<'s> Reporter<'s> {
    /// Reporter writing into `sink`
    pub fn new(sink: &'s dyn ReportSink) -> Self {
        Self { sink }
    }

    /// Underlying sink
    pub fn sink(&self) -> &'s dyn ReportSink {
        self.sink
    }

    /// Handle for a node record
    pub fn for_node(&self, node: &NodeRecord) -> NodeReport<'s> {
        Report::new(self.sink, RecordRef::new(RecordCategory::Node, node.id))
    }

    /// Handle for a relationship record
    pub fn for_relationship(&self, rel: &RelationshipRecord) -> RelationshipReport<'s> {
        Report::new(self.sink, RecordRef::new(RecordCategory::Relationship, rel.id))
    }

    /// Handle for a node or relationship by id
    pub fn for_entity(&self, kind: EntityKind, id: u64) -> Box<dyn EntityReport + 's> {
        match kind {
            EntityKind::Node => Box::new(NodeReport::new(
                self.sink,
                RecordRef::new(RecordCategory::Node, id),
            )),
            EntityKind::Relationship => Box::new(RelationshipReport::new(
                self.sink,
                RecordRef::new(RecordCategory::Relationship, id),
            )),
        }
    }

    /// Handle for a relationship group record
    pub fn for_group(&self, group: &RelationshipGroupRecord) -> GroupReport<'s> {
        Report::new(
            self.sink,
            RecordRef::new(RecordCategory::RelationshipGroup, group.id),
        )
    }

    /// Handle for a property record
    pub fn for_property(&self, property: &PropertyRecord) -> PropertyReport<'s> {
        Report::new(self.sink, RecordRef::new(RecordCategory::Property, property.id))
    }

    /// Handle for a block of a dynamic store
    pub fn for_dynamic(&self, store: DynamicStoreKind, block: &DynamicRecord) -> DynamicReport<'s> {
        Report::new(
            self.sink,
            RecordRef::scoped(
                RecordCategory::DynamicRecord,
                block.id,
                RecordScope::Store(store),
            ),
        )
    }

    /// Handle for a token record
    pub fn for_token(&self, token: &TokenRecord) -> NameReport<'s> {
        Report::new(
            self.sink,
            RecordRef::new(RecordCategory::for_token(token.kind), u64::from(token.id)),
        )
    }

    /// Handle for a schema record
    pub fn for_schema(&self, rule: &SchemaRecord) -> SchemaReport<'s> {
        Report::new(self.sink, RecordRef::new(RecordCategory::SchemaRule, rule.id))
    }

    /// Handle for an index as a whole (dirty flags, unsupported index kinds)
    pub fn for_index(&self, index: u64) -> IndexReport<'s> {
        Report::new(self.sink, RecordRef::new(RecordCategory::SchemaRule, index))
    }

    /// Handle for one entry of an index
    pub fn for_index_entry(&self, entry: &IndexEntry) -> IndexReport<'s> {
        Report::new(
            self.sink,
            RecordRef::scoped(
                RecordCategory::IndexEntry,
                entry.entity,
                RecordScope::Index(entry.index),
            ),
        )
    }

    /// Handle for a scan store as a whole
    pub fn for_scan_store(&self, kind: EntityKind) -> TokenScanReport<'s> {
        Report::new(
            self.sink,
            RecordRef::scoped(RecordCategory::ScanDocument, NULL_REF, RecordScope::Scan(kind)),
        )
    }

    /// Handle for one token scan document
    pub fn for_scan_document(&self, document: &TokenScanDocument) -> TokenScanReport<'s> {
        Report::new(
            self.sink,
            RecordRef::scoped(
                RecordCategory::ScanDocument,
                document.entity,
                RecordScope::Scan(document.entity_kind),
            ),
        )
    }

    /// Handle for one counts key
    pub fn for_counts(&self, key: &CountsKey) -> CountsReport<'s> {
        Report::new(
            self.sink,
            RecordRef::new(RecordCategory::CountsEntry, key.synthetic_id()),
        )
    }
}

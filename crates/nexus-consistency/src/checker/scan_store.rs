//! Label scan and relationship type scan stores

use super::{CheckContext, node};
use crate::error::Result;
use crate::record::{EntityKind, RecordCategory, TokenScanDocument};
use crate::report::TokenScanViolation;
use rayon::prelude::*;
use tracing::debug;

pub(super) fn check(ctx: &CheckContext<'_>) -> Result<()> {
    for kind in [EntityKind::Node, EntityKind::Relationship] {
        if ctx.stopped() {
            break;
        }
        if ctx.store.scan_is_dirty(kind)? {
            ctx.reporter
                .for_scan_store(kind)
                .report(TokenScanViolation::DirtyIndex { kind });
        }

        let documents = ctx.store.scan_documents(kind)?;
        documents
            .par_chunks(ctx.chunk_len())
            .try_for_each(|chunk| -> Result<()> {
                for document in chunk {
                    if ctx.stopped() {
                        break;
                    }
                    check_document(ctx, document)?;
                }
                Ok(())
            })?;
        ctx.record_checked(RecordCategory::ScanDocument, documents.len() as u64);
        debug!(?kind, documents = documents.len(), "scan store checked");
    }
    Ok(())
}

fn check_document(ctx: &CheckContext<'_>, document: &TokenScanDocument) -> Result<()> {
    let kind = document.entity_kind;
    let entity = document.entity;
    let report = ctx.reporter.for_scan_document(document);

    let tokens = match kind {
        EntityKind::Node => {
            let record = ctx.store.node(entity)?;
            if !record.in_use {
                report.report(TokenScanViolation::EntityNotInUse { kind, entity });
                return Ok(());
            }
            node::labels_of(ctx.store, &record)?
        }
        EntityKind::Relationship => {
            let record = ctx.store.relationship(entity)?;
            if !record.in_use {
                report.report(TokenScanViolation::EntityNotInUse { kind, entity });
                return Ok(());
            }
            vec![record.rel_type]
        }
    };

    for token in document.tokens.iter() {
        if !tokens.contains(&token) {
            report.report(TokenScanViolation::EntityDoesNotHaveExpectedToken {
                kind,
                entity,
                token,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::check_collect;
    use crate::record::{EntityKind, TokenKind, TokenScanDocument};
    use crate::report::{NodeViolation, RecordScope, TokenScanViolation, Violation};
    use crate::store::MemoryStore;

    #[test]
    fn test_documents_against_records() {
        let store = MemoryStore::new();
        let person = store.create_token(TokenKind::Label, "Person").unwrap();
        let city = store.create_token(TokenKind::Label, "City").unwrap();
        let t = store.create_token(TokenKind::RelationshipType, "T").unwrap();
        let a = store.create_node(&[person]).unwrap();
        let b = store.create_node(&[]).unwrap();
        let rel = store.create_relationship(a, b, t).unwrap();

        store.put_scan_document(TokenScanDocument::new(EntityKind::Node, a, &[person, city]));
        store.put_scan_document(TokenScanDocument::new(EntityKind::Node, 30, &[person]));
        store.put_scan_document(TokenScanDocument::new(EntityKind::Relationship, rel, &[t, 5]));

        let sink = check_collect(&store);
        let found: Vec<_> = sink
            .violations()
            .into_iter()
            .filter_map(|v| match v.violation {
                Violation::TokenScan(violation) => Some((v.record.scope, violation)),
                _ => None,
            })
            .collect();
        assert!(found.contains(&(
            RecordScope::Scan(EntityKind::Node),
            TokenScanViolation::EntityDoesNotHaveExpectedToken {
                kind: EntityKind::Node,
                entity: a,
                token: city
            }
        )));
        assert!(found.contains(&(
            RecordScope::Scan(EntityKind::Node),
            TokenScanViolation::EntityNotInUse {
                kind: EntityKind::Node,
                entity: 30
            }
        )));
        assert!(found.contains(&(
            RecordScope::Scan(EntityKind::Relationship),
            TokenScanViolation::EntityDoesNotHaveExpectedToken {
                kind: EntityKind::Relationship,
                entity: rel,
                token: 5
            }
        )));
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn test_missing_documents_and_dirty_store() {
        let store = MemoryStore::new();
        let person = store.create_token(TokenKind::Label, "Person").unwrap();
        let a = store.create_node(&[person]).unwrap();
        store.remove_scan_document(EntityKind::Node, a);
        store.mark_scan_dirty(EntityKind::Relationship, true);

        let sink = check_collect(&store);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count_of("node_label_not_in_index"), 1);
        assert_eq!(sink.count_of("dirty_index"), 1);
        assert!(sink.violations().iter().any(|v| v.violation
            == Violation::Node(NodeViolation::LabelNotInScanStore { label: person })));
    }
}

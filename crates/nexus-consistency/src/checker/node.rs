//! Node checks: labels, relationship head, property chain, secondary structures

use super::{CheckContext, index, property};
use crate::error::Result;
use crate::record::{
    DynamicStoreKind, EntityKind, LabelField, LabelId, NULL_REF, NULL_TOKEN, NodeRecord,
    RecordCategory, RelationshipHead, TokenKind, link,
};
use crate::report::{DynamicViolation, NodeReport, NodeViolation, OwnerRef};
use crate::store::{ChainStep, StoreAccess, StoreFile, read_dynamic_chain};
use roaring::RoaringTreemap;
use std::collections::BTreeSet;

pub(super) fn check(ctx: &CheckContext<'_>, id: u64) -> Result<()> {
    let node = ctx.store.node(id)?;
    if !node.in_use {
        return Ok(());
    }
    let report = ctx.reporter.for_node(&node);
    let labels = check_labels(ctx, &node, &report)?;

    if ctx.graph() {
        check_relationship_head(ctx, &node, &report)?;
        property::check_entity_chain(
            ctx,
            &report,
            OwnerRef::new(RecordCategory::Node, id),
            node.first_property(),
        )?;
    }
    index::check_entity_rules(
        ctx,
        &report,
        EntityKind::Node,
        id,
        &labels,
        node.first_property(),
    )?;

    if ctx.config.check_token_scans {
        for &label in &labels {
            if !ctx.store.scan_contains(EntityKind::Node, id, label)? {
                report.report(NodeViolation::LabelNotInScanStore { label });
            }
        }
    }
    if ctx.config.check_counts {
        ctx.counts.node(&labels);
    }
    Ok(())
}

/// Labels of a node, read without reporting; empty when the label chain is broken
pub(super) fn labels_of(store: &dyn StoreAccess, node: &NodeRecord) -> Result<Vec<LabelId>> {
    let labels = match &node.labels {
        LabelField::Inline(labels) => labels.clone(),
        LabelField::Dynamic(first) => {
            let chain = read_dynamic_chain(store, DynamicStoreKind::NodeLabels, *first)?;
            if !chain.is_complete() {
                return Ok(Vec::new());
            }
            LabelField::decode_dynamic(&chain.bytes())
                .map(|(_, labels)| labels)
                .unwrap_or_default()
        }
    };
    Ok(legal(labels))
}

fn legal(mut labels: Vec<LabelId>) -> Vec<LabelId> {
    labels.retain(|label| *label != NULL_TOKEN);
    labels.sort_unstable();
    labels.dedup();
    labels
}

/// Check the label field and return the node's legal labels
fn check_labels(
    ctx: &CheckContext<'_>,
    node: &NodeRecord,
    report: &NodeReport<'_>,
) -> Result<Vec<LabelId>> {
    let graph = ctx.graph();
    let labels = match &node.labels {
        LabelField::Inline(labels) => labels.clone(),
        LabelField::Dynamic(first) => {
            let first = *first;
            let kind = DynamicStoreKind::NodeLabels;
            let chain = read_dynamic_chain(ctx.store, kind, first)?;
            if !chain.blocks.is_empty() {
                ctx.ownership
                    .claim_dynamic(kind, first, OwnerRef::new(RecordCategory::Node, node.id));
            }
            match chain.end {
                ChainStep::Complete => {}
                ChainStep::NotInUse(block) => {
                    if graph {
                        report.report(NodeViolation::DynamicLabelRecordNotInUse { block });
                    }
                    return Ok(Vec::new());
                }
                ChainStep::Cycle(block) => {
                    if graph {
                        report.report(NodeViolation::DynamicRecordChainCycle { block });
                    }
                    return Ok(Vec::new());
                }
                ChainStep::Overrun => {
                    if graph {
                        report.report(NodeViolation::DynamicRecordChainCycle { block: first });
                    }
                    return Ok(Vec::new());
                }
            }

            match LabelField::decode_dynamic(&chain.bytes()) {
                Some((owner, labels)) => {
                    if graph && owner != node.id {
                        if let Some(head) = chain.blocks.first() {
                            ctx.reporter.for_dynamic(kind, head).report(
                                DynamicViolation::OrphanDynamicLabelRecordDueToInvalidOwner {
                                    owner,
                                },
                            );
                        }
                    }
                    labels
                }
                None => {
                    if graph {
                        report.report(NodeViolation::IllegalLabel);
                    }
                    return Ok(Vec::new());
                }
            }
        }
    };

    if graph {
        for &label in &labels {
            if label == NULL_TOKEN {
                report.report(NodeViolation::IllegalLabel);
            } else if !ctx.token_in_use(TokenKind::Label, label)? {
                report.report(NodeViolation::LabelNotInUse { label });
            }
        }

        let mut seen = BTreeSet::new();
        let mut duplicated = BTreeSet::new();
        for &label in &labels {
            if !seen.insert(label) && duplicated.insert(label) {
                report.report(NodeViolation::LabelDuplicate { label });
            }
        }
        for pair in labels.windows(2) {
            if pair[0] > pair[1] {
                report.report(NodeViolation::LabelsOutOfOrder {
                    largest: pair[0],
                    smallest: pair[1],
                });
            }
        }
    }
    Ok(legal(labels))
}

fn check_relationship_head(
    ctx: &CheckContext<'_>,
    node: &NodeRecord,
    report: &NodeReport<'_>,
) -> Result<()> {
    match node.relationships {
        RelationshipHead::None => Ok(()),
        RelationshipHead::Chain(first) => {
            let rel = ctx.store.relationship(first)?;
            if !rel.in_use {
                report.report(NodeViolation::RelationshipNotInUse { relationship: first });
                return Ok(());
            }
            if !rel.touches(node.id) {
                report.report(NodeViolation::RelationshipForOtherNode { relationship: first });
                return Ok(());
            }
            if rel.source == node.id && rel.source_prev != NULL_REF {
                report.report(NodeViolation::RelationshipNotFirstInSourceChain {
                    relationship: first,
                });
            } else if rel.target == node.id && rel.target_prev != NULL_REF {
                report.report(NodeViolation::RelationshipNotFirstInTargetChain {
                    relationship: first,
                });
            }
            walk_relationship_chain(ctx, node.id, first, report)
        }
        RelationshipHead::Groups(first) => {
            let group = ctx.store.group(first)?;
            if !group.in_use {
                report.report(NodeViolation::RelationshipGroupNotInUse { group: first });
                return Ok(());
            }
            if group.owner != node.id {
                report.report(NodeViolation::RelationshipGroupHasOtherOwner { group: first });
                return Ok(());
            }

            // Broken group links are reported by the group pass
            let bound = ctx.store.high_id(StoreFile::RelationshipGroups);
            let mut visited = RoaringTreemap::new();
            let mut current = Some(first);
            while let Some(id) = current {
                if !visited.insert(id) || visited.len() > bound {
                    break;
                }
                let group = ctx.store.group(id)?;
                if !group.in_use || group.owner != node.id {
                    break;
                }
                for head in [group.first_out, group.first_in, group.first_loop] {
                    if let Some(head) = link(head) {
                        walk_relationship_chain(ctx, node.id, head, report)?;
                    }
                }
                current = group.next_group();
            }
            Ok(())
        }
    }
}

fn walk_relationship_chain(
    ctx: &CheckContext<'_>,
    node: u64,
    first: u64,
    report: &NodeReport<'_>,
) -> Result<()> {
    let bound = ctx.store.high_id(StoreFile::Relationships);
    let mut visited = RoaringTreemap::new();
    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) || visited.len() > bound {
            report.report(NodeViolation::RelationshipChainContainsCircularReference {
                relationship: id,
            });
            break;
        }
        let rel = ctx.store.relationship(id)?;
        if !rel.in_use {
            break;
        }
        if rel.touches(node) {
            ctx.chains.reached(node, id);
        }
        current = rel.next_for(node).and_then(link);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::check_collect;
    use crate::record::{LabelField, NodeRecord, RelationshipHead, RelationshipRecord, TokenKind};
    use crate::report::{NodeViolation, Violation};
    use crate::store::{MemoryStore, StoreAccess};

    fn node_violations(store: &MemoryStore, node: u64) -> Vec<NodeViolation> {
        check_collect(store)
            .violations()
            .into_iter()
            .filter(|v| v.record.id == node)
            .filter_map(|v| match v.violation {
                Violation::Node(violation) => Some(violation),
                _ => None,
            })
            .collect()
    }

    fn labels(store: &MemoryStore, count: usize) -> Vec<u32> {
        (0..count)
            .map(|i| store.create_token(TokenKind::Label, &format!("L{i}")).unwrap())
            .collect()
    }

    #[test]
    fn test_inline_label_checks() {
        let store = MemoryStore::new();
        let ids = labels(&store, 3);
        let node = store.create_node(&[]).unwrap();
        let mut record = store.node(node).unwrap();
        record.labels = LabelField::Inline(vec![ids[2], ids[0], ids[0], 9]);
        store.put_node(record).unwrap();

        let found = node_violations(&store, node);
        assert!(found.contains(&NodeViolation::LabelNotInUse { label: 9 }));
        assert!(found.contains(&NodeViolation::LabelDuplicate { label: ids[0] }));
        assert!(found.contains(&NodeViolation::LabelsOutOfOrder {
            largest: ids[2],
            smallest: ids[0]
        }));
        assert_eq!(
            found
                .iter()
                .filter(|v| matches!(v, NodeViolation::LabelDuplicate { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_dynamic_labels_are_read() {
        let store = MemoryStore::new();
        let ids = labels(&store, 6);
        let node = store.create_node(&ids).unwrap();
        assert!(matches!(store.node(node).unwrap().labels, LabelField::Dynamic(_)));
        assert!(check_collect(&store).is_empty());
    }

    #[test]
    fn test_dynamic_label_chain_not_in_use() {
        let store = MemoryStore::new();
        let node = store.create_node(&[]).unwrap();
        let mut record = store.node(node).unwrap();
        record.labels = LabelField::Dynamic(3);
        store.put_node(record).unwrap();

        assert_eq!(
            node_violations(&store, node),
            vec![NodeViolation::DynamicLabelRecordNotInUse { block: 3 }]
        );
    }

    #[test]
    fn test_relationship_head_checks() {
        let store = MemoryStore::new();
        let knows = store.create_token(TokenKind::RelationshipType, "KNOWS").unwrap();
        let a = store.create_node(&[]).unwrap();
        let b = store.create_node(&[]).unwrap();
        let c = store.create_node(&[]).unwrap();
        let ab = store.create_relationship(a, b, knows).unwrap();
        store.create_relationship(a, b, knows).unwrap();

        // c points at a relationship between a and b
        let mut record = store.node(c).unwrap();
        record.relationships = RelationshipHead::Chain(ab);
        store.put_node(record).unwrap();
        assert!(node_violations(&store, c)
            .contains(&NodeViolation::RelationshipForOtherNode { relationship: ab }));

        // a points at the second relationship of its chain
        let mut record = store.node(a).unwrap();
        record.relationships = RelationshipHead::Chain(ab);
        store.put_node(record).unwrap();
        assert!(node_violations(&store, a)
            .contains(&NodeViolation::RelationshipNotFirstInSourceChain { relationship: ab }));

        let mut record = store.node(b).unwrap();
        record.relationships = RelationshipHead::Chain(40);
        store.put_node(record).unwrap();
        assert!(node_violations(&store, b)
            .contains(&NodeViolation::RelationshipNotInUse { relationship: 40 }));
    }

    #[test]
    fn test_relationship_chain_cycle() {
        let store = MemoryStore::new();
        let t = store.create_token(TokenKind::RelationshipType, "T").unwrap();
        let a = store.create_node(&[]).unwrap();
        let b = store.create_node(&[]).unwrap();
        let first = store.create_relationship(a, b, t).unwrap();
        let second = store.create_relationship(a, b, t).unwrap();

        // second -> first -> second on a's side
        let mut record: RelationshipRecord = store.relationship(first).unwrap();
        record.source_next = second;
        store.put_relationship(record).unwrap();

        assert!(node_violations(&store, a).contains(
            &NodeViolation::RelationshipChainContainsCircularReference {
                relationship: second
            }
        ));
    }

    #[test]
    fn test_group_head_checks() {
        let store = MemoryStore::with_dense_threshold(2);
        let t = store.create_token(TokenKind::RelationshipType, "T").unwrap();
        let hub = store.create_node(&[]).unwrap();
        let other = store.create_node(&[]).unwrap();
        for _ in 0..4 {
            let leaf = store.create_node(&[]).unwrap();
            store.create_relationship(hub, leaf, t).unwrap();
        }
        let RelationshipHead::Groups(group) = store.node(hub).unwrap().relationships else {
            panic!("hub should be dense");
        };

        let mut record: NodeRecord = store.node(other).unwrap();
        record.relationships = RelationshipHead::Groups(group);
        store.put_node(record).unwrap();
        assert!(node_violations(&store, other)
            .contains(&NodeViolation::RelationshipGroupHasOtherOwner { group }));
        assert!(node_violations(&store, hub).is_empty());
    }
}

//! Relationship checks: type, endpoints, chain pointers, property chain

use super::{CheckContext, group, index, property};
use crate::error::Result;
use crate::record::{
    EntityKind, NULL_REF, NULL_TOKEN, RecordCategory, RelationshipHead, RelationshipRecord,
    TokenKind, link,
};
use crate::report::{
    ChainPointer, NodeViolation, OwnerRef, RelationshipReport, RelationshipViolation,
};
use crate::store::StoreFile;
use dashmap::DashSet;
use roaring::RoaringTreemap;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Side {
    Source,
    Target,
}

/// Chain membership seen from both ends
///
/// Node walks record every relationship they reach. Relationships that are
/// not first in a chain record the node chain they claim to be part of; the
/// claims no walk confirmed are resolved after the relationship pass.
#[derive(Debug, Default)]
pub(crate) struct ChainMembership {
    reached: DashSet<(u64, u64)>,
    claimed: DashSet<(u64, u64, Side)>,
}

impl ChainMembership {
    /// `relationship` was reached walking `node`'s chain
    pub fn reached(&self, node: u64, relationship: u64) {
        self.reached.insert((node, relationship));
    }

    fn claim(&self, relationship: u64, node: u64, side: Side) {
        self.claimed.insert((relationship, node, side));
    }

    fn is_reached(&self, node: u64, relationship: u64) -> bool {
        self.reached.contains(&(node, relationship))
    }
}

pub(super) fn check(ctx: &CheckContext<'_>, id: u64) -> Result<()> {
    let rel = ctx.store.relationship(id)?;
    if !rel.in_use {
        return Ok(());
    }
    let report = ctx.reporter.for_relationship(&rel);
    let type_legal = rel.rel_type != NULL_TOKEN;

    if ctx.graph() {
        if !type_legal {
            report.report(RelationshipViolation::IllegalRelationshipType);
        } else if !ctx.token_in_use(TokenKind::RelationshipType, rel.rel_type)? {
            report.report(RelationshipViolation::RelationshipTypeNotInUse {
                rel_type: rel.rel_type,
            });
        }

        check_endpoint(ctx, &rel, &report, Side::Source)?;
        if !rel.is_loop() || rel.target == NULL_REF {
            check_endpoint(ctx, &rel, &report, Side::Target)?;
        }
        check_pointers(ctx, &rel, &report)?;
        property::check_entity_chain(
            ctx,
            &report,
            OwnerRef::new(RecordCategory::Relationship, id),
            rel.first_property(),
        )?;
    }

    let tokens = if type_legal { vec![rel.rel_type] } else { Vec::new() };
    index::check_entity_rules(
        ctx,
        &report,
        EntityKind::Relationship,
        id,
        &tokens,
        rel.first_property(),
    )?;

    if type_legal {
        if ctx.config.check_token_scans
            && !ctx
                .store
                .scan_contains(EntityKind::Relationship, id, rel.rel_type)?
        {
            report.report(RelationshipViolation::TypeNotInScanStore {
                rel_type: rel.rel_type,
            });
        }
        if ctx.config.check_counts {
            ctx.counts.relationship(rel.rel_type);
        }
    }
    Ok(())
}

fn check_endpoint(
    ctx: &CheckContext<'_>,
    rel: &RelationshipRecord,
    report: &RelationshipReport<'_>,
    side: Side,
) -> Result<()> {
    let (node_id, prev) = match side {
        Side::Source => (rel.source, rel.source_prev),
        Side::Target => (rel.target, rel.target_prev),
    };
    if node_id == NULL_REF {
        report.report(match side {
            Side::Source => RelationshipViolation::IllegalSourceNode,
            Side::Target => RelationshipViolation::IllegalTargetNode,
        });
        return Ok(());
    }

    let node = ctx.store.node(node_id)?;
    if !node.in_use {
        report.report(match side {
            Side::Source => RelationshipViolation::SourceNodeNotInUse { node: node_id },
            Side::Target => RelationshipViolation::TargetNodeNotInUse { node: node_id },
        });
        return Ok(());
    }

    let references_back = match node.relationships {
        RelationshipHead::None => {
            report.report(match side {
                Side::Source => {
                    RelationshipViolation::SourceNodeHasNoRelationships { node: node_id }
                }
                Side::Target => {
                    RelationshipViolation::TargetNodeHasNoRelationships { node: node_id }
                }
            });
            return Ok(());
        }
        // Only the first relationship of a chain is referenced by the node
        _ if prev != NULL_REF => {
            ctx.chains.claim(rel.id, node_id, side);
            true
        }
        RelationshipHead::Chain(head) => head == rel.id,
        RelationshipHead::Groups(first) => {
            let found = group::find_group(ctx, node_id, first, rel.rel_type)?;
            match (found, rel.direction_for(node_id)) {
                (Some(found), Some(direction)) => found.first(direction) == rel.id,
                _ => false,
            }
        }
    };
    if !references_back {
        report.report(match side {
            Side::Source => RelationshipViolation::SourceNodeDoesNotReferenceBack { node: node_id },
            Side::Target => RelationshipViolation::TargetNodeDoesNotReferenceBack { node: node_id },
        });
    }
    Ok(())
}

/// Report relationships that sit in a node's chain by their own pointers only
///
/// Claims are followed in relationship id order along the node's chain. A walk
/// that loops without meeting the reachable chain is a detached cycle,
/// reported once on the node; anything else is reported on the relationship.
pub(super) fn resolve_unreached(ctx: &CheckContext<'_>) -> Result<()> {
    let mut claims: Vec<(u64, u64, Side)> = ctx
        .chains
        .claimed
        .iter()
        .map(|claim| *claim)
        .filter(|(id, node, _)| !ctx.chains.is_reached(*node, *id))
        .collect();
    claims.sort_unstable();

    let bound = ctx.store.high_id(StoreFile::Relationships);
    let mut walked: BTreeMap<u64, RoaringTreemap> = BTreeMap::new();
    let mut unreached = 0u64;
    for (id, node, side) in claims {
        if walked.get(&node).is_some_and(|ids| ids.contains(id)) {
            continue;
        }

        let mut visited = RoaringTreemap::new();
        let mut current = Some(id);
        let mut cycle = None;
        while let Some(next) = current {
            if !visited.insert(next) || visited.len() > bound {
                cycle = Some(next);
                break;
            }
            let rel = ctx.store.relationship(next)?;
            if !rel.in_use {
                break;
            }
            current = rel.next_for(node).and_then(link);
        }

        let detached = cycle.filter(|start| !ctx.chains.is_reached(node, *start));
        if let Some(start) = detached {
            let ids = walked.entry(node).or_default();
            if !ids.contains(start) {
                let record = ctx.store.node(node)?;
                ctx.reporter.for_node(&record).report(
                    NodeViolation::RelationshipChainContainsCircularReference {
                        relationship: start,
                    },
                );
            }
            ids.extend(visited.iter());
        } else {
            let rel = ctx.store.relationship(id)?;
            ctx.reporter.for_relationship(&rel).report(match side {
                Side::Source => RelationshipViolation::SourceNodeDoesNotReferenceBack { node },
                Side::Target => RelationshipViolation::TargetNodeDoesNotReferenceBack { node },
            });
        }
        unreached += 1;
    }

    debug!(unreached, "relationship chain membership resolved");
    Ok(())
}

fn check_pointers(
    ctx: &CheckContext<'_>,
    rel: &RelationshipRecord,
    report: &RelationshipReport<'_>,
) -> Result<()> {
    // Loops keep their chain on the source side
    let pointers: &[ChainPointer] = if rel.is_loop() {
        &[ChainPointer::SourcePrev, ChainPointer::SourceNext]
    } else {
        &ChainPointer::ALL
    };

    for &pointer in pointers {
        let (node, raw) = match pointer {
            ChainPointer::SourcePrev => (rel.source, rel.source_prev),
            ChainPointer::SourceNext => (rel.source, rel.source_next),
            ChainPointer::TargetPrev => (rel.target, rel.target_prev),
            ChainPointer::TargetNext => (rel.target, rel.target_next),
        };
        let Some(other_id) = link(raw) else {
            continue;
        };
        if node == NULL_REF {
            continue;
        }

        let other = ctx.store.relationship(other_id)?;
        if !other.in_use {
            report.report(RelationshipViolation::NotUsedRelationshipReferencedInChain {
                pointer,
                relationship: other_id,
            });
            continue;
        }
        if !other.touches(node) {
            report.report(RelationshipViolation::ReferencesOtherNodes {
                pointer,
                relationship: other_id,
            });
            continue;
        }
        let back = match pointer {
            ChainPointer::SourcePrev | ChainPointer::TargetPrev => other.next_for(node),
            ChainPointer::SourceNext | ChainPointer::TargetNext => other.prev_for(node),
        };
        if back != Some(rel.id) {
            report.report(RelationshipViolation::DoesNotReferenceBack {
                pointer,
                relationship: other_id,
            });
        }
    }
    Ok(())
}

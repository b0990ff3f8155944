//! Single-owner tracking for property and dynamic chains
//!
//! Record passes only record claims. Once every pass has run, claims are
//! resolved in ascending order: the lowest claimant keeps the chain and every
//! other claimant is reported. Chain heads and dynamic blocks nobody claimed
//! are reported as orphans, as are loops of blocks that no owner leads into.

use super::{CheckContext, dynamic};
use crate::error::{Error, Result};
use crate::record::{DynamicStoreKind, EntityKind, LabelField, NULL_REF, RecordCategory};
use crate::report::{
    DynamicViolation, EntityViolation, NameViolation, NodeViolation, OwnerRef, PropertyViolation,
};
use crate::store::{ChainStep, read_dynamic_chain};
use dashmap::{DashMap, DashSet};
use roaring::RoaringTreemap;
use std::collections::BTreeMap;

/// Something that can have exactly one owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum Claimed {
    /// Property chain, by its first record
    PropertyChain(u64),
    /// Dynamic block of a store
    Dynamic(DynamicStoreKind, u64),
}

pub(crate) struct OwnershipTracker {
    enabled: bool,
    claims: DashMap<Claimed, Vec<OwnerRef>>,
    heads: DashSet<u64>,
    blocks: DashSet<(DynamicStoreKind, u64)>,
}

impl OwnershipTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            claims: DashMap::new(),
            heads: DashSet::new(),
            blocks: DashSet::new(),
        }
    }

    pub fn claim_property_chain(&self, first: u64, owner: OwnerRef) {
        self.claim(Claimed::PropertyChain(first), owner);
    }

    pub fn claim_dynamic(&self, store: DynamicStoreKind, block: u64, owner: OwnerRef) {
        self.claim(Claimed::Dynamic(store, block), owner);
    }

    /// An in-use property record with no predecessor
    pub fn note_property_head(&self, id: u64) {
        if self.enabled {
            self.heads.insert(id);
        }
    }

    /// An in-use dynamic block
    pub fn note_dynamic_block(&self, store: DynamicStoreKind, id: u64) {
        if self.enabled {
            self.blocks.insert((store, id));
        }
    }

    fn claim(&self, claimed: Claimed, owner: OwnerRef) {
        if self.enabled {
            self.claims.entry(claimed).or_default().push(owner);
        }
    }

    fn is_claimed(&self, claimed: Claimed) -> bool {
        self.claims.contains_key(&claimed)
    }

    /// Report conflicting claims and orphans
    pub fn resolve(&self, ctx: &CheckContext<'_>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut claims: Vec<(Claimed, Vec<OwnerRef>)> = self
            .claims
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        claims.sort_unstable_by_key(|(claimed, _)| *claimed);

        let mut conflicts = 0u64;
        for (claimed, mut owners) in claims {
            owners.sort_unstable();
            owners.dedup();
            let Some((&keeper, others)) = owners.split_first() else {
                continue;
            };
            for &claimant in others {
                report_conflict(ctx, claimed, keeper, claimant)?;
                conflicts += 1;
            }
        }

        let mut orphans = 0u64;
        let mut heads: Vec<u64> = self.heads.iter().map(|head| *head).collect();
        heads.sort_unstable();
        for head in heads {
            if !self.is_claimed(Claimed::PropertyChain(head)) {
                let record = ctx.store.property(head)?;
                ctx.reporter
                    .for_property(&record)
                    .report(PropertyViolation::OrphanPropertyChain);
                orphans += 1;
            }
        }

        let reachable = self.reachable_blocks(ctx)?;
        let mut blocks: Vec<(DynamicStoreKind, u64)> =
            self.blocks.iter().map(|block| *block).collect();
        blocks.sort_unstable();
        let mut walked: BTreeMap<DynamicStoreKind, RoaringTreemap> = BTreeMap::new();
        for (store, id) in blocks {
            if !self.is_claimed(Claimed::Dynamic(store, id)) {
                report_orphan_block(ctx, store, id)?;
                orphans += 1;
                continue;
            }
            let seen = |map: &BTreeMap<DynamicStoreKind, RoaringTreemap>, id: u64| {
                map.get(&store).is_some_and(|ids| ids.contains(id))
            };
            if seen(&reachable, id) || seen(&walked, id) {
                continue;
            }

            // Referenced only by blocks no owner leads to, so a loop here is detached
            let chain = read_dynamic_chain(ctx.store, store, id)?;
            if let ChainStep::Cycle(start) = chain.end {
                if !seen(&walked, start) {
                    let members = chain.blocks.iter().map(|block| block.id);
                    let lowest = members.skip_while(|block| *block != start).min();
                    dynamic::report_chain_cycle(ctx, store, &chain);
                    if let Some(lowest) = lowest {
                        report_orphan_block(ctx, store, lowest)?;
                        orphans += 1;
                    }
                }
            }
            walked
                .entry(store)
                .or_default()
                .extend(chain.blocks.iter().map(|block| block.id));
        }

        tracing::info!(conflicts, orphans, "chain ownership resolved");
        Ok(())
    }

    /// Blocks on a chain that starts at a record other than a dynamic block
    fn reachable_blocks(
        &self,
        ctx: &CheckContext<'_>,
    ) -> Result<BTreeMap<DynamicStoreKind, RoaringTreemap>> {
        let mut roots: Vec<(DynamicStoreKind, u64)> = self
            .claims
            .iter()
            .filter_map(|entry| match *entry.key() {
                Claimed::Dynamic(store, id)
                    if entry
                        .value()
                        .iter()
                        .any(|owner| owner.category != RecordCategory::DynamicRecord) =>
                {
                    Some((store, id))
                }
                _ => None,
            })
            .collect();
        roots.sort_unstable();

        let mut reachable: BTreeMap<DynamicStoreKind, RoaringTreemap> = BTreeMap::new();
        for (store, first) in roots {
            let ids = reachable.entry(store).or_default();
            if ids.contains(first) {
                continue;
            }
            let chain = read_dynamic_chain(ctx.store, store, first)?;
            ids.extend(chain.blocks.iter().map(|block| block.id));
        }
        Ok(reachable)
    }
}

fn report_conflict(
    ctx: &CheckContext<'_>,
    claimed: Claimed,
    keeper: OwnerRef,
    claimant: OwnerRef,
) -> Result<()> {
    let store = ctx.store;
    let reporter = ctx.reporter;
    let unexpected = || {
        Error::internal(format!(
            "unexpected claimant {claimant:?} of {claimed:?}"
        ))
    };

    match claimed {
        Claimed::PropertyChain(_) => {
            let kind = match claimant.category {
                RecordCategory::Node => EntityKind::Node,
                RecordCategory::Relationship => EntityKind::Relationship,
                _ => return Err(unexpected()),
            };
            reporter
                .for_entity(kind, claimant.id)
                .report_entity(EntityViolation::MultipleOwners { other: keeper });
        }
        Claimed::Dynamic(kind, _) => match claimant.category {
            RecordCategory::Property => {
                let record = store.property(claimant.id)?;
                let violation = if kind == DynamicStoreKind::Array {
                    PropertyViolation::ArrayMultipleOwners { other: keeper }
                } else {
                    PropertyViolation::StringMultipleOwners { other: keeper }
                };
                reporter.for_property(&record).report(violation);
            }
            RecordCategory::Node => {
                let node = store.node(claimant.id)?;
                reporter
                    .for_node(&node)
                    .report(NodeViolation::DynamicLabelRecordMultipleOwners { other: keeper });
            }
            RecordCategory::DynamicRecord => {
                let block = store.dynamic(kind, claimant.id)?;
                reporter
                    .for_dynamic(kind, &block)
                    .report(DynamicViolation::NextMultipleOwners { other: keeper });
            }
            category => {
                let token_kind = category.token_kind().ok_or_else(unexpected)?;
                let id = u32::try_from(claimant.id).map_err(|_| unexpected())?;
                let token = store.token(token_kind, id)?;
                reporter
                    .for_token(&token)
                    .report(NameViolation::NameMultipleOwners { other: keeper });
            }
        },
    }
    Ok(())
}

fn report_orphan_block(ctx: &CheckContext<'_>, store: DynamicStoreKind, id: u64) -> Result<()> {
    let block = ctx.store.dynamic(store, id)?;
    let report = ctx.reporter.for_dynamic(store, &block);
    if store != DynamicStoreKind::NodeLabels {
        report.report(DynamicViolation::OrphanDynamicRecord);
        return Ok(());
    }

    // Label chains start with the id of the node they were written for
    match LabelField::decode_dynamic(&block.data) {
        Some((owner, _)) if owner != NULL_REF => {
            report.report(DynamicViolation::OrphanDynamicLabelRecordDueToInvalidOwner { owner })
        }
        _ => report.report(DynamicViolation::OrphanDynamicLabelRecord),
    }
    Ok(())
}

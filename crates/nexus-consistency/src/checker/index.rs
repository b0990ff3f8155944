//! Property index consistency, in both directions
//!
//! Entity side: every node or relationship an online index covers must be in
//! it exactly once, with the values it carries. Index side: every entry must
//! point at a live entity with the index's token and matching values.

use super::{CheckContext, node};
use crate::error::Result;
use crate::record::{
    EntityKind, IndexEntry, IndexKind, IndexRule, IndexState, KeyId, RecordCategory, Value,
};
use crate::report::{EntityReport, EntityViolation, IndexViolation};
use crate::store::read_entity_values;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Values of `keys` in order, `None` when any of them is missing
fn values_for(values: &BTreeMap<KeyId, Value>, keys: &[KeyId]) -> Option<Vec<Value>> {
    keys.iter().map(|key| values.get(key).cloned()).collect()
}

/// Mandatory property and index membership checks for one entity
pub(super) fn check_entity_rules(
    ctx: &CheckContext<'_>,
    report: &dyn EntityReport,
    kind: EntityKind,
    id: u64,
    tokens: &[u32],
    first_property: Option<u64>,
) -> Result<()> {
    let graph = ctx.graph();
    let indexes = ctx.config.check_indexes;
    if !(graph || indexes) || tokens.is_empty() || !ctx.schema.covers(kind, tokens) {
        return Ok(());
    }
    let values = read_entity_values(ctx.store, first_property)?;

    if graph {
        for key in ctx.schema.mandatory_keys(kind, tokens) {
            if !values.contains_key(&key) {
                report.report_entity(EntityViolation::MissingMandatoryProperty { key });
            }
        }
    }
    if !indexes {
        return Ok(());
    }

    for (index, rule) in ctx.schema.online_indexes(kind) {
        if !tokens.contains(&rule.schema.token) {
            continue;
        }
        let Some(indexed) = values_for(&values, &rule.schema.properties) else {
            continue;
        };
        let holders = ctx.store.index_lookup(index, &indexed)?;
        let own = holders.iter().filter(|holder| **holder == id).count() as u64;
        match own {
            0 => report.report_entity(EntityViolation::NotIndexed {
                index,
                values: indexed.clone(),
            }),
            1 => {}
            count => report.report_entity(EntityViolation::IndexedMultipleTimes {
                index,
                values: indexed.clone(),
                count,
            }),
        }
        if rule.kind == IndexKind::Unique {
            if let Some(duplicate) = holders.iter().copied().filter(|h| *h != id).min() {
                report.report_entity(EntityViolation::UniqueIndexNotUnique {
                    index,
                    values: indexed,
                    duplicate,
                });
            }
        }
    }
    Ok(())
}

/// Check every index rule and the entries of every online index
pub(super) fn check(ctx: &CheckContext<'_>) -> Result<()> {
    let rules: Vec<(u64, IndexRule)> = ctx
        .schema
        .indexes()
        .map(|(id, rule)| (id, rule.clone()))
        .collect();

    for (index, rule) in rules {
        if ctx.stopped() {
            break;
        }
        let report = ctx.reporter.for_index(index);
        if ctx.store.index_is_dirty(index)? {
            report.report(IndexViolation::DirtyIndex);
        }
        if rule.kind == IndexKind::Unique && rule.schema.entity == EntityKind::Relationship {
            report.report(IndexViolation::RelationshipConstraintIndex);
        }
        if rule.state != IndexState::Online {
            continue;
        }

        let entries = ctx.store.index_entries(index)?;
        entries
            .par_chunks(ctx.chunk_len())
            .try_for_each(|chunk| -> Result<()> {
                for entry in chunk {
                    if ctx.stopped() {
                        break;
                    }
                    check_entry(ctx, &rule, entry)?;
                }
                Ok(())
            })?;
        ctx.record_checked(RecordCategory::IndexEntry, entries.len() as u64);
        debug!(index, entries = entries.len(), name = %rule.name, "index entries checked");
    }
    Ok(())
}

fn check_entry(ctx: &CheckContext<'_>, rule: &IndexRule, entry: &IndexEntry) -> Result<()> {
    let report = ctx.reporter.for_index_entry(entry);
    let kind = rule.schema.entity;
    let entity = entry.entity;

    let (in_use, tokens, first_property) = match kind {
        EntityKind::Node => {
            let record = ctx.store.node(entity)?;
            let labels = if record.in_use {
                node::labels_of(ctx.store, &record)?
            } else {
                Vec::new()
            };
            (record.in_use, labels, record.first_property())
        }
        EntityKind::Relationship => {
            let record = ctx.store.relationship(entity)?;
            (record.in_use, vec![record.rel_type], record.first_property())
        }
    };
    if !in_use {
        report.report(IndexViolation::EntityNotInUse { kind, entity });
        return Ok(());
    }
    if !tokens.contains(&rule.schema.token) {
        report.report(IndexViolation::EntityDoesNotHaveExpectedToken {
            kind,
            entity,
            token: rule.schema.token,
        });
        return Ok(());
    }

    let values = read_entity_values(ctx.store, first_property)?;
    match values_for(&values, &rule.schema.properties) {
        None => report.report(IndexViolation::IndexedWhenShouldNot { kind, entity }),
        Some(expected) if expected != entry.values => {
            report.report(IndexViolation::IndexedWithWrongValues {
                kind,
                entity,
                expected,
                indexed: entry.values.clone(),
            });
        }
        Some(_) => {}
    }
    Ok(())
}

//! Property record checks and property chain walks

use super::{CheckContext, dynamic};
use crate::error::Result;
use crate::record::{
    BlockValue, DynamicStoreKind, KeyId, NULL_TOKEN, RecordCategory, TokenKind, Value,
};
use crate::report::{EntityReport, EntityViolation, OwnerRef, PropertyReport, PropertyViolation};
use crate::store::{ChainStep, StoreFile, read_dynamic_chain};
use roaring::RoaringTreemap;
use std::collections::BTreeSet;

pub(super) fn check(ctx: &CheckContext<'_>, id: u64) -> Result<()> {
    let record = ctx.store.property(id)?;
    if !record.in_use {
        return Ok(());
    }
    let report = ctx.reporter.for_property(&record);

    match record.prev_record() {
        None => ctx.ownership.note_property_head(id),
        Some(prev) => {
            let prev_record = ctx.store.property(prev)?;
            if !prev_record.in_use {
                report.report(PropertyViolation::PrevNotInUse { property: prev });
            } else if prev_record.next != id {
                report.report(PropertyViolation::PreviousDoesNotReferenceBack { property: prev });
            }
        }
    }
    if let Some(next) = record.next_record() {
        let next_record = ctx.store.property(next)?;
        if !next_record.in_use {
            report.report(PropertyViolation::NextNotInUse { property: next });
        } else if next_record.prev != id {
            report.report(PropertyViolation::NextDoesNotReferenceBack { property: next });
        }
    }

    for (index, block) in record.blocks.iter().enumerate() {
        let key = block.key;
        if key == NULL_TOKEN {
            report.report(PropertyViolation::InvalidPropertyKey { block: index });
        } else if !ctx.token_in_use(TokenKind::PropertyKey, key)? {
            report.report(PropertyViolation::KeyNotInUse { key });
        }

        match &block.value {
            BlockValue::Inline(_) => {}
            BlockValue::Invalid { type_tag } => {
                report.report(PropertyViolation::InvalidPropertyType {
                    key,
                    type_tag: *type_tag,
                });
            }
            BlockValue::String { first_block } => {
                check_value_chain(ctx, &report, id, key, DynamicStoreKind::String, *first_block)?;
            }
            BlockValue::Array { first_block } => {
                check_value_chain(ctx, &report, id, key, DynamicStoreKind::Array, *first_block)?;
            }
        }
    }
    Ok(())
}

fn check_value_chain(
    ctx: &CheckContext<'_>,
    report: &PropertyReport<'_>,
    property: u64,
    key: KeyId,
    store: DynamicStoreKind,
    block: u64,
) -> Result<()> {
    let first = ctx.store.dynamic(store, block)?;
    if !first.in_use {
        report.report(match store {
            DynamicStoreKind::Array => PropertyViolation::ArrayNotInUse { key, block },
            _ => PropertyViolation::StringNotInUse { key, block },
        });
        return Ok(());
    }
    ctx.ownership
        .claim_dynamic(store, block, OwnerRef::new(RecordCategory::Property, property));

    let chain = read_dynamic_chain(ctx.store, store, block)?;
    match chain.end {
        ChainStep::Complete => {
            let bytes = chain.bytes();
            if bytes.is_empty() {
                report.report(match store {
                    DynamicStoreKind::Array => PropertyViolation::ArrayEmpty { key, block },
                    _ => PropertyViolation::StringEmpty { key, block },
                });
                return Ok(());
            }
            let decoded = match store {
                DynamicStoreKind::Array => Value::decode_int_array(&bytes),
                _ => Value::decode_string(&bytes),
            };
            if decoded.is_none() {
                report.report(PropertyViolation::InvalidPropertyValue { key });
            }
        }
        ChainStep::Cycle(_) => dynamic::report_chain_cycle(ctx, store, &chain),
        // Broken links are reported by the dynamic pass on the block holding them
        ChainStep::NotInUse(_) | ChainStep::Overrun => {}
    }
    Ok(())
}

/// Walk the property chain of a node or relationship
///
/// Claims the chain for `owner`; conflicts surface when ownership is resolved.
pub(super) fn check_entity_chain(
    ctx: &CheckContext<'_>,
    report: &dyn EntityReport,
    owner: OwnerRef,
    first: Option<u64>,
) -> Result<()> {
    let Some(first) = first else {
        return Ok(());
    };
    let head = ctx.store.property(first)?;
    if !head.in_use {
        report.report_entity(EntityViolation::PropertyNotInUse { property: first });
        return Ok(());
    }
    if head.prev_record().is_some() {
        report.report_entity(EntityViolation::PropertyNotFirstInChain { property: first });
    }
    ctx.ownership.claim_property_chain(first, owner);

    let bound = ctx.store.high_id(StoreFile::Properties);
    let mut visited = RoaringTreemap::new();
    let mut keys = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) || visited.len() > bound {
            report.report_entity(EntityViolation::PropertyChainContainsCircularReference {
                property: id,
            });
            break;
        }
        let record = ctx.store.property(id)?;
        if !record.in_use {
            break;
        }
        for block in &record.blocks {
            if block.key != NULL_TOKEN && !keys.insert(block.key) && duplicated.insert(block.key) {
                report.report_entity(EntityViolation::PropertyKeyNotUniqueInChain {
                    key: block.key,
                });
            }
        }
        current = record.next_record();
    }
    Ok(())
}

//! Token name checks

use super::{CheckContext, dynamic};
use crate::error::Result;
use crate::record::{NULL_REF, RecordCategory, TokenKind};
use crate::report::{NameViolation, OwnerRef};
use crate::store::{ChainStep, read_dynamic_chain};

pub(super) fn check(ctx: &CheckContext<'_>, kind: TokenKind, id: u64) -> Result<()> {
    let Ok(id) = u32::try_from(id) else {
        return Ok(());
    };
    let token = ctx.store.token(kind, id)?;
    if !token.in_use {
        return Ok(());
    }
    let report = ctx.reporter.for_token(&token);
    let Some(block) = token.name_block() else {
        report.report(NameViolation::EmptyName { block: NULL_REF });
        return Ok(());
    };

    let store = kind.name_store();
    let first = ctx.store.dynamic(store, block)?;
    if !first.in_use {
        report.report(NameViolation::NameBlockNotInUse { block });
        return Ok(());
    }
    ctx.ownership.claim_dynamic(
        store,
        block,
        OwnerRef::new(RecordCategory::for_token(kind), u64::from(id)),
    );

    let chain = read_dynamic_chain(ctx.store, store, block)?;
    match chain.end {
        ChainStep::Complete if chain.bytes().is_empty() => {
            report.report(NameViolation::EmptyName { block });
        }
        ChainStep::Cycle(_) => dynamic::report_chain_cycle(ctx, store, &chain),
        // Broken links are reported against the block holding them
        _ => {}
    }
    Ok(())
}

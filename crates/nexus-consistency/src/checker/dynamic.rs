//! Dynamic block checks

use super::CheckContext;
use crate::error::Result;
use crate::record::{DynamicStoreKind, RecordCategory};
use crate::report::{DynamicViolation, OwnerRef};
use crate::store::{ChainStep, DynamicChain};

pub(super) fn check(ctx: &CheckContext<'_>, store: DynamicStoreKind, id: u64) -> Result<()> {
    let block = ctx.store.dynamic(store, id)?;
    if !block.in_use {
        return Ok(());
    }
    ctx.ownership.note_dynamic_block(store, id);

    let report = ctx.reporter.for_dynamic(store, &block);
    let capacity = ctx.store.block_size(store);
    if block.len() > capacity {
        report.report(DynamicViolation::InvalidLength {
            length: block.len(),
            capacity,
        });
    }
    if block.is_empty() {
        report.report(DynamicViolation::EmptyBlock);
    }

    let Some(next) = block.next_block() else {
        return Ok(());
    };
    if next == id {
        report.report(DynamicViolation::CircularReferenceNext { next });
        return Ok(());
    }
    let next_block = ctx.store.dynamic(store, next)?;
    if !next_block.in_use {
        report.report(DynamicViolation::NextNotInUse { next });
        return Ok(());
    }
    if block.len() < capacity {
        report.report(DynamicViolation::RecordNotFullReferencesNext);
    }
    if next_block.is_empty() {
        report.report(DynamicViolation::EmptyNextBlock { next });
    }
    ctx.ownership
        .claim_dynamic(store, next, OwnerRef::new(RecordCategory::DynamicRecord, id));
    Ok(())
}

/// Report a chain that loops through more than one block, on the block closing the loop
///
/// Single-block loops are reported by the block pass itself.
pub(super) fn report_chain_cycle(
    ctx: &CheckContext<'_>,
    store: DynamicStoreKind,
    chain: &DynamicChain,
) {
    if let ChainStep::Cycle(next) = chain.end {
        if let Some(last) = chain.blocks.last() {
            if last.id != next {
                ctx.reporter
                    .for_dynamic(store, last)
                    .report(DynamicViolation::CircularReferenceNext { next });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::check_collect;
    use crate::record::{DynamicRecord, DynamicStoreKind, RecordCategory};
    use crate::report::{DynamicViolation, OwnerRef, RecordScope, Violation};
    use crate::store::MemoryStore;

    fn dynamic_violations(store: &MemoryStore) -> Vec<(u64, DynamicViolation)> {
        let mut found: Vec<(u64, DynamicViolation)> = check_collect(store)
            .violations()
            .into_iter()
            .filter_map(|v| match v.violation {
                Violation::Dynamic(violation) => Some((v.record.id, violation)),
                _ => None,
            })
            .collect();
        found.sort_by_key(|(id, _)| *id);
        found
    }

    #[test]
    fn test_block_shape_checks() {
        let store = MemoryStore::new();
        let kind = DynamicStoreKind::String;
        // 0 -> 1 is fine except 0 is not full; 2 is too long; 3 is empty and orphaned
        let mut first = DynamicRecord::new(0, vec![1; 10]);
        first.next = 1;
        store.put_dynamic(kind, first).unwrap();
        store.put_dynamic(kind, DynamicRecord::new(1, vec![1; 5])).unwrap();
        store.put_dynamic(kind, DynamicRecord::new(2, vec![1; 130])).unwrap();
        store.put_dynamic(kind, DynamicRecord::new(3, vec![])).unwrap();

        let found = dynamic_violations(&store);
        assert!(found.contains(&(0, DynamicViolation::RecordNotFullReferencesNext)));
        assert!(found.contains(&(
            2,
            DynamicViolation::InvalidLength {
                length: 130,
                capacity: 120
            }
        )));
        assert!(found.contains(&(3, DynamicViolation::EmptyBlock)));
        // nothing references 0, 2 or 3
        assert!(found.contains(&(0, DynamicViolation::OrphanDynamicRecord)));
        assert!(found.contains(&(3, DynamicViolation::OrphanDynamicRecord)));
        assert!(!found.contains(&(1, DynamicViolation::OrphanDynamicRecord)));
    }

    #[test]
    fn test_next_pointers() {
        let store = MemoryStore::new();
        let kind = DynamicStoreKind::Array;
        let mut self_loop = DynamicRecord::new(0, vec![1; 120]);
        self_loop.next = 0;
        let mut dangling = DynamicRecord::new(1, vec![1; 120]);
        dangling.next = 40;
        let mut to_empty = DynamicRecord::new(2, vec![1; 120]);
        to_empty.next = 3;
        store.put_dynamic(kind, self_loop).unwrap();
        store.put_dynamic(kind, dangling).unwrap();
        store.put_dynamic(kind, to_empty).unwrap();
        store.put_dynamic(kind, DynamicRecord::new(3, vec![])).unwrap();

        let found = dynamic_violations(&store);
        assert!(found.contains(&(0, DynamicViolation::CircularReferenceNext { next: 0 })));
        assert!(found.contains(&(1, DynamicViolation::NextNotInUse { next: 40 })));
        assert!(found.contains(&(2, DynamicViolation::EmptyNextBlock { next: 3 })));
    }

    #[test]
    fn test_shared_next_block() {
        let store = MemoryStore::new();
        let kind = DynamicStoreKind::String;
        for id in [0, 1] {
            let mut block = DynamicRecord::new(id, vec![b'x'; 120]);
            block.next = 2;
            store.put_dynamic(kind, block).unwrap();
        }
        store.put_dynamic(kind, DynamicRecord::new(2, vec![b'y'; 3])).unwrap();

        let sink = check_collect(&store);
        let shared: Vec<_> = sink
            .violations()
            .into_iter()
            .filter(|v| {
                matches!(
                    v.violation,
                    Violation::Dynamic(DynamicViolation::NextMultipleOwners { .. })
                )
            })
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].record.id, 1);
        assert_eq!(shared[0].record.scope, RecordScope::Store(kind));
        assert_eq!(
            shared[0].violation,
            Violation::Dynamic(DynamicViolation::NextMultipleOwners {
                other: OwnerRef::new(RecordCategory::DynamicRecord, 0)
            })
        );
    }

    #[test]
    fn test_detached_loop_is_reported() {
        let store = MemoryStore::new();
        let kind = DynamicStoreKind::String;
        for (id, next) in [(0, 1), (1, 0)] {
            let mut block = DynamicRecord::new(id, vec![b'x'; 120]);
            block.next = next;
            store.put_dynamic(kind, block).unwrap();
        }

        let found = dynamic_violations(&store);
        assert_eq!(
            found,
            vec![
                (0, DynamicViolation::OrphanDynamicRecord),
                (1, DynamicViolation::CircularReferenceNext { next: 0 }),
            ]
        );
    }

    #[test]
    fn test_loop_behind_orphan_head_is_reported_once() {
        let store = MemoryStore::new();
        let kind = DynamicStoreKind::Array;
        // 5 -> 2 -> 3 -> 4 -> 2, nothing references 5
        for (id, next) in [(5, 2), (2, 3), (3, 4), (4, 2)] {
            let mut block = DynamicRecord::new(id, vec![1; 120]);
            block.next = next;
            store.put_dynamic(kind, block).unwrap();
        }

        let found = dynamic_violations(&store);
        let loops: Vec<_> = found
            .iter()
            .filter(|(_, v)| matches!(v, DynamicViolation::CircularReferenceNext { .. }))
            .collect();
        assert_eq!(loops, vec![&(4, DynamicViolation::CircularReferenceNext { next: 2 })]);
        assert!(found.contains(&(5, DynamicViolation::OrphanDynamicRecord)));
        assert!(found.contains(&(2, DynamicViolation::OrphanDynamicRecord)));
        // 2 is claimed by both 4 and 5
        assert!(found.contains(&(
            5,
            DynamicViolation::NextMultipleOwners {
                other: OwnerRef::new(RecordCategory::DynamicRecord, 4)
            }
        )));
        assert_eq!(found.len(), 4, "unexpected: {found:?}");
    }

    #[test]
    fn test_orphan_label_blocks() {
        let store = MemoryStore::new();
        let owned = crate::record::LabelField::encode_dynamic(5, &[1, 2, 3, 4, 5]);
        store.put_dynamic(DynamicStoreKind::NodeLabels, DynamicRecord::new(0, owned)).unwrap();
        store.put_dynamic(DynamicStoreKind::NodeLabels, DynamicRecord::new(1, vec![7; 3])).unwrap();

        let found = dynamic_violations(&store);
        assert!(found.contains(&(
            0,
            DynamicViolation::OrphanDynamicLabelRecordDueToInvalidOwner { owner: 5 }
        )));
        assert!(found.contains(&(1, DynamicViolation::OrphanDynamicLabelRecord)));
    }
}

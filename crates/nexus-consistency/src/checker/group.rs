//! Relationship group checks (dense nodes)

use super::CheckContext;
use crate::error::Result;
use crate::record::{
    GroupDirection, NULL_REF, NULL_TOKEN, RelationshipGroupRecord, TokenKind, TypeId, link,
};
use crate::report::GroupViolation;
use crate::store::StoreFile;
use roaring::RoaringTreemap;
use tracing::debug;

pub(super) fn check(ctx: &CheckContext<'_>, id: u64) -> Result<()> {
    let group = ctx.store.group(id)?;
    if !group.in_use {
        return Ok(());
    }
    let report = ctx.reporter.for_group(&group);

    if group.rel_type == NULL_TOKEN {
        report.report(GroupViolation::IllegalRelationshipType);
    } else if !ctx.token_in_use(TokenKind::RelationshipType, group.rel_type)? {
        report.report(GroupViolation::RelationshipTypeNotInUse {
            rel_type: group.rel_type,
        });
    }

    let owner_in_use = if group.owner == NULL_REF {
        report.report(GroupViolation::IllegalOwner);
        false
    } else if !ctx.store.node(group.owner)?.in_use {
        report.report(GroupViolation::OwnerNotInUse { owner: group.owner });
        false
    } else {
        true
    };

    match group.next_group() {
        Some(next) => {
            let next_group = ctx.store.group(next)?;
            if !next_group.in_use {
                report.report(GroupViolation::NextGroupNotInUse { next });
            } else if next_group.owner != group.owner {
                report.report(GroupViolation::NextHasOtherOwner { next });
            } else if next_group.rel_type <= group.rel_type {
                report.report(GroupViolation::InvalidTypeSortOrder { next });
            }
        }
        None => {
            if group.owner != NULL_REF {
                ctx.terminal_groups.entry(group.owner).or_default().push(id);
            }
        }
    }

    for direction in GroupDirection::ALL {
        let Some(first) = link(group.first(direction)) else {
            continue;
        };
        let rel = ctx.store.relationship(first)?;
        if !rel.in_use {
            report.report(GroupViolation::FirstRelationshipNotInUse {
                direction,
                relationship: first,
            });
            continue;
        }
        if rel.rel_type != group.rel_type {
            report.report(GroupViolation::FirstRelationshipOfOtherType {
                direction,
                relationship: first,
            });
        }
        if !owner_in_use {
            continue;
        }
        if rel.direction_for(group.owner) != Some(direction) {
            report.report(GroupViolation::FirstRelationshipDoesNotShareNodeWithGroup {
                direction,
                relationship: first,
            });
        } else if !rel.is_first_for(group.owner) {
            report.report(GroupViolation::FirstRelationshipNotFirstInChain {
                direction,
                relationship: first,
            });
        }
    }
    Ok(())
}

/// Every node's group chain must end in exactly one group
///
/// The lowest terminal group is taken as the real end; the others are reported.
pub(super) fn resolve_terminal_groups(ctx: &CheckContext<'_>) -> Result<()> {
    let mut owners: Vec<(u64, Vec<u64>)> = ctx
        .terminal_groups
        .iter()
        .filter(|entry| entry.value().len() > 1)
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    owners.sort_unstable_by_key(|(owner, _)| *owner);

    for (node, mut groups) in owners {
        groups.sort_unstable();
        let keeper = groups[0];
        debug!(node, groups = groups.len(), "multiple last groups");
        for &id in &groups[1..] {
            let group = ctx.store.group(id)?;
            ctx.reporter
                .for_group(&group)
                .report(GroupViolation::MultipleLastGroups { node, other: keeper });
        }
    }
    Ok(())
}

/// Group of `rel_type` in a node's group chain, starting at `first`
///
/// Stops at the first group that is not in use, belongs to someone else or
/// was already visited.
pub(super) fn find_group(
    ctx: &CheckContext<'_>,
    node: u64,
    first: u64,
    rel_type: TypeId,
) -> Result<Option<RelationshipGroupRecord>> {
    let bound = ctx.store.high_id(StoreFile::RelationshipGroups);
    let mut visited = RoaringTreemap::new();
    let mut current = Some(first);
    while let Some(id) = current {
        if !visited.insert(id) || visited.len() > bound {
            return Ok(None);
        }
        let group = ctx.store.group(id)?;
        if !group.in_use || group.owner != node {
            return Ok(None);
        }
        if group.rel_type == rel_type {
            return Ok(Some(group));
        }
        current = group.next_group();
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::super::tests::check_collect;
    use crate::record::{
        GroupDirection, NULL_REF, RelationshipGroupRecord, RelationshipHead, TokenKind,
    };
    use crate::report::{GroupViolation, Violation};
    use crate::store::{MemoryStore, StoreAccess};

    fn group_violations(store: &MemoryStore) -> Vec<(u64, GroupViolation)> {
        check_collect(store)
            .violations()
            .into_iter()
            .filter_map(|v| match v.violation {
                Violation::Group(violation) => Some((v.record.id, violation)),
                _ => None,
            })
            .collect()
    }

    /// Dense hub with relationships of two types; returns (store, hub, first group)
    fn dense_hub() -> (MemoryStore, u64, u64) {
        let store = MemoryStore::with_dense_threshold(2);
        let a = store.create_token(TokenKind::RelationshipType, "A").unwrap();
        let b = store.create_token(TokenKind::RelationshipType, "B").unwrap();
        let hub = store.create_node(&[]).unwrap();
        for i in 0..6 {
            let leaf = store.create_node(&[]).unwrap();
            let rel_type = if i % 2 == 0 { a } else { b };
            store.create_relationship(hub, leaf, rel_type).unwrap();
        }
        let RelationshipHead::Groups(first) = store.node(hub).unwrap().relationships else {
            panic!("hub should be dense");
        };
        (store, hub, first)
    }

    #[test]
    fn test_dense_hub_is_clean() {
        let (store, _, _) = dense_hub();
        assert!(check_collect(&store).is_empty());
    }

    #[test]
    fn test_owner_and_type() {
        let store = MemoryStore::new();
        store.put_group(RelationshipGroupRecord::new(0, NULL_REF, 4)).unwrap();
        store.put_group(RelationshipGroupRecord::new(1, 12, 4)).unwrap();

        let found = group_violations(&store);
        assert!(found.contains(&(0, GroupViolation::IllegalOwner)));
        assert!(found.contains(&(0, GroupViolation::RelationshipTypeNotInUse { rel_type: 4 })));
        assert!(found.contains(&(1, GroupViolation::OwnerNotInUse { owner: 12 })));
    }

    #[test]
    fn test_next_group_checks() {
        let (store, hub, first) = dense_hub();
        let mut head = store.group(first).unwrap();
        let second = head.next;

        head.next = 40;
        store.put_group(head.clone()).unwrap();
        assert!(
            group_violations(&store)
                .contains(&(first, GroupViolation::NextGroupNotInUse { next: 40 }))
        );

        let original = store.group(second).unwrap();
        let mut stray = RelationshipGroupRecord::new(second, hub + 1, original.rel_type);
        stray.first_out = original.first_out;
        head.next = second;
        store.put_group(head).unwrap();
        store.put_group(stray).unwrap();
        assert!(
            group_violations(&store)
                .contains(&(first, GroupViolation::NextHasOtherOwner { next: second }))
        );
    }

    #[test]
    fn test_first_relationship_checks() {
        let (store, hub, first) = dense_hub();
        let mut head = store.group(first).unwrap();
        let out = head.first_out;
        head.first_in = out;
        head.first_loop = 99;
        store.put_group(head).unwrap();

        let found = group_violations(&store);
        assert!(found.contains(&(
            first,
            GroupViolation::FirstRelationshipDoesNotShareNodeWithGroup {
                direction: GroupDirection::Incoming,
                relationship: out
            }
        )));
        assert!(found.contains(&(
            first,
            GroupViolation::FirstRelationshipNotInUse {
                direction: GroupDirection::Loop,
                relationship: 99
            }
        )));
        assert_eq!(store.node(hub).unwrap().relationships, RelationshipHead::Groups(first));
    }

    #[test]
    fn test_multiple_last_groups() {
        let (store, hub, first) = dense_hub();
        let second = store.group(first).unwrap().next;
        let mut head = store.group(first).unwrap();
        head.next = NULL_REF;
        store.put_group(head).unwrap();

        let found = group_violations(&store);
        let last: Vec<_> = found
            .iter()
            .filter(|(_, v)| matches!(v, GroupViolation::MultipleLastGroups { .. }))
            .collect();
        let (keeper, other) = (first.min(second), first.max(second));
        assert_eq!(
            last,
            vec![&(other, GroupViolation::MultipleLastGroups { node: hub, other: keeper })]
        );
    }
}

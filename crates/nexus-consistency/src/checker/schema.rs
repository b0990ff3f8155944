//! Schema rule checks
//!
//! Rules are loaded once into a [`SchemaTable`] before any pass runs, since
//! entity checks need the online indexes and mandatory properties, and rule
//! checks need to see every other rule for duplicates and obligations.

use super::CheckContext;
use crate::error::Result;
use crate::record::{
    ConstraintRule, EntityKind, IndexKind, IndexRule, IndexState, KeyId, SchemaDescriptor,
    SchemaRecord, SchemaRule, TokenKind,
};
use crate::report::{ObligationKind, SchemaReport, SchemaViolation};
use crate::store::{StoreAccess, StoreFile};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// In-use schema rules plus the lookups the checks need
#[derive(Debug, Default)]
pub(crate) struct SchemaTable {
    records: BTreeMap<u64, SchemaRecord>,
    by_content: HashMap<String, Vec<u64>>,
    by_name: HashMap<String, Vec<u64>>,
    /// index id -> constraints claiming it as their backing index
    index_claims: BTreeMap<u64, Vec<u64>>,
    /// constraint id -> indexes claiming to back it
    constraint_claims: BTreeMap<u64, Vec<u64>>,
}

impl SchemaTable {
    pub fn load(store: &dyn StoreAccess) -> Result<Self> {
        let mut table = Self::default();
        for id in 0..store.high_id(StoreFile::Schema) {
            let record = store.schema(id)?;
            if !record.in_use {
                continue;
            }
            if let Some(rule) = &record.rule {
                if let Some(content) = rule.content_key() {
                    table.by_content.entry(content).or_default().push(id);
                }
                if let Some(name) = rule.name() {
                    table.by_name.entry(name.to_string()).or_default().push(id);
                }
                match rule {
                    SchemaRule::Constraint(constraint) => {
                        if let Some(index) = constraint.owned_index {
                            table.index_claims.entry(index).or_default().push(id);
                        }
                    }
                    SchemaRule::Index(index) => {
                        if let Some(constraint) = index.owning_constraint {
                            table.constraint_claims.entry(constraint).or_default().push(id);
                        }
                    }
                    SchemaRule::Unsupported(_) => {}
                }
            }
            table.records.insert(id, record);
        }
        tracing::debug!(rules = table.records.len(), "schema rules loaded");
        Ok(table)
    }

    pub fn get(&self, id: u64) -> Option<&SchemaRecord> {
        self.records.get(&id)
    }

    pub fn index(&self, id: u64) -> Option<&IndexRule> {
        self.get(id).and_then(SchemaRecord::index)
    }

    pub fn constraint(&self, id: u64) -> Option<&ConstraintRule> {
        self.get(id).and_then(SchemaRecord::constraint)
    }

    /// Every index rule, in id order
    pub fn indexes(&self) -> impl Iterator<Item = (u64, &IndexRule)> + '_ {
        self.records
            .iter()
            .filter_map(|(id, record)| record.index().map(|index| (*id, index)))
    }

    /// Online indexes over `kind`
    pub fn online_indexes(&self, kind: EntityKind) -> impl Iterator<Item = (u64, &IndexRule)> + '_ {
        self.indexes().filter(move |(_, index)| {
            index.state == IndexState::Online && index.schema.entity == kind
        })
    }

    /// Keys an entity of `kind` carrying `tokens` must have
    pub fn mandatory_keys(&self, kind: EntityKind, tokens: &[u32]) -> BTreeSet<KeyId> {
        self.records
            .values()
            .filter_map(SchemaRecord::constraint)
            .filter(|constraint| {
                constraint.kind.is_mandatory()
                    && constraint.schema.entity == kind
                    && tokens.contains(&constraint.schema.token)
            })
            .flat_map(|constraint| constraint.schema.properties.iter().copied())
            .collect()
    }

    /// Whether any index or mandatory constraint covers `tokens`
    pub fn covers(&self, kind: EntityKind, tokens: &[u32]) -> bool {
        self.records
            .values()
            .filter_map(|record| record.rule.as_ref().and_then(SchemaRule::schema))
            .any(|schema| schema.entity == kind && tokens.contains(&schema.token))
    }

    /// The rule this one is mutually linked with (constraint and backing index)
    fn partner(&self, id: u64, rule: &SchemaRule) -> Option<u64> {
        match rule {
            SchemaRule::Index(index) => index.owning_constraint.filter(|constraint| {
                self.constraint(*constraint)
                    .is_some_and(|c| c.owned_index == Some(id))
            }),
            SchemaRule::Constraint(constraint) => constraint.owned_index.filter(|index| {
                self.index(*index)
                    .is_some_and(|i| i.owning_constraint == Some(id))
            }),
            SchemaRule::Unsupported(_) => None,
        }
    }
}

/// Claimant that keeps an obligation: the one referenced back, else the lowest
fn obligation_keeper(claimants: &[u64], referenced: Option<u64>) -> Option<u64> {
    referenced
        .filter(|id| claimants.contains(id))
        .or_else(|| claimants.iter().copied().min())
}

pub(super) fn check(ctx: &CheckContext<'_>, id: u64) -> Result<()> {
    let Some(record) = ctx.schema.get(id) else {
        return Ok(());
    };
    let report = ctx.reporter.for_schema(record);
    let Some(rule) = &record.rule else {
        report.report(SchemaViolation::MalformedSchemaRule);
        return Ok(());
    };
    let schema = match rule {
        SchemaRule::Unsupported(rule_type) => {
            report.report(SchemaViolation::UnsupportedSchemaRuleType {
                rule_type: rule_type.clone(),
            });
            return Ok(());
        }
        SchemaRule::Index(index) => &index.schema,
        SchemaRule::Constraint(constraint) => &constraint.schema,
    };

    check_tokens(ctx, &report, schema)?;
    check_duplicates(ctx, &report, id, rule);
    match rule {
        SchemaRule::Index(index) => check_index(ctx, &report, id, index),
        SchemaRule::Constraint(constraint) => check_constraint(ctx, &report, id, constraint),
        SchemaRule::Unsupported(_) => {}
    }
    Ok(())
}

fn check_tokens(
    ctx: &CheckContext<'_>,
    report: &SchemaReport<'_>,
    schema: &SchemaDescriptor,
) -> Result<()> {
    match schema.entity {
        EntityKind::Node => {
            if !ctx.token_in_use(TokenKind::Label, schema.token)? {
                report.report(SchemaViolation::LabelNotInUse {
                    label: schema.token,
                });
            }
        }
        EntityKind::Relationship => {
            if !ctx.token_in_use(TokenKind::RelationshipType, schema.token)? {
                report.report(SchemaViolation::RelationshipTypeNotInUse {
                    rel_type: schema.token,
                });
            }
        }
    }
    for &key in &schema.properties {
        if !ctx.token_in_use(TokenKind::PropertyKey, key)? {
            report.report(SchemaViolation::PropertyKeyNotInUse { key });
        }
    }
    Ok(())
}

fn check_duplicates(ctx: &CheckContext<'_>, report: &SchemaReport<'_>, id: u64, rule: &SchemaRule) {
    let table = &ctx.schema;
    let earlier = |ids: Option<&Vec<u64>>, skip: Option<u64>| {
        ids.into_iter()
            .flatten()
            .copied()
            .filter(|other| *other < id && Some(*other) != skip)
            .min()
    };

    if let Some(other) = rule
        .content_key()
        .and_then(|content| earlier(table.by_content.get(&content), None))
    {
        report.report(SchemaViolation::DuplicateRuleContent { other });
    }

    // A constraint and its backing index share their name
    if let Some(name) = rule.name() {
        if let Some(other) = earlier(table.by_name.get(name), table.partner(id, rule)) {
            report.report(SchemaViolation::DuplicateRuleName {
                other,
                name: name.to_string(),
            });
        }
    }
}

fn check_index(ctx: &CheckContext<'_>, report: &SchemaReport<'_>, id: u64, index: &IndexRule) {
    let table = &ctx.schema;
    if index.state != IndexState::Online {
        report.report(SchemaViolation::SchemaRuleNotOnline { state: index.state });
    }

    match index.owning_constraint {
        Some(constraint_id) => {
            let claimants = table
                .constraint_claims
                .get(&constraint_id)
                .map_or(&[][..], Vec::as_slice);
            let referenced = table.constraint(constraint_id).and_then(|c| c.owned_index);
            match obligation_keeper(claimants, referenced) {
                Some(keeper) if keeper != id => {
                    report.report(SchemaViolation::DuplicateObligation { other: keeper });
                }
                _ => match table.constraint(constraint_id) {
                    Some(constraint) if constraint.owned_index == Some(id) => {
                        if constraint.name != index.name {
                            report.report(
                                SchemaViolation::ConstraintIndexNameDoesNotMatchConstraintName {
                                    index: id,
                                    index_name: index.name.clone(),
                                    constraint_name: constraint.name.clone(),
                                },
                            );
                        }
                    }
                    _ => report.report(SchemaViolation::ConstraintIndexRuleNotReferencingBack {
                        constraint: constraint_id,
                    }),
                },
            }
        }
        None if index.kind == IndexKind::Unique => {
            report.report(SchemaViolation::MissingObligation {
                kind: ObligationKind::UniquenessConstraint,
            });
        }
        None => {}
    }
}

fn check_constraint(
    ctx: &CheckContext<'_>,
    report: &SchemaReport<'_>,
    id: u64,
    constraint: &ConstraintRule,
) {
    if !constraint.kind.needs_index() {
        return;
    }
    let table = &ctx.schema;
    let Some(index_id) = constraint.owned_index else {
        report.report(SchemaViolation::MissingObligation {
            kind: ObligationKind::ConstraintIndexRule,
        });
        return;
    };

    let claimants = table.index_claims.get(&index_id).map_or(&[][..], Vec::as_slice);
    let referenced = table.index(index_id).and_then(|i| i.owning_constraint);
    if let Some(keeper) = obligation_keeper(claimants, referenced) {
        if keeper != id {
            report.report(SchemaViolation::DuplicateObligation { other: keeper });
            return;
        }
    }

    match table.index(index_id) {
        Some(index) if index.owning_constraint == Some(id) => {
            if index.kind != IndexKind::Unique {
                report.report(SchemaViolation::UniquenessConstraintReferencingIndexOfWrongType {
                    index: index_id,
                });
            }
        }
        _ => report.report(SchemaViolation::UniquenessConstraintNotReferencingBack {
            index: index_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::check_collect;
    use crate::record::{
        ConstraintKind, ConstraintRule, IndexKind, IndexRule, IndexState, RecordCategory,
        SchemaDescriptor, SchemaRecord, SchemaRule, TokenKind,
    };
    use crate::report::{ObligationKind, SchemaViolation, Violation};
    use crate::store::MemoryStore;

    fn schema_violations(store: &MemoryStore) -> Vec<(u64, SchemaViolation)> {
        check_collect(store)
            .violations()
            .into_iter()
            .filter(|v| v.record.category == RecordCategory::SchemaRule)
            .filter_map(|v| match v.violation {
                Violation::Schema(schema) => Some((v.record.id, schema)),
                _ => None,
            })
            .collect()
    }

    fn tokens(store: &MemoryStore) -> (u32, u32) {
        let label = store.create_token(TokenKind::Label, "User").unwrap();
        let key = store.create_token(TokenKind::PropertyKey, "email").unwrap();
        (label, key)
    }

    #[test]
    fn test_constraint_with_backing_index_is_clean() {
        let store = MemoryStore::new();
        let (label, key) = tokens(&store);
        store
            .create_constraint(
                "user_email",
                SchemaDescriptor::node(label, vec![key]),
                ConstraintKind::Unique,
            )
            .unwrap();
        assert!(schema_violations(&store).is_empty());
    }

    #[test]
    fn test_malformed_and_unsupported_rules() {
        let store = MemoryStore::new();
        store.put_schema(SchemaRecord {
            id: 0,
            in_use: true,
            rule: None,
        }).unwrap();
        store.put_schema(SchemaRecord::new(1, SchemaRule::Unsupported("fulltext".into()))).unwrap();

        assert_eq!(
            schema_violations(&store),
            vec![
                (0, SchemaViolation::MalformedSchemaRule),
                (
                    1,
                    SchemaViolation::UnsupportedSchemaRuleType {
                        rule_type: "fulltext".into()
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_tokens_not_in_use() {
        let store = MemoryStore::new();
        store.put_schema(SchemaRecord::new(
            0,
            SchemaRule::Index(IndexRule {
                name: "dangling".into(),
                schema: SchemaDescriptor::node(4, vec![9]),
                kind: IndexKind::General,
                state: IndexState::Online,
                owning_constraint: None,
            }),
        )).unwrap();
        let found = schema_violations(&store);
        assert!(found.contains(&(0, SchemaViolation::LabelNotInUse { label: 4 })));
        assert!(found.contains(&(0, SchemaViolation::PropertyKeyNotInUse { key: 9 })));
    }

    #[test]
    fn test_duplicate_content_and_name() {
        let store = MemoryStore::new();
        let (label, key) = tokens(&store);
        store
            .create_index("by_email", SchemaDescriptor::node(label, vec![key]))
            .unwrap();
        // Raw write bypasses the name check of create_index
        store.put_schema(SchemaRecord::new(
            1,
            SchemaRule::Index(IndexRule {
                name: "by_email".into(),
                schema: SchemaDescriptor::node(label, vec![key]),
                kind: IndexKind::General,
                state: IndexState::Online,
                owning_constraint: None,
            }),
        )).unwrap();

        let found = schema_violations(&store);
        assert_eq!(
            found,
            vec![
                (1, SchemaViolation::DuplicateRuleContent { other: 0 }),
                (
                    1,
                    SchemaViolation::DuplicateRuleName {
                        other: 0,
                        name: "by_email".into()
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_obligations() {
        let store = MemoryStore::new();
        let (label, key) = tokens(&store);
        let schema = SchemaDescriptor::node(label, vec![key]);

        // Constraint without backing index, unique index without constraint
        store.put_schema(SchemaRecord::new(
            0,
            SchemaRule::Constraint(ConstraintRule {
                name: "c0".into(),
                schema,
                kind: ConstraintKind::Unique,
                owned_index: None,
            }),
        )).unwrap();
        store.put_schema(SchemaRecord::new(
            1,
            SchemaRule::Index(IndexRule {
                name: "i1".into(),
                schema: SchemaDescriptor::node(label, vec![]),
                kind: IndexKind::Unique,
                state: IndexState::Populating,
                owning_constraint: None,
            }),
        )).unwrap();

        let found = schema_violations(&store);
        assert!(found.contains(&(
            0,
            SchemaViolation::MissingObligation {
                kind: ObligationKind::ConstraintIndexRule
            }
        )));
        assert!(found.contains(&(
            1,
            SchemaViolation::MissingObligation {
                kind: ObligationKind::UniquenessConstraint
            }
        )));
        assert!(found.contains(&(
            1,
            SchemaViolation::SchemaRuleNotOnline {
                state: IndexState::Populating
            }
        )));
    }

    #[test]
    fn test_mismatched_references() {
        let store = MemoryStore::new();
        let (label, key) = tokens(&store);
        let schema = SchemaDescriptor::node(label, vec![key]);

        // Constraint 0 owns general index 1, which points back; index 2 claims constraint 0
        store.put_schema(SchemaRecord::new(
            0,
            SchemaRule::Constraint(ConstraintRule {
                name: "c".into(),
                schema: schema.clone(),
                kind: ConstraintKind::NodeKey,
                owned_index: Some(1),
            }),
        )).unwrap();
        store.put_schema(SchemaRecord::new(
            1,
            SchemaRule::Index(IndexRule {
                name: "other_name".into(),
                schema: schema.clone(),
                kind: IndexKind::General,
                state: IndexState::Online,
                owning_constraint: Some(0),
            }),
        )).unwrap();
        store.put_schema(SchemaRecord::new(
            2,
            SchemaRule::Index(IndexRule {
                name: "c2".into(),
                schema: SchemaDescriptor::node(label, vec![]),
                kind: IndexKind::Unique,
                state: IndexState::Online,
                owning_constraint: Some(0),
            }),
        )).unwrap();

        let found = schema_violations(&store);
        assert!(found.contains(&(
            0,
            SchemaViolation::UniquenessConstraintReferencingIndexOfWrongType { index: 1 }
        )));
        assert!(found.contains(&(
            1,
            SchemaViolation::ConstraintIndexNameDoesNotMatchConstraintName {
                index: 1,
                index_name: "other_name".into(),
                constraint_name: "c".into(),
            }
        )));
        assert!(found.contains(&(2, SchemaViolation::DuplicateObligation { other: 1 })));
    }

    #[test]
    fn test_index_not_referencing_back() {
        let store = MemoryStore::new();
        let (label, key) = tokens(&store);
        let schema = SchemaDescriptor::node(label, vec![key]);
        store.put_schema(SchemaRecord::new(
            0,
            SchemaRule::Constraint(ConstraintRule {
                name: "c".into(),
                schema: schema.clone(),
                kind: ConstraintKind::Unique,
                owned_index: Some(1),
            }),
        )).unwrap();
        store.put_schema(SchemaRecord::new(
            1,
            SchemaRule::Index(IndexRule {
                name: "c".into(),
                schema,
                kind: IndexKind::Unique,
                state: IndexState::Online,
                owning_constraint: None,
            }),
        )).unwrap();

        let found = schema_violations(&store);
        assert!(found.contains(&(
            0,
            SchemaViolation::UniquenessConstraintNotReferencingBack { index: 1 }
        )));
        assert!(found.contains(&(
            1,
            SchemaViolation::MissingObligation {
                kind: ObligationKind::UniquenessConstraint
            }
        )));
    }
}

//! Counts store check
//!
//! Node and relationship passes feed a [`CountsAccumulator`]; once they are
//! done the recomputed counts are diffed against the stored ones. A key only
//! one side knows about counts as zero on the other.

use super::CheckContext;
use crate::error::Result;
use crate::record::{CountsKey, LabelId, RecordCategory, TypeId};
use crate::report::CountsViolation;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::info;

/// Counts recomputed from the primary records
#[derive(Debug, Default)]
pub(crate) struct CountsAccumulator {
    counts: DashMap<CountsKey, u64>,
}

impl CountsAccumulator {
    fn add(&self, key: CountsKey) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// Count a live node with its legal, deduplicated labels
    pub fn node(&self, labels: &[LabelId]) {
        self.add(CountsKey::Nodes { label: None });
        for &label in labels {
            self.add(CountsKey::Nodes { label: Some(label) });
        }
    }

    /// Count a live relationship of a legal type
    pub fn relationship(&self, rel_type: TypeId) {
        self.add(CountsKey::Relationships { rel_type });
    }

    /// Sorted copy of the recomputed counts
    pub fn snapshot(&self) -> BTreeMap<CountsKey, u64> {
        self.counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

pub(super) fn check(ctx: &CheckContext<'_>) -> Result<()> {
    let expected = ctx.counts.snapshot();
    let stored: BTreeMap<CountsKey, u64> = ctx
        .store
        .stored_counts()?
        .into_iter()
        .map(|entry| (entry.key, entry.count))
        .collect();

    let mut keys: Vec<CountsKey> = expected.keys().chain(stored.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut mismatches = 0u64;
    for key in &keys {
        let expected = expected.get(key).copied().unwrap_or(0);
        let actual = stored.get(key).copied().unwrap_or(0);
        if expected == actual {
            continue;
        }
        mismatches += 1;
        let report = ctx.reporter.for_counts(key);
        match key {
            CountsKey::Nodes { .. } => {
                report.report(CountsViolation::InconsistentNodeCount { expected, actual });
            }
            CountsKey::Relationships { .. } => {
                report.report(CountsViolation::InconsistentRelationshipCount { expected, actual });
            }
        }
    }
    ctx.record_checked(RecordCategory::CountsEntry, keys.len() as u64);
    info!(keys = keys.len(), mismatches, "counts checked");
    Ok(())
}

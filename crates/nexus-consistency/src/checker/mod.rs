//! Consistency checker
//!
//! Walks every store once per pass and re-derives the structural invariants
//! of each record from the records it points to:
//!
//! 1. schema rules and tokens
//! 2. nodes, relationships, relationship groups, properties, dynamic blocks
//! 3. ownership of property and dynamic chains (resolved after the record passes)
//! 4. index entries, label / relationship type scan stores, counts
//!
//! Each pass splits the id space into shards of `shard_size` records and
//! checks them on a dedicated rayon pool. Per-record checks only read; the
//! little cross-record state there is (ownership claims, chain membership,
//! terminal groups, recomputed counts) is collected concurrently and resolved in id order
//! once the record passes are done, so repeated runs report the same
//! multiset of violations.
//!
//! Findings go to the [`ReportSink`]; only collaborator failures abort a
//! check with an [`Error`].

mod counts;
mod dynamic;
mod group;
mod index;
mod node;
mod ownership;
mod property;
mod relationship;
mod scan_store;
mod schema;
mod token;

use crate::config::CheckConfig;
use crate::error::{Error, Result};
use crate::record::{DynamicStoreKind, NULL_TOKEN, RecordCategory, TokenKind};
use crate::report::{ReportSink, Reporter};
use crate::store::{StoreAccess, StoreFile};
use counts::CountsAccumulator;
use dashmap::DashMap;
use ownership::OwnershipTracker;
use relationship::ChainMembership;
use rayon::prelude::*;
use schema::SchemaTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cooperative cancellation flag, polled between records
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Fresh signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every pass to stop after its current record
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    /// Every enabled pass ran to the end
    pub completed: bool,
    /// Record ids visited per category
    pub records_checked: BTreeMap<RecordCategory, u64>,
    /// Wall time in milliseconds
    pub elapsed_ms: u64,
    /// Errors reported by this check
    pub errors: u64,
    /// Warnings reported by this check
    pub warnings: u64,
}

impl CheckSummary {
    /// Completed with no errors
    pub fn is_consistent(&self) -> bool {
        self.completed && self.errors == 0
    }
}

/// State shared by every pass of one check
pub(crate) struct CheckContext<'a> {
    pub store: &'a dyn StoreAccess,
    pub reporter: Reporter<'a>,
    pub config: &'a CheckConfig,
    pub schema: SchemaTable,
    pub ownership: OwnershipTracker,
    pub counts: CountsAccumulator,
    pub terminal_groups: DashMap<u64, Vec<u64>>,
    pub chains: ChainMembership,
    checked: DashMap<RecordCategory, u64>,
    stop: StopSignal,
}

impl CheckContext<'_> {
    fn stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    fn record_checked(&self, category: RecordCategory, records: u64) {
        *self.checked.entry(category).or_insert(0) += records;
    }

    /// Whether structural record checks run
    pub fn graph(&self) -> bool {
        self.config.check_graph
    }

    /// Records per parallel chunk of an in-memory list
    fn chunk_len(&self) -> usize {
        usize::try_from(self.config.shard_size).unwrap_or(usize::MAX).max(1)
    }

    /// Whether a token id is legal and its record in use
    pub fn token_in_use(&self, kind: TokenKind, id: u32) -> Result<bool> {
        if id == NULL_TOKEN {
            return Ok(false);
        }
        Ok(self.store.token(kind, id)?.in_use)
    }
}

/// Run `check` over `[0, high_id)` in parallel shards
fn run_pass<F>(
    ctx: &CheckContext<'_>,
    pass: &'static str,
    category: RecordCategory,
    high_id: u64,
    check: F,
) -> Result<()>
where
    F: Fn(&CheckContext<'_>, u64) -> Result<()> + Sync,
{
    let shard = ctx.config.shard_size.max(1);
    let starts: Vec<u64> = (0..high_id).step_by(shard as usize).collect();

    starts.into_par_iter().try_for_each(|start| -> Result<()> {
        let end = start.saturating_add(shard).min(high_id);
        let mut visited = 0;
        for id in start..end {
            if ctx.stopped() {
                break;
            }
            check(ctx, id)?;
            visited += 1;
        }
        ctx.record_checked(category, visited);
        tracing::debug!(pass, start, end, "shard checked");
        Ok(())
    })?;

    tracing::info!(pass, records = high_id, "consistency pass finished");
    Ok(())
}

/// Offline consistency checker over a [`StoreAccess`]
pub struct ConsistencyChecker<'a> {
    store: &'a dyn StoreAccess,
    config: CheckConfig,
    stop: StopSignal,
}

impl<'a> ConsistencyChecker<'a> {
    /// Checker over `store`
    pub fn new(store: &'a dyn StoreAccess, config: CheckConfig) -> Self {
        Self {
            store,
            config,
            stop: StopSignal::new(),
        }
    }

    /// Use an externally owned stop signal
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Signal that cancels this checker
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Configuration in use
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Check every enabled invariant, reporting into `sink`
    ///
    /// Returns an error only when the store fails to produce a record; the
    /// pass in progress is abandoned and no summary is produced.
    pub fn check(&self, sink: &dyn ReportSink) -> Result<CheckSummary> {
        let started = Instant::now();
        // Sinks may be reused; only what this check adds is counted
        let before = sink.summary();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("nexus-check-{i}"))
            .build()
            .map_err(|e| Error::internal(format!("failed to start checker pool: {e}")))?;

        let ctx = CheckContext {
            store: self.store,
            reporter: Reporter::new(sink),
            config: &self.config,
            schema: SchemaTable::load(self.store)?,
            ownership: OwnershipTracker::new(
                self.config.check_graph && self.config.check_property_owners,
            ),
            counts: CountsAccumulator::default(),
            terminal_groups: DashMap::new(),
            chains: ChainMembership::default(),
            checked: DashMap::new(),
            stop: self.stop.clone(),
        };

        tracing::info!(
            threads = pool.current_num_threads(),
            shard_size = self.config.shard_size,
            "starting consistency check"
        );
        let completed = pool.install(|| self.run(&ctx))?;
        if !completed {
            tracing::warn!("consistency check stopped before completion");
        }

        let report = sink.summary();
        let summary = CheckSummary {
            completed,
            records_checked: ctx.checked.into_iter().collect(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            errors: report.errors.saturating_sub(before.errors),
            warnings: report.warnings.saturating_sub(before.warnings),
        };
        tracing::info!(
            completed,
            errors = summary.errors,
            warnings = summary.warnings,
            elapsed_ms = summary.elapsed_ms,
            "consistency check finished"
        );
        Ok(summary)
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<bool> {
        let config = &self.config;
        let store = self.store;

        if config.check_schema {
            run_pass(
                ctx,
                "schema",
                RecordCategory::SchemaRule,
                store.high_id(StoreFile::Schema),
                schema::check,
            )?;
            for kind in TokenKind::ALL {
                run_pass(
                    ctx,
                    "tokens",
                    RecordCategory::for_token(kind),
                    store.high_id(StoreFile::Tokens(kind)),
                    move |ctx, id| token::check(ctx, kind, id),
                )?;
            }
        }
        if ctx.stopped() {
            return Ok(false);
        }

        let entity_passes = config.check_graph
            || config.check_counts
            || config.check_indexes
            || config.check_token_scans;
        if entity_passes {
            run_pass(
                ctx,
                "nodes",
                RecordCategory::Node,
                store.high_id(StoreFile::Nodes),
                node::check,
            )?;
            run_pass(
                ctx,
                "relationships",
                RecordCategory::Relationship,
                store.high_id(StoreFile::Relationships),
                relationship::check,
            )?;
        }
        if ctx.stopped() {
            return Ok(false);
        }

        if config.check_graph {
            relationship::resolve_unreached(ctx)?;
            run_pass(
                ctx,
                "relationship groups",
                RecordCategory::RelationshipGroup,
                store.high_id(StoreFile::RelationshipGroups),
                group::check,
            )?;
            group::resolve_terminal_groups(ctx)?;

            run_pass(
                ctx,
                "properties",
                RecordCategory::Property,
                store.high_id(StoreFile::Properties),
                property::check,
            )?;

            for kind in DynamicStoreKind::ALL {
                if is_name_store(kind) && !config.check_schema {
                    continue;
                }
                run_pass(
                    ctx,
                    "dynamic blocks",
                    RecordCategory::DynamicRecord,
                    store.high_id(StoreFile::Dynamic(kind)),
                    move |ctx, id| dynamic::check(ctx, kind, id),
                )?;
            }
            if ctx.stopped() {
                return Ok(false);
            }
            ctx.ownership.resolve(ctx)?;
        }
        if ctx.stopped() {
            return Ok(false);
        }

        if config.check_indexes {
            index::check(ctx)?;
        }
        if config.check_token_scans {
            scan_store::check(ctx)?;
        }
        if ctx.stopped() {
            return Ok(false);
        }

        if config.check_counts {
            counts::check(ctx)?;
        }
        Ok(!ctx.stopped())
    }
}

fn is_name_store(kind: DynamicStoreKind) -> bool {
    matches!(
        kind,
        DynamicStoreKind::LabelName
            | DynamicStoreKind::RelationshipTypeName
            | DynamicStoreKind::PropertyKeyName
    )
}

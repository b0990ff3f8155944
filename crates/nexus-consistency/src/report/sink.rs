//! Report sinks

use super::{ReportedViolation, Severity, ViolationRecord};
use crate::config::ReporterMode;
use crate::record::RecordCategory;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Destination of reported violations
///
/// Sinks are shared by every checker worker, so `report` must tolerate
/// concurrent calls. Reporting never fails.
pub trait ReportSink: Send + Sync {
    /// Accept one violation
    fn report(&self, violation: ReportedViolation);

    /// Errors and warnings seen so far
    fn summary(&self) -> ReportSummary {
        ReportSummary::default()
    }
}

/// Errors and warnings for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    /// Number of errors
    pub errors: u64,
    /// Number of warnings
    pub warnings: u64,
}

/// Aggregated violation counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Total errors
    pub errors: u64,
    /// Total warnings
    pub warnings: u64,
    /// Breakdown per record category
    pub by_category: BTreeMap<RecordCategory, CategoryCounts>,
}

impl ReportSummary {
    /// Count one violation
    pub fn add(&mut self, violation: &ReportedViolation) {
        let counts = self
            .by_category
            .entry(violation.record.category)
            .or_default();
        match violation.severity() {
            Severity::Error => {
                self.errors += 1;
                counts.errors += 1;
            }
            Severity::Warning => {
                self.warnings += 1;
                counts.warnings += 1;
            }
        }
    }

    /// Errors plus warnings
    pub fn total(&self) -> u64 {
        self.errors + self.warnings
    }

    /// No errors were reported (warnings allowed)
    pub fn is_consistent(&self) -> bool {
        self.errors == 0
    }
}

#[derive(Default)]
struct Collected {
    violations: Vec<ReportedViolation>,
    summary: ReportSummary,
}

/// Append-only in-memory sink
#[derive(Default)]
pub struct CollectingSink {
    inner: Mutex<Collected>,
}

impl CollectingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far, in arrival order
    pub fn violations(&self) -> Vec<ReportedViolation> {
        self.inner.lock().violations.clone()
    }

    /// Number of violations reported so far
    pub fn len(&self) -> usize {
        self.inner.lock().violations.len()
    }

    /// Nothing reported yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of violations of a given kind
    pub fn count_of(&self, kind: &str) -> usize {
        self.inner
            .lock()
            .violations
            .iter()
            .filter(|v| v.violation.detail().kind == kind)
            .count()
    }

    /// Export everything as flat records, sorted for stable output
    pub fn export(&self) -> Vec<ViolationRecord> {
        let mut records: Vec<_> = self
            .inner
            .lock()
            .violations
            .iter()
            .map(ViolationRecord::from_reported)
            .collect();
        records.sort_by(|a, b| {
            (a.record_category, a.record_id, &a.violation_kind).cmp(&(
                b.record_category,
                b.record_id,
                &b.violation_kind,
            ))
        });
        records
    }

    /// Drain the collected violations and reset the summary
    pub fn take(&self) -> Vec<ReportedViolation> {
        let mut inner = self.inner.lock();
        inner.summary = ReportSummary::default();
        std::mem::take(&mut inner.violations)
    }
}

impl ReportSink for CollectingSink {
    fn report(&self, violation: ReportedViolation) {
        let mut inner = self.inner.lock();
        inner.summary.add(&violation);
        inner.violations.push(violation);
    }

    fn summary(&self) -> ReportSummary {
        self.inner.lock().summary.clone()
    }
}

/// Sink that logs each violation as a `tracing` event
#[derive(Default)]
pub struct TracingSink {
    summary: Mutex<ReportSummary>,
}

impl TracingSink {
    /// New logging sink
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportSink for TracingSink {
    fn report(&self, violation: ReportedViolation) {
        let detail = violation.violation.detail();
        match violation.severity() {
            Severity::Error => tracing::error!(
                category = ?violation.record.category,
                record = violation.record.id,
                kind = %detail.kind,
                context = ?detail.context,
                "consistency violation"
            ),
            Severity::Warning => tracing::warn!(
                category = ?violation.record.category,
                record = violation.record.id,
                kind = %detail.kind,
                context = ?detail.context,
                "consistency warning"
            ),
        }
        self.summary.lock().add(&violation);
    }

    fn summary(&self) -> ReportSummary {
        self.summary.lock().clone()
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReport;

impl ReportSink for NoReport {
    fn report(&self, _violation: ReportedViolation) {}
}

/// Sink selected by [`ReporterMode`]
pub enum ConfiguredSink {
    /// Keep every violation
    Collect(CollectingSink),
    /// Log every violation
    Log(TracingSink),
    /// Drop every violation
    Discard(NoReport),
}

impl ConfiguredSink {
    /// Build the sink for a reporter mode
    pub fn from_mode(mode: ReporterMode) -> Self {
        match mode {
            ReporterMode::Collect => ConfiguredSink::Collect(CollectingSink::new()),
            ReporterMode::Log => ConfiguredSink::Log(TracingSink::new()),
            ReporterMode::Discard => ConfiguredSink::Discard(NoReport),
        }
    }

    /// Collected violations, when collecting
    pub fn collected(&self) -> Option<&CollectingSink> {
        match self {
            ConfiguredSink::Collect(sink) => Some(sink),
            _ => None,
        }
    }
}

impl ReportSink for ConfiguredSink {
    fn report(&self, violation: ReportedViolation) {
        match self {
            ConfiguredSink::Collect(sink) => sink.report(violation),
            ConfiguredSink::Log(sink) => sink.report(violation),
            ConfiguredSink::Discard(sink) => sink.report(violation),
        }
    }

    fn summary(&self) -> ReportSummary {
        match self {
            ConfiguredSink::Collect(sink) => sink.summary(),
            ConfiguredSink::Log(sink) => sink.summary(),
            ConfiguredSink::Discard(sink) => sink.summary(),
        }
    }
}

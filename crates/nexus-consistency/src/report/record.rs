//! Export shape of a reported violation

use super::{RecordScope, ReportedViolation, Severity};
use crate::error::Result;
use crate::record::RecordCategory;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Flat, serializable form of a [`ReportedViolation`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Category of the offending record
    pub record_category: RecordCategory,
    /// Offending record id
    pub record_id: u64,
    /// Sub-store qualifier of the record id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_scope: Option<RecordScope>,
    /// Snake-case violation kind
    pub violation_kind: String,
    /// Error or warning
    pub severity: Severity,
    /// Other records involved
    pub context_record_ids: Vec<u64>,
    /// Expected value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
    /// Value actually found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
}

impl ViolationRecord {
    /// Flatten a reported violation
    pub fn from_reported(reported: &ReportedViolation) -> Self {
        let detail = reported.violation.detail();
        Self {
            record_category: reported.record.category,
            record_id: reported.record.id,
            record_scope: match reported.record.scope {
                RecordScope::Global => None,
                scope => Some(scope),
            },
            violation_kind: detail.kind,
            severity: reported.severity(),
            context_record_ids: detail.context,
            expected: detail.expected,
            actual: detail.actual,
        }
    }

    /// Write records as JSON lines
    pub fn write_json_lines<W: Write>(records: &[ViolationRecord], mut out: W) -> Result<()> {
        for record in records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

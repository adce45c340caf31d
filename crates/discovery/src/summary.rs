//! Report aggregation

use protocol::{SessionReport, SessionState, SessionSummary, VerdictKind};
use std::collections::BTreeMap;

/// Count recorded verdicts by kind
pub fn summarize(report: &SessionReport) -> SessionSummary {
    let mut by_kind = BTreeMap::new();
    for record in &report.records {
        *by_kind.entry(record.verdict.kind()).or_insert(0) += 1;
    }

    SessionSummary {
        total: report.records.len(),
        succeeded: by_kind.get(&VerdictKind::Success).copied().unwrap_or(0),
        by_kind,
        aborted: report.state == SessionState::Aborted,
    }
}

//! Session report types
//!
//! The report is the authoritative output of a probe session. It is built
//! incrementally by the session and is read-only once the session reaches a
//! terminal state.

use crate::outcome::{Verdict, VerdictKind};
use crate::types::{DeviceInfo, EndpointDescriptor};
use crate::version::{CURRENT_VERSION, ReportVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a probe session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

/// Final verdict recorded for one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    /// Label of the probe
    pub label: String,
    /// Verdict after retries were exhausted
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Executions it took to reach this verdict
    pub attempts: u32,
    /// ISO 8601 time the verdict was recorded
    pub timestamp: String,
    /// Duration of the final attempt in microseconds
    pub elapsed_us: u64,
}

/// Marker appended when a session stops before the end of its catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMarker {
    /// Probe that was executing when the handle became invalid
    pub at_label: String,
    /// Position of that probe in the catalog
    pub at_index: usize,
    /// Human-readable reason
    pub reason: String,
    /// ISO 8601 time of the abort
    pub timestamp: String,
}

/// Report of one session pass over a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Report format version
    pub version: ReportVersion,
    /// Final state of the session
    pub state: SessionState,
    /// Number of probes in the catalog
    pub catalog_len: usize,
    /// Device identity (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    /// Endpoints the session was allowed to use
    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,
    /// One record per executed probe, in catalog order
    pub records: Vec<ProbeRecord>,
    /// Present only when the session was aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortMarker>,
}

impl SessionReport {
    /// Empty report for a catalog of the given size
    pub fn new(catalog_len: usize) -> Self {
        Self {
            version: CURRENT_VERSION,
            state: SessionState::Idle,
            catalog_len,
            device: None,
            endpoints: Vec::new(),
            records: Vec::new(),
            aborted: None,
        }
    }

    /// Whether any probe produced bytes worth a closer look
    pub fn has_evidence(&self) -> bool {
        self.records.iter().any(|r| r.verdict.is_evidence())
    }

    /// Records whose verdict suggests protocol support
    pub fn evidence(&self) -> impl Iterator<Item = &ProbeRecord> {
        self.records.iter().filter(|r| r.verdict.is_evidence())
    }

    /// Look up the record for a label
    pub fn record(&self, label: &str) -> Option<&ProbeRecord> {
        self.records.iter().find(|r| r.label == label)
    }
}

/// Aggregate counts over a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Probes that reached a verdict
    pub total: usize,
    /// Probes recorded as `Success`
    pub succeeded: usize,
    /// Count per verdict kind (kinds with no records are omitted)
    pub by_kind: BTreeMap<VerdictKind, usize>,
    /// Whether the session was aborted
    pub aborted: bool,
}

impl SessionSummary {
    pub fn count(&self, kind: VerdictKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Probes that did not succeed
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }

    /// Any `Success` or any non-empty `ShortRead`
    pub fn has_evidence(&self) -> bool {
        self.succeeded > 0 || self.count(VerdictKind::ShortRead) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: &str, verdict: Verdict) -> ProbeRecord {
        ProbeRecord {
            label: label.to_string(),
            verdict,
            attempts: 1,
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            elapsed_us: 10,
        }
    }

    #[test]
    fn test_new_report_is_idle() {
        let report = SessionReport::new(3);
        assert_eq!(report.state, SessionState::Idle);
        assert!(!report.state.is_terminal());
        assert!(report.records.is_empty());
        assert!(report.aborted.is_none());
    }

    #[test]
    fn test_report_evidence() {
        let mut report = SessionReport::new(2);
        report.records.push(record("a", Verdict::Stalled));
        assert!(!report.has_evidence());

        report.records.push(record(
            "b",
            Verdict::ShortRead {
                length: 1,
                payload: vec![0x00],
            },
        ));
        assert!(report.has_evidence());
        assert_eq!(report.evidence().count(), 1);
        assert!(report.record("b").is_some());
    }

    #[test]
    fn test_record_json_is_flat() {
        let json = serde_json::to_value(record("a", Verdict::Stalled)).unwrap();
        assert_eq!(json["label"], "a");
        assert_eq!(json["verdict"], "stalled");
    }

    #[test]
    fn test_summary_counts() {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(VerdictKind::Stalled, 2);
        by_kind.insert(VerdictKind::Success, 1);
        let summary = SessionSummary {
            total: 3,
            succeeded: 1,
            by_kind,
            aborted: false,
        };
        assert_eq!(summary.count(VerdictKind::Stalled), 2);
        assert_eq!(summary.count(VerdictKind::Timeout), 0);
        assert_eq!(summary.failed(), 2);
        assert!(summary.has_evidence());
    }
}

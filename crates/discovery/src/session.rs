//! Probe session
//!
//! Drives a catalog through the executor and classifier, applying the retry
//! and pacing policy, and owns the resulting report.
//!
//! State machine:
//!
//! ```text
//! Idle ──start──► Running ──all probes recorded──► Completed
//!                    │
//!                    └──handle invalid──► Aborted
//! ```
//!
//! Terminal states are final: a session runs its catalog once.

use crate::catalog::Catalog;
use crate::classifier::Classifier;
use crate::executor::execute_probe;
use crate::registry::EndpointRegistry;
use protocol::{
    AbortMarker, DeviceInfo, DeviceIo, Pacer, ProbeError, ProbeRecord, ProbeSpec, Result,
    SessionReport, SessionState, ThreadPacer, UsbError,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pacing, retry and classification knobs for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Wait between consecutive probes (not after the last one)
    pub inter_probe_delay: Duration,
    /// Extra executions allowed after a timeout or transport error
    pub retry_count: u32,
    /// Wait before each retry
    pub retry_backoff: Duration,
    /// Bound on every individual transfer
    pub transfer_timeout: Duration,
    /// Classify successful zero-byte answers as timeouts
    pub treat_empty_as_failure: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inter_probe_delay: Duration::from_millis(100),
            retry_count: 1,
            retry_backoff: Duration::from_millis(250),
            transfer_timeout: Duration::from_secs(1),
            treat_empty_as_failure: true,
        }
    }
}

/// Result of running one probe to its final verdict
enum ProbeRun {
    Recorded(ProbeRecord),
    Interrupted(String),
}

/// One pass of a catalog against one device
pub struct ProbeSession<P: Pacer = ThreadPacer> {
    policy: SessionPolicy,
    classifier: Classifier,
    pacer: P,
    device: Option<DeviceInfo>,
    report: SessionReport,
}

impl ProbeSession<ThreadPacer> {
    /// Session that waits by sleeping the current thread
    pub fn new(policy: SessionPolicy) -> Self {
        Self::with_pacer(policy, ThreadPacer)
    }
}

impl<P: Pacer> ProbeSession<P> {
    pub fn with_pacer(policy: SessionPolicy, pacer: P) -> Self {
        Self {
            policy,
            classifier: Classifier::new(policy.treat_empty_as_failure),
            pacer,
            device: None,
            report: SessionReport::new(0),
        }
    }

    /// Attach device identity to the report (informational only)
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn state(&self) -> SessionState {
        self.report.state
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn into_report(self) -> SessionReport {
        self.report
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Run every probe of `catalog` in order
    ///
    /// Returns the finished report, whether the session completed or was
    /// aborted by a disappearing device.
    ///
    /// # Errors
    ///
    /// [`ProbeError::ProtocolViolation`] if the session is not idle or the
    /// device handle is already closed. The session is left untouched.
    pub fn start<D>(
        &mut self,
        catalog: &Catalog,
        registry: &EndpointRegistry,
        device: &mut D,
    ) -> Result<&SessionReport>
    where
        D: DeviceIo + ?Sized,
    {
        if self.report.state != SessionState::Idle {
            return Err(ProbeError::ProtocolViolation(format!(
                "session already started (state: {:?})",
                self.report.state
            )));
        }
        if !device.is_open() {
            return Err(ProbeError::ProtocolViolation(
                "cannot start a session on a closed device handle".to_string(),
            ));
        }

        let mut report = SessionReport::new(catalog.len());
        report.device = self.device.clone();
        report.endpoints = registry.endpoints().to_vec();
        report.state = SessionState::Running;
        self.report = report;

        info!(
            "Session started: catalog '{}' with {} probes",
            catalog.name(),
            catalog.len()
        );
        for (spec, reason) in catalog.unresolved(registry) {
            warn!("Probe '{}' cannot be routed: {}", spec.label, reason);
        }

        for (index, spec) in catalog.iter().enumerate() {
            if index > 0 {
                self.pacer.pause(self.policy.inter_probe_delay);
            }

            match self.run_probe(spec, registry, device) {
                ProbeRun::Recorded(record) => {
                    info!(
                        "[{}/{}] {}: {} (attempts: {})",
                        index + 1,
                        catalog.len(),
                        record.label,
                        record.verdict,
                        record.attempts
                    );
                    self.report.records.push(record);
                }
                ProbeRun::Interrupted(reason) => {
                    warn!("Session aborted at '{}': {}", spec.label, reason);
                    self.report.aborted = Some(AbortMarker {
                        at_label: spec.label.clone(),
                        at_index: index,
                        reason,
                        timestamp: common::now_iso8601(),
                    });
                    self.report.state = SessionState::Aborted;
                    return Ok(&self.report);
                }
            }
        }

        self.report.state = SessionState::Completed;
        info!(
            "Session completed: {} probes recorded",
            self.report.records.len()
        );
        Ok(&self.report)
    }

    /// Execute and classify one probe, retrying transient failures
    fn run_probe<D>(
        &mut self,
        spec: &ProbeSpec,
        registry: &EndpointRegistry,
        device: &mut D,
    ) -> ProbeRun
    where
        D: DeviceIo + ?Sized,
    {
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let outcome =
                match execute_probe(device, registry, spec, self.policy.transfer_timeout) {
                    Ok(outcome) => outcome,
                    Err(e) => return ProbeRun::Interrupted(e.to_string()),
                };

            if outcome.error == Some(UsbError::NoDevice) {
                return ProbeRun::Interrupted(format!(
                    "device disconnected: {}",
                    UsbError::NoDevice
                ));
            }

            let verdict = self.classifier.classify(&outcome, spec);

            if verdict.is_retryable() && attempts <= self.policy.retry_count {
                debug!(
                    "Probe '{}' attempt {} gave {}, retrying in {:?}",
                    spec.label, attempts, verdict, self.policy.retry_backoff
                );
                self.pacer.pause(self.policy.retry_backoff);
                continue;
            }

            return ProbeRun::Recorded(ProbeRecord {
                label: spec.label.clone(),
                verdict,
                attempts,
                timestamp: common::now_iso8601(),
                elapsed_us: u64::try_from(outcome.elapsed.as_micros()).unwrap_or(u64::MAX),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        RecordingPacer, Reply, ScriptedDevice, create_mock_device_info, create_mock_endpoints,
    };
    use protocol::{ControlSetup, Verdict};

    fn policy() -> SessionPolicy {
        SessionPolicy {
            inter_probe_delay: Duration::from_millis(100),
            retry_count: 1,
            retry_backoff: Duration::from_millis(250),
            transfer_timeout: Duration::from_millis(50),
            treat_empty_as_failure: true,
        }
    }

    fn registry() -> EndpointRegistry {
        EndpointRegistry::new(64, create_mock_endpoints())
    }

    fn session() -> ProbeSession<RecordingPacer> {
        ProbeSession::with_pacer(policy(), RecordingPacer::new())
    }

    #[test]
    fn test_default_policy() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.retry_count, 1);
        assert!(policy.treat_empty_as_failure);
        assert_eq!(policy.transfer_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_delay_between_probes_only() {
        let catalog = Catalog::new("two")
            .with(ProbeSpec::control("a", ControlSetup::vendor_in(0x06, 0, 0)))
            .with(ProbeSpec::control("b", ControlSetup::vendor_in(0x07, 0, 0)));
        let mut device = ScriptedDevice::new().otherwise(Reply::Error(UsbError::Pipe));
        let mut session = session();

        session.start(&catalog, &registry(), &mut device).unwrap();

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.pacer().pauses, [Duration::from_millis(100)]);
    }

    #[test]
    fn test_transfer_timeout_applied() {
        let catalog = Catalog::new("one").with(ProbeSpec::bulk("read"));
        let mut device = ScriptedDevice::new().then(Reply::Bytes(vec![1]));
        let mut session = session();

        session.start(&catalog, &registry(), &mut device).unwrap();
        assert_eq!(device.timeouts(), [Duration::from_millis(50)]);
    }

    #[test]
    fn test_retry_then_success_records_one_verdict() {
        let catalog = Catalog::new("retry").with(ProbeSpec::bulk("read").with_expected_length(2));
        let mut device = ScriptedDevice::new()
            .then(Reply::Error(UsbError::Timeout))
            .then(Reply::Bytes(vec![1, 2]));
        let mut session = session();

        let report = session.start(&catalog, &registry(), &mut device).unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].attempts, 2);
        assert!(matches!(
            report.records[0].verdict,
            Verdict::Success { length: 2, .. }
        ));
        assert_eq!(session.pacer().pauses, [Duration::from_millis(250)]);
    }

    #[test]
    fn test_stall_is_not_retried() {
        let catalog = Catalog::new("stall")
            .with(ProbeSpec::control("a", ControlSetup::vendor_in(0x00, 0, 0)));
        let mut device = ScriptedDevice::new().otherwise(Reply::Error(UsbError::Pipe));
        let mut session = session();

        let report = session.start(&catalog, &registry(), &mut device).unwrap();
        assert_eq!(report.records[0].attempts, 1);
        assert_eq!(device.calls().len(), 1);
    }

    #[test]
    fn test_closed_handle_rejected_and_session_stays_idle() {
        let catalog = Catalog::new("closed").with(ProbeSpec::bulk("read"));
        let mut device = ScriptedDevice::closed();
        let mut session = session();

        let err = session.start(&catalog, &registry(), &mut device).unwrap_err();
        assert!(matches!(err, ProbeError::ProtocolViolation(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_restart_is_violation() {
        let catalog = Catalog::new("once").with(ProbeSpec::bulk("read"));
        let mut device = ScriptedDevice::new().otherwise(Reply::Bytes(vec![1]));
        let mut session = session();

        session.start(&catalog, &registry(), &mut device).unwrap();
        let before = session.report().clone();

        assert!(session.start(&catalog, &registry(), &mut device).is_err());
        assert_eq!(session.report(), &before);
    }

    #[test]
    fn test_no_device_aborts() {
        let catalog = Catalog::new("unplug")
            .with(ProbeSpec::bulk("first"))
            .with(ProbeSpec::bulk("second"))
            .with(ProbeSpec::bulk("third"));
        let mut device = ScriptedDevice::new()
            .then(Reply::Bytes(vec![1]))
            .then(Reply::Error(UsbError::NoDevice));
        let mut session = session();

        let report = session.start(&catalog, &registry(), &mut device).unwrap();
        assert_eq!(report.state, SessionState::Aborted);
        assert_eq!(report.records.len(), 1);
        let marker = report.aborted.as_ref().unwrap();
        assert_eq!(marker.at_label, "second");
        assert_eq!(marker.at_index, 1);
    }

    #[test]
    fn test_report_carries_device_and_endpoints() {
        let catalog = Catalog::new("info").with(ProbeSpec::bulk("read"));
        let mut device = ScriptedDevice::new().then(Reply::Bytes(vec![1]));
        let mut session = session().with_device(create_mock_device_info(0x1234, 0x5678));

        session.start(&catalog, &registry(), &mut device).unwrap();
        let report = session.into_report();
        assert_eq!(report.device.map(|d| d.vendor_id), Some(0x1234));
        assert_eq!(report.endpoints.len(), 5);
        assert_eq!(report.catalog_len, 1);
    }
}

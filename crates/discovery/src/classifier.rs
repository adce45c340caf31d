//! Response classification
//!
//! Maps a raw [`TransferOutcome`] onto a [`Verdict`]. Transport errors are
//! checked before byte counts, so a stall or timeout always wins over whatever
//! partial data came back.

use protocol::{ProbeSpec, TransferOutcome, UsbError, Verdict};

/// Outcome classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    /// Treat a successful transfer of zero bytes as a timeout
    pub treat_empty_as_failure: bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            treat_empty_as_failure: true,
        }
    }
}

impl Classifier {
    pub fn new(treat_empty_as_failure: bool) -> Self {
        Self {
            treat_empty_as_failure,
        }
    }

    /// Classify one outcome against the probe that produced it
    pub fn classify(&self, outcome: &TransferOutcome, spec: &ProbeSpec) -> Verdict {
        match &outcome.error {
            Some(UsbError::Pipe) => return Verdict::Stalled,
            Some(UsbError::Timeout) => return Verdict::Timeout,
            Some(error) => {
                return Verdict::TransportError {
                    error: error.clone(),
                };
            }
            None => {}
        }

        let length = outcome.bytes_transferred;
        let expected = spec.effective_expected_length();

        if length == 0 {
            // A zero-length control write that the device acknowledged is a real answer
            let acknowledged_empty_write = !spec.reads_response() && expected == Some(0);
            return if self.treat_empty_as_failure && !acknowledged_empty_write {
                Verdict::Timeout
            } else {
                Verdict::Success {
                    payload: Vec::new(),
                    length: 0,
                }
            };
        }

        match expected {
            Some(expected) if length < expected => Verdict::ShortRead {
                length,
                payload: outcome.payload.clone(),
            },
            _ => Verdict::Success {
                payload: outcome.payload.clone(),
                length,
            },
        }
    }
}

/// Classify with the default policy (empty answers count as timeouts)
pub fn classify(outcome: &TransferOutcome, spec: &ProbeSpec) -> Verdict {
    Classifier::default().classify(outcome, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use protocol::{ControlSetup, TransferTelemetry};
    use std::time::Duration;

    fn outcome(error: Option<UsbError>, payload: Vec<u8>) -> TransferOutcome {
        TransferOutcome {
            error,
            bytes_sent: 0,
            bytes_transferred: payload.len(),
            payload,
            elapsed: Duration::from_millis(1),
            telemetry: TransferTelemetry {
                send_calls: 0,
                receive_calls: 1,
            },
        }
    }

    fn bulk_read(expected: usize) -> ProbeSpec {
        ProbeSpec::bulk("read").with_expected_length(expected)
    }

    #[test]
    fn test_stall_and_timeout() {
        let spec = bulk_read(8);
        assert_eq!(
            classify(&outcome(Some(UsbError::Pipe), vec![]), &spec),
            Verdict::Stalled
        );
        assert_eq!(
            classify(&outcome(Some(UsbError::Timeout), vec![]), &spec),
            Verdict::Timeout
        );
        assert_eq!(
            classify(&outcome(Some(UsbError::Overflow), vec![]), &spec),
            Verdict::TransportError {
                error: UsbError::Overflow
            }
        );
    }

    #[test]
    fn test_empty_answer_policy() {
        let spec = bulk_read(8);
        let empty = outcome(None, vec![]);

        assert_eq!(Classifier::new(true).classify(&empty, &spec), Verdict::Timeout);
        assert_eq!(
            Classifier::new(false).classify(&empty, &spec),
            Verdict::Success {
                payload: vec![],
                length: 0
            }
        );
    }

    #[test]
    fn test_short_read_and_success() {
        let spec = bulk_read(64);
        assert_eq!(
            classify(&outcome(None, vec![0xaa; 10]), &spec),
            Verdict::ShortRead {
                length: 10,
                payload: vec![0xaa; 10]
            }
        );
        assert!(matches!(
            classify(&outcome(None, vec![0; 64]), &spec),
            Verdict::Success { length: 64, .. }
        ));
    }

    #[test]
    fn test_unknown_expected_length_is_success() {
        let spec = ProbeSpec::bulk("spontaneous");
        assert!(matches!(
            classify(&outcome(None, vec![1, 2, 3]), &spec),
            Verdict::Success { length: 3, .. }
        ));
    }

    #[test]
    fn test_control_write_measured_against_payload() {
        let spec = ProbeSpec::control("init", ControlSetup::vendor_out(0x01, 0, 0))
            .with_payload([1, 0, 0, 0]);

        let mut partial = outcome(None, vec![]);
        partial.bytes_sent = 2;
        partial.bytes_transferred = 2;
        assert_eq!(
            classify(&partial, &spec),
            Verdict::ShortRead {
                length: 2,
                payload: vec![]
            }
        );

        let zero_length = ProbeSpec::control("ack", ControlSetup::vendor_out(0x09, 1, 0));
        assert_eq!(
            classify(&outcome(None, vec![]), &zero_length),
            Verdict::Success {
                payload: vec![],
                length: 0
            }
        );
    }

    fn any_error() -> impl Strategy<Value = Option<UsbError>> {
        prop_oneof![
            Just(None),
            Just(Some(UsbError::Timeout)),
            Just(Some(UsbError::Pipe)),
            Just(Some(UsbError::NoDevice)),
            Just(Some(UsbError::Io)),
            Just(Some(UsbError::Overflow)),
        ]
    }

    proptest! {
        #[test]
        fn prop_errors_take_precedence(
            error in any_error(),
            payload in proptest::collection::vec(any::<u8>(), 0..128),
            expected in proptest::option::of(0usize..128),
            treat_empty in any::<bool>(),
        ) {
            let mut spec = ProbeSpec::interrupt("prop");
            spec.expected_length = expected;
            let outcome = outcome(error.clone(), payload.clone());
            let verdict = Classifier::new(treat_empty).classify(&outcome, &spec);

            match error {
                Some(UsbError::Pipe) => prop_assert_eq!(verdict, Verdict::Stalled),
                Some(UsbError::Timeout) => prop_assert_eq!(verdict, Verdict::Timeout),
                Some(e) => prop_assert_eq!(verdict, Verdict::TransportError { error: e }),
                None if payload.is_empty() => {
                    let expected_verdict = if treat_empty {
                        Verdict::Timeout
                    } else {
                        Verdict::Success { payload: vec![], length: 0 }
                    };
                    prop_assert_eq!(verdict, expected_verdict);
                }
                None => {
                    let short = expected.is_some_and(|e| payload.len() < e);
                    prop_assert_eq!(matches!(verdict, Verdict::ShortRead { .. }), short);
                    prop_assert_eq!(verdict.payload(), Some(payload.as_slice()));
                }
            }
        }
    }
}

//! Raw transfer outcomes and classified verdicts

use crate::types::UsbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Calls issued against the device while executing one probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTelemetry {
    /// Host-to-device transfers issued
    pub send_calls: u32,
    /// Device-to-host transfers issued
    pub receive_calls: u32,
}

/// Raw result of executing one probe once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Transport error of the failing phase, if any
    pub error: Option<UsbError>,
    /// Bytes accepted by the device in the send phase
    pub bytes_sent: usize,
    /// Bytes moved by the final phase (received, or sent for send-only probes)
    pub bytes_transferred: usize,
    /// Captured bytes, never more than the capture cap
    pub payload: Vec<u8>,
    /// Wall-clock time spent in the transfer calls
    pub elapsed: Duration,
    /// Call counts
    pub telemetry: TransferTelemetry,
}

impl TransferOutcome {
    /// Outcome of a probe that failed before any device I/O
    pub fn failed(error: UsbError) -> Self {
        Self {
            error: Some(error),
            bytes_sent: 0,
            bytes_transferred: 0,
            payload: Vec::new(),
            elapsed: Duration::ZERO,
            telemetry: TransferTelemetry::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Classification of one outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Device answered with at least the expected number of bytes
    Success {
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
        length: usize,
    },
    /// No answer within the timeout (or an empty answer treated as none)
    Timeout,
    /// Device rejected the request
    Stalled,
    /// Device answered with fewer bytes than expected
    ShortRead {
        length: usize,
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },
    /// Any other transport failure
    TransportError { error: UsbError },
}

/// Verdict variant without its data, for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Success,
    Timeout,
    Stalled,
    ShortRead,
    TransportError,
}

impl VerdictKind {
    pub const ALL: [VerdictKind; 5] = [
        VerdictKind::Success,
        VerdictKind::ShortRead,
        VerdictKind::Stalled,
        VerdictKind::Timeout,
        VerdictKind::TransportError,
    ];
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerdictKind::Success => "success",
            VerdictKind::Timeout => "timeout",
            VerdictKind::Stalled => "stalled",
            VerdictKind::ShortRead => "short read",
            VerdictKind::TransportError => "transport error",
        };
        f.write_str(name)
    }
}

impl Verdict {
    pub fn kind(&self) -> VerdictKind {
        match self {
            Verdict::Success { .. } => VerdictKind::Success,
            Verdict::Timeout => VerdictKind::Timeout,
            Verdict::Stalled => VerdictKind::Stalled,
            Verdict::ShortRead { .. } => VerdictKind::ShortRead,
            Verdict::TransportError { .. } => VerdictKind::TransportError,
        }
    }

    /// Timeouts and transport errors may be transient and are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Verdict::Timeout | Verdict::TransportError { .. })
    }

    /// Whether this verdict suggests the device understood the request
    pub fn is_evidence(&self) -> bool {
        match self {
            Verdict::Success { .. } => true,
            Verdict::ShortRead { length, .. } => *length > 0,
            _ => false,
        }
    }

    /// Bytes captured with this verdict, if any
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Verdict::Success { payload, .. } | Verdict::ShortRead { payload, .. } => {
                Some(payload)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success { length, .. } => write!(f, "SUCCESS ({} bytes)", length),
            Verdict::Timeout => write!(f, "TIMEOUT"),
            Verdict::Stalled => write!(f, "STALLED"),
            Verdict::ShortRead { length, .. } => write!(f, "SHORT READ ({} bytes)", length),
            Verdict::TransportError { error } => write!(f, "ERROR {}", error),
        }
    }
}

//! Probe error types

use crate::types::{EndpointHint, TransferKind};
use thiserror::Error;

/// Errors that stop a probe run
///
/// Per-probe transport failures are not errors: they are recorded as
/// verdicts. Only resource acquisition and contract misuse end up here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// Device could not be opened or its interface claimed
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Caller broke a usage contract (closed handle, restarted session)
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Registry has no endpoint matching the request
    #[error("No {kind} endpoint matches {hint}")]
    EndpointNotFound {
        kind: TransferKind,
        hint: EndpointHint,
    },

    /// Catalog entry cannot be turned into a probe
    #[error("Invalid catalog entry '{label}': {reason}")]
    InvalidCatalog { label: String, reason: String },
}

/// Type alias for probe results
pub type Result<T> = std::result::Result<T, ProbeError>;

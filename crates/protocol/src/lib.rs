//! Data model for USB protocol discovery
//!
//! This crate defines the types that flow through a probe run: endpoint
//! descriptors, probe specifications, raw transfer outcomes, verdicts and the
//! session report. It also defines the two seams the discovery core depends
//! on, [`DeviceIo`] for device transfers and [`Pacer`] for waits.
//!
//! # Example
//!
//! ```
//! use protocol::{ControlSetup, ProbeSpec, TransferKind};
//!
//! let status = ProbeSpec::control("Vendor 0x06", ControlSetup::vendor_in(0x06, 0, 0))
//!     .with_expected_length(64);
//! assert_eq!(status.kind(), TransferKind::Control);
//!
//! let init = ProbeSpec::bulk("Init")
//!     .with_payload([0xea, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0xea])
//!     .with_out_endpoint(0x01)
//!     .with_in_endpoint(0x82);
//! assert_eq!(init.payload.len(), 8);
//! ```

pub mod error;
pub mod io;
pub mod outcome;
pub mod probe;
pub mod report;
pub mod types;
pub mod version;

pub use error::{ProbeError, Result};
pub use io::{DeviceIo, Pacer, ThreadPacer};
pub use outcome::{TransferOutcome, TransferTelemetry, Verdict, VerdictKind};
pub use probe::{ProbeChannel, ProbeSpec};
pub use report::{AbortMarker, ProbeRecord, SessionReport, SessionState, SessionSummary};
pub use types::{
    ControlSetup, DeviceInfo, DeviceSpeed, Direction, EndpointDescriptor, EndpointHint,
    TransferKind, UsbError,
};
pub use version::{CURRENT_VERSION, ReportVersion};

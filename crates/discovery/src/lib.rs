//! USB protocol discovery core
//!
//! Runs an ordered catalog of candidate probes against a device and turns the
//! raw results into a report:
//!
//! ```text
//! Catalog ──► ProbeSession ──► execute_probe ──► Classifier ──► SessionReport
//!                                   │
//!                     EndpointRegistry + DeviceIo
//! ```
//!
//! Everything here is synchronous and single-threaded. The device is reached
//! only through [`protocol::DeviceIo`], so the whole pipeline runs against
//! `common::test_utils::ScriptedDevice` in tests.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{Reply, ScriptedDevice, create_mock_endpoints};
//! use discovery::{Catalog, EndpointRegistry, ProbeSession, SessionPolicy, summarize};
//! use protocol::{ControlSetup, ProbeSpec, SessionState};
//! use std::time::Duration;
//!
//! let catalog = Catalog::new("example")
//!     .with(ProbeSpec::control("Vendor 0x06", ControlSetup::vendor_in(0x06, 0, 0))
//!         .with_expected_length(4))
//!     .with(ProbeSpec::bulk("Spontaneous read").with_in_endpoint(0x82));
//! let registry = EndpointRegistry::new(64, create_mock_endpoints());
//! let mut device = ScriptedDevice::new()
//!     .then(Reply::Bytes(vec![0x01, 0x02, 0x03, 0x04]));
//!
//! let policy = SessionPolicy {
//!     inter_probe_delay: Duration::ZERO,
//!     retry_backoff: Duration::ZERO,
//!     ..SessionPolicy::default()
//! };
//! let mut session = ProbeSession::new(policy);
//! let report = session.start(&catalog, &registry, &mut device).unwrap();
//!
//! assert_eq!(report.state, SessionState::Completed);
//! let summary = summarize(report);
//! assert_eq!(summary.total, 2);
//! assert_eq!(summary.succeeded, 1);
//! ```

pub mod catalog;
pub mod classifier;
pub mod executor;
pub mod registry;
pub mod session;
pub mod summary;

pub use catalog::Catalog;
pub use classifier::{Classifier, classify};
pub use executor::{
    BULK_CAPTURE_CAP, CONTROL_CAPTURE_CAP, INTERRUPT_CAPTURE_CAP, execute_probe,
};
pub use registry::EndpointRegistry;
pub use session::{ProbeSession, SessionPolicy};
pub use summary::summarize;

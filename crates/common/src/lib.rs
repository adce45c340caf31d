//! Common utilities for usb-probe
//!
//! Shared plumbing between the discovery core and the harness binary:
//! logging setup, error handling, report timestamps, and the scripted device
//! used by tests across crates.

pub mod error;
pub mod logging;
pub mod test_utils;
pub mod time;

pub use error::{Error, Result};
pub use logging::setup_logging;
pub use time::now_iso8601;

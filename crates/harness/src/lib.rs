//! usb-probe harness
//!
//! Drives the discovery core against a real device through rusb: loads the
//! configuration, opens and claims the device, seeds the endpoint registry
//! from its descriptors, selects a catalog and renders the session report.

pub mod catalogs;
pub mod config;
pub mod render;
pub mod usb;

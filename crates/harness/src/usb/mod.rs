//! USB subsystem
//!
//! Opens and claims the target device, enumerates its endpoints, and executes
//! transfers through rusb. Everything runs synchronously on the caller's
//! thread.

pub mod descriptors;
pub mod device;
pub mod transfers;

pub use descriptors::{describe, interface_endpoints};
pub use device::UsbDevice;
pub use transfers::map_rusb_error;

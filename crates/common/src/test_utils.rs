//! Test utilities for usb-probe
//!
//! Provides a scripted [`DeviceIo`] implementation and helper constructors so
//! the discovery core can be exercised without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{Reply, ScriptedDevice};
//! use protocol::{DeviceIo, UsbError};
//! use std::time::Duration;
//!
//! let mut device = ScriptedDevice::new()
//!     .then(Reply::Accept)
//!     .then(Reply::Bytes(vec![0x01, 0x02]));
//!
//! device.write_bulk(0x01, &[0xea], Duration::from_millis(10)).unwrap();
//! let mut buf = [0u8; 64];
//! assert_eq!(device.read_bulk(0x82, &mut buf, Duration::from_millis(10)), Ok(2));
//! // Script exhausted: the default reply is a timeout
//! assert_eq!(
//!     device.read_bulk(0x82, &mut buf, Duration::from_millis(10)),
//!     Err(UsbError::Timeout)
//! );
//! ```

use protocol::{
    ControlSetup, DeviceInfo, DeviceIo, DeviceSpeed, EndpointDescriptor, Pacer, TransferKind,
    UsbError,
};
use std::collections::VecDeque;
use std::time::Duration;

/// Default test timeout for transfers
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// Scripted answer to one device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Reads: copy these bytes into the caller's buffer (truncated to fit).
    /// Writes: accept the whole buffer.
    Bytes(Vec<u8>),
    /// Reads: return zero bytes. Writes: accept the whole buffer.
    Accept,
    /// Writes: accept only this many bytes. Reads: treated as zero bytes.
    Partial(usize),
    /// Fail with a transport error
    Error(UsbError),
}

/// One call observed by the scripted device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ReadControl { setup: ControlSetup, length: usize },
    WriteControl { setup: ControlSetup, data: Vec<u8> },
    ReadBulk { endpoint: u8, length: usize },
    WriteBulk { endpoint: u8, data: Vec<u8> },
    ReadInterrupt { endpoint: u8, length: usize },
    WriteInterrupt { endpoint: u8, data: Vec<u8> },
}

impl Call {
    pub fn is_send(&self) -> bool {
        matches!(
            self,
            Call::WriteControl { .. } | Call::WriteBulk { .. } | Call::WriteInterrupt { .. }
        )
    }

    pub fn is_receive(&self) -> bool {
        !self.is_send()
    }
}

/// Device that answers calls from a script, in order
///
/// Calls are answered from the script queue first; once it is empty every
/// call gets the fallback reply (a timeout unless changed). The device can be
/// told to disconnect after a number of calls, after which it reports itself
/// closed and every call fails with `NoDevice`.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    script: VecDeque<Reply>,
    fallback: Reply,
    calls: Vec<Call>,
    timeouts: Vec<Duration>,
    open: bool,
    disconnect_after: Option<usize>,
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDevice {
    /// Open device with an empty script
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: Reply::Error(UsbError::Timeout),
            calls: Vec::new(),
            timeouts: Vec::new(),
            open: true,
            disconnect_after: None,
        }
    }

    /// Device whose handle is already closed
    pub fn closed() -> Self {
        Self {
            open: false,
            ..Self::new()
        }
    }

    /// Queue a reply
    pub fn then(mut self, reply: Reply) -> Self {
        self.script.push_back(reply);
        self
    }

    /// Queue the same reply `times` times
    pub fn then_repeat(mut self, reply: Reply, times: usize) -> Self {
        self.script.extend(std::iter::repeat_n(reply, times));
        self
    }

    /// Reply used once the script is exhausted
    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Unplug the device once `calls` calls have been answered
    pub fn disconnect_after(mut self, calls: usize) -> Self {
        self.disconnect_after = Some(calls);
        self
    }

    /// Close the handle now
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Every call issued so far
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Timeouts passed to each call, in order
    pub fn timeouts(&self) -> &[Duration] {
        &self.timeouts
    }

    pub fn send_calls(&self) -> usize {
        self.calls.iter().filter(|c| c.is_send()).count()
    }

    pub fn receive_calls(&self) -> usize {
        self.calls.iter().filter(|c| c.is_receive()).count()
    }

    /// Replies still queued
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn answer(&mut self, call: Call, timeout: Duration) -> Reply {
        self.calls.push(call);
        self.timeouts.push(timeout);

        if !self.open {
            return Reply::Error(UsbError::NoDevice);
        }

        let reply = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if self.disconnect_after.is_some_and(|limit| self.calls.len() >= limit) {
            self.open = false;
        }

        reply
    }

    fn read(&mut self, call: Call, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
        match self.answer(call, timeout) {
            Reply::Bytes(bytes) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Reply::Accept | Reply::Partial(_) => Ok(0),
            Reply::Error(e) => Err(e),
        }
    }

    fn write(&mut self, call: Call, len: usize, timeout: Duration) -> Result<usize, UsbError> {
        match self.answer(call, timeout) {
            Reply::Bytes(_) | Reply::Accept => Ok(len),
            Reply::Partial(n) => Ok(n.min(len)),
            Reply::Error(e) => Err(e),
        }
    }
}

impl DeviceIo for ScriptedDevice {
    fn is_open(&self) -> bool {
        self.open
    }

    fn read_control(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::ReadControl {
            setup: *setup,
            length: buf.len(),
        };
        self.read(call, buf, timeout)
    }

    fn write_control(
        &mut self,
        setup: &ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::WriteControl {
            setup: *setup,
            data: data.to_vec(),
        };
        self.write(call, data.len(), timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::ReadBulk {
            endpoint,
            length: buf.len(),
        };
        self.read(call, buf, timeout)
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::WriteBulk {
            endpoint,
            data: data.to_vec(),
        };
        self.write(call, data.len(), timeout)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::ReadInterrupt {
            endpoint,
            length: buf.len(),
        };
        self.read(call, buf, timeout)
    }

    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        let call = Call::WriteInterrupt {
            endpoint,
            data: data.to_vec(),
        };
        self.write(call, data.len(), timeout)
    }
}

/// Pacer that records requested waits instead of sleeping
#[derive(Debug, Default, Clone)]
pub struct RecordingPacer {
    pub pauses: Vec<Duration>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all requested waits
    pub fn total(&self) -> Duration {
        self.pauses.iter().sum()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

/// Endpoint layout of the fingerprint reader the harness was first written
/// against: bulk OUT 0x01, bulk IN 0x82, interrupt IN 0x83 and 0x84
pub fn create_mock_endpoints() -> Vec<EndpointDescriptor> {
    vec![
        EndpointDescriptor {
            address: 0x01,
            kind: TransferKind::Bulk,
            max_packet_size: 64,
            interval: 0,
        },
        EndpointDescriptor {
            address: 0x82,
            kind: TransferKind::Bulk,
            max_packet_size: 64,
            interval: 0,
        },
        EndpointDescriptor {
            address: 0x83,
            kind: TransferKind::Interrupt,
            max_packet_size: 16,
            interval: 4,
        },
        EndpointDescriptor {
            address: 0x84,
            kind: TransferKind::Interrupt,
            max_packet_size: 16,
            interval: 4,
        },
    ]
}

/// Create a mock DeviceInfo for testing
pub fn create_mock_device_info(vendor_id: u16, product_id: u16) -> DeviceInfo {
    DeviceInfo {
        vendor_id,
        product_id,
        bus_number: 1,
        device_address: 4,
        manufacturer: Some("Test Manufacturer".to_string()),
        product: Some("Test Product".to_string()),
        serial_number: Some("SN000001".to_string()),
        class: 0xff,
        subclass: 0x00,
        protocol: 0x00,
        max_packet_size0: 64,
        speed: DeviceSpeed::Full,
    }
}

/// Deterministic payload of `size` bytes (0x00, 0x01, ... wrapping)
pub fn create_mock_bulk_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_order_and_fallback() {
        let mut device = ScriptedDevice::new()
            .then(Reply::Bytes(vec![1, 2, 3]))
            .otherwise(Reply::Error(UsbError::Pipe));

        let mut buf = [0u8; 2];
        assert_eq!(device.read_bulk(0x82, &mut buf, DEFAULT_TEST_TIMEOUT), Ok(2));
        assert_eq!(buf, [1, 2]);
        assert_eq!(
            device.read_bulk(0x82, &mut buf, DEFAULT_TEST_TIMEOUT),
            Err(UsbError::Pipe)
        );
        assert_eq!(device.receive_calls(), 2);
        assert_eq!(device.send_calls(), 0);
    }

    #[test]
    fn test_partial_write() {
        let mut device = ScriptedDevice::new().then(Reply::Partial(3));
        assert_eq!(
            device.write_bulk(0x01, &[0; 8], DEFAULT_TEST_TIMEOUT),
            Ok(3)
        );
        assert_eq!(
            device.calls()[0],
            Call::WriteBulk {
                endpoint: 0x01,
                data: vec![0; 8]
            }
        );
    }

    #[test]
    fn test_disconnect_after() {
        let mut device = ScriptedDevice::new()
            .otherwise(Reply::Accept)
            .disconnect_after(2);
        let setup = ControlSetup::vendor_out(0x01, 0, 0);

        assert!(device.write_control(&setup, &[1], DEFAULT_TEST_TIMEOUT).is_ok());
        assert!(device.is_open());
        assert!(device.write_control(&setup, &[1], DEFAULT_TEST_TIMEOUT).is_ok());
        assert!(!device.is_open());
        assert_eq!(
            device.write_control(&setup, &[1], DEFAULT_TEST_TIMEOUT),
            Err(UsbError::NoDevice)
        );
    }

    #[test]
    fn test_closed_device_rejects_calls() {
        let mut device = ScriptedDevice::closed().then(Reply::Accept);
        assert!(!device.is_open());
        let mut buf = [0u8; 4];
        assert_eq!(
            device.read_interrupt(0x83, &mut buf, DEFAULT_TEST_TIMEOUT),
            Err(UsbError::NoDevice)
        );
        assert_eq!(device.remaining(), 1);
    }

    #[test]
    fn test_recording_pacer() {
        let mut pacer = RecordingPacer::new();
        pacer.pause(Duration::from_millis(100));
        pacer.pause(Duration::from_millis(50));
        assert_eq!(pacer.pauses.len(), 2);
        assert_eq!(pacer.total(), Duration::from_millis(150));
    }

    #[test]
    fn test_mock_endpoints() {
        let endpoints = create_mock_endpoints();
        assert_eq!(endpoints.len(), 4);
        assert!(endpoints.iter().any(|e| e.address == 0x82));
        assert_eq!(create_mock_bulk_data(300)[257], 1);
    }
}

//! Collaborator seams
//!
//! The discovery core never talks to libusb directly. It drives a [`DeviceIo`]
//! (implemented over rusb by the harness and by a scripted fake in tests) and
//! waits through a [`Pacer`].

use crate::types::{ControlSetup, UsbError};
use std::time::Duration;

/// Synchronous transfer capability of an opened, claimed device
///
/// Every call is bounded by `timeout` and returns the number of bytes moved.
/// Implementations report transport failures as [`UsbError`]; they never panic
/// on device errors.
pub trait DeviceIo {
    /// Whether the handle is still usable for transfers
    fn is_open(&self) -> bool;

    /// Control transfer, device to host
    fn read_control(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    /// Control transfer, host to device
    fn write_control(
        &mut self,
        setup: &ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
}

impl<T: DeviceIo + ?Sized> DeviceIo for &mut T {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read_control(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        (**self).read_control(setup, buf, timeout)
    }

    fn write_control(
        &mut self,
        setup: &ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        (**self).write_control(setup, data, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        (**self).read_bulk(endpoint, buf, timeout)
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        (**self).write_bulk(endpoint, data, timeout)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        (**self).read_interrupt(endpoint, buf, timeout)
    }

    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        (**self).write_interrupt(endpoint, data, timeout)
    }
}

/// Blocking wait used for inter-probe delays and retry backoff
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Pacer that blocks the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

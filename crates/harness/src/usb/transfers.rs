//! USB transfer execution
//!
//! Implements [`DeviceIo`] for [`UsbDevice`] on top of rusb's synchronous
//! transfer calls, mapping rusb errors to protocol errors.

use super::device::UsbDevice;
use protocol::{ControlSetup, DeviceIo, UsbError};
use rusb::{Context, DeviceHandle};
use std::time::Duration;

impl UsbDevice {
    fn claimed_handle(&self) -> Result<&DeviceHandle<Context>, UsbError> {
        self.handle().ok_or(UsbError::NoDevice)
    }
}

impl DeviceIo for UsbDevice {
    fn is_open(&self) -> bool {
        self.handle().is_some()
    }

    fn read_control(
        &mut self,
        setup: &ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.claimed_handle()?
            .read_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                buf,
                timeout,
            )
            .map_err(map_rusb_error)
    }

    fn write_control(
        &mut self,
        setup: &ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.claimed_handle()?
            .write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                data,
                timeout,
            )
            .map_err(map_rusb_error)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.claimed_handle()?
            .read_bulk(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.claimed_handle()?
            .write_bulk(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.claimed_handle()?
            .read_interrupt(endpoint, buf, timeout)
            .map_err(map_rusb_error)
    }

    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        self.claimed_handle()?
            .write_interrupt(endpoint, data, timeout)
            .map_err(map_rusb_error)
    }
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}

//! USB type definitions
//!
//! This module defines the USB-level vocabulary shared by every stage of a
//! probe run: endpoint descriptors, control setup fields, transfer kinds and
//! transport error codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction bit (bit 7) of an endpoint address or bmRequestType
pub const DIRECTION_IN: u8 = 0x80;

/// Request type bits of bmRequestType
pub const REQUEST_TYPE_STANDARD: u8 = 0x00;
pub const REQUEST_TYPE_CLASS: u8 = 0x20;
pub const REQUEST_TYPE_VENDOR: u8 = 0x40;

/// Recipient bits of bmRequestType
pub const RECIPIENT_DEVICE: u8 = 0x00;
pub const RECIPIENT_INTERFACE: u8 = 0x01;
pub const RECIPIENT_ENDPOINT: u8 = 0x02;

/// Standard request codes
pub const REQUEST_GET_STATUS: u8 = 0x00;
pub const REQUEST_GET_DESCRIPTOR: u8 = 0x06;

/// Descriptor type for the device descriptor, placed in the high byte of wValue
pub const DESCRIPTOR_TYPE_DEVICE: u8 = 0x01;

/// Transfer direction relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Decode the direction from an endpoint address or bmRequestType
    pub fn from_bits(bits: u8) -> Self {
        if bits & DIRECTION_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

/// USB transfer kinds the harness can probe
///
/// Isochronous endpoints are enumerated by the descriptor layer but never
/// probed, so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Control,
    Bulk,
    Interrupt,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Control => write!(f, "control"),
            TransferKind::Bulk => write!(f, "bulk"),
            TransferKind::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// Endpoint descriptor as read from the active configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    /// Transfer type of the endpoint
    pub kind: TransferKind,
    /// wMaxPacketSize
    pub max_packet_size: u16,
    /// bInterval (polling interval, meaningful for interrupt endpoints)
    pub interval: u8,
}

impl EndpointDescriptor {
    /// Default control endpoint (endpoint zero)
    pub fn control(max_packet_size: u16) -> Self {
        Self {
            address: 0x00,
            kind: TransferKind::Control,
            max_packet_size,
            interval: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_bits(self.address)
    }

    /// Endpoint number without the direction bit
    pub fn number(&self) -> u8 {
        self.address & 0x0f
    }
}

/// How a probe names the endpoint it wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointHint {
    /// An exact endpoint address
    Address(u8),
    /// The first endpoint of the requested kind in this direction
    Any(Direction),
}

impl EndpointHint {
    pub fn direction(&self) -> Direction {
        match self {
            EndpointHint::Address(address) => Direction::from_bits(*address),
            EndpointHint::Any(direction) => *direction,
        }
    }

    /// Build a hint from an optional address, falling back to any endpoint
    /// in the given direction
    pub fn or_any(address: Option<u8>, direction: Direction) -> Self {
        match address {
            Some(address) => EndpointHint::Address(address),
            None => EndpointHint::Any(direction),
        }
    }
}

impl fmt::Display for EndpointHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointHint::Address(address) => write!(f, "{:#04x}", address),
            EndpointHint::Any(direction) => write!(f, "any {} endpoint", direction),
        }
    }
}

/// Setup fields of a control transfer (wLength comes from the probe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSetup {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
}

impl ControlSetup {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
        }
    }

    /// Vendor request, device recipient, device to host
    pub fn vendor_in(request: u8, value: u16, index: u16) -> Self {
        Self::new(
            DIRECTION_IN | REQUEST_TYPE_VENDOR | RECIPIENT_DEVICE,
            request,
            value,
            index,
        )
    }

    /// Vendor request, device recipient, host to device
    pub fn vendor_out(request: u8, value: u16, index: u16) -> Self {
        Self::new(REQUEST_TYPE_VENDOR | RECIPIENT_DEVICE, request, value, index)
    }

    /// Standard request, device recipient, device to host
    pub fn standard_in(request: u8, value: u16, index: u16) -> Self {
        Self::new(
            DIRECTION_IN | REQUEST_TYPE_STANDARD | RECIPIENT_DEVICE,
            request,
            value,
            index,
        )
    }

    pub fn direction(&self) -> Direction {
        Direction::from_bits(self.request_type)
    }
}

impl fmt::Display for ControlSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bmRequestType={:#04x} bRequest={:#04x} wValue={:#06x} wIndex={:#06x}",
            self.request_type, self.request, self.value, self.index
        )
    }
}

/// USB transport error codes
///
/// Maps to libusb error codes. See rusb::Error for details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UsbError {
    /// Transfer timed out
    Timeout,
    /// Endpoint stalled (request rejected by the device)
    Pipe,
    /// Device was disconnected
    NoDevice,
    /// Device or endpoint not found
    NotFound,
    /// Device is busy
    Busy,
    /// Buffer overflow
    Overflow,
    /// I/O error
    Io,
    /// Invalid parameter
    InvalidParam,
    /// Access denied (permissions)
    Access,
    /// Other error with message
    Other { message: String },
}

impl UsbError {
    /// Numeric libusb error code
    pub fn code(&self) -> i32 {
        match self {
            UsbError::Io => -1,
            UsbError::InvalidParam => -2,
            UsbError::Access => -3,
            UsbError::NoDevice => -4,
            UsbError::NotFound => -5,
            UsbError::Busy => -6,
            UsbError::Timeout => -7,
            UsbError::Overflow => -8,
            UsbError::Pipe => -9,
            UsbError::Other { .. } => -99,
        }
    }

    /// libusb error name
    pub fn name(&self) -> &'static str {
        match self {
            UsbError::Io => "LIBUSB_ERROR_IO",
            UsbError::InvalidParam => "LIBUSB_ERROR_INVALID_PARAM",
            UsbError::Access => "LIBUSB_ERROR_ACCESS",
            UsbError::NoDevice => "LIBUSB_ERROR_NO_DEVICE",
            UsbError::NotFound => "LIBUSB_ERROR_NOT_FOUND",
            UsbError::Busy => "LIBUSB_ERROR_BUSY",
            UsbError::Timeout => "LIBUSB_ERROR_TIMEOUT",
            UsbError::Overflow => "LIBUSB_ERROR_OVERFLOW",
            UsbError::Pipe => "LIBUSB_ERROR_PIPE",
            UsbError::Other { .. } => "LIBUSB_ERROR_OTHER",
        }
    }
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::Other { message } => {
                write!(f, "{} ({}): {}", self.name(), self.code(), message)
            }
            _ => write!(f, "{} ({})", self.name(), self.code()),
        }
    }
}

/// USB device speed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceSpeed {
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low,
    /// Full speed - 12 Mbps (USB 1.1)
    Full,
    /// High speed - 480 Mbps (USB 2.0)
    High,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus,
    /// Speed not reported by the host controller
    Unknown,
}

/// Identity and string descriptors of the probed device
///
/// Informational only: carried into the report header, never consulted by
/// session logic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number on the host
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number string (if available)
    pub serial_number: Option<String>,
    /// USB device class
    pub class: u8,
    /// USB device subclass
    pub subclass: u8,
    /// USB device protocol
    pub protocol: u8,
    /// Endpoint 0 packet size in bytes (bMaxPacketSize0, decoded)
    pub max_packet_size0: u16,
    /// Device speed
    pub speed: DeviceSpeed,
}

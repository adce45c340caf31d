//! USB device abstraction
//!
//! This module provides a wrapper around rusb::Device with a cached device
//! descriptor, the claim/release lifecycle of one interface, and conversion
//! to protocol types.

use protocol::{DeviceInfo, DeviceSpeed, ProbeError};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use tracing::{debug, info, warn};

/// USB device wrapper with cached information
pub struct UsbDevice {
    /// Underlying rusb device
    device: Device<Context>,
    /// Cached device descriptor
    descriptor: DeviceDescriptor,
    /// Device handle (if claimed)
    handle: Option<DeviceHandle<Context>>,
    /// Interface claimed by us
    claimed_interface: Option<u8>,
    /// Whether we detached a kernel driver from the claimed interface
    detached_kernel_driver: bool,
}

impl UsbDevice {
    /// Find the first device matching `vendor_id:product_id`
    ///
    /// Reads and caches the device descriptor. The device is not opened.
    pub fn find(vendor_id: u16, product_id: u16) -> Result<Self, ProbeError> {
        let context = Context::new().map_err(|e| {
            ProbeError::DeviceUnavailable(format!("Failed to initialize libusb: {}", e))
        })?;
        let devices = context.devices().map_err(|e| {
            ProbeError::DeviceUnavailable(format!("Failed to enumerate USB devices: {}", e))
        })?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Skipping device on bus {:03} address {:03}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if descriptor.vendor_id() == vendor_id && descriptor.product_id() == product_id {
                debug!(
                    "Found device {:04x}:{:04x} on bus {:03} address {:03}",
                    vendor_id,
                    product_id,
                    device.bus_number(),
                    device.address()
                );
                return Ok(Self {
                    device,
                    descriptor,
                    handle: None,
                    claimed_interface: None,
                    detached_kernel_driver: false,
                });
            }
        }

        Err(ProbeError::DeviceUnavailable(format!(
            "Device {:04x}:{:04x} not found",
            vendor_id, product_id
        )))
    }

    /// Get the underlying rusb device
    pub fn device(&self) -> &Device<Context> {
        &self.device
    }

    /// Get the cached device descriptor
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn handle(&self) -> Option<&DeviceHandle<Context>> {
        self.handle.as_ref()
    }

    /// Convert to protocol DeviceInfo
    ///
    /// Reads string descriptors (manufacturer, product, serial) if available.
    pub fn device_info(&self) -> DeviceInfo {
        let (manufacturer, product, serial_number) = match &self.handle {
            Some(handle) => self.read_string_descriptors(handle),
            // Try to open device temporarily to read strings
            None => self
                .device
                .open()
                .map(|handle| self.read_string_descriptors(&handle))
                .unwrap_or((None, None, None)),
        };

        let speed = map_device_speed(self.device.speed());
        DeviceInfo {
            vendor_id: self.descriptor.vendor_id(),
            product_id: self.descriptor.product_id(),
            bus_number: self.device.bus_number(),
            device_address: self.device.address(),
            manufacturer,
            product,
            serial_number,
            class: self.descriptor.class_code(),
            subclass: self.descriptor.sub_class_code(),
            protocol: self.descriptor.protocol_code(),
            max_packet_size0: control_packet_size(self.descriptor.max_packet_size(), speed),
            speed,
        }
    }

    /// Open the device and claim one interface
    ///
    /// An active kernel driver is detached first when `detach_kernel_driver`
    /// is set; failing to detach is logged and the claim is still attempted.
    pub fn claim(&mut self, interface: u8, detach_kernel_driver: bool) -> Result<(), ProbeError> {
        if self.handle.is_some() {
            return Ok(()); // Already claimed
        }

        let handle = self.device.open().map_err(|e| {
            warn!("Failed to open device: {}", e);
            ProbeError::DeviceUnavailable(match e {
                rusb::Error::Access => {
                    format!("Permission denied opening device ({}), try sudo", e)
                }
                _ => format!("Failed to open device: {}", e),
            })
        })?;

        if detach_kernel_driver {
            match handle.kernel_driver_active(interface) {
                Ok(true) => {
                    info!("Kernel driver active on interface {}, detaching", interface);
                    match handle.detach_kernel_driver(interface) {
                        Ok(()) => self.detached_kernel_driver = true,
                        Err(e) => warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            interface, e
                        ),
                    }
                }
                Ok(false) => {
                    debug!("No kernel driver active on interface {}", interface);
                }
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        interface, e
                    );
                }
            }
        }

        handle.claim_interface(interface).map_err(|e| {
            warn!("Failed to claim interface {}: {}", interface, e);
            ProbeError::DeviceUnavailable(format!(
                "Failed to claim interface {}: {}",
                interface, e
            ))
        })?;

        info!("Interface {} claimed", interface);
        self.claimed_interface = Some(interface);
        self.handle = Some(handle);
        Ok(())
    }

    /// Release the claimed interface and close the handle
    ///
    /// A kernel driver we detached is reattached so the device returns to
    /// normal kernel control.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Some(interface) = self.claimed_interface.take() {
                if let Err(e) = handle.release_interface(interface) {
                    warn!("Failed to release interface {}: {}", interface, e);
                }

                if self.detached_kernel_driver {
                    if let Err(e) = handle.attach_kernel_driver(interface) {
                        debug!(
                            "Could not reattach kernel driver to interface {}: {}",
                            interface, e
                        );
                    } else {
                        debug!("Reattached kernel driver to interface {}", interface);
                    }
                    self.detached_kernel_driver = false;
                }
            }

            debug!(
                "Closed device {:04x}:{:04x}",
                self.descriptor.vendor_id(),
                self.descriptor.product_id()
            );
        }
    }

    /// Read string descriptors from device
    fn read_string_descriptors(
        &self,
        handle: &DeviceHandle<Context>,
    ) -> (Option<String>, Option<String>, Option<String>) {
        let manufacturer = self
            .descriptor
            .manufacturer_string_index()
            .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

        let product = self
            .descriptor
            .product_string_index()
            .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

        let serial_number = self
            .descriptor
            .serial_number_string_index()
            .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

        (manufacturer, product, serial_number)
    }
}

impl Drop for UsbDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map rusb device speed to protocol DeviceSpeed
pub fn map_device_speed(speed: rusb::Speed) -> DeviceSpeed {
    match speed {
        rusb::Speed::Low => DeviceSpeed::Low,
        rusb::Speed::Full => DeviceSpeed::Full,
        rusb::Speed::High => DeviceSpeed::High,
        rusb::Speed::Super => DeviceSpeed::Super,
        rusb::Speed::SuperPlus => DeviceSpeed::SuperPlus,
        _ => DeviceSpeed::Unknown,
    }
}

/// Endpoint 0 packet size in bytes
///
/// SuperSpeed devices encode bMaxPacketSize0 as an exponent (9 means 512).
pub fn control_packet_size(raw: u8, speed: DeviceSpeed) -> u16 {
    match speed {
        DeviceSpeed::Super | DeviceSpeed::SuperPlus if raw < 16 => 1u16 << raw,
        _ => u16::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_device_speed() {
        assert_eq!(map_device_speed(rusb::Speed::Low), DeviceSpeed::Low);
        assert_eq!(map_device_speed(rusb::Speed::Full), DeviceSpeed::Full);
        assert_eq!(map_device_speed(rusb::Speed::High), DeviceSpeed::High);
        assert_eq!(map_device_speed(rusb::Speed::Super), DeviceSpeed::Super);
        assert_eq!(
            map_device_speed(rusb::Speed::SuperPlus),
            DeviceSpeed::SuperPlus
        );
        assert_eq!(map_device_speed(rusb::Speed::Unknown), DeviceSpeed::Unknown);
    }

    #[test]
    fn test_control_packet_size() {
        assert_eq!(control_packet_size(8, DeviceSpeed::Low), 8);
        assert_eq!(control_packet_size(64, DeviceSpeed::High), 64);
        assert_eq!(control_packet_size(9, DeviceSpeed::Super), 512);
        assert_eq!(control_packet_size(9, DeviceSpeed::SuperPlus), 512);
        assert_eq!(control_packet_size(64, DeviceSpeed::Super), 64);
    }
}

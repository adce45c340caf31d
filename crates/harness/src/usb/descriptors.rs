//! Descriptor enumeration
//!
//! Reads the endpoint layout that seeds the endpoint registry and prints the
//! full descriptor tree for `--describe`.

use super::device::UsbDevice;
use protocol::{EndpointDescriptor, TransferKind};
use rusb::{Context, Device};
use std::io::{self, Write};
use tracing::debug;

/// Endpoints of alternate setting 0 of `interface` in the active configuration
///
/// Isochronous endpoints are skipped; they are never probed.
pub fn interface_endpoints(
    device: &Device<Context>,
    interface: u8,
) -> Result<Vec<EndpointDescriptor>, rusb::Error> {
    let config = device.active_config_descriptor()?;
    let mut endpoints = Vec::new();

    for iface in config.interfaces().filter(|i| i.number() == interface) {
        for setting in iface.descriptors().filter(|d| d.setting_number() == 0) {
            for endpoint in setting.endpoint_descriptors() {
                match map_transfer_type(endpoint.transfer_type()) {
                    Some(kind) => endpoints.push(EndpointDescriptor {
                        address: endpoint.address(),
                        kind,
                        max_packet_size: endpoint.max_packet_size(),
                        interval: endpoint.interval(),
                    }),
                    None => debug!(
                        "Skipping isochronous endpoint {:#04x}",
                        endpoint.address()
                    ),
                }
            }
        }
    }

    Ok(endpoints)
}

/// Map rusb transfer types onto the kinds the harness can probe
pub fn map_transfer_type(transfer_type: rusb::TransferType) -> Option<TransferKind> {
    match transfer_type {
        rusb::TransferType::Control => Some(TransferKind::Control),
        rusb::TransferType::Bulk => Some(TransferKind::Bulk),
        rusb::TransferType::Interrupt => Some(TransferKind::Interrupt),
        rusb::TransferType::Isochronous => None,
    }
}

fn transfer_type_name(transfer_type: rusb::TransferType) -> &'static str {
    match transfer_type {
        rusb::TransferType::Control => "Control",
        rusb::TransferType::Isochronous => "Isochronous",
        rusb::TransferType::Bulk => "Bulk",
        rusb::TransferType::Interrupt => "Interrupt",
    }
}

fn version(v: rusb::Version) -> String {
    format!("{:x}.{:x}{:x}", v.major(), v.minor(), v.sub_minor())
}

/// Print device, configuration and string descriptors
pub fn describe<W: Write>(device: &UsbDevice, out: &mut W) -> io::Result<()> {
    let desc = device.descriptor();

    writeln!(out, "=== Device Descriptor ===")?;
    writeln!(out, "bcdUSB: {}", version(desc.usb_version()))?;
    writeln!(out, "bDeviceClass: {:#04x}", desc.class_code())?;
    writeln!(out, "bDeviceSubClass: {:#04x}", desc.sub_class_code())?;
    writeln!(out, "bDeviceProtocol: {:#04x}", desc.protocol_code())?;
    writeln!(out, "bMaxPacketSize0: {}", desc.max_packet_size())?;
    writeln!(out, "idVendor: {:04x}", desc.vendor_id())?;
    writeln!(out, "idProduct: {:04x}", desc.product_id())?;
    writeln!(out, "bcdDevice: {}", version(desc.device_version()))?;
    writeln!(out, "bNumConfigurations: {}", desc.num_configurations())?;

    match device.device().active_config_descriptor() {
        Ok(config) => {
            writeln!(out, "\n=== Configuration Descriptor ===")?;
            writeln!(out, "bConfigurationValue: {}", config.number())?;
            writeln!(out, "bNumInterfaces: {}", config.num_interfaces())?;
            writeln!(out, "Self powered: {}", config.self_powered())?;
            writeln!(out, "Remote wakeup: {}", config.remote_wakeup())?;
            writeln!(out, "MaxPower: {} mA", config.max_power())?;

            for iface in config.interfaces() {
                writeln!(out, "\n--- Interface {} ---", iface.number())?;
                for setting in iface.descriptors() {
                    writeln!(out, "  bAlternateSetting: {}", setting.setting_number())?;
                    writeln!(
                        out,
                        "  Class: {:#04x} SubClass: {:#04x} Protocol: {:#04x}",
                        setting.class_code(),
                        setting.sub_class_code(),
                        setting.protocol_code()
                    )?;
                    writeln!(out, "  bNumEndpoints: {}", setting.num_endpoints())?;

                    for endpoint in setting.endpoint_descriptors() {
                        let direction = match endpoint.direction() {
                            rusb::Direction::In => "IN",
                            rusb::Direction::Out => "OUT",
                        };
                        writeln!(
                            out,
                            "    Endpoint {:#04x} ({}) {}: wMaxPacketSize {}, bInterval {}",
                            endpoint.address(),
                            direction,
                            transfer_type_name(endpoint.transfer_type()),
                            endpoint.max_packet_size(),
                            endpoint.interval()
                        )?;
                    }
                }
            }
        }
        Err(e) => writeln!(out, "\nFailed to get config descriptor: {}", e)?,
    }

    let info = device.device_info();
    writeln!(out, "\n=== String Descriptors ===")?;
    writeln!(
        out,
        "Manufacturer: {}",
        info.manufacturer.as_deref().unwrap_or("(none)")
    )?;
    writeln!(out, "Product: {}", info.product.as_deref().unwrap_or("(none)"))?;
    writeln!(
        out,
        "Serial: {}",
        info.serial_number.as_deref().unwrap_or("(none)")
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_transfer_type() {
        assert_eq!(
            map_transfer_type(rusb::TransferType::Bulk),
            Some(TransferKind::Bulk)
        );
        assert_eq!(
            map_transfer_type(rusb::TransferType::Interrupt),
            Some(TransferKind::Interrupt)
        );
        assert_eq!(map_transfer_type(rusb::TransferType::Isochronous), None);
    }

    #[test]
    fn test_transfer_type_name() {
        assert_eq!(transfer_type_name(rusb::TransferType::Bulk), "Bulk");
        assert_eq!(
            transfer_type_name(rusb::TransferType::Isochronous),
            "Isochronous"
        );
    }
}

//! The USB stack this library drives.
//!
//! Everything the rest of the crate needs from the operating system's USB stack is expressed by the
//! three traits in this module. The implementation used in practice is the one for [`rusb`]'s
//! `Context`, `Device` and `DeviceHandle`; tests substitute a scripted backend.
//!
//! All operations report failures as [`rusb::Error`], which the crate maps onto its own
//! [`ErrorKind`]s.
//!
//! [`ErrorKind`]: ../enum.ErrorKind.html

use log::{debug, trace};
use std::time::Duration;

/// The fields of a USB device descriptor this library looks at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// String descriptor index of the serial number, if the device has one.
    pub serial_number_index: Option<u8>,
}

/// Addresses of the bulk endpoint pair of an interface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub read: u8,
    pub write: u8,
}

/// Enumerates the devices attached to the host.
pub trait UsbBackend {
    type Device: UsbDevice;

    /// Returns a snapshot of all attached USB devices, in enumeration order.
    fn list_devices(&self) -> rusb::Result<Vec<Self::Device>>;
}

/// A reference to an attached (but not necessarily opened) USB device.
///
/// Dropping the value releases the reference.
pub trait UsbDevice {
    type Handle: UsbHandle;

    fn descriptor(&self) -> rusb::Result<Descriptor>;

    fn bus_number(&self) -> u8;

    /// The address the device was assigned on its bus.
    fn address(&self) -> u8;

    /// Returns whether `self` and `other` refer to the same physical device reference of the USB
    /// stack.
    fn is_same(&self, other: &Self) -> bool;

    fn open(&self) -> rusb::Result<Self::Handle>;
}

/// An opened USB device. Dropping the value closes it.
pub trait UsbHandle {
    fn read_string_ascii(&self, index: u8) -> rusb::Result<String>;

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()>;

    /// Looks up the bulk IN/OUT endpoint pair of `interface`.
    ///
    /// Returns `None` if the interface does not exist or does not have exactly one bulk endpoint in
    /// each direction.
    fn bulk_endpoints(&self, interface: u8) -> rusb::Result<Option<Endpoints>>;

    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize>;

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

impl UsbBackend for rusb::Context {
    type Device = rusb::Device<rusb::Context>;

    fn list_devices(&self) -> rusb::Result<Vec<Self::Device>> {
        Ok(rusb::UsbContext::devices(self)?.iter().collect())
    }
}

impl UsbDevice for rusb::Device<rusb::Context> {
    type Handle = rusb::DeviceHandle<rusb::Context>;

    fn descriptor(&self) -> rusb::Result<Descriptor> {
        let descr = self.device_descriptor()?;
        Ok(Descriptor {
            vendor_id: descr.vendor_id(),
            product_id: descr.product_id(),
            serial_number_index: descr.serial_number_string_index(),
        })
    }

    fn bus_number(&self) -> u8 {
        rusb::Device::bus_number(self)
    }

    fn address(&self) -> u8 {
        rusb::Device::address(self)
    }

    fn is_same(&self, other: &Self) -> bool {
        // libusb hands out the same `libusb_device` for a physical device as long as someone holds
        // a reference to it.
        std::ptr::eq(self.as_raw(), other.as_raw())
    }

    fn open(&self) -> rusb::Result<Self::Handle> {
        rusb::Device::open(self)
    }
}

impl UsbHandle for rusb::DeviceHandle<rusb::Context> {
    fn read_string_ascii(&self, index: u8) -> rusb::Result<String> {
        self.read_string_descriptor_ascii(index)
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        rusb::DeviceHandle::claim_interface(self, interface)
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        rusb::DeviceHandle::release_interface(self, interface)
    }

    fn bulk_endpoints(&self, interface: u8) -> rusb::Result<Option<Endpoints>> {
        let conf = self.device().active_config_descriptor()?;
        trace!("active configuration descriptor: {:#x?}", conf);

        for intf in conf.interfaces() {
            for descr in intf.descriptors() {
                if descr.interface_number() != interface {
                    continue;
                }

                let endpoints: Vec<_> = descr
                    .endpoint_descriptors()
                    .filter(|ep| ep.transfer_type() == rusb::TransferType::Bulk)
                    .collect();
                trace!("bulk endpoints of interface #{}: {:#x?}", interface, endpoints);

                let read = endpoints
                    .iter()
                    .find(|ep| ep.direction() == rusb::Direction::In);
                let write = endpoints
                    .iter()
                    .find(|ep| ep.direction() == rusb::Direction::Out);

                return Ok(match (read, write) {
                    (Some(read), Some(write)) if endpoints.len() == 2 => Some(Endpoints {
                        read: read.address(),
                        write: write.address(),
                    }),
                    _ => {
                        debug!(
                            "interface #{} has {} bulk endpoints, expected one IN and one OUT",
                            interface,
                            endpoints.len()
                        );
                        None
                    }
                });
            }
        }

        Ok(None)
    }

    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize> {
        rusb::DeviceHandle::write_bulk(self, endpoint, data, timeout)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        rusb::DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }
}

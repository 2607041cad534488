use crate::context::DEFAULT_TIMEOUT;
use crate::error::{Cause as _, ResultExt as _};
use crate::transport::Transport;
use crate::usb::{UsbDevice, UsbHandle};
use crate::{Device, Error, ErrorKind, Result};
use log::{debug, warn};
use std::fmt;

/// An open session with a J-Link device.
///
/// Opening a device claims its J-Link USB interface, so only one handle per device can exist at a
/// time (across all applications). The interface is released and the device closed when the handle
/// is dropped.
///
/// A handle performs blocking USB transfers and is not meant to be shared between threads without
/// external synchronization; every method takes `&mut self`. Handles of different devices are
/// independent of each other.
pub struct DeviceHandle<D: UsbDevice = rusb::Device<rusb::Context>> {
    transport: Transport<D::Handle>,
    device: Device<D>,
}

impl<D: UsbDevice> Device<D> {
    /// Opens the device.
    ///
    /// The returned handle holds its own reference to this `Device`.
    pub fn open(&self) -> Result<DeviceHandle<D>> {
        DeviceHandle::open(self.clone())
    }
}

impl<D: UsbDevice> DeviceHandle<D> {
    fn open(device: Device<D>) -> Result<Self> {
        let interface = device.variant().interface_number();
        let timeout = device
            .shared()
            .map_or(DEFAULT_TIMEOUT, |shared| shared.timeout());

        debug!(
            "opening device {} (bus:address = {:03}:{:03})",
            device.serial_number(),
            device.bus_number(),
            device.device_address(),
        );

        let mut usb = device.usb().open().map_err(|e| {
            let kind = e.kind();
            let inner: Box<dyn std::error::Error + Send + Sync> = if cfg!(windows)
                && (e == rusb::Error::NotSupported || e == rusb::Error::NotFound)
            {
                format!(
                    "{} (this error may be caused by not having the \
                        WinUSB driver installed; use Zadig (https://zadig.akeo.ie/) to install it \
                        for the J-Link device; this will replace the SEGGER J-Link driver)",
                    e
                )
                .into()
            } else {
                Box::new(e)
            };

            Error::with_while(kind, inner, "opening USB device")
        })?;

        usb.claim_interface(interface)
            .jaylink_err_while("taking control over USB device")?;

        let endpoints = match usb.bulk_endpoints(interface) {
            Ok(Some(endpoints)) => endpoints,
            res => {
                release(&mut usb, interface);
                return Err(match res {
                    Err(e) => Error::with_while(e.kind(), e, "reading device configuration"),
                    _ => Error::new(
                        ErrorKind::Other,
                        format!(
                            "USB interface {} has no bulk endpoint pair, device is not a J-Link",
                            interface
                        ),
                    ),
                });
            }
        };
        debug!(
            "J-Link interface is #{} (endpoints IN {:#04x}, OUT {:#04x})",
            interface, endpoints.read, endpoints.write
        );

        Ok(Self {
            transport: Transport::new(usb, interface, endpoints, timeout),
            device,
        })
    }

    /// Closes the handle.
    ///
    /// This is the same as dropping it.
    pub fn close(self) {}

    /// Returns the device this handle was opened from.
    pub fn device(&self) -> &Device<D> {
        &self.device
    }

    pub(crate) fn transport(&mut self) -> &mut Transport<D::Handle> {
        &mut self.transport
    }
}

fn release<H: UsbHandle>(usb: &mut H, interface: u8) {
    if let Err(e) = usb.release_interface(interface) {
        warn!("failed to release interface #{}: {}", interface, e);
    }
}

impl<D: UsbDevice> Drop for DeviceHandle<D> {
    fn drop(&mut self) {
        debug!(
            "closing device {} (bus:address = {:03}:{:03})",
            self.device.serial_number(),
            self.device.bus_number(),
            self.device.device_address(),
        );

        let interface = self.transport.interface();
        release(self.transport.usb_mut(), interface);
        // The USB handle is closed when `transport` is dropped, then the device reference goes.
    }
}

impl<D: UsbDevice> fmt::Debug for DeviceHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("device", &self.device)
            .field("interface", &self.transport.interface())
            .finish()
    }
}

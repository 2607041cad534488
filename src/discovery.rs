//! Enumeration of attached J-Link devices.

use crate::context::Shared;
use crate::device::{Records, Variant};
use crate::error::ResultExt as _;
use crate::usb::{Descriptor, UsbBackend, UsbDevice, UsbHandle};
use crate::{Context, Device, DeviceList, Error, ErrorKind, Result};
use log::{debug, trace};
use std::sync::Arc;

/// USB Vendor ID (VID) of SEGGER products.
pub const VID_SEGGER: u16 = 0x1366;

/// USB Product ID (PID) of J-Link devices with USB address 0.
const PID_BASE: u16 = 0x0101;

/// USB Product ID (PID) of J-Link OB devices.
const PID_ONBOARD: u16 = 0x0105;

/// Maximum length of the serial number string descriptor.
const SERIAL_NUMBER_LENGTH: usize = 12;

/// Maximum number of digits in a serial number.
///
/// J-Link serial numbers have at most 9 digits, but user-defined serial numbers may use 10.
const MAX_SERIAL_NUMBER_DIGITS: usize = 10;

impl<B: UsbBackend> Context<B> {
    /// Scans the USB bus for J-Link devices.
    ///
    /// Devices that are already known to this context are returned as new references to their
    /// existing [`Device`] record; only devices seen for the first time are opened (briefly) to read
    /// their serial number.
    ///
    /// Failing to enumerate the USB bus is an error. A device that can't be probed (eg. because
    /// opening it fails or its serial number is malformed) is left out of the list instead.
    ///
    /// [`Device`]: struct.Device.html
    pub fn device_list(&self) -> Result<DeviceList<B::Device>> {
        let usb_devices = self
            .usb()
            .list_devices()
            .jaylink_err_while("enumerating USB devices")?;
        trace!("{} USB devices attached", usb_devices.len());

        let shared = self.shared();
        let mut records = shared.registry.lock();
        let mut devices = Vec::new();
        for usb in usb_devices {
            let (bus, address) = (usb.bus_number(), usb.address());
            match probe_device(shared, &mut records, usb) {
                Ok(Some(dev)) => devices.push(dev),
                Ok(None) => {}
                Err(e) => debug!(
                    "skipping device (bus:address = {:03}:{:03}): {}",
                    bus, address, e
                ),
            }
        }
        drop(records);

        debug!("found {} J-Link device(s)", devices.len());
        Ok(DeviceList::new(devices))
    }
}

/// Classifies a SEGGER product ID.
///
/// Returns the hardware variant and the J-Link USB address, or `None` if the product ID does not
/// belong to a J-Link.
fn classify(product_id: u16) -> Option<(Variant, u8)> {
    match product_id {
        PID_ONBOARD => Some((Variant::Onboard, 0)),
        PID_BASE..=PID_ONBOARD => Some((Variant::Standalone, (product_id - PID_BASE) as u8)),
        _ => None,
    }
}

fn probe_device<D: UsbDevice>(
    shared: &Arc<Shared<D>>,
    records: &mut Records<'_, D>,
    usb: D,
) -> Result<Option<Device<D>>> {
    let descr = usb
        .descriptor()
        .jaylink_err_while("reading device descriptor")?;

    if descr.vendor_id != VID_SEGGER {
        return Ok(None);
    }

    let (variant, usb_address) = match classify(descr.product_id) {
        Some(class) => class,
        None => {
            trace!("ignoring SEGGER device with PID {:04X}", descr.product_id);
            return Ok(None);
        }
    };

    if let Some(dev) = records.find(&usb) {
        trace!("device {} is already known", dev.serial_number());
        return Ok(Some(dev));
    }

    let serial = read_serial_number(&usb, &descr)?;
    let serial_number = parse_serial_number(&serial).ok_or_else(|| {
        Error::new(
            ErrorKind::Protocol,
            format!("malformed serial number {:?}", serial),
        )
    })?;

    debug!(
        "found J-Link {} ({:?}, USB address {}, bus:address = {:03}:{:03})",
        serial_number,
        variant,
        usb_address,
        usb.bus_number(),
        usb.address(),
    );

    let dev = Device::new(shared, usb, variant, usb_address, serial_number);
    records.insert(&dev);
    Ok(Some(dev))
}

fn read_serial_number<D: UsbDevice>(usb: &D, descr: &Descriptor) -> Result<String> {
    let index = descr
        .serial_number_index
        .ok_or_else(|| Error::new(ErrorKind::Other, "device has no serial number"))?;

    let handle = usb.open().jaylink_err_while("opening USB device")?;
    let serial = handle
        .read_string_ascii(index)
        .jaylink_err_while("reading serial number")?;
    drop(handle);

    Ok(serial.chars().take(SERIAL_NUMBER_LENGTH).collect())
}

/// Parses the serial number string of a J-Link.
///
/// Only the last 10 characters are used, since some devices pad the serial number with random
/// digits instead of zeros.
fn parse_serial_number(serial: &str) -> Option<u32> {
    let bytes = serial.as_bytes();
    let digits = &bytes[bytes.len().saturating_sub(MAX_SERIAL_NUMBER_DIGITS)..];

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
}

use crate::context::Shared;
use crate::usb::UsbDevice;
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};
use std::{fmt, ops::Deref, vec};

/// USB interface number of standalone J-Link devices.
const INTERFACE_NUMBER: u8 = 0;

/// USB interface number of J-Link OB (on-board) devices.
const INTERFACE_NUMBER_OB: u8 = 2;

/// Kind of J-Link hardware, as determined from the USB product ID.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Variant {
    /// A standalone probe in its own enclosure.
    Standalone,

    /// A J-Link OB, integrated on an evaluation board.
    Onboard,
}

impl Variant {
    /// The USB interface carrying the J-Link protocol on this kind of hardware.
    pub(crate) fn interface_number(self) -> u8 {
        match self {
            Variant::Standalone => INTERFACE_NUMBER,
            Variant::Onboard => INTERFACE_NUMBER_OB,
        }
    }
}

struct Record<D: UsbDevice> {
    usb: D,
    variant: Variant,
    usb_address: u8,
    serial_number: u32,
    context: Weak<Shared<D>>,
}

impl<D: UsbDevice> Drop for Record<D> {
    fn drop(&mut self) {
        debug!(
            "releasing device {} (bus:address = {:03}:{:03})",
            self.serial_number,
            self.usb.bus_number(),
            self.usb.address(),
        );

        // The registry may be locked by this thread (a scan dropping the last temporary reference),
        // in which case the dead entry is swept by the next insertion instead.
        if let Some(shared) = self.context.upgrade() {
            if let Some(mut records) = shared.registry.try_lock() {
                records.prune();
            }
        }
    }
}

/// Set of device records that are alive, keyed by the USB stack's device reference.
///
/// The registry only holds weak references: a record lives exactly as long as some [`Device`]
/// refers to it.
pub(crate) struct Registry<D: UsbDevice> {
    records: Mutex<Vec<Weak<Record<D>>>>,
}

impl<D: UsbDevice> Registry<D> {
    pub(crate) fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn lock(&self) -> Records<'_, D> {
        Records(self.records.lock())
    }

    fn try_lock(&self) -> Option<Records<'_, D>> {
        self.records.try_lock().map(Records)
    }

    pub(crate) fn len(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, device: &Device<D>) -> bool {
        let weak = Arc::downgrade(&device.record);
        self.records.lock().iter().any(|record| record.ptr_eq(&weak))
    }
}

pub(crate) struct Records<'a, D: UsbDevice>(MutexGuard<'a, Vec<Weak<Record<D>>>>);

impl<D: UsbDevice> Records<'_, D> {
    /// Looks up the record for `usb` and returns a new reference to it.
    pub(crate) fn find(&self, usb: &D) -> Option<Device<D>> {
        self.0
            .iter()
            .filter_map(Weak::upgrade)
            .find(|record| record.usb.is_same(usb))
            .map(|record| Device { record })
    }

    pub(crate) fn insert(&mut self, device: &Device<D>) {
        self.prune();
        self.0.push(Arc::downgrade(&device.record));
    }

    /// Removes entries of records that have been released.
    fn prune(&mut self) {
        self.0.retain(|record| record.strong_count() > 0);
    }
}

/// A J-Link device attached to the host.
///
/// `Device` is a reference-counted handle to the record of one physical probe. Cloning it takes
/// another reference, dropping it releases one. The record, and the USB stack's reference to the
/// device, are released when the last `Device` (including those held by open [`DeviceHandle`]s)
/// is dropped.
///
/// Two `Device`s compare equal if they refer to the same record.
///
/// [`DeviceHandle`]: struct.DeviceHandle.html
pub struct Device<D: UsbDevice = rusb::Device<rusb::Context>> {
    record: Arc<Record<D>>,
}

impl<D: UsbDevice> Device<D> {
    pub(crate) fn new(
        shared: &Arc<Shared<D>>,
        usb: D,
        variant: Variant,
        usb_address: u8,
        serial_number: u32,
    ) -> Self {
        Self {
            record: Arc::new(Record {
                usb,
                variant,
                usb_address,
                serial_number,
                context: Arc::downgrade(shared),
            }),
        }
    }

    /// Returns the serial number of the device.
    ///
    /// This number is meant for telling devices apart during enumeration, and may differ from the
    /// serial number printed on the probe for devices that pad it with garbage digits.
    pub fn serial_number(&self) -> u32 {
        self.record.serial_number
    }

    /// Returns the J-Link USB address of the device.
    ///
    /// This is the address configured on the probe (0-3) and is derived from its USB product ID.
    /// On-board probes always use address 0. It is unrelated to the address assigned by the host's
    /// USB stack (see [`device_address`]).
    ///
    /// [`device_address`]: #method.device_address
    pub fn usb_address(&self) -> u8 {
        self.record.usb_address
    }

    /// Returns whether the device is a standalone probe or an on-board J-Link OB.
    pub fn variant(&self) -> Variant {
        self.record.variant
    }

    /// Returns the number of the USB bus the device is attached to.
    pub fn bus_number(&self) -> u8 {
        self.record.usb.bus_number()
    }

    /// Returns the address the host's USB stack assigned to the device on its bus.
    pub fn device_address(&self) -> u8 {
        self.record.usb.address()
    }

    pub(crate) fn usb(&self) -> &D {
        &self.record.usb
    }

    pub(crate) fn shared(&self) -> Option<Arc<Shared<D>>> {
        self.record.context.upgrade()
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> usize {
        Arc::strong_count(&self.record)
    }
}

impl<D: UsbDevice> Clone for Device<D> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
        }
    }
}

impl<D: UsbDevice> PartialEq for Device<D> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl<D: UsbDevice> Eq for Device<D> {}

impl<D: UsbDevice> fmt::Debug for Device<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("serial_number", &self.record.serial_number)
            .field("usb_address", &self.record.usb_address)
            .field("variant", &self.record.variant)
            .finish()
    }
}

/// Snapshot of the J-Link devices found by [`Context::device_list`].
///
/// The list owns one reference to each of its devices. Dropping the list releases them; use
/// [`into_vec`] or iterate by value to keep the devices around instead.
///
/// [`Context::device_list`]: struct.Context.html#method.device_list
/// [`into_vec`]: #method.into_vec
pub struct DeviceList<D: UsbDevice = rusb::Device<rusb::Context>> {
    devices: Vec<Device<D>>,
}

impl<D: UsbDevice> DeviceList<D> {
    pub(crate) fn new(devices: Vec<Device<D>>) -> Self {
        Self { devices }
    }

    /// Frees the list, handing over its device references to the caller.
    pub fn into_vec(self) -> Vec<Device<D>> {
        self.devices
    }
}

impl<D: UsbDevice> Deref for DeviceList<D> {
    type Target = [Device<D>];

    fn deref(&self) -> &Self::Target {
        &self.devices
    }
}

impl<D: UsbDevice> IntoIterator for DeviceList<D> {
    type Item = Device<D>;
    type IntoIter = vec::IntoIter<Device<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}

impl<'a, D: UsbDevice> IntoIterator for &'a DeviceList<D> {
    type Item = &'a Device<D>;
    type IntoIter = std::slice::Iter<'a, Device<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

impl<D: UsbDevice> fmt::Debug for DeviceList<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.devices).finish()
    }
}

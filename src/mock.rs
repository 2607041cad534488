//! Scripted USB backend for unit tests.

use crate::usb::{Descriptor, Endpoints, UsbBackend, UsbDevice, UsbHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const EP_IN: u8 = 0x81;
pub(crate) const EP_OUT: u8 = 0x01;

/// Everything that happened on the wire (and around it) for one mock device.
#[derive(Debug, Default)]
pub(crate) struct UsbLog {
    pub opens: usize,
    pub closes: usize,
    pub claimed: Vec<u8>,
    pub released: Vec<u8>,
    /// Data of every bulk OUT transfer.
    pub writes: Vec<Vec<u8>>,
    /// Requested length of every bulk IN transfer.
    pub reads: Vec<usize>,
    /// Responses handed out by bulk IN transfers, in order.
    pub responses: VecDeque<rusb::Result<Vec<u8>>>,
    pub write_errors: VecDeque<rusb::Error>,
}

#[derive(Debug)]
struct State {
    descriptor: rusb::Result<Descriptor>,
    serial: rusb::Result<String>,
    bus: u8,
    address: u8,
    open_error: Option<rusb::Error>,
    claim_error: Option<rusb::Error>,
    release_error: Option<rusb::Error>,
    log: UsbLog,
}

/// A mock device reference. Clones are the *same* physical device.
#[derive(Debug, Clone)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    pub fn new(vendor_id: u16, product_id: u16, serial: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                descriptor: Ok(Descriptor {
                    vendor_id,
                    product_id,
                    serial_number_index: Some(3),
                }),
                serial: Ok(serial.to_string()),
                bus: 1,
                address: 7,
                open_error: None,
                claim_error: None,
                release_error: None,
                log: UsbLog::default(),
            })),
        }
    }

    /// A standalone J-Link with the given serial number.
    pub fn jlink(serial: &str) -> Self {
        Self::new(0x1366, 0x0101, serial)
    }

    pub fn fail_descriptor(&self, err: rusb::Error) {
        self.state.lock().descriptor = Err(err);
    }

    pub fn fail_open(&self, err: rusb::Error) {
        self.state.lock().open_error = Some(err);
    }

    pub fn fail_claim(&self, err: rusb::Error) {
        self.state.lock().claim_error = Some(err);
    }

    pub fn fail_release(&self, err: rusb::Error) {
        self.state.lock().release_error = Some(err);
    }

    pub fn fail_serial(&self, err: rusb::Error) {
        self.state.lock().serial = Err(err);
    }

    /// Queues the data returned by the next bulk IN transfer.
    pub fn respond(&self, data: &[u8]) {
        self.state.lock().log.responses.push_back(Ok(data.to_vec()));
    }

    pub fn respond_err(&self, err: rusb::Error) {
        self.state.lock().log.responses.push_back(Err(err));
    }

    pub fn fail_next_write(&self, err: rusb::Error) {
        self.state.lock().log.write_errors.push_back(err);
    }

    pub fn with_log<R>(&self, f: impl FnOnce(&UsbLog) -> R) -> R {
        f(&self.state.lock().log)
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.with_log(|log| log.writes.clone())
    }

    pub fn reads(&self) -> Vec<usize> {
        self.with_log(|log| log.reads.clone())
    }

    /// Number of live references to this device, including the one held by the test.
    pub fn references(&self) -> usize {
        Arc::strong_count(&self.state)
    }
}

impl UsbDevice for MockDevice {
    type Handle = MockHandle;

    fn descriptor(&self) -> rusb::Result<Descriptor> {
        self.state.lock().descriptor
    }

    fn bus_number(&self) -> u8 {
        self.state.lock().bus
    }

    fn address(&self) -> u8 {
        self.state.lock().address
    }

    fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn open(&self) -> rusb::Result<MockHandle> {
        let mut state = self.state.lock();
        if let Some(err) = state.open_error {
            return Err(err);
        }
        state.log.opens += 1;
        Ok(MockHandle {
            state: self.state.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockHandle {
    state: Arc<Mutex<State>>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.state.lock().log.closes += 1;
    }
}

impl UsbHandle for MockHandle {
    fn read_string_ascii(&self, _index: u8) -> rusb::Result<String> {
        self.state.lock().serial.clone()
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.claim_error {
            return Err(err);
        }
        state.log.claimed.push(interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state.lock();
        state.log.released.push(interface);
        match state.release_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn bulk_endpoints(&self, _interface: u8) -> rusb::Result<Option<Endpoints>> {
        Ok(Some(Endpoints {
            read: EP_IN,
            write: EP_OUT,
        }))
    }

    fn write_bulk(&self, endpoint: u8, data: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        assert_eq!(endpoint, EP_OUT);
        let mut state = self.state.lock();
        state.log.writes.push(data.to_vec());
        match state.log.write_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(data.len()),
        }
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        assert_eq!(endpoint, EP_IN);
        let mut state = self.state.lock();
        state.log.reads.push(buf.len());
        match state.log.responses.pop_front() {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Err(err)) => Err(err),
            None => Err(rusb::Error::Timeout),
        }
    }
}

/// A mock USB bus with a fixed set of attached devices.
#[derive(Debug, Default)]
pub(crate) struct MockBus {
    devices: Mutex<Vec<MockDevice>>,
    fail: Mutex<Option<rusb::Error>>,
}

impl MockBus {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices: Mutex::new(devices),
            fail: Mutex::new(None),
        }
    }

    pub fn fail_enumeration(&self, err: rusb::Error) {
        *self.fail.lock() = Some(err);
    }

    pub fn unplug_all(&self) {
        self.devices.lock().clear();
    }
}

impl UsbBackend for MockBus {
    type Device = MockDevice;

    fn list_devices(&self) -> rusb::Result<Vec<MockDevice>> {
        if let Some(err) = *self.fail.lock() {
            return Err(err);
        }
        Ok(self.devices.lock().clone())
    }
}

/// Discovers `dev` through a throwaway context and opens it.
pub(crate) fn open(dev: &MockDevice) -> crate::DeviceHandle<MockDevice> {
    let ctx = crate::Context::with_backend(MockBus::new(vec![dev.clone()]));
    let device = ctx.device_list().unwrap().into_vec().remove(0);
    device.open().unwrap()
}

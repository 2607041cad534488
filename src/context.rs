use crate::device::Registry;
use crate::error::ResultExt as _;
use crate::usb::{UsbBackend, UsbDevice};
use crate::{DeviceHandle, Error, ErrorKind, Result};
use log::{debug, LevelFilter};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to every USB transfer unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// State shared between a [`Context`] and the [`Device`]s it discovered.
pub(crate) struct Shared<D: UsbDevice> {
    pub(crate) registry: Registry<D>,
    timeout: Mutex<Duration>,
}

impl<D: UsbDevice> Shared<D> {
    pub(crate) fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }
}

/// Library context, owning the USB stack and the set of known J-Link devices.
///
/// All devices are discovered through a `Context`. The context keeps track of every [`Device`]
/// that is still referenced somewhere, so that repeated calls to [`Context::device_list`] hand out
/// the *same* [`Device`] for the same physical probe instead of opening it again.
///
/// The USB stack is abstracted by the [`UsbBackend`] trait and defaults to `rusb`.
///
/// [`Device`]: struct.Device.html
/// [`Context::device_list`]: #method.device_list
/// [`UsbBackend`]: usb/trait.UsbBackend.html
pub struct Context<B: UsbBackend = rusb::Context> {
    usb: B,
    shared: Arc<Shared<B::Device>>,
}

impl Context<rusb::Context> {
    /// Creates a new context backed by a fresh libusb context.
    pub fn new() -> Result<Self> {
        log_libusb_info();

        let usb = rusb::Context::new().jaylink_err_while("initializing libusb")?;
        Ok(Self::with_backend(usb))
    }
}

impl<B: UsbBackend> Context<B> {
    /// Creates a context that uses `usb` to talk to the USB stack.
    pub fn with_backend(usb: B) -> Self {
        Self {
            usb,
            shared: Arc::new(Shared {
                registry: Registry::new(),
                timeout: Mutex::new(DEFAULT_TIMEOUT),
            }),
        }
    }

    /// Sets the timeout of USB transfers performed by device handles opened afterwards.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// Sets the timeout of USB transfers performed by device handles opened afterwards.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.shared.timeout.lock() = timeout;
    }

    /// Returns the configured USB transfer timeout.
    pub fn timeout(&self) -> Duration {
        self.shared.timeout()
    }

    /// Sets the verbosity of the log messages emitted by this library.
    ///
    /// This forwards to [`log::set_max_level`], so it affects every user of the `log` crate in the
    /// process.
    pub fn set_log_level(&self, level: LevelFilter) {
        log::set_max_level(level);
    }

    /// Returns the current log verbosity.
    pub fn log_level(&self) -> LevelFilter {
        log::max_level()
    }

    pub(crate) fn usb(&self) -> &B {
        &self.usb
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<B::Device>> {
        &self.shared
    }

    /// Opens an attached J-Link device by its serial number.
    ///
    /// If `serial` is `None`, this will open the only attached J-Link device, and return an error
    /// of type [`MultipleDevicesFound`] when more than one is attached. This is usually the desired
    /// behavior of robust applications.
    ///
    /// [`MultipleDevicesFound`]: enum.ErrorKind.html#variant.MultipleDevicesFound
    pub fn open_by_serial(&self, serial: Option<u32>) -> Result<DeviceHandle<B::Device>> {
        let mut devices = self
            .device_list()?
            .into_iter()
            .filter(|dev| serial.map_or(true, |serial| dev.serial_number() == serial));

        let first = devices.next().ok_or_else(|| {
            let message = if let Some(serial) = serial {
                format!("no J-Link device with serial {} was found (make sure your current user has permissions to access it)", serial)
            } else {
                "no J-Link devices found (make sure your current user has permissions to access them)".to_string()
            };
            Error::new(ErrorKind::DeviceNotFound, message)
        })?;

        if devices.next().is_some() {
            let msg = if let Some(serial) = serial {
                format!("found multiple devices matching serial {}", serial)
            } else {
                "multiple devices found (specify serial number to select one)".to_string()
            };
            return Err(Error::new(ErrorKind::MultipleDevicesFound, msg));
        }

        first.open()
    }

    /// Returns the number of device records currently known to this context.
    pub fn known_devices(&self) -> usize {
        self.shared.registry.len()
    }

    #[cfg(test)]
    pub(crate) fn is_known(&self, device: &crate::Device<B::Device>) -> bool {
        self.shared.registry.contains(device)
    }
}

impl<B: UsbBackend> fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("known_devices", &self.known_devices())
            .field("timeout", &self.timeout())
            .finish()
    }
}

fn log_libusb_info() {
    static DID_LOG: AtomicBool = AtomicBool::new(false);

    if DID_LOG.swap(true, Ordering::Acquire) {
        return;
    }

    let vers = rusb::version();
    debug!(
        "libusb {}.{}.{}.{}{}",
        vers.major(),
        vers.minor(),
        vers.micro(),
        vers.nano(),
        vers.rc().map(|rc| format!("-{}", rc)).unwrap_or_default(),
    );
    debug!("libusb has capability API: {:?}", rusb::has_capability());
}

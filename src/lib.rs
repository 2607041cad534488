//! Host-side access to SEGGER J-Link debug probes connected via USB.
//!
//! This crate finds J-Link probes on the USB bus, opens sessions with them and speaks the
//! vendor-specific command protocol of their J-Link interface. The virtual COM port of the probes
//! is a regular CDC device and needs no support from this crate.
//!
//! # Overview
//!
//! * A [`Context`] owns the USB stack and keeps track of every probe it has seen.
//! * [`Context::device_list`] scans the bus and returns a [`DeviceList`] of [`Device`]s. A
//!   `Device` is a cheap, reference-counted handle: scanning again hands out the *same* `Device`
//!   for a probe that is still referenced, without reopening it.
//! * [`Device::open`] claims the probe's USB interface and returns a [`DeviceHandle`], through
//!   which commands are sent. The interface is released when the handle is dropped.
//!
//! ```no_run
//! use jaylink_host::Context;
//!
//! # fn main() -> jaylink_host::Result<()> {
//! let context = Context::new()?;
//! for device in &context.device_list()? {
//!     let mut handle = device.open()?;
//!     println!("{}: {}", device.serial_number(), handle.firmware_version()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Pinout
//!
//! The probes use the standard 20-pin ARM JTAG connector. The pin states reported by
//! [`DeviceHandle::hardware_status`] refer to these pins.
//!
//! ```notrust
//!            ┌───────────┐
//!     VTref  │ *  1  2 * │ NC
//!     nTRST  │ *  3  4 * │ GND
//!       TDI  │ *  5  6 * │ GND
//!       TMS  │ *  7  8 * │ GND
//!       TCK ┌┘ *  9 10 * │ GND
//!      RTCK └┐ * 11 12 * │ GND
//!       TDO  │ * 13 14 * │ GND
//!     RESET  │ * 15 16 * │ GND
//!     DBGRQ  │ * 17 18 * │ GND
//! 5V-Supply  │ * 19 20 * │ GND
//!            └───────────┘
//! ```
//!
//! # Logging
//!
//! Diagnostics are emitted through the [`log`] crate. USB transfers are logged at `trace` level,
//! discovery and session management at `debug` level.
//!
//! [`Context`]: struct.Context.html
//! [`Context::device_list`]: struct.Context.html#method.device_list
//! [`DeviceList`]: struct.DeviceList.html
//! [`Device`]: struct.Device.html
//! [`Device::open`]: struct.Device.html#method.open
//! [`DeviceHandle`]: struct.DeviceHandle.html
//! [`DeviceHandle::hardware_status`]: struct.DeviceHandle.html#method.hardware_status
//! [`log`]: https://docs.rs/log

#![doc(html_root_url = "https://docs.rs/jaylink-host/0.1.0")]
// Deny a few warnings in doctests, since rustdoc `allow`s many warnings by default
#![doc(test(attr(deny(unused_imports, unused_must_use))))]
#![warn(missing_debug_implementations, rust_2018_idioms)]

mod capabilities;
mod codec;
mod commands;
mod context;
mod device;
mod discovery;
mod emucom;
mod error;
mod handle;
mod interface;
#[cfg(test)]
mod mock;
mod readme;
mod transport;
pub mod usb;

pub use self::capabilities::{has_cap, Capabilities, Capability, CAPS_SIZE, EXT_CAPS_SIZE};
pub use self::commands::{HardwareStatus, HardwareType, HardwareVersion, SpeedConfig, Speeds};
pub use self::context::{Context, DEFAULT_TIMEOUT};
pub use self::device::{Device, DeviceList, Variant};
pub use self::discovery::VID_SEGGER;
pub use self::error::{Error, ErrorKind};
pub use self::handle::DeviceHandle;
pub use self::interface::{TargetInterface, TargetInterfaces};

/// A result type with the error hardwired to [`Error`].
///
/// [`Error`]: struct.Error.html
pub type Result<T> = std::result::Result<T, Error>;

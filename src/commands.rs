//! The J-Link command set.
//!
//! Each command is exactly one transport transaction (or two, for responses whose size is only
//! known after reading a length prefix). Commands neither retry nor cache anything: every call
//! talks to the device.

use crate::capabilities::{Capabilities, Capability, CAPS_SIZE, EXT_CAPS_SIZE};
use crate::codec;
use crate::error::ResultExt as _;
use crate::interface::{TargetInterface, TargetInterfaces};
use crate::usb::UsbDevice;
use crate::{DeviceHandle, Error, ErrorKind, Result};
use log::debug;
use std::fmt;

#[repr(u8)]
enum Command {
    Version = 0x01,
    SetSpeed = 0x05,
    GetState = 0x07,
    SetTargetPower = 0x08,
    GetSpeeds = 0xC0,
    SelectIf = 0xC7,
    GetFreeMemory = 0xD4,
    HwReset0 = 0xDC,
    HwReset1 = 0xDD,
    GetCaps = 0xE8,
    GetExtCaps = 0xED,
    GetHwVersion = 0xF0,
}

/// `SELECT_IF` argument querying the selected interface.
const SELECT_IF_CURRENT: u8 = 0xFE;

/// `SELECT_IF` argument querying the available interfaces.
const SELECT_IF_AVAILABLE: u8 = 0xFF;

impl<D: UsbDevice> DeviceHandle<D> {
    /// Sends a command that has no response.
    fn command(&mut self, cmd: &[u8]) -> Result<()> {
        let transport = self.transport();
        transport.start_write(cmd.len(), true)?;
        transport.write(cmd)
    }

    /// Sends a command and reads its fixed-size response.
    fn query(&mut self, cmd: &[u8], response: &mut [u8]) -> Result<()> {
        let transport = self.transport();
        transport.start_write_read(cmd.len(), response.len(), true)?;
        transport.write(cmd)?;
        transport.read(response)
    }

    fn query_u32(&mut self, cmd: &[u8]) -> Result<u32> {
        let mut buf = [0; 4];
        self.query(cmd, &mut buf)?;
        Ok(codec::get_u32(&buf, 0))
    }

    /// Reads the firmware version string from the device.
    ///
    /// Returns an empty string if the device doesn't report a firmware version.
    pub fn firmware_version(&mut self) -> Result<String> {
        let mut buf = [0; 2];
        self.query(&[Command::Version as u8], &mut buf)?;
        let length = usize::from(codec::get_u16(&buf, 0));
        if length == 0 {
            return Ok(String::new());
        }

        let mut version = Vec::new();
        version.try_reserve_exact(length).jaylink_err()?;
        version.resize(length, 0);

        let transport = self.transport();
        transport.start_read(length)?;
        transport.read(&mut version)?;

        // The string is padded with null bytes.
        let end = version.iter().position(|&b| b == 0).unwrap_or(length);
        Ok(String::from_utf8_lossy(&version[..end]).into_owned())
    }

    /// Reads the hardware version from the device.
    ///
    /// This requires the [`GetHwVersion`] capability.
    ///
    /// [`GetHwVersion`]: enum.Capability.html#variant.GetHwVersion
    pub fn hardware_version(&mut self) -> Result<HardwareVersion> {
        let raw = self.query_u32(&[Command::GetHwVersion as u8])?;
        Ok(HardwareVersion(raw))
    }

    /// Reads the probe's CPU speed information.
    ///
    /// This requires the [`SpeedInfo`] capability.
    ///
    /// [`SpeedInfo`]: enum.Capability.html#variant.SpeedInfo
    pub fn speeds(&mut self) -> Result<Speeds> {
        let mut buf = [0; 6];
        self.query(&[Command::GetSpeeds as u8], &mut buf)?;

        let speeds = Speeds {
            base_freq: codec::get_u32(&buf, 0),
            min_div: codec::get_u16(&buf, 4),
        };
        if speeds.min_div == 0 {
            return Err(Error::new(
                ErrorKind::Protocol,
                "device reported a minimum frequency divider of 0",
            ));
        }
        Ok(speeds)
    }

    /// Sets the target communication speed.
    pub fn set_speed(&mut self, speed: SpeedConfig) -> Result<()> {
        let mut buf = [Command::SetSpeed as u8, 0, 0];
        codec::set_u16(&mut buf, speed.raw, 1);
        self.command(&buf)
    }

    /// Reads the target voltage and the state of the JTAG pins.
    pub fn hardware_status(&mut self) -> Result<HardwareStatus> {
        let mut buf = [0; 8];
        self.query(&[Command::GetState as u8], &mut buf)?;

        Ok(HardwareStatus {
            target_voltage: codec::get_u16(&buf, 0),
            tck: buf[2] != 0,
            tdi: buf[3] != 0,
            tdo: buf[4] != 0,
            tms: buf[5] != 0,
            tres: buf[6] != 0,
            trst: buf[7] != 0,
        })
    }

    /// Reads the raw 32-bit capability array.
    pub fn caps(&mut self) -> Result<[u8; CAPS_SIZE]> {
        let mut caps = [0; CAPS_SIZE];
        self.query(&[Command::GetCaps as u8], &mut caps)?;
        Ok(caps)
    }

    /// Reads the raw 256-bit extended capability array.
    ///
    /// This requires the [`GetExtCaps`] capability.
    ///
    /// [`GetExtCaps`]: enum.Capability.html#variant.GetExtCaps
    pub fn extended_caps(&mut self) -> Result<[u8; EXT_CAPS_SIZE]> {
        let mut caps = [0; EXT_CAPS_SIZE];
        self.query(&[Command::GetExtCaps as u8], &mut caps)?;
        Ok(caps)
    }

    /// Reads the full set of capabilities of the device.
    ///
    /// The extended capabilities are read if the device supports them, the legacy 32-bit set
    /// otherwise.
    pub fn capabilities(&mut self) -> Result<Capabilities> {
        let legacy = Capabilities::from_raw_legacy(self.caps()?);
        if !legacy.contains(Capability::GetExtCaps) {
            debug!("capabilities: {:?}", legacy);
            return Ok(legacy);
        }

        let ext = Capabilities::from_raw_ex(self.extended_caps()?);
        if !legacy.is_subset(&ext) {
            return Err(Error::new(
                ErrorKind::Protocol,
                format!(
                    "extended capabilities {:?} are missing legacy capabilities {:?}",
                    ext, legacy
                ),
            ));
        }
        debug!("capabilities: {:?}", ext);
        Ok(ext)
    }

    /// Fails with [`ErrorKind::FeatureNotSupported`] unless the device advertises `cap`.
    ///
    /// [`ErrorKind::FeatureNotSupported`]: enum.ErrorKind.html#variant.FeatureNotSupported
    pub fn require_capability(&mut self, cap: Capability) -> Result<()> {
        if self.capabilities()?.contains(cap) {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::FeatureNotSupported,
                format!("device is missing capability {:?}", cap),
            ))
        }
    }

    /// Reads the amount of free memory of the device, in bytes.
    ///
    /// This requires the [`GetFreeMemory`] capability.
    ///
    /// [`GetFreeMemory`]: enum.Capability.html#variant.GetFreeMemory
    pub fn free_memory(&mut self) -> Result<u32> {
        self.query_u32(&[Command::GetFreeMemory as u8])
    }

    /// Selects the interface to use for talking to the target.
    ///
    /// Returns the previously selected interface. This requires the [`SelectTargetInterface`]
    /// capability.
    ///
    /// [`SelectTargetInterface`]: enum.Capability.html#variant.SelectTargetInterface
    pub fn select_interface(&mut self, intf: TargetInterface) -> Result<TargetInterface> {
        let raw = self.query_u32(&[Command::SelectIf as u8, intf.number()])?;
        let previous = decode_interface(raw)?;
        debug!("selected {} (was {})", intf, previous);
        Ok(previous)
    }

    /// Reads the target interfaces the device can use.
    ///
    /// This requires the [`SelectTargetInterface`] capability.
    ///
    /// [`SelectTargetInterface`]: enum.Capability.html#variant.SelectTargetInterface
    pub fn available_interfaces(&mut self) -> Result<TargetInterfaces> {
        let raw = self.query_u32(&[Command::SelectIf as u8, SELECT_IF_AVAILABLE])?;
        Ok(TargetInterfaces::from_bits_warn(raw))
    }

    /// Reads the currently selected target interface.
    ///
    /// This requires the [`SelectTargetInterface`] capability.
    ///
    /// [`SelectTargetInterface`]: enum.Capability.html#variant.SelectTargetInterface
    pub fn selected_interface(&mut self) -> Result<TargetInterface> {
        let raw = self.query_u32(&[Command::SelectIf as u8, SELECT_IF_CURRENT])?;
        decode_interface(raw)
    }

    /// Releases the target reset signal (drives nRESET high).
    pub fn clear_reset(&mut self) -> Result<()> {
        self.command(&[Command::HwReset1 as u8])
    }

    /// Asserts the target reset signal (drives nRESET low).
    pub fn set_reset(&mut self) -> Result<()> {
        self.command(&[Command::HwReset0 as u8])
    }

    /// Enables or disables the 5V supply on pin 19 of the probe's connector.
    ///
    /// This requires the [`SetTargetPower`] capability.
    ///
    /// [`SetTargetPower`]: enum.Capability.html#variant.SetTargetPower
    pub fn set_target_power(&mut self, enable: bool) -> Result<()> {
        self.command(&[Command::SetTargetPower as u8, enable as u8])
    }
}

fn decode_interface(raw: u32) -> Result<TargetInterface> {
    TargetInterface::from_u32(raw).ok_or_else(|| {
        Error::new(
            ErrorKind::Protocol,
            format!("device reported invalid target interface {}", raw),
        )
    })
}

/// Target communication speed setting.
///
/// This determines the clock frequency of the JTAG/SWD communication.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SpeedConfig {
    raw: u16,
}

impl SpeedConfig {
    /// Let the probe adapt the speed to the target (RTCK).
    ///
    /// Requires the [`AdaptiveClocking`] capability.
    ///
    /// [`AdaptiveClocking`]: enum.Capability.html#variant.AdaptiveClocking
    pub const ADAPTIVE: Self = Self { raw: 0xFFFF };

    /// Manually specify the speed in kHz.
    ///
    /// Returns `None` for 0 and for `0xFFFF`, which is reserved for adaptive clocking. Other values
    /// may still be rejected by the device.
    pub fn khz(khz: u16) -> Option<Self> {
        match khz {
            0 | 0xFFFF => None,
            raw => Some(Self { raw }),
        }
    }

    /// Returns the configured speed in kHz, or `None` for adaptive clocking.
    pub fn as_khz(&self) -> Option<u16> {
        if *self == Self::ADAPTIVE {
            None
        } else {
            Some(self.raw)
        }
    }
}

/// Target voltage and pin states, as returned by [`DeviceHandle::hardware_status`].
///
/// [`DeviceHandle::hardware_status`]: struct.DeviceHandle.html#method.hardware_status
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HardwareStatus {
    target_voltage: u16,
    tck: bool,
    tdi: bool,
    tdo: bool,
    tms: bool,
    tres: bool,
    trst: bool,
}

impl HardwareStatus {
    /// Target reference voltage in mV.
    pub fn target_voltage(&self) -> u16 {
        self.target_voltage
    }

    /// State of the JTAG clock pin (TCK).
    pub fn tck(&self) -> bool {
        self.tck
    }

    /// State of the JTAG data input pin (TDI).
    pub fn tdi(&self) -> bool {
        self.tdi
    }

    /// State of the JTAG data output pin (TDO).
    pub fn tdo(&self) -> bool {
        self.tdo
    }

    /// State of the JTAG mode select pin (TMS).
    pub fn tms(&self) -> bool {
        self.tms
    }

    /// State of the target reset pin (nRESET).
    pub fn tres(&self) -> bool {
        self.tres
    }

    /// State of the JTAG TAP reset pin (nTRST).
    pub fn trst(&self) -> bool {
        self.trst
    }
}

/// A hardware version returned by [`DeviceHandle::hardware_version`].
///
/// The version is decimal-coded as `TTMMmmrr` (type, major, minor, revision). It does not allow
/// reliable feature detection: on-board probes may report 1.0.0 despite supporting much newer
/// features.
///
/// [`DeviceHandle::hardware_version`]: struct.DeviceHandle.html#method.hardware_version
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HardwareVersion(u32);

impl HardwareVersion {
    /// Returns the type of hardware (or `None` if the hardware type is unknown).
    pub fn hardware_type(&self) -> Option<HardwareType> {
        Some(match (self.0 / 1_000_000) % 100 {
            0 => HardwareType::JLink,
            1 => HardwareType::JTrace,
            2 => HardwareType::Flasher,
            3 => HardwareType::JLinkPro,
            _ => return None,
        })
    }

    pub fn major(&self) -> u8 {
        ((self.0 / 10_000) % 100) as u8
    }

    pub fn minor(&self) -> u8 {
        ((self.0 / 100) % 100) as u8
    }

    pub fn revision(&self) -> u8 {
        (self.0 % 100) as u8
    }
}

impl fmt::Display for HardwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(hw) = self.hardware_type() {
            write!(f, "{} ", hw)?;
        }
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.revision())
    }
}

/// The hardware/product type of the device.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HardwareType {
    JLink,
    JTrace,
    Flasher,
    JLinkPro,
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HardwareType::JLink => "J-Link",
            HardwareType::JTrace => "J-Trace",
            HardwareType::Flasher => "Flasher",
            HardwareType::JLinkPro => "J-Link Pro",
        })
    }
}

/// Probe CPU frequency info.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Speeds {
    base_freq: u32,
    min_div: u16,
}

impl Speeds {
    /// Base frequency in Hz.
    pub fn base_freq(&self) -> u32 {
        self.base_freq
    }

    /// Minimum divider of the base frequency. Never 0.
    pub fn min_div(&self) -> u16 {
        self.min_div
    }

    /// Returns the maximum supported speed for SWD/JTAG operation (in Hz).
    pub fn max_speed(&self) -> u32 {
        self.base_freq / u32::from(self.min_div)
    }
}

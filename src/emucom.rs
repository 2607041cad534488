//! EMUCOM, a set of byte channels between the host and software running on the probe.
//!
//! Channel transfers answer with a 32-bit status word that either holds the number of bytes
//! transferred or one of a few error sentinels. The sentinels are decoded into [`ErrorKind`]s here
//! and never reach the caller.
//!
//! [`ErrorKind`]: ../enum.ErrorKind.html

use crate::codec;
use crate::usb::UsbDevice;
use crate::{DeviceHandle, Error, ErrorKind, Result};
use log::trace;
use std::convert::TryFrom;

const CMD_EMUCOM: u8 = 0xEE;

const EMUCOM_CMD_READ: u8 = 0x00;
const EMUCOM_CMD_WRITE: u8 = 0x01;

/// The channel is not supported by the device.
const EMUCOM_ERR_NOT_SUPPORTED: u32 = 0x8000_0001;

/// The channel has less data available than requested. The low 24 bits hold the amount available.
const EMUCOM_ERR_NOT_AVAILABLE: u32 = 0x8100_0000;

const EMUCOM_ERR_NOT_AVAILABLE_MASK: u32 = 0xFF00_0000;

const HEADER_SIZE: usize = 10;

impl<D: UsbDevice> DeviceHandle<D> {
    /// Writes `data` to EMUCOM channel `channel`.
    ///
    /// Returns the number of bytes the device accepted, which may be less than `data.len()`.
    ///
    /// This requires the [`Emucom`] capability.
    ///
    /// [`Emucom`]: enum.Capability.html#variant.Emucom
    pub fn emucom_write(&mut self, channel: u32, data: &[u8]) -> Result<usize> {
        let length = transfer_length(data.len())?;
        let header = header(EMUCOM_CMD_WRITE, channel, length);

        let transport = self.transport();
        transport.start_write(HEADER_SIZE, true)?;
        transport.write(&header)?;

        let mut status = [0; 4];
        transport.start_write_read(data.len(), status.len(), false)?;
        transport.write(data)?;
        transport.read(&mut status)?;

        let written = decode_write_status(codec::get_u32(&status, 0), channel, length)?;
        trace!("EMUCOM channel {:#x}: wrote {} bytes", channel, written);
        Ok(written as usize)
    }

    /// Reads up to `buf.len()` bytes from EMUCOM channel `channel`.
    ///
    /// Returns the number of bytes read into the start of `buf`, which is 0 if the channel has no
    /// pending data.
    ///
    /// This requires the [`Emucom`] capability.
    ///
    /// [`Emucom`]: enum.Capability.html#variant.Emucom
    pub fn emucom_read(&mut self, channel: u32, buf: &mut [u8]) -> Result<usize> {
        let length = transfer_length(buf.len())?;
        let header = header(EMUCOM_CMD_READ, channel, length);

        let transport = self.transport();
        let mut status = [0; 4];
        transport.start_write_read(HEADER_SIZE, status.len(), true)?;
        transport.write(&header)?;
        transport.read(&mut status)?;

        let available = decode_read_status(codec::get_u32(&status, 0), channel, length)? as usize;
        if available == 0 {
            return Ok(0);
        }

        transport.start_read(available)?;
        transport.read(&mut buf[..available])?;
        trace!("EMUCOM channel {:#x}: read {} bytes", channel, available);
        Ok(available)
    }
}

fn transfer_length(len: usize) -> Result<u32> {
    if len == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "EMUCOM transfers must not be empty",
        ));
    }
    u32::try_from(len).map_err(|_| {
        Error::new(
            ErrorKind::InvalidArgument,
            format!("EMUCOM transfer of {} bytes is too large", len),
        )
    })
}

fn header(cmd: u8, channel: u32, length: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0; HEADER_SIZE];
    header[0] = CMD_EMUCOM;
    header[1] = cmd;
    codec::set_u32(&mut header, channel, 2);
    codec::set_u32(&mut header, length, 6);
    header
}

fn not_supported(channel: u32) -> Error {
    Error::new(
        ErrorKind::FeatureNotSupported,
        format!("EMUCOM channel {:#x} is not supported by the device", channel),
    )
}

fn device_error(channel: u32, status: u32) -> Error {
    Error::new(
        ErrorKind::Device,
        format!(
            "EMUCOM transfer on channel {:#x} failed with status {:#010x}",
            channel, status
        ),
    )
}

fn decode_write_status(status: u32, channel: u32, requested: u32) -> Result<u32> {
    if status == EMUCOM_ERR_NOT_SUPPORTED {
        return Err(not_supported(channel));
    }
    if (status as i32) < 0 {
        return Err(device_error(channel, status));
    }
    if status > requested {
        return Err(Error::new(
            ErrorKind::Protocol,
            format!(
                "only {} bytes were supposed to be written, but the device reported {} written bytes",
                requested, status
            ),
        ));
    }
    Ok(status)
}

fn decode_read_status(status: u32, channel: u32, requested: u32) -> Result<u32> {
    if status == EMUCOM_ERR_NOT_SUPPORTED {
        return Err(not_supported(channel));
    }
    if status & EMUCOM_ERR_NOT_AVAILABLE_MASK == EMUCOM_ERR_NOT_AVAILABLE {
        return Err(Error::new(
            ErrorKind::NotAvailable,
            format!(
                "EMUCOM channel {:#x} has only {} of {} requested bytes available",
                channel,
                status & !EMUCOM_ERR_NOT_AVAILABLE_MASK,
                requested
            ),
        ));
    }
    if (status as i32) < 0 {
        return Err(device_error(channel, status));
    }
    if status > requested {
        return Err(Error::new(
            ErrorKind::Protocol,
            format!(
                "only {} bytes were requested, but the device announced {} bytes",
                requested, status
            ),
        ));
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockDevice};

    fn kind<T: std::fmt::Debug>(res: Result<T>) -> ErrorKind {
        res.unwrap_err().kind()
    }

    #[test]
    fn write_status() {
        assert_eq!(
            kind(decode_write_status(0x8000_0001, 1, 16)),
            ErrorKind::FeatureNotSupported
        );
        assert_eq!(kind(decode_write_status(0xFFFF_FFFF, 1, 16)), ErrorKind::Device);
        assert_eq!(kind(decode_write_status(0x8000_0000, 1, 16)), ErrorKind::Device);
        assert_eq!(kind(decode_write_status(17, 1, 16)), ErrorKind::Protocol);
        assert_eq!(decode_write_status(16, 1, 16).unwrap(), 16);
        assert_eq!(decode_write_status(3, 1, 16).unwrap(), 3);
        assert_eq!(decode_write_status(0, 1, 16).unwrap(), 0);
    }

    #[test]
    fn read_status() {
        assert_eq!(
            kind(decode_read_status(0x8000_0001, 1, 16)),
            ErrorKind::FeatureNotSupported
        );
        assert_eq!(
            kind(decode_read_status(0x8100_0000, 1, 16)),
            ErrorKind::NotAvailable
        );
        assert_eq!(
            kind(decode_read_status(0x8100_0004, 1, 16)),
            ErrorKind::NotAvailable
        );
        assert_eq!(kind(decode_read_status(0xFFFF_FFFF, 1, 16)), ErrorKind::Device);
        assert_eq!(kind(decode_read_status(20, 1, 16)), ErrorKind::Protocol);
        assert_eq!(decode_read_status(0, 1, 16).unwrap(), 0);
        assert_eq!(decode_read_status(7, 1, 16).unwrap(), 7);
    }

    #[test]
    fn write() {
        let dev = MockDevice::jlink("1");
        let mut handle = mock::open(&dev);

        dev.respond(&[0x03, 0x00, 0x00, 0x00]);
        assert_eq!(handle.emucom_write(0x1_0000, b"hello").unwrap(), 3);
        assert_eq!(
            dev.writes(),
            vec![
                vec![0xEE, 0x01, 0x00, 0x00, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00],
                b"hello".to_vec(),
            ]
        );
        assert_eq!(dev.reads(), vec![4]);

        dev.respond(&[0x01, 0x00, 0x00, 0x80]);
        let err = handle.emucom_write(2, b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureNotSupported);

        dev.respond(&[0x06, 0x00, 0x00, 0x00]);
        let err = handle.emucom_write(2, b"hello").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn empty_transfers_are_rejected() {
        let dev = MockDevice::jlink("1");
        let mut handle = mock::open(&dev);

        assert_eq!(kind(handle.emucom_write(0, &[])), ErrorKind::InvalidArgument);
        assert_eq!(
            kind(handle.emucom_read(0, &mut [])),
            ErrorKind::InvalidArgument
        );
        assert!(dev.writes().is_empty());
    }

    #[test]
    fn read() {
        let dev = MockDevice::jlink("1");
        let mut handle = mock::open(&dev);
        let mut buf = [0; 8];

        dev.respond(&[0x02, 0x00, 0x00, 0x00]);
        dev.respond(b"ok");
        assert_eq!(handle.emucom_read(7, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ok");
        assert_eq!(
            dev.writes(),
            vec![vec![0xEE, 0x00, 0x07, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00]]
        );
        assert_eq!(dev.reads(), vec![4, 2]);

        dev.respond(&[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(handle.emucom_read(7, &mut buf).unwrap(), 0);
        assert_eq!(dev.reads(), vec![4, 2, 4]);

        dev.respond(&[0x01, 0x00, 0x00, 0x81]);
        assert_eq!(kind(handle.emucom_read(7, &mut buf)), ErrorKind::NotAvailable);
    }
}

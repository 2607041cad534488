//! Buffered command transport over the probe's bulk endpoint pair.
//!
//! Every exchange with the probe is a *transaction*: it is opened with one of the `start_*`
//! functions, which declare how many bytes will be written and how many will be read, followed by
//! any number of [`Transport::write`] and [`Transport::read`] calls that add up to exactly those
//! lengths.
//!
//! Writes are collected in the internal buffer and sent as a single bulk OUT transfer once the
//! declared write length is reached. The first read that can't be served from the buffer fetches
//! everything the transaction still expects with a single bulk IN request, since the probe sends
//! each response in one burst. If the device delivers the response in shorter packets, further
//! bulk IN transfers are issued until the declared length has arrived. Write and read phases never
//! overlap, so both share one buffer.

use crate::error::ResultExt as _;
use crate::usb::{Endpoints, UsbHandle};
use crate::{Error, ErrorKind, Result};
use log::trace;
use std::cmp;
use std::time::Duration;

pub(crate) struct Transport<H> {
    usb: H,
    interface: u8,
    endpoints: Endpoints,
    timeout: Duration,

    buffer: Vec<u8>,
    /// Whether the first byte written in this transaction is a command ID.
    has_command: bool,
    /// Number of bytes left to be written before the write is sent to the device.
    write_length: usize,
    /// Number of bytes collected in the buffer for the pending write.
    write_pos: usize,
    /// Number of bytes still owed to the caller in this transaction.
    read_length: usize,
    /// Number of received bytes in the buffer that were not read yet.
    bytes_available: usize,
    /// Position of the next unread byte in the buffer.
    read_pos: usize,
    /// Set when a transfer fails. The transaction can't be continued afterwards.
    failed: bool,
}

impl<H: UsbHandle> Transport<H> {
    pub(crate) fn new(usb: H, interface: u8, endpoints: Endpoints, timeout: Duration) -> Self {
        Self {
            usb,
            interface,
            endpoints,
            timeout,
            buffer: Vec::new(),
            has_command: false,
            write_length: 0,
            write_pos: 0,
            read_length: 0,
            bytes_available: 0,
            read_pos: 0,
            failed: false,
        }
    }

    pub(crate) fn interface(&self) -> u8 {
        self.interface
    }

    pub(crate) fn usb_mut(&mut self) -> &mut H {
        &mut self.usb
    }

    /// Starts a transaction that writes `length` bytes and reads nothing.
    pub(crate) fn start_write(&mut self, length: usize, has_command: bool) -> Result<()> {
        if length == 0 {
            return Err(invalid_argument("write length must not be 0"));
        }

        trace!("starting write transaction of {} bytes", length);
        self.begin(length, 0, has_command)
    }

    /// Starts a transaction that reads `length` bytes without writing anything first.
    pub(crate) fn start_read(&mut self, length: usize) -> Result<()> {
        if length == 0 {
            return Err(invalid_argument("read length must not be 0"));
        }

        trace!("starting read transaction of {} bytes", length);
        self.begin(0, length, false)
    }

    /// Starts a transaction that writes `write_length` bytes, then reads `read_length` bytes.
    pub(crate) fn start_write_read(
        &mut self,
        write_length: usize,
        read_length: usize,
        has_command: bool,
    ) -> Result<()> {
        if write_length == 0 || read_length == 0 {
            return Err(invalid_argument("write and read length must not be 0"));
        }

        trace!(
            "starting write/read transaction ({} bytes out, {} bytes in)",
            write_length,
            read_length
        );
        self.begin(write_length, read_length, has_command)
    }

    fn begin(&mut self, write_length: usize, read_length: usize, has_command: bool) -> Result<()> {
        let size = cmp::max(write_length, read_length);
        self.buffer.clear();
        self.buffer.try_reserve_exact(size).jaylink_err()?;
        self.buffer.resize(size, 0);

        self.has_command = has_command;
        self.write_length = write_length;
        self.write_pos = 0;
        self.read_length = read_length;
        self.bytes_available = 0;
        self.read_pos = 0;
        self.failed = false;
        Ok(())
    }

    fn check_usable(&self) -> Result<()> {
        if self.failed {
            Err(Error::new(
                ErrorKind::InvalidArgument,
                "transaction was aborted by a failed transfer; a new one must be started",
            ))
        } else {
            Ok(())
        }
    }

    /// Writes `data` as part of the current transaction.
    ///
    /// Nothing is sent to the device until the declared write length is reached. An empty write
    /// never causes a transfer.
    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check_usable()?;

        if data.is_empty() {
            return Ok(());
        }

        let len = data.len();
        if len > self.write_length {
            return Err(invalid_argument(format!(
                "attempted to write {} bytes, but only {} bytes are left in the transaction",
                len, self.write_length
            )));
        }

        if len < self.write_length {
            self.buffer[self.write_pos..self.write_pos + len].copy_from_slice(data);
            self.write_pos += len;
            self.write_length -= len;
            trace!(
                "buffered {} bytes, {} left before sending",
                len,
                self.write_length
            );
            return Ok(());
        }

        self.write_length = 0;

        let result = if self.write_pos == 0 {
            // Everything arrived in one piece, send it without copying.
            self.send(data)
        } else {
            let total = self.write_pos + len;
            self.buffer[self.write_pos..total].copy_from_slice(data);
            self.write_pos = 0;
            self.send(&self.buffer[..total])
        };

        if result.is_err() {
            self.failed = true;
        }
        result
    }

    /// Reads `buf.len()` bytes of the current transaction's response.
    ///
    /// If the buffer doesn't hold enough received bytes, the rest of the response is requested with
    /// a single USB transfer. Short packets are followed up by more transfers until the whole
    /// remainder has arrived.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_usable()?;

        if self.write_length != 0 {
            return Err(invalid_argument(format!(
                "attempted to read while {} bytes of the write are still outstanding",
                self.write_length
            )));
        }

        let len = buf.len();
        if len > self.read_length {
            return Err(invalid_argument(format!(
                "attempted to read {} bytes, but only {} bytes are left in the transaction",
                len, self.read_length
            )));
        }

        let buffered = cmp::min(len, self.bytes_available);
        self.consume(&mut buf[..buffered]);
        if buffered == len {
            return Ok(());
        }

        // The buffer is exhausted, fetch everything this transaction still expects.
        let fetch = self.read_length;
        if let Err(e) = self.receive(fetch) {
            self.failed = true;
            return Err(e);
        }
        self.read_pos = 0;
        self.bytes_available = fetch;

        self.consume(&mut buf[buffered..]);
        Ok(())
    }

    fn consume(&mut self, out: &mut [u8]) {
        let len = out.len();
        out.copy_from_slice(&self.buffer[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        self.bytes_available -= len;
        self.read_length -= len;
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        if self.has_command {
            trace!(
                "write {} bytes (command {:#04x}): {:x?}",
                data.len(),
                data[0],
                data
            );
        } else {
            trace!("write {} bytes: {:x?}", data.len(), data);
        }

        let bytes = self
            .usb
            .write_bulk(self.endpoints.write, data, self.timeout)
            .jaylink_err_while("writing data to device")?;

        if bytes != data.len() {
            return Err(format!(
                "incomplete write (expected {} bytes, wrote {})",
                data.len(),
                bytes
            ))
            .jaylink_err();
        }
        Ok(())
    }

    /// Receives `len` bytes into the start of the buffer.
    fn receive(&mut self, len: usize) -> Result<()> {
        let mut total = 0;

        while total < len {
            let bytes = self
                .usb
                .read_bulk(
                    self.endpoints.read,
                    &mut self.buffer[total..len],
                    self.timeout,
                )
                .jaylink_err_while("reading from device")?;
            if bytes == 0 {
                return Err(Error::new(
                    ErrorKind::Protocol,
                    format!("device sent an empty packet ({} of {} bytes received)", total, len),
                ));
            }
            total += bytes;
        }

        trace!("read {} bytes: {:x?}", len, &self.buffer[..len]);
        Ok(())
    }
}

fn invalid_argument(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidArgument, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockHandle, EP_IN, EP_OUT};
    use crate::usb::UsbDevice;

    fn transport() -> (MockDevice, Transport<MockHandle>) {
        let dev = MockDevice::jlink("1");
        let handle = dev.open().unwrap();
        let endpoints = Endpoints {
            read: EP_IN,
            write: EP_OUT,
        };
        (
            dev,
            Transport::new(handle, 0, endpoints, Duration::from_millis(100)),
        )
    }

    #[test]
    fn writes_are_coalesced() {
        let (dev, mut t) = transport();
        t.start_write(3, true).unwrap();

        t.write(&[0x05]).unwrap();
        t.write(&[0x10]).unwrap();
        assert!(dev.writes().is_empty());

        t.write(&[0x27]).unwrap();
        assert_eq!(dev.writes(), vec![vec![0x05, 0x10, 0x27]]);
    }

    #[test]
    fn single_write_is_sent_directly() {
        let (dev, mut t) = transport();
        t.start_write(2, true).unwrap();
        t.write(&[0x08, 0x01]).unwrap();
        assert_eq!(dev.writes(), vec![vec![0x08, 0x01]]);
    }

    #[test]
    fn reads_are_batched() {
        let (dev, mut t) = transport();
        t.start_write_read(1, 4, true).unwrap();
        t.write(&[0xD4]).unwrap();
        dev.respond(&[1, 2, 3, 4]);

        let mut buf = [0; 2];
        t.read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(dev.reads(), vec![4]);

        t.read(&mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
        assert_eq!(dev.reads(), vec![4]);
    }

    #[test]
    fn read_only_transaction() {
        let (dev, mut t) = transport();
        t.start_read(5).unwrap();
        dev.respond(b"hello");

        let mut buf = [0; 5];
        t.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(dev.writes().is_empty());
        assert_eq!(dev.reads(), vec![5]);
    }

    #[test]
    fn short_packets_are_reassembled() {
        let (dev, mut t) = transport();
        t.start_read(6).unwrap();
        dev.respond(&[1, 2, 3, 4]);
        dev.respond(&[5, 6]);

        let mut buf = [0; 6];
        t.read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
        assert_eq!(dev.reads(), vec![6, 2]);
    }

    #[test]
    fn buffer_is_shared_between_phases() {
        let (dev, mut t) = transport();
        t.start_write_read(10, 4, true).unwrap();
        assert_eq!(t.buffer.len(), 10);
        t.write(&[0xEE, 0x01]).unwrap();
        t.write(&[0; 8]).unwrap();
        assert_eq!(dev.writes().len(), 1);

        dev.respond(&[9, 9, 9, 9]);
        let mut buf = [0; 4];
        t.read(&mut buf).unwrap();
        assert_eq!(buf, [9; 4]);

        t.start_write_read(1, 32, true).unwrap();
        assert_eq!(t.buffer.len(), 32);
    }

    #[test]
    fn overlong_write_is_rejected() {
        let (dev, mut t) = transport();
        t.start_write(2, true).unwrap();
        t.write(&[1]).unwrap();

        let err = t.write(&[2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(dev.writes().is_empty());

        // The transaction is still intact.
        t.write(&[2]).unwrap();
        assert_eq!(dev.writes(), vec![vec![1, 2]]);
    }

    #[test]
    fn empty_writes_send_nothing() {
        let (dev, mut t) = transport();
        t.start_read(4).unwrap();
        t.write(&[]).unwrap();
        assert!(dev.writes().is_empty());

        t.start_write_read(1, 4, true).unwrap();
        t.write(&[]).unwrap();
        t.write(&[0xE8]).unwrap();
        t.write(&[]).unwrap();
        assert_eq!(dev.writes(), vec![vec![0xE8]]);

        dev.respond(&[1, 2, 3, 4]);
        let mut buf = [0; 4];
        t.read(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn overlong_read_is_rejected() {
        let (dev, mut t) = transport();
        t.start_write_read(1, 2, true).unwrap();
        t.write(&[0x01]).unwrap();

        let mut buf = [0; 3];
        assert_eq!(
            t.read(&mut buf).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert!(dev.reads().is_empty());

        // A properly started transaction afterwards is unaffected.
        t.start_write_read(1, 3, true).unwrap();
        t.write(&[0x02]).unwrap();
        dev.respond(&[7, 8, 9]);
        t.read(&mut buf).unwrap();
        assert_eq!(buf, [7, 8, 9]);
        assert_eq!(dev.writes(), vec![vec![0x01], vec![0x02]]);
    }

    #[test]
    fn read_before_write_completes() {
        let (_dev, mut t) = transport();
        t.start_write_read(2, 2, true).unwrap();
        t.write(&[1]).unwrap();
        let mut buf = [0; 2];
        assert_eq!(
            t.read(&mut buf).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn zero_lengths_are_rejected() {
        let (_dev, mut t) = transport();
        assert_eq!(
            t.start_write(0, true).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            t.start_read(0).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            t.start_write_read(1, 0, true).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn failed_transfer_aborts_transaction() {
        let (dev, mut t) = transport();
        t.start_write_read(1, 4, true).unwrap();
        t.write(&[0xE8]).unwrap();
        dev.respond_err(rusb::Error::Timeout);

        let mut buf = [0; 2];
        assert_eq!(t.read(&mut buf).unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(
            t.read(&mut buf).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(dev.reads().len(), 1);

        t.start_write(1, true).unwrap();
        dev.fail_next_write(rusb::Error::NoDevice);
        assert_eq!(t.write(&[0xDC]).unwrap_err().kind(), ErrorKind::Usb);
        assert_eq!(
            t.write(&[0xDC]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        // A fresh transaction works again.
        t.start_write(1, true).unwrap();
        t.write(&[0xDD]).unwrap();
        assert_eq!(dev.writes().last().unwrap(), &vec![0xDD]);
    }

    #[test]
    fn empty_packet_is_a_protocol_error() {
        let (dev, mut t) = transport();
        t.start_read(2).unwrap();
        dev.respond(&[]);
        let mut buf = [0; 2];
        assert_eq!(t.read(&mut buf).unwrap_err().kind(), ErrorKind::Protocol);
    }
}

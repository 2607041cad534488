use std::collections::TryReserveError;
use std::fmt;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// List of specific errors that may occur when using this library.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An argument passed to the library was out of range.
    ///
    /// This is detected before any USB traffic is generated. It is also used when a caller tries to
    /// write or read more bytes than the active transport transaction was started with.
    InvalidArgument,

    /// A buffer could not be allocated.
    OutOfMemory,

    /// A USB transfer did not complete in the configured time.
    ///
    /// The timeout can be configured with [`Context::with_timeout`].
    ///
    /// [`Context::with_timeout`]: struct.Context.html#method.with_timeout
    Timeout,

    /// The device sent a response that violates the protocol.
    ///
    /// For example, the device claimed to have written more bytes to an EMUCOM channel than it was
    /// given, or reported a selected target interface that doesn't exist.
    Protocol,

    /// The device reported a failure without any further detail.
    Device,

    /// The device does not support the requested feature (eg. an EMUCOM channel).
    FeatureNotSupported,

    /// The requested resource (eg. EMUCOM channel data) is temporarily not available.
    NotAvailable,

    /// The USB interface of the device is claimed by another handle or application.
    DeviceBusy,

    /// A USB transport error occurred.
    ///
    /// This variant is used for all errors reported by the operating system when performing a USB
    /// operation that are not covered by a more specific kind. It may indicate that the USB device
    /// was unplugged, or that the current user does not have permission to access it.
    Usb,

    /// No (matching) J-Link device was found.
    ///
    /// This error occurs when calling [`Context::open_by_serial`] while no J-Link device is
    /// connected (or no device matching the serial number is connected).
    ///
    /// [`Context::open_by_serial`]: struct.Context.html#method.open_by_serial
    DeviceNotFound,

    /// Automatic device connection failed because multiple devices were found.
    ///
    /// This error occurs when calling [`Context::open_by_serial`] without a serial number while
    /// multiple J-Link devices are connected. This library will refuse to "guess" a device and
    /// requires specifying a serial number in this case.
    ///
    /// [`Context::open_by_serial`]: struct.Context.html#method.open_by_serial
    MultipleDevicesFound,

    /// An unspecified error occurred.
    Other,
}

pub(crate) trait Cause {
    fn kind(&self) -> ErrorKind;
}

/// The error type used by this library.
///
/// Errors can be introspected by the user by calling [`Error::kind`] and inspecting the returned
/// [`ErrorKind`].
///
/// [`Error::kind`]: #method.kind
/// [`ErrorKind`]: enum.ErrorKind.html
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: BoxedError,
    while_: Option<&'static str>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, inner: impl Into<BoxedError>) -> Self {
        Self {
            kind,
            inner: inner.into(),
            while_: None,
        }
    }

    pub(crate) fn with_while(
        kind: ErrorKind,
        inner: impl Into<BoxedError>,
        while_: &'static str,
    ) -> Self {
        Self {
            kind,
            inner: inner.into(),
            while_: Some(while_),
        }
    }

    /// Returns the [`ErrorKind`] describing this error.
    ///
    /// [`ErrorKind`]: enum.ErrorKind.html
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let while_ = self.while_.map(|w| format!(" while {}", w)).unwrap_or_default();

        // Prefix foreign errors with further explanation where they're coming from
        match self.kind {
            ErrorKind::Usb | ErrorKind::Timeout | ErrorKind::DeviceBusy => {
                write!(f, "USB error{}: {}", while_, self.inner)
            }
            _ if self.while_.is_some() => write!(f, "error{}: {}", while_, self.inner),
            _ => self.inner.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

pub(crate) trait ResultExt<T, E> {
    fn jaylink_err(self) -> Result<T, Error>
    where
        E: Cause + Into<BoxedError>;

    fn jaylink_err_while(self, while_: &'static str) -> Result<T, Error>
    where
        E: Cause + Into<BoxedError>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn jaylink_err(self) -> Result<T, Error>
    where
        E: Cause + Into<BoxedError>,
    {
        self.map_err(|e| Error::new(e.kind(), e))
    }

    fn jaylink_err_while(self, while_: &'static str) -> Result<T, Error>
    where
        E: Cause + Into<BoxedError>,
    {
        self.map_err(|e| Error::with_while(e.kind(), e, while_))
    }
}

impl Cause for rusb::Error {
    fn kind(&self) -> ErrorKind {
        match self {
            rusb::Error::Timeout => ErrorKind::Timeout,
            rusb::Error::Busy => ErrorKind::DeviceBusy,
            rusb::Error::NoMem => ErrorKind::OutOfMemory,
            rusb::Error::InvalidParam => ErrorKind::InvalidArgument,
            _ => ErrorKind::Usb,
        }
    }
}

macro_rules! error_mapping {
    (
        $(
            $errty:ty => $kind:ident,
        )+
    ) => {
        $(
            impl Cause for $errty {
                fn kind(&self) -> ErrorKind {
                    ErrorKind::$kind
                }
            }
        )+
    };
}

error_mapping! {
    TryReserveError => OutOfMemory,
    String => Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_error_kinds() {
        let res: Result<(), _> = Err(rusb::Error::Timeout);
        assert_eq!(res.jaylink_err().unwrap_err().kind(), ErrorKind::Timeout);

        let res: Result<(), _> = Err(rusb::Error::Busy);
        assert_eq!(res.jaylink_err().unwrap_err().kind(), ErrorKind::DeviceBusy);

        let res: Result<(), _> = Err(rusb::Error::Pipe);
        assert_eq!(res.jaylink_err().unwrap_err().kind(), ErrorKind::Usb);
    }

    #[test]
    fn display_while() {
        let res: Result<(), _> = Err(rusb::Error::Pipe);
        let err = res.jaylink_err_while("reading from device").unwrap_err();
        assert!(err.to_string().starts_with("USB error while reading from device: "));

        let err = Error::new(ErrorKind::Protocol, "bad length");
        assert_eq!(err.to_string(), "bad length");

        let res: Result<(), _> = Err("oops".to_string());
        let err = res.jaylink_err_while("parsing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(err.to_string(), "error while parsing: oops");
    }
}

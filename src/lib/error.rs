use thiserror::Error;

/// A failure reported by a HID backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("os error {code:#010x}: {message}")]
    Os { code: i32, message: String },
    #[error("operation timed out")]
    Timeout,
    #[error("device not found")]
    NotFound,
    #[error("short transfer: {actual} of {expected} bytes")]
    ShortTransfer { expected: usize, actual: usize },
    #[error("invalid device path: {0}")]
    InvalidPath(String),
    #[error("{0}")]
    Other(String),
    #[cfg(feature = "libusb")]
    #[error("USB error: {0}")]
    Usb(libusb::Error),
}

impl BackendError {
    /// The low-level OS error code, if the backend reported one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            BackendError::Os { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        match error.raw_os_error() {
            Some(code) => BackendError::Os {
                code,
                message: error.to_string(),
            },
            None if error.kind() == std::io::ErrorKind::TimedOut => BackendError::Timeout,
            None => BackendError::Other(error.to_string()),
        }
    }
}

#[cfg(feature = "hidapi")]
impl From<hidapi::HidError> for BackendError {
    fn from(error: hidapi::HidError) -> Self {
        match error {
            hidapi::HidError::IncompleteSendError { sent, all } => BackendError::ShortTransfer {
                expected: all,
                actual: sent,
            },
            hidapi::HidError::IoError { error } => error.into(),
            other => BackendError::Other(other.to_string()),
        }
    }
}

#[cfg(feature = "libusb")]
impl From<libusb::Error> for BackendError {
    fn from(error: libusb::Error) -> Self {
        match error {
            libusb::Error::Timeout => BackendError::Timeout,
            libusb::Error::NotFound | libusb::Error::NoDevice => BackendError::NotFound,
            other => BackendError::Usb(other),
        }
    }
}

/// Errors which make opening a [`Session`](crate::Session) fail.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("unable to open device {path}: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: BackendError,
    },
    #[error("unable to query report capabilities of {path}: {source}")]
    Capabilities {
        path: String,
        #[source]
        source: BackendError,
    },
    #[error("input and output report sizes do not match ({input} != {output})")]
    AsymmetricReports { input: usize, output: usize },
    #[error("detected report size ({0}) is not 64, 512 or 1024")]
    UnsupportedReportSize(usize),
}

/// Errors of a single command exchange.
///
/// After any of these the probe state is unknown. Whether to close and
/// reopen the session is up to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("session is not open")]
    NotOpen,
    #[error("empty request, a command opcode is required")]
    EmptyRequest,
    #[error("request of {len} bytes does not fit a {report_size} byte report")]
    RequestTooLarge { len: usize, report_size: usize },
    #[error("debugger write failed: {0}")]
    WriteFailed(#[source] BackendError),
    #[error("debugger read failed: {0}")]
    ReadFailed(#[source] BackendError),
    #[error("invalid response received: request = {expected:#04x}, response = {actual:#04x}")]
    ProtocolMismatch { expected: u8, actual: u8 },
}

/// Errors while walking a HID report descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("report descriptor item at offset {0} is truncated")]
    Truncated(usize),
    #[error("pop without matching push at offset {0}")]
    UnbalancedPop(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_names_path_and_code() {
        let error = OpenError::DeviceUnavailable {
            path: "\\\\?\\hid#vid_03eb".to_string(),
            source: BackendError::Os {
                code: 5,
                message: "Access is denied.".to_string(),
            },
        };
        let text = error.to_string();
        assert!(text.contains("\\\\?\\hid#vid_03eb"));
        assert!(text.contains("0x00000005"));
    }

    #[test]
    fn mismatch_shows_both_opcodes() {
        let error = TransportError::ProtocolMismatch {
            expected: 0x05,
            actual: 0x00,
        };
        assert_eq!(
            error.to_string(),
            "invalid response received: request = 0x05, response = 0x00"
        );
    }

    #[test]
    fn io_error_keeps_os_code() {
        let error = BackendError::from(std::io::Error::from_raw_os_error(13));
        assert_eq!(error.os_code(), Some(13));
    }

    #[cfg(feature = "hidapi")]
    #[test]
    fn hidapi_io_error_keeps_os_code() {
        let error = BackendError::from(hidapi::HidError::IoError {
            error: std::io::Error::from_raw_os_error(2),
        });
        assert_eq!(error.os_code(), Some(2));

        let error = BackendError::from(hidapi::HidError::IoError {
            error: std::io::ErrorKind::TimedOut.into(),
        });
        assert!(matches!(error, BackendError::Timeout));
    }
}

use std::time::Duration;

use crate::error::BackendError;
use crate::probe_info::UsbId;

/// The report ID prefixed to every report. CMSIS-DAP probes don't use
/// numbered reports.
pub const REPORT_ID: u8 = 0x00;

/// The USB string descriptors a probe may report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringKind {
    Manufacturer,
    Product,
    SerialNumber,
}

/// Input and output report lengths of a HID device.
///
/// Both lengths include the leading report ID byte, the same way the Windows
/// HID stack reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportCapabilities {
    pub input_len: usize,
    pub output_len: usize,
}

impl ReportCapabilities {
    pub fn new(input_len: usize, output_len: usize) -> Self {
        Self {
            input_len,
            output_len,
        }
    }
}

/// A host HID stack which can list and open devices.
pub trait ProbeBackend {
    type Handle: ProbeHandle;

    /// Lists the paths of all HID devices present, in host order.
    ///
    /// An entry is an error when the backend found a device but couldn't
    /// resolve a path for it.
    fn device_paths(&self) -> Result<Vec<Result<String, BackendError>>, BackendError>;

    /// Opens the device at `path` for reading and writing.
    fn open(&self, path: &str) -> Result<Self::Handle, BackendError>;
}

/// An open HID device. Dropping the handle closes the device.
pub trait ProbeHandle {
    fn usb_id(&self) -> Result<UsbId, BackendError>;

    /// Reads one of the USB string descriptors.
    fn string(&self, kind: StringKind) -> Result<Option<String>, BackendError>;

    fn capabilities(&mut self) -> Result<ReportCapabilities, BackendError>;

    /// Writes a full report, report ID byte first. Returns the number of
    /// bytes written including the report ID.
    fn write_report(&mut self, report: &[u8]) -> Result<usize, BackendError>;

    /// Reads one report into `buf`, report ID byte first, and returns the
    /// number of bytes read including the report ID.
    ///
    /// `None` blocks until a report arrives.
    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, BackendError>;
}

//! HID access through the OS HID stack, using `hidapi`.

use std::ffi::CString;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};

use crate::debug_probe::{ProbeBackend, ProbeHandle, ReportCapabilities, StringKind, REPORT_ID};
use crate::error::BackendError;
use crate::probe_info::UsbId;

/// Largest report descriptor the USB HID class allows.
const MAX_REPORT_DESCRIPTOR_SIZE: usize = 4096;

/// The OS HID stack.
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            api: HidApi::new()?,
        })
    }

    /// Rescans the HID devices. The device list is otherwise the one found
    /// when the backend was created.
    pub fn refresh(&mut self) -> Result<(), BackendError> {
        self.api.refresh_devices()?;
        Ok(())
    }
}

impl ProbeBackend for HidApiBackend {
    type Handle = HidApiHandle;

    fn device_paths(&self) -> Result<Vec<Result<String, BackendError>>, BackendError> {
        Ok(self
            .api
            .device_list()
            .map(|device| {
                device
                    .path()
                    .to_str()
                    .map(str::to_owned)
                    .map_err(|_| {
                        BackendError::InvalidPath(device.path().to_string_lossy().into_owned())
                    })
            })
            .collect())
    }

    fn open(&self, path: &str) -> Result<HidApiHandle, BackendError> {
        let c_path = CString::new(path).map_err(|_| BackendError::InvalidPath(path.to_string()))?;
        let device = self.api.open_path(&c_path)?;
        Ok(HidApiHandle { device })
    }
}

/// An open device of the OS HID stack.
pub struct HidApiHandle {
    device: HidDevice,
}

impl ProbeHandle for HidApiHandle {
    fn usb_id(&self) -> Result<UsbId, BackendError> {
        let info = self.device.get_device_info()?;
        Ok(UsbId::new(info.vendor_id(), info.product_id()))
    }

    fn string(&self, kind: StringKind) -> Result<Option<String>, BackendError> {
        let string = match kind {
            StringKind::Manufacturer => self.device.get_manufacturer_string()?,
            StringKind::Product => self.device.get_product_string()?,
            StringKind::SerialNumber => self.device.get_serial_number_string()?,
        };
        Ok(string)
    }

    fn capabilities(&mut self) -> Result<ReportCapabilities, BackendError> {
        let mut descriptor = [0u8; MAX_REPORT_DESCRIPTOR_SIZE];
        let len = self.device.get_report_descriptor(&mut descriptor)?;
        ReportCapabilities::from_report_descriptor(&descriptor[..len])
            .map_err(|e| BackendError::Other(e.to_string()))
    }

    fn write_report(&mut self, report: &[u8]) -> Result<usize, BackendError> {
        Ok(self.device.write(report)?)
    }

    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, BackendError> {
        if buf.is_empty() {
            return Ok(0);
        }

        // hidapi hands out reports without the report ID of unnumbered
        // reports.
        let n = match timeout {
            Some(timeout) => {
                let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
                match self.device.read_timeout(&mut buf[1..], millis)? {
                    0 => return Err(BackendError::Timeout),
                    n => n,
                }
            }
            None => self.device.read(&mut buf[1..])?,
        };

        buf[0] = REPORT_ID;
        Ok(n + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_devices() {
        // Hosts without a HID subsystem can't create the backend.
        if let Ok(backend) = HidApiBackend::new() {
            for dap in crate::enumerate(&backend, 16) {
                assert!(dap.product.contains("CMSIS-DAP"));
            }
        }
    }
}

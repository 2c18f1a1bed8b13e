//! Simulated HID devices.
//!
//! Lets the enumeration and transport logic, and protocol layers built on
//! top of it, run without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::debug_probe::{ProbeBackend, ProbeHandle, ReportCapabilities, StringKind};
use crate::error::BackendError;
use crate::probe_info::UsbId;

/// Produces the report a simulated device answers to a written report.
pub type Responder = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Bookkeeping shared between a [`MockDevice`] and its open handles.
#[derive(Debug, Default)]
pub struct MockLog {
    /// Every report written to the device, report ID included.
    pub writes: Vec<Vec<u8>>,
    /// Number of reads served.
    pub reads: usize,
    /// The timeout passed to every read attempt, served or not.
    pub read_timeouts: Vec<Option<Duration>>,
    /// Number of times the device was opened.
    pub opens: usize,
    /// Number of handles currently open.
    pub open_handles: usize,
}

/// A simulated HID device.
#[derive(Clone)]
pub struct MockDevice {
    /// `None` simulates a device whose path can't be resolved.
    pub path: Option<String>,
    pub usb_id: UsbId,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub capabilities: ReportCapabilities,
    /// OS error code returned when the device is opened, if any.
    pub open_error: Option<i32>,
    /// Makes the VID:PID query of an open handle fail.
    pub fail_usb_id: bool,
    pub fail_writes: bool,
    pub fail_reads: bool,
    /// Accepts writes but never answers them.
    pub silent: bool,
    pub responder: Responder,
    log: Arc<Mutex<MockLog>>,
}

impl MockDevice {
    /// A full speed CMSIS-DAP probe which echoes every report back.
    pub fn cmsis_dap<P: Into<String>>(path: P, usb_id: UsbId) -> Self {
        Self {
            path: Some(path.into()),
            usb_id,
            manufacturer: Some("Mock Corp.".to_string()),
            product: Some("Mock CMSIS-DAP".to_string()),
            serial: Some("MOCK0001".to_string()),
            capabilities: ReportCapabilities::new(65, 65),
            open_error: None,
            fail_usb_id: false,
            fail_writes: false,
            fail_reads: false,
            silent: false,
            responder: Arc::new(|report: &[u8]| report.to_vec()),
            log: Arc::new(Mutex::new(MockLog::default())),
        }
    }

    pub fn with_product<P: Into<String>>(mut self, product: Option<P>) -> Self {
        self.product = product.map(Into::into);
        self
    }

    pub fn with_serial<S: Into<String>>(mut self, serial: Option<S>) -> Self {
        self.serial = serial.map(Into::into);
        self
    }

    pub fn with_capabilities(mut self, input_len: usize, output_len: usize) -> Self {
        self.capabilities = ReportCapabilities::new(input_len, output_len);
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    pub fn unresolvable(mut self) -> Self {
        self.path = None;
        self
    }

    pub fn failing_open(mut self, code: i32) -> Self {
        self.open_error = Some(code);
        self
    }

    pub fn failing_attributes(mut self) -> Self {
        self.fail_usb_id = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Shared view of what happened to this device so far.
    pub fn log(&self) -> MutexGuard<'_, MockLog> {
        lock(&self.log)
    }
}

fn lock(log: &Mutex<MockLog>) -> MutexGuard<'_, MockLog> {
    // A test that panicked while holding the lock leaves the log usable.
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A backend serving a fixed list of simulated devices.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub devices: Vec<MockDevice>,
    /// Makes listing the devices fail as a whole.
    pub unavailable: bool,
}

impl MockBackend {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            unavailable: false,
        }
    }

    /// Number of handles currently open across all devices.
    pub fn open_handles(&self) -> usize {
        self.devices.iter().map(|device| device.log().open_handles).sum()
    }
}

impl ProbeBackend for MockBackend {
    type Handle = MockHandle;

    fn device_paths(&self) -> Result<Vec<Result<String, BackendError>>, BackendError> {
        if self.unavailable {
            return Err(BackendError::Other("HID subsystem unavailable".to_string()));
        }
        Ok(self
            .devices
            .iter()
            .map(|device| device.path.clone().ok_or(BackendError::NotFound))
            .collect())
    }

    fn open(&self, path: &str) -> Result<MockHandle, BackendError> {
        let device = self
            .devices
            .iter()
            .find(|device| device.path.as_deref() == Some(path))
            .ok_or(BackendError::NotFound)?;

        if let Some(code) = device.open_error {
            return Err(BackendError::Os {
                code,
                message: "access denied".to_string(),
            });
        }

        {
            let mut log = device.log();
            log.opens += 1;
            log.open_handles += 1;
        }

        Ok(MockHandle {
            device: device.clone(),
            pending: VecDeque::new(),
        })
    }
}

/// An open simulated device.
pub struct MockHandle {
    device: MockDevice,
    pending: VecDeque<Vec<u8>>,
}

impl ProbeHandle for MockHandle {
    fn usb_id(&self) -> Result<UsbId, BackendError> {
        if self.device.fail_usb_id {
            return Err(BackendError::Os {
                code: 5,
                message: "input/output error".to_string(),
            });
        }
        Ok(self.device.usb_id)
    }

    fn string(&self, kind: StringKind) -> Result<Option<String>, BackendError> {
        Ok(match kind {
            StringKind::Manufacturer => self.device.manufacturer.clone(),
            StringKind::Product => self.device.product.clone(),
            StringKind::SerialNumber => self.device.serial.clone(),
        })
    }

    fn capabilities(&mut self) -> Result<ReportCapabilities, BackendError> {
        Ok(self.device.capabilities)
    }

    fn write_report(&mut self, report: &[u8]) -> Result<usize, BackendError> {
        if self.device.fail_writes {
            return Err(BackendError::Os {
                code: 31,
                message: "device not functioning".to_string(),
            });
        }
        self.device.log().writes.push(report.to_vec());
        if !self.device.silent {
            self.pending.push_back((self.device.responder)(report));
        }
        Ok(report.len())
    }

    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, BackendError> {
        self.device.log().read_timeouts.push(timeout);
        if self.device.fail_reads {
            return Err(BackendError::Os {
                code: 1167,
                message: "device not connected".to_string(),
            });
        }
        // Nothing will ever arrive, so a blocking read would hang.
        let report = self.pending.pop_front().ok_or(BackendError::Timeout)?;
        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);
        self.device.log().reads += 1;
        Ok(len)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.device.log().open_handles -= 1;
    }
}

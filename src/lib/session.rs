use std::time::Duration;

use crate::debug_probe::{ProbeBackend, ProbeHandle, ReportCapabilities};
use crate::error::OpenError;
use crate::probe_info::{DapVersion, ProbeInfo};

/// The HID report sizes CMSIS-DAP probes use, report ID excluded.
pub const SUPPORTED_REPORT_SIZES: [usize; 3] = [64, 512, 1024];

/// Options for opening a [`Session`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// The protocol version the caller is going to speak. The transport
    /// only records it.
    pub version: DapVersion,
    /// How long to wait for a response report. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(version: DapVersion) -> Self {
        Self {
            version,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An open connection to one CMSIS-DAP probe.
///
/// The report size is fixed when the session is opened. Commands are
/// exchanged with [`Session::send`].
pub struct Session<H: ProbeHandle> {
    pub(crate) handle: Option<H>,
    pub(crate) path: String,
    pub(crate) report_size: usize,
    pub(crate) config: SessionConfig,
    /// Report buffer, `report_size + 1` bytes.
    pub(crate) buffer: Vec<u8>,
}

impl<H: ProbeHandle> Session<H> {
    /// Opens the probe described by `info`.
    pub fn open<B>(backend: &B, info: &ProbeInfo, version: DapVersion) -> Result<Self, OpenError>
    where
        B: ProbeBackend<Handle = H>,
    {
        Self::open_with(backend, info, SessionConfig::new(version))
    }

    pub fn open_with<B>(
        backend: &B,
        info: &ProbeInfo,
        config: SessionConfig,
    ) -> Result<Self, OpenError>
    where
        B: ProbeBackend<Handle = H>,
    {
        if !info.supports(config.version) {
            log::debug!(
                "{} does not advertise {:?}, opening anyway",
                info.path,
                config.version
            );
        }

        let handle = backend
            .open(&info.path)
            .map_err(|source| OpenError::DeviceUnavailable {
                path: info.path.clone(),
                source,
            })?;

        Self::from_handle(handle, info.path.clone(), config)
    }

    /// Wraps an already open device handle.
    pub fn from_handle(
        mut handle: H,
        path: String,
        config: SessionConfig,
    ) -> Result<Self, OpenError> {
        let capabilities = handle
            .capabilities()
            .map_err(|source| OpenError::Capabilities {
                path: path.clone(),
                source,
            })?;
        let report_size = report_size(capabilities)?;

        log::debug!(
            "Opened {} with report size {} for CMSIS-DAP {:?}",
            path,
            report_size,
            config.version
        );

        Ok(Self {
            handle: Some(handle),
            path,
            report_size,
            config,
            buffer: vec![0; report_size + 1],
        })
    }

    /// Closes the device. Does nothing if it is already closed.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            log::debug!("Closed {}", self.path);
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Data bytes per report, report ID excluded.
    pub fn report_size(&self) -> usize {
        self.report_size
    }

    pub fn version(&self) -> DapVersion {
        self.config.version
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Derives the report size from the device's report lengths.
pub fn report_size(capabilities: ReportCapabilities) -> Result<usize, OpenError> {
    let input = capabilities.input_len.saturating_sub(1);
    let output = capabilities.output_len.saturating_sub(1);

    if input != output {
        return Err(OpenError::AsymmetricReports { input, output });
    }

    if !SUPPORTED_REPORT_SIZES.contains(&input) {
        return Err(OpenError::UnsupportedReportSize(input));
    }

    Ok(input)
}

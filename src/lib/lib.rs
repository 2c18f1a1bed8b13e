//! Host side enumeration and command transport for CMSIS-DAP debug probes
//! attached over USB HID.
//!
//! [`enumerate`] lists the probes a backend can see, [`Session::open`]
//! connects to one of them and [`Session::send`] exchanges one DAP command
//! with it. What the command bytes mean is up to the caller.

pub mod debug_probe;
pub mod enumerate;
pub mod error;
pub mod known_probes;
pub mod mock;
pub mod probe_info;
pub mod report_descriptor;
pub mod session;
pub mod transport;

#[cfg(feature = "hidapi")]
pub mod hidapi_backend;
#[cfg(feature = "libusb")]
pub mod usb_interface;

pub use crate::debug_probe::{ProbeBackend, ProbeHandle, ReportCapabilities, StringKind};
pub use crate::enumerate::enumerate;
pub use crate::error::{BackendError, DescriptorError, OpenError, TransportError};
pub use crate::known_probes::is_known_probe_identity;
pub use crate::probe_info::{DapVersion, DapVersions, ProbeInfo, UsbId};
pub use crate::session::{Session, SessionConfig};
pub use crate::transport::frame_request;

#[cfg(feature = "hidapi")]
pub use crate::hidapi_backend::HidApiBackend;
#[cfg(feature = "libusb")]
pub use crate::usb_interface::LibusbBackend;

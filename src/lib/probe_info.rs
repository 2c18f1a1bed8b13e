use std::fmt;

use bitflags::bitflags;

use crate::known_probes;

bitflags! {
    /// The CMSIS-DAP protocol variants a probe advertises.
    pub struct DapVersions: u8 {
        /// CMSIS-DAP v1, commands carried in HID reports.
        const V1 = 0b0000_0001;
        /// CMSIS-DAP v2, commands carried over bulk endpoints.
        const V2 = 0b0000_0010;
    }
}

/// A single CMSIS-DAP protocol version, as requested when opening a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DapVersion {
    V1,
    V2,
}

impl DapVersion {
    pub fn flag(self) -> DapVersions {
        match self {
            DapVersion::V1 => DapVersions::V1,
            DapVersion::V2 => DapVersions::V2,
        }
    }
}

impl Default for DapVersion {
    fn default() -> Self {
        DapVersion::V1
    }
}

/// Vendor and product ID of a USB device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbId {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Describes a discovered CMSIS-DAP probe.
///
/// The strings are whatever the device reported and are empty when it
/// reported nothing. `path` is only meaningful to the backend which produced
/// it and is used to open a [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeInfo {
    pub path: String,
    pub serial: String,
    pub manufacturer: String,
    pub product: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub versions: DapVersions,
}

impl ProbeInfo {
    pub fn usb_id(&self) -> UsbId {
        UsbId::new(self.vendor_id, self.product_id)
    }

    /// Whether the VID/PID pair is one of the known debug probes.
    ///
    /// This is independent of the product string check done during
    /// enumeration.
    pub fn is_known_identity(&self) -> bool {
        known_probes::is_known_probe_identity(self.vendor_id, self.product_id)
    }

    pub fn supports(&self, version: DapVersion) -> bool {
        self.versions.contains(version.flag())
    }
}

impl fmt::Display for ProbeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.usb_id(),
            self.serial,
            self.manufacturer,
            self.product
        )
    }
}

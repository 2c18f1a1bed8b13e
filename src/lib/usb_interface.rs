//! HID access through raw USB, using `libusb`.
//!
//! Talks to the HID interface of a probe directly over its interrupt
//! endpoints, bypassing the OS HID stack. The kernel driver is detached
//! from the interface while it is claimed.

use std::fmt;
use std::time::Duration;

use libusb::{
    Context, Device, DeviceHandle, Direction, Language, Recipient, RequestType, TransferType,
};

use crate::debug_probe::{ProbeBackend, ProbeHandle, ReportCapabilities, StringKind, REPORT_ID};
use crate::error::BackendError;
use crate::probe_info::UsbId;

/// The USB HID interface class.
const HID_CLASS: u8 = 0x03;

const GET_DESCRIPTOR: u8 = 0x06;
const HID_REPORT_DESCRIPTOR: u16 = 0x22;
const HID_SET_REPORT: u8 = 0x09;
const HID_OUTPUT_REPORT: u16 = 0x02;

/// Timeout for descriptor requests.
pub const TIMEOUT: Duration = Duration::from_millis(1000);

/// Identifies a HID interface as `bus-address:interface`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct UsbPath {
    bus: u8,
    address: u8,
    interface: u8,
}

impl UsbPath {
    fn parse(path: &str) -> Option<Self> {
        let (device, interface) = split_once(path, ':')?;
        let (bus, address) = split_once(device, '-')?;
        Some(Self {
            bus: bus.parse().ok()?,
            address: address.parse().ok()?,
            interface: interface.parse().ok()?,
        })
    }

    fn matches(&self, device: &Device<'_>) -> bool {
        device.bus_number() == self.bus && device.address() == self.address
    }
}

impl fmt::Display for UsbPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}-{:03}:{}", self.bus, self.address, self.interface)
    }
}

fn split_once(s: &str, separator: char) -> Option<(&str, &str)> {
    let mut parts = s.splitn(2, separator);
    Some((parts.next()?, parts.next()?))
}

/// Interrupt endpoints of a HID interface.
#[derive(Clone, Copy, Debug)]
struct HidEndpoints {
    ep_in: u8,
    ep_out: Option<u8>,
}

/// Numbers of all HID interfaces in the active configuration.
fn hid_interfaces(device: &Device<'_>) -> Result<Vec<u8>, libusb::Error> {
    let config = device.active_config_descriptor()?;
    let mut numbers = Vec::new();
    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            let number = descriptor.interface_number();
            if descriptor.class_code() == HID_CLASS && !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    Ok(numbers)
}

fn hid_endpoints(device: &Device<'_>, number: u8) -> Result<Option<HidEndpoints>, libusb::Error> {
    let config = device.active_config_descriptor()?;
    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            if descriptor.interface_number() != number || descriptor.class_code() != HID_CLASS {
                continue;
            }

            let mut ep_in = None;
            let mut ep_out = None;
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Interrupt {
                    continue;
                }
                match endpoint.direction() {
                    Direction::In => ep_in = Some(endpoint.address()),
                    Direction::Out => ep_out = Some(endpoint.address()),
                }
            }

            if let Some(ep_in) = ep_in {
                return Ok(Some(HidEndpoints { ep_in, ep_out }));
            }
        }
    }
    Ok(None)
}

/// Raw USB access to HID interfaces.
pub struct LibusbBackend {
    context: Context,
}

impl LibusbBackend {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl<'a> ProbeBackend for &'a LibusbBackend {
    type Handle = LibusbHandle<'a>;

    fn device_paths(&self) -> Result<Vec<Result<String, BackendError>>, BackendError> {
        let devices = self.context.devices()?;
        let mut paths = Vec::new();
        for device in devices.iter() {
            match hid_interfaces(&device) {
                Ok(interfaces) => paths.extend(interfaces.into_iter().map(|interface| {
                    Ok(UsbPath {
                        bus: device.bus_number(),
                        address: device.address(),
                        interface,
                    }
                    .to_string())
                })),
                Err(e) => paths.push(Err(e.into())),
            }
        }
        Ok(paths)
    }

    fn open(&self, path: &str) -> Result<LibusbHandle<'a>, BackendError> {
        let backend: &'a LibusbBackend = *self;
        let usb_path =
            UsbPath::parse(path).ok_or_else(|| BackendError::InvalidPath(path.to_string()))?;

        let devices = backend.context.devices()?;
        let device = devices
            .iter()
            .find(|device| usb_path.matches(device))
            .ok_or(BackendError::NotFound)?;

        let descriptor = device.device_descriptor()?;
        let endpoints =
            hid_endpoints(&device, usb_path.interface)?.ok_or(BackendError::NotFound)?;

        // The interface is only claimed once reports are exchanged, so
        // looking at a keyboard or mouse leaves its kernel driver bound.
        let handle = device.open()?;
        let language = handle
            .read_languages(TIMEOUT)
            .ok()
            .and_then(|languages| languages.first().cloned());

        log::debug!("Opened HID interface {} ({:?})", usb_path, endpoints);

        Ok(LibusbHandle {
            handle,
            interface: usb_path.interface,
            claim: ClaimState::default(),
            endpoints,
            usb_id: UsbId::new(descriptor.vendor_id(), descriptor.product_id()),
            language,
            string_indexes: [
                descriptor.manufacturer_string_index(),
                descriptor.product_string_index(),
                descriptor.serial_number_string_index(),
            ],
        })
    }
}

/// The interface operations needed to take a HID interface over from the
/// kernel and give it back.
trait InterfaceClaim {
    fn kernel_driver_active(&self, interface: u8) -> libusb::Result<bool>;
    fn detach_kernel_driver(&mut self, interface: u8) -> libusb::Result<()>;
    fn attach_kernel_driver(&mut self, interface: u8) -> libusb::Result<()>;
    fn claim_interface(&mut self, interface: u8) -> libusb::Result<()>;
    fn release_interface(&mut self, interface: u8) -> libusb::Result<()>;
}

impl<'a> InterfaceClaim for DeviceHandle<'a> {
    fn kernel_driver_active(&self, interface: u8) -> libusb::Result<bool> {
        DeviceHandle::kernel_driver_active(self, interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> libusb::Result<()> {
        DeviceHandle::detach_kernel_driver(self, interface)
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> libusb::Result<()> {
        DeviceHandle::attach_kernel_driver(self, interface)
    }

    fn claim_interface(&mut self, interface: u8) -> libusb::Result<()> {
        DeviceHandle::claim_interface(self, interface)
    }

    fn release_interface(&mut self, interface: u8) -> libusb::Result<()> {
        DeviceHandle::release_interface(self, interface)
    }
}

/// What was done to an interface, so that only that is undone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ClaimState {
    claimed: bool,
    detached: bool,
}

impl ClaimState {
    /// Claims `interface`, detaching a bound kernel driver first. Does
    /// nothing if the interface is already claimed.
    fn claim<U: InterfaceClaim>(&mut self, usb: &mut U, interface: u8) -> libusb::Result<()> {
        if self.claimed {
            return Ok(());
        }

        if !self.detached && usb.kernel_driver_active(interface).unwrap_or(false) {
            usb.detach_kernel_driver(interface)?;
            self.detached = true;
        }
        usb.claim_interface(interface)?;
        self.claimed = true;
        Ok(())
    }

    /// Releases the interface and reattaches the kernel driver, as far as
    /// they were taken. Errors are ignored.
    fn release<U: InterfaceClaim>(&mut self, usb: &mut U, interface: u8) {
        if self.claimed {
            let _ = usb.release_interface(interface);
            self.claimed = false;
        }
        if self.detached {
            let _ = usb.attach_kernel_driver(interface);
            self.detached = false;
        }
    }
}

/// A HID interface, claimed on first use.
pub struct LibusbHandle<'a> {
    handle: DeviceHandle<'a>,
    interface: u8,
    claim: ClaimState,
    endpoints: HidEndpoints,
    usb_id: UsbId,
    language: Option<Language>,
    /// Manufacturer, product and serial number string indexes.
    string_indexes: [Option<u8>; 3],
}

impl<'a> LibusbHandle<'a> {
    /// Zero means no timeout to libusb.
    fn transfer_timeout(timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| Duration::from_millis(0))
    }

    fn claim(&mut self) -> Result<(), BackendError> {
        let was_claimed = self.claim.claimed;
        self.claim.claim(&mut self.handle, self.interface)?;
        if !was_claimed {
            log::debug!("Claimed HID interface {}", self.interface);
        }
        Ok(())
    }
}

impl<'a> ProbeHandle for LibusbHandle<'a> {
    fn usb_id(&self) -> Result<UsbId, BackendError> {
        Ok(self.usb_id)
    }

    fn string(&self, kind: StringKind) -> Result<Option<String>, BackendError> {
        let index = match kind {
            StringKind::Manufacturer => self.string_indexes[0],
            StringKind::Product => self.string_indexes[1],
            StringKind::SerialNumber => self.string_indexes[2],
        };
        match (self.language, index) {
            (Some(language), Some(index)) => Ok(Some(
                self.handle.read_string_descriptor(language, index, TIMEOUT)?,
            )),
            _ => Ok(None),
        }
    }

    fn capabilities(&mut self) -> Result<ReportCapabilities, BackendError> {
        // Interface requests need the interface claimed.
        self.claim()?;

        let mut descriptor = [0u8; 4096];
        let len = self.handle.read_control(
            libusb::request_type(Direction::In, RequestType::Standard, Recipient::Interface),
            GET_DESCRIPTOR,
            HID_REPORT_DESCRIPTOR << 8,
            u16::from(self.interface),
            &mut descriptor,
            TIMEOUT,
        )?;
        ReportCapabilities::from_report_descriptor(&descriptor[..len])
            .map_err(|e| BackendError::Other(e.to_string()))
    }

    fn write_report(&mut self, report: &[u8]) -> Result<usize, BackendError> {
        if report.is_empty() {
            return Ok(0);
        }
        self.claim()?;

        // The report ID of unnumbered reports isn't sent over the wire.
        let written = match self.endpoints.ep_out {
            Some(ep_out) => self.handle.write_interrupt(ep_out, &report[1..], TIMEOUT)?,
            None => self.handle.write_control(
                libusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface),
                HID_SET_REPORT,
                (HID_OUTPUT_REPORT << 8) | u16::from(REPORT_ID),
                u16::from(self.interface),
                &report[1..],
                TIMEOUT,
            )?,
        };
        Ok(written + 1)
    }

    fn read_report(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, BackendError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.claim()?;

        let read = self.handle.read_interrupt(
            self.endpoints.ep_in,
            &mut buf[1..],
            Self::transfer_timeout(timeout),
        )?;
        buf[0] = REPORT_ID;
        Ok(read + 1)
    }
}

impl<'a> Drop for LibusbHandle<'a> {
    fn drop(&mut self) {
        self.claim.release(&mut self.handle, self.interface);
    }
}

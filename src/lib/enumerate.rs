use crate::debug_probe::{ProbeBackend, ProbeHandle, StringKind};
use crate::probe_info::{DapVersions, ProbeInfo};

/// The product string token which identifies a CMSIS-DAP probe.
pub const CMSIS_DAP_SIGNATURE: &str = "CMSIS-DAP";

/// Whether a HID product string identifies a CMSIS-DAP probe.
pub fn is_cmsis_dap_product(product: &str) -> bool {
    product.contains(CMSIS_DAP_SIGNATURE)
}

/// Lists at most `capacity` CMSIS-DAP probes, in host enumeration order.
///
/// Devices which can't be resolved, opened or identified are skipped, and a
/// backend that can't list devices at all yields no probes. Every device
/// opened here is closed again before the next one is looked at.
pub fn enumerate<B: ProbeBackend>(backend: &B, capacity: usize) -> Vec<ProbeInfo> {
    let paths = match backend.device_paths() {
        Ok(paths) => paths,
        Err(e) => {
            log::debug!("Unable to list HID devices: {}", e);
            return vec![];
        }
    };

    let mut probes = Vec::new();
    for path in paths {
        if probes.len() >= capacity {
            break;
        }

        let path = match path {
            Ok(path) => path,
            Err(e) => {
                log::debug!("Skipping HID device without a usable path: {}", e);
                continue;
            }
        };

        let handle = match backend.open(&path) {
            Ok(handle) => handle,
            Err(e) => {
                log::debug!("Skipping {}, unable to open: {}", path, e);
                continue;
            }
        };

        if let Some(info) = probe_info(&handle, path) {
            log::debug!("Found CMSIS-DAP probe {}", info);
            probes.push(info);
        }
    }

    log::debug!("Found {} CMSIS-DAP probes", probes.len());
    probes
}

/// Reads the descriptor fields of an open device, returning `None` when it
/// isn't a CMSIS-DAP probe.
fn probe_info<H: ProbeHandle>(handle: &H, path: String) -> Option<ProbeInfo> {
    let usb_id = match handle.usb_id() {
        Ok(usb_id) => usb_id,
        Err(e) => {
            log::debug!("Skipping {}, unable to read attributes: {}", path, e);
            return None;
        }
    };

    let product = read_string(handle, StringKind::Product);
    if !is_cmsis_dap_product(&product) {
        log::trace!("Skipping {} ({}), product {:?}", path, usb_id, product);
        return None;
    }

    Some(ProbeInfo {
        serial: read_string(handle, StringKind::SerialNumber),
        manufacturer: read_string(handle, StringKind::Manufacturer),
        product,
        vendor_id: usb_id.vendor_id,
        product_id: usb_id.product_id,
        versions: DapVersions::V1,
        path,
    })
}

fn read_string<H: ProbeHandle>(handle: &H, kind: StringKind) -> String {
    handle.string(kind).ok().flatten().unwrap_or_default()
}

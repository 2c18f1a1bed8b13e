use lazy_static::lazy_static;

use std::collections::HashMap;

/// The Atmel (now Microchip) USB VendorID.
pub const VID_ATMEL: u16 = 0x03eb;

pub const PID_ATMEL_EDBG: u16 = 0x2111;
pub const PID_ATMEL_MEDBG: u16 = 0x2145;
pub const PID_ATMEL_ICE: u16 = 0x2141;
pub const PID_ARDUINO_ZERO: u16 = 0x2157;

lazy_static! {
    /// Map of USB VID to the debug probe models known under it.
    static ref KNOWN_PROBES: HashMap<u16, Vec<ProbeModel>> = {
        let mut m = HashMap::new();
        m.insert(VID_ATMEL, vec![
            ProbeModel::new("EDBG",         PID_ATMEL_EDBG),
            ProbeModel::new("mEDBG",        PID_ATMEL_MEDBG),
            ProbeModel::new("Atmel-ICE",    PID_ATMEL_ICE),
            ProbeModel::new("Arduino Zero", PID_ARDUINO_ZERO),
        ]);
        m
    };
}

/// A debug probe model on the allow-list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeModel {
    pub name: String,
    pub usb_pid: u16,
}

impl ProbeModel {
    pub fn new<N: Into<String>>(name: N, usb_pid: u16) -> Self {
        Self {
            name: name.into(),
            usb_pid,
        }
    }
}

/// Looks up the model of a known probe.
pub fn probe_model(vendor_id: u16, product_id: u16) -> Option<&'static ProbeModel> {
    KNOWN_PROBES
        .get(&vendor_id)
        .and_then(|models| models.iter().find(|model| model.usb_pid == product_id))
}

/// Checks a VID/PID pair against the static list of known debug probes.
pub fn is_known_probe_identity(vendor_id: u16, product_id: u16) -> bool {
    probe_model(vendor_id, product_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atmel_identities_are_known() {
        for pid in &[PID_ATMEL_EDBG, PID_ATMEL_MEDBG, PID_ATMEL_ICE, PID_ARDUINO_ZERO] {
            assert!(is_known_probe_identity(VID_ATMEL, *pid));
        }
        assert_eq!(probe_model(VID_ATMEL, PID_ATMEL_ICE).unwrap().name, "Atmel-ICE");
    }

    #[test]
    fn unknown_pairs_are_rejected() {
        assert!(!is_known_probe_identity(VID_ATMEL, 0x0001));
        assert!(!is_known_probe_identity(0x0d28, PID_ATMEL_EDBG));
    }
}

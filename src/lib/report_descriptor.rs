//! Report length calculation from a raw HID report descriptor.
//!
//! Backends which can't ask the OS for the report capabilities of a device
//! (everything but the Windows HID stack) get them from the report
//! descriptor instead. The lengths come out the way `HidP_GetCaps` reports
//! them: the longest report of each direction plus one report ID byte.

use std::collections::HashMap;

use crate::debug_probe::ReportCapabilities;
use crate::error::DescriptorError;

const LONG_ITEM_PREFIX: u8 = 0xfe;

const TYPE_MAIN: u8 = 0;
const TYPE_GLOBAL: u8 = 1;

const MAIN_INPUT: u8 = 0x8;
const MAIN_OUTPUT: u8 = 0x9;

const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xa;
const GLOBAL_POP: u8 = 0xb;

#[derive(Clone, Copy, Default)]
struct GlobalState {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

impl ReportCapabilities {
    /// Computes the report capabilities described by `descriptor`.
    ///
    /// A direction without any report has a length of zero.
    pub fn from_report_descriptor(descriptor: &[u8]) -> Result<Self, DescriptorError> {
        let mut globals = GlobalState::default();
        let mut stack = Vec::new();
        let mut input_bits: HashMap<u8, u32> = HashMap::new();
        let mut output_bits: HashMap<u8, u32> = HashMap::new();

        let mut offset = 0;
        while offset < descriptor.len() {
            let prefix = descriptor[offset];

            if prefix == LONG_ITEM_PREFIX {
                let size = *descriptor
                    .get(offset + 1)
                    .ok_or(DescriptorError::Truncated(offset))? as usize;
                let end = offset + 3 + size;
                if end > descriptor.len() {
                    return Err(DescriptorError::Truncated(offset));
                }
                offset = end;
                continue;
            }

            let size = match prefix & 0x03 {
                3 => 4,
                n => n as usize,
            };
            let data = descriptor
                .get(offset + 1..offset + 1 + size)
                .ok_or(DescriptorError::Truncated(offset))?;
            let value = data
                .iter()
                .rev()
                .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte));

            let item_type = (prefix >> 2) & 0x03;
            let tag = prefix >> 4;
            match (item_type, tag) {
                (TYPE_MAIN, MAIN_INPUT) => {
                    let bits = globals.report_size.saturating_mul(globals.report_count);
                    let total = input_bits.entry(globals.report_id).or_insert(0);
                    *total = total.saturating_add(bits);
                }
                (TYPE_MAIN, MAIN_OUTPUT) => {
                    let bits = globals.report_size.saturating_mul(globals.report_count);
                    let total = output_bits.entry(globals.report_id).or_insert(0);
                    *total = total.saturating_add(bits);
                }
                (TYPE_GLOBAL, GLOBAL_REPORT_SIZE) => globals.report_size = value,
                (TYPE_GLOBAL, GLOBAL_REPORT_COUNT) => globals.report_count = value,
                (TYPE_GLOBAL, GLOBAL_REPORT_ID) => globals.report_id = value as u8,
                (TYPE_GLOBAL, GLOBAL_PUSH) => stack.push(globals),
                (TYPE_GLOBAL, GLOBAL_POP) => {
                    globals = stack.pop().ok_or(DescriptorError::UnbalancedPop(offset))?;
                }
                _ => (),
            }

            offset += 1 + size;
        }

        Ok(ReportCapabilities::new(
            report_length(&input_bits),
            report_length(&output_bits),
        ))
    }
}

/// Length in bytes of the longest report, plus the report ID byte.
fn report_length(bits_per_report: &HashMap<u8, u32>) -> usize {
    bits_per_report
        .values()
        .max()
        .map_or(0, |bits| ((*bits as usize) + 7) / 8 + 1)
}

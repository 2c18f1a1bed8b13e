use log::log_enabled;

use crate::debug_probe::{ProbeHandle, REPORT_ID};
use crate::error::{BackendError, TransportError};
use crate::session::Session;

/// Fill value for the unused tail of an outbound report.
pub const PADDING: u8 = 0xff;

/// Builds the outbound report for `request`: the report ID, the request and
/// `PADDING` up to `report_size + 1` bytes.
pub fn frame_request(request: &[u8], report_size: usize) -> Result<Vec<u8>, TransportError> {
    let too_large = || TransportError::RequestTooLarge {
        len: request.len(),
        report_size,
    };
    if request.len() > report_size {
        return Err(too_large());
    }
    let mut report = vec![0; report_size.checked_add(1).ok_or_else(too_large)?];
    fill_report(&mut report, request)?;
    Ok(report)
}

fn fill_report(report: &mut [u8], request: &[u8]) -> Result<(), TransportError> {
    let report_size = report.len() - 1;
    if request.len() > report_size {
        return Err(TransportError::RequestTooLarge {
            len: request.len(),
            report_size,
        });
    }

    report[0] = REPORT_ID;
    report[1..=request.len()].copy_from_slice(request);
    for byte in &mut report[request.len() + 1..] {
        *byte = PADDING;
    }
    Ok(())
}

impl<H: ProbeHandle> Session<H> {
    /// Sends one command and receives its response.
    ///
    /// `request` starts with the command opcode. The response payload
    /// following the echoed opcode is copied into `response`, as far as it
    /// fits. The returned length is that of the whole payload the probe sent
    /// and exceeds `response.len()` when the payload was truncated.
    ///
    /// Exactly one report is written and one is read. Nothing is retried.
    pub fn send(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotOpen)?;
        let opcode = *request.first().ok_or(TransportError::EmptyRequest)?;
        let report = &mut self.buffer[..];

        fill_report(report, request)?;
        trace_buffer("Transmit buffer", report);

        let written = handle
            .write_report(report)
            .map_err(TransportError::WriteFailed)?;
        if written < report.len() {
            return Err(TransportError::WriteFailed(BackendError::ShortTransfer {
                expected: report.len(),
                actual: written,
            }));
        }

        let read = handle
            .read_report(report, self.config.timeout)
            .map_err(TransportError::ReadFailed)?;
        if read < 2 {
            return Err(TransportError::ReadFailed(BackendError::ShortTransfer {
                expected: report.len(),
                actual: read,
            }));
        }
        trace_buffer("Receive buffer", &report[..read]);

        if report[1] != opcode {
            return Err(TransportError::ProtocolMismatch {
                expected: opcode,
                actual: report[1],
            });
        }

        let len = read - 2;
        let copied = len.min(response.len());
        response[..copied].copy_from_slice(&report[2..2 + copied]);
        Ok(len)
    }
}

/// Trace log a buffer, leaving out the padding at its end.
fn trace_buffer(name: &str, buf: &[u8]) {
    if log_enabled!(log::Level::Trace) {
        let end = buf
            .iter()
            .rposition(|&x| x != PADDING)
            .map_or(1, |last| last + 1)
            .min(buf.len());
        log::trace!("{}: {:02X?}...", name, &buf[..end]);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{MockBackend, MockDevice};
    use crate::session::SessionConfig;
    use crate::probe_info::{DapVersion, DapVersions, ProbeInfo, UsbId};

    fn open(device: MockDevice) -> (MockBackend, Session<crate::mock::MockHandle>) {
        let backend = MockBackend::new(vec![device]);
        let info = ProbeInfo {
            path: "dap0".to_string(),
            serial: String::new(),
            manufacturer: String::new(),
            product: "Mock CMSIS-DAP".to_string(),
            vendor_id: 0x03eb,
            product_id: 0x2111,
            versions: DapVersions::V1,
        };
        let session = Session::open(&backend, &info, DapVersion::V1).unwrap();
        (backend, session)
    }

    fn device() -> MockDevice {
        MockDevice::cmsis_dap("dap0", UsbId::new(0x03eb, 0x2111))
    }

    /// A reply report: report ID, `opcode`, `payload` and zero fill.
    fn reply(opcode: u8, payload: &[u8], report_size: usize) -> Vec<u8> {
        let mut report = vec![0; report_size + 1];
        report[1] = opcode;
        report[2..2 + payload.len()].copy_from_slice(payload);
        report
    }

    #[test]
    fn framing_layout() {
        for report_size in &[64, 512, 1024] {
            for len in 0..=*report_size {
                let request: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
                let report = frame_request(&request, *report_size).unwrap();
                assert_eq!(report.len(), report_size + 1);
                assert_eq!(report[0], 0x00);
                assert_eq!(&report[1..=len], &request[..]);
                assert!(report[len + 1..].iter().all(|&b| b == 0xff));
            }
        }
    }

    #[test]
    fn oversized_request_is_rejected() {
        assert!(matches!(
            frame_request(&[0; 65], 64),
            Err(TransportError::RequestTooLarge {
                len: 65,
                report_size: 64
            })
        ));
    }

    #[test]
    fn unrepresentable_report_size_is_rejected() {
        assert!(matches!(
            frame_request(&[0x01], usize::MAX),
            Err(TransportError::RequestTooLarge {
                len: 1,
                report_size: usize::MAX
            })
        ));
    }

    #[test]
    fn send_writes_one_padded_report() {
        let (backend, mut session) = open(device());
        let mut response = [0u8; 8];
        session.send(&[0x00, 0xfe], &mut response).unwrap();

        let log = backend.devices[0].log();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.reads, 1);
        let written = &log.writes[0];
        assert_eq!(written.len(), 65);
        assert_eq!(&written[..3], &[0x00, 0x00, 0xfe]);
        assert!(written[3..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn response_payload_is_returned() {
        let (_backend, mut session) = open(
            device().with_responder(|_| vec![0x00, 0xab, 0x11, 0x22]),
        );
        let mut response = [0u8; 4];
        let len = session.send(&[0xab], &mut response).unwrap();
        assert_eq!(len, 2);
        assert_eq!(&response[..2], &[0x11, 0x22]);
        assert_eq!(&response[2..], &[0x00, 0x00]);
    }

    #[test]
    fn truncation_is_reported() {
        let payload: Vec<u8> = (1..=10).collect();
        let (_backend, mut session) = open(
            device().with_responder(move |_| reply(0x05, &payload, 64)),
        );
        let mut response = [0u8; 4];
        let len = session.send(&[0x05, 0x00, 0x01, 0x02], &mut response).unwrap();
        assert_eq!(len, 63);
        assert_eq!(response, [1, 2, 3, 4]);
    }

    #[test]
    fn opcode_mismatch_is_an_error() {
        let (_backend, mut session) = open(device().with_responder(|_| reply(0x00, &[0x00], 64)));
        let mut response = [0u8; 64];
        match session.send(&[0x05, 0x00], &mut response) {
            Err(TransportError::ProtocolMismatch {
                expected: 0x05,
                actual: 0x00,
            }) => (),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(response.iter().all(|&b| b == 0));
    }

    #[test]
    fn request_must_fit_report() {
        let (backend, mut session) = open(device());
        let request = [0x05; 65];
        assert!(matches!(
            session.send(&request, &mut []),
            Err(TransportError::RequestTooLarge { .. })
        ));
        assert!(matches!(
            session.send(&[], &mut []),
            Err(TransportError::EmptyRequest)
        ));
        assert!(backend.devices[0].log().writes.is_empty());
    }

    #[test]
    fn full_report_request_fits() {
        let (_backend, mut session) = open(device());
        let request = [0x06; 64];
        let mut response = [0u8; 64];
        let len = session.send(&request, &mut response).unwrap();
        assert_eq!(len, 63);
        assert_eq!(&response[..63], &request[1..]);
    }

    #[test]
    fn io_failures_are_surfaced() {
        let mut failing = device();
        failing.fail_writes = true;
        let (_backend, mut session) = open(failing);
        assert!(matches!(
            session.send(&[0x00], &mut []),
            Err(TransportError::WriteFailed(BackendError::Os { code: 31, .. }))
        ));

        let mut failing = device();
        failing.fail_reads = true;
        let (_backend, mut session) = open(failing);
        assert!(matches!(
            session.send(&[0x00], &mut []),
            Err(TransportError::ReadFailed(BackendError::Os { code: 1167, .. }))
        ));
    }

    #[test]
    fn unanswered_command_times_out() {
        let backend = MockBackend::new(vec![device().silent()]);
        let info = crate::enumerate(&backend, 1).remove(0);
        let config = SessionConfig::new(DapVersion::V1).with_timeout(Duration::from_millis(250));
        let mut session = Session::open_with(&backend, &info, config).unwrap();

        assert!(matches!(
            session.send(&[0x00, 0x01], &mut [0u8; 8]),
            Err(TransportError::ReadFailed(BackendError::Timeout))
        ));
        let log = backend.devices[0].log();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.reads, 0);
        assert_eq!(log.read_timeouts, [Some(Duration::from_millis(250))]);
    }

    #[test]
    fn blocking_read_by_default() {
        let (backend, mut session) = open(device());
        session.send(&[0x00, 0x01], &mut []).unwrap();
        assert_eq!(backend.devices[0].log().read_timeouts, [None]);
    }

    #[test]
    fn short_read_is_an_error() {
        let (_backend, mut session) = open(device().with_responder(|_| vec![0x00]));
        assert!(matches!(
            session.send(&[0x00], &mut []),
            Err(TransportError::ReadFailed(BackendError::ShortTransfer { actual: 1, .. }))
        ));
    }

    #[test]
    fn closed_session_refuses_commands() {
        let (_backend, mut session) = open(device());
        session.close();
        assert!(matches!(
            session.send(&[0x00], &mut []),
            Err(TransportError::NotOpen)
        ));
    }
}

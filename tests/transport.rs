use cmsisdap::known_probes::{PID_ATMEL_ICE, VID_ATMEL};
use cmsisdap::mock::{MockBackend, MockDevice};
use cmsisdap::{
    enumerate, is_known_probe_identity, DapVersion, OpenError, Session, TransportError, UsbId,
};

fn atmel_ice(path: &str) -> MockDevice {
    MockDevice::cmsis_dap(path, UsbId::new(VID_ATMEL, PID_ATMEL_ICE))
        .with_product(Some("Atmel-ICE CMSIS-DAP"))
}

#[test]
fn enumerate_open_send_close() {
    let backend = MockBackend::new(vec![
        MockDevice::cmsis_dap("kbd", UsbId::new(0x046d, 0xc31c)).with_product(Some("USB Keyboard")),
        atmel_ice("ice").with_responder(|_| {
            let mut reply = vec![0xff; 65];
            reply[..4].copy_from_slice(&[0x00, 0xab, 0x11, 0x22]);
            reply
        }),
    ]);

    let found = enumerate(&backend, 4);
    assert_eq!(found.len(), 1);
    let dap = &found[0];
    assert_eq!(dap.path, "ice");
    assert!(dap.is_known_identity());
    assert_eq!(backend.open_handles(), 0);

    let mut session = Session::open(&backend, dap, DapVersion::V1).unwrap();
    assert_eq!(session.report_size(), 64);

    let mut response = [0u8; 4];
    let len = session.send(&[0xab], &mut response).unwrap();
    assert_eq!(len, 63);
    assert_eq!(response, [0x11, 0x22, 0xff, 0xff]);

    {
        let log = backend.devices[1].log();
        let written = &log.writes[0];
        assert_eq!(written.len(), 65);
        assert_eq!(&written[..2], &[0x00, 0xab]);
        assert!(written[2..].iter().all(|&b| b == 0xff));
    }

    session.close();
    session.close();
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn short_reply_reports_its_own_length() {
    let backend = MockBackend::new(vec![
        atmel_ice("ice").with_responder(|_| vec![0x00, 0xab, 0x11, 0x22])
    ]);
    let found = enumerate(&backend, 1);
    let mut session = Session::open(&backend, &found[0], DapVersion::V1).unwrap();

    let mut response = [0u8; 4];
    let len = session.send(&[0xab, 0x00], &mut response).unwrap();
    assert_eq!(len, 2);
    assert_eq!(&response[..len], &[0x11, 0x22]);
}

#[test]
fn desynchronised_reply_is_rejected() {
    let backend = MockBackend::new(vec![
        atmel_ice("ice").with_responder(|report| {
            let mut reply = report.to_vec();
            reply[1] = reply[1].wrapping_add(1);
            reply
        })
    ]);
    let found = enumerate(&backend, 1);
    let mut session = Session::open(&backend, &found[0], DapVersion::V1).unwrap();

    for opcode in 0..=255u8 {
        match session.send(&[opcode], &mut [0u8; 64]) {
            Err(TransportError::ProtocolMismatch { expected, actual }) => {
                assert_eq!(expected, opcode);
                assert_eq!(actual, opcode.wrapping_add(1));
            }
            other => panic!("opcode {:#04x}: {:?}", opcode, other),
        }
    }
}

#[test]
fn allow_list_is_independent_of_enumeration() {
    let backend = MockBackend::new(vec![atmel_ice("ice").with_product(Some("Atmel-ICE"))]);
    assert!(enumerate(&backend, 4).is_empty());
    assert!(is_known_probe_identity(VID_ATMEL, PID_ATMEL_ICE));
}

#[test]
fn malformed_capabilities_fail_open() {
    let backend = MockBackend::new(vec![atmel_ice("ice").with_capabilities(65, 1025)]);
    let found = enumerate(&backend, 1);
    assert!(matches!(
        Session::open(&backend, &found[0], DapVersion::V1),
        Err(OpenError::AsymmetricReports { .. })
    ));

    let backend = MockBackend::new(vec![atmel_ice("ice").with_capabilities(129, 129)]);
    let found = enumerate(&backend, 1);
    assert!(matches!(
        Session::open(&backend, &found[0], DapVersion::V1),
        Err(OpenError::UnsupportedReportSize(128))
    ));
    assert_eq!(backend.open_handles(), 0);
}

//! Integration tests for report and catalog serialization
//!
//! Reports are written as JSON for later tooling and catalogs can be stored
//! as data, so both must survive a serde round-trip unchanged.

use protocol::{
    AbortMarker, CURRENT_VERSION, ControlSetup, DeviceInfo, DeviceSpeed, EndpointDescriptor,
    ProbeRecord, ProbeSpec, SessionReport, SessionState, TransferKind, UsbError, Verdict,
};

fn make_test_device_info() -> DeviceInfo {
    DeviceInfo {
        vendor_id: 0x1234,
        product_id: 0x5678,
        bus_number: 1,
        device_address: 7,
        manufacturer: Some("Test Manufacturer".to_string()),
        product: None,
        serial_number: None,
        class: 0xff,
        subclass: 0x00,
        protocol: 0x00,
        max_packet_size0: 64,
        speed: DeviceSpeed::Full,
    }
}

fn make_record(label: &str, verdict: Verdict) -> ProbeRecord {
    ProbeRecord {
        label: label.to_string(),
        verdict,
        attempts: 1,
        timestamp: "2024-05-01T12:00:00.000Z".to_string(),
        elapsed_us: 1500,
    }
}

fn make_report() -> SessionReport {
    let mut report = SessionReport::new(6);
    report.state = SessionState::Aborted;
    report.device = Some(make_test_device_info());
    report.endpoints = vec![
        EndpointDescriptor::control(64),
        EndpointDescriptor {
            address: 0x82,
            kind: TransferKind::Bulk,
            max_packet_size: 64,
            interval: 0,
        },
    ];
    report.records = vec![
        make_record(
            "Init",
            Verdict::Success {
                payload: vec![0xea, 0x81, 0x00, 0xea],
                length: 4,
            },
        ),
        make_record("Reset", Verdict::Stalled),
        make_record("Scan", Verdict::Timeout),
        make_record(
            "Status",
            Verdict::ShortRead {
                length: 2,
                payload: vec![0x00, 0x01],
            },
        ),
        make_record(
            "Info",
            Verdict::TransportError {
                error: UsbError::Overflow,
            },
        ),
    ];
    report.aborted = Some(AbortMarker {
        at_label: "Interrupt 0x83".to_string(),
        at_index: 5,
        reason: "device disconnected: LIBUSB_ERROR_NO_DEVICE (-4)".to_string(),
        timestamp: "2024-05-01T12:00:01.000Z".to_string(),
    });
    report
}

mod report_json {
    use super::*;

    #[test]
    fn test_report_roundtrip() {
        let report = make_report();
        let json = serde_json::to_string_pretty(&report).unwrap();
        let decoded: SessionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, report);
        assert!(decoded.version.is_compatible_with(&CURRENT_VERSION));
    }

    #[test]
    fn test_report_shape() {
        let json = serde_json::to_value(make_report()).unwrap();

        assert_eq!(json["state"], "aborted");
        assert_eq!(json["catalog_len"], 6);
        assert_eq!(json["device"]["vendor_id"], 0x1234);
        assert_eq!(json["records"][1]["verdict"], "stalled");
        assert_eq!(json["records"][3]["verdict"], "short_read");
        assert_eq!(json["aborted"]["at_label"], "Interrupt 0x83");
    }

    #[test]
    fn test_completed_report_omits_abort_marker() {
        let mut report = SessionReport::new(0);
        report.state = SessionState::Completed;
        let json = serde_json::to_value(&report).unwrap();

        assert!(json.get("aborted").is_none());
        assert!(json.get("device").is_none());
    }

    #[test]
    fn test_superspeed_control_packet_size() {
        // SuperSpeed devices report 512 bytes for endpoint 0
        let info = DeviceInfo {
            max_packet_size0: 512,
            speed: DeviceSpeed::Super,
            ..make_test_device_info()
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["max_packet_size0"], 512);
        let decoded: DeviceInfo = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, info);

        let ep0 = EndpointDescriptor::control(decoded.max_packet_size0);
        assert_eq!(ep0.max_packet_size, 512);
    }
}

mod catalog_data {
    use super::*;

    #[test]
    fn test_probe_spec_roundtrip() {
        let specs = vec![
            ProbeSpec::control("GET_STATUS", ControlSetup::standard_in(0x00, 0, 0))
                .with_expected_length(2),
            ProbeSpec::bulk("Init")
                .with_payload([0xea, 0x01, 0x00, 0x00, 0x00, 0x00, 0x01, 0xea])
                .with_out_endpoint(0x01)
                .with_in_endpoint(0x82),
            ProbeSpec::interrupt("Interrupt 0x84").with_in_endpoint(0x84),
            ProbeSpec::write_then_read(
                "Reset then read",
                ControlSetup::vendor_out(0x02, 0, 0),
                TransferKind::Bulk,
                Some(0x82),
            )
            .with_payload([0x02, 0x00, 0x00, 0x00]),
        ];

        for spec in specs {
            let json = serde_json::to_string(&spec).unwrap();
            let decoded: ProbeSpec = serde_json::from_str(&json).unwrap();
            assert_eq!(decoded, spec);
        }
    }

    #[test]
    fn test_channel_tag() {
        let spec = ProbeSpec::interrupt("Interrupt 0x83");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["channel"]["kind"], "interrupt");
    }
}

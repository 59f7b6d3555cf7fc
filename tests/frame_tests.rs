//! Unit tests for the `frame.rs` module: outbound builders, structural
//! classification, the BCC scheme and the inbound parsers.

use iec62056_rs::constants::{IEC_ACK, IEC_ETX, IEC_NACK, IEC_SOH, IEC_STX};
use iec62056_rs::iec::frame::{
    b0_message, calc_bcc, check_bcc, classify, option_select_message, p1_message,
    parse_data_message, parse_identification, parse_obis_frame, r1_message, r1_obis_message,
    r5_obis_message, request_message, w1_message, FrameType, ObisValue, ProtocolMode,
    SessionStatus,
};
use iec62056_rs::Iec62056Error;
use proptest::prelude::*;
use std::time::Duration;

/// Tests that a broadcast request message is correctly built.
#[test]
fn test_request_message_broadcast() {
    assert_eq!(request_message(None), b"/?!\r\n");
}

/// Tests that an addressed request zero-pads the address to twelve digits.
#[test]
fn test_request_message_addressed() {
    assert_eq!(request_message(Some(1613300153)), b"/?001613300153!\r\n");
}

/// Tests the option select message with a negotiated mode C baud rate.
#[test]
fn test_option_select_with_baudrate() {
    let msg = option_select_message(0, 0, Some(9600)).unwrap();
    assert_eq!(msg, [IEC_ACK, b'0', b'5', b'0', b'\r', b'\n']);
}

/// Tests that the option select message falls back to the placeholder when
/// no baud rate is negotiated.
#[test]
fn test_option_select_placeholder() {
    let msg = option_select_message(0, 1, None).unwrap();
    assert_eq!(msg, [IEC_ACK, b'0', b':', b'1', b'\r', b'\n']);
}

/// Tests that a rate outside the mode C table is rejected.
#[test]
fn test_option_select_unknown_baudrate() {
    assert!(matches!(
        option_select_message(0, 0, Some(115200)),
        Err(Iec62056Error::UnknownBaudRate(115200))
    ));
}

/// Tests that the R1 builder produces the documented frame layout with a
/// valid trailing BCC.
#[test]
fn test_r1_message_layout() {
    let msg = r1_message(0x10);
    assert_eq!(msg[0], IEC_SOH);
    assert_eq!(&msg[1..3], b"R1");
    assert_eq!(msg[3], IEC_STX);
    assert_eq!(&msg[4..14], b"00000010()");
    assert_eq!(msg[14], IEC_ETX);
    assert!(check_bcc(&msg));
}

/// Tests the payloads of the remaining convenience builders.
#[test]
fn test_convenience_builder_payloads() {
    let p1 = p1_message(0);
    assert_eq!(&p1[1..3], b"P1");
    assert_eq!(&p1[4..14], b"(00000000)");

    let w1 = w1_message(0x40, "00000000");
    assert_eq!(&w1[1..3], b"W1");
    assert_eq!(&w1[4..22], b"00000040(00000000)");

    let b0 = b0_message();
    assert_eq!(b0.len(), 5);
    assert_eq!(&b0[..3], &[IEC_SOH, b'B', b'0']);
    assert_eq!(b0[3], IEC_ETX);
    assert!(check_bcc(&b0));

    let r5 = r5_obis_message("P.1");
    assert_eq!(&r5[1..3], b"R5");
    assert_eq!(&r5[4..10], b"P.1(;)");

    let r1 = r1_obis_message("1.8.0");
    assert_eq!(&r1[1..3], b"R1");
    assert_eq!(&r1[4..12], b"1.8.0(;)");
}

/// Classification is exhaustive over the builder set: every generated frame
/// classifies back to the kind that produced it.
#[test]
fn test_classification_round_trip() {
    assert_eq!(classify(&request_message(None)), FrameType::Identification);
    assert_eq!(
        classify(&request_message(Some(1))),
        FrameType::Identification
    );
    assert_eq!(
        classify(&option_select_message(0, 1, None).unwrap()),
        FrameType::Acknowledge
    );
    for frame in [
        r1_message(0x31),
        p1_message(0),
        w1_message(0x40, "00000000"),
        b0_message(),
        r5_obis_message("P.98"),
        r1_obis_message("1.8.0"),
    ] {
        assert_eq!(classify(&frame), FrameType::ProgrammingCommand);
    }
    assert_eq!(classify(&[IEC_NACK]), FrameType::NegativeAcknowledge);
    assert_eq!(
        classify(&[IEC_STX, b'x', IEC_ETX, b'x' ^ IEC_ETX]),
        FrameType::Data
    );
    assert_eq!(classify(&[]), FrameType::Unrecognized);
    assert_eq!(classify(b"garbage"), FrameType::Unrecognized);
}

/// The crafted data frame from the protocol captures must fail the checksum
/// once its fourth byte is altered.
#[test]
fn test_bcc_detects_altered_payload() {
    let mut frame = vec![
        0x02, 0x31, 0x2E, 0x38, 0x2E, 0x30, 0x28, 0x30, 0x30, 0x31, 0x29, 0x03,
    ];
    let bcc = calc_bcc(&frame);
    assert_eq!(bcc, 0x0A);
    frame.push(bcc);
    assert!(check_bcc(&frame));

    frame[3] ^= 0x01;
    assert!(!check_bcc(&frame));
}

/// Tests the identification parser against an ISK mode C meter.
#[test]
fn test_parse_identification_mode_c() {
    let identity = parse_identification(b"/ISK5\\@360233353\r\n").unwrap();
    assert_eq!(identity.manufacturer, "ISK");
    // 'K' is uppercase, so the short reaction window applies
    assert_eq!(identity.reaction_time, Duration::from_millis(20));
    assert_eq!(identity.protocol_mode, ProtocolMode::C);
    assert_eq!(identity.max_baudrate, Some(9600));
    assert!(identity.baudrate_variable);
    assert_eq!(identity.identification, "\\@360233353");
    assert_eq!(identity.status, SessionStatus::Initialized);
}

/// A letter as baud character selects mode B with its announced rate.
#[test]
fn test_parse_identification_mode_b() {
    let identity = parse_identification(b"/ABCF12345\r\n").unwrap();
    assert_eq!(identity.protocol_mode, ProtocolMode::B);
    assert_eq!(identity.max_baudrate, Some(9600));
    assert!(identity.baudrate_variable);
}

/// Anything else as baud character means mode A with a fixed, unannounced
/// rate; a lowercase third manufacturer letter selects the slow window.
#[test]
fn test_parse_identification_mode_a() {
    let identity = parse_identification(b"/abc:12345\r\n").unwrap();
    assert_eq!(identity.protocol_mode, ProtocolMode::A);
    assert_eq!(identity.max_baudrate, None);
    assert!(!identity.baudrate_variable);
    assert_eq!(identity.reaction_time, Duration::from_millis(200));
    assert_eq!(identity.identification, "12345");
}

/// Missing markers fail fast with a malformed-frame error.
#[test]
fn test_parse_identification_malformed() {
    assert!(matches!(
        parse_identification(b"ISK5\\@360233353\r\n"),
        Err(Iec62056Error::MalformedFrame(_))
    ));
    assert!(matches!(
        parse_identification(b"/ISK5\\@360233353"),
        Err(Iec62056Error::MalformedFrame(_))
    ));
}

/// Tests the data message parser on a register reply.
#[test]
fn test_parse_data_message() {
    let mut frame = b"\x0200000010(12345)\x03".to_vec();
    let bcc = calc_bcc(&frame);
    frame.push(bcc);
    let (key, value) = parse_data_message(&frame).unwrap();
    assert_eq!(key, "00000010");
    assert_eq!(value, "12345");
}

/// A frame without the data markers is rejected.
#[test]
fn test_parse_data_message_requires_markers() {
    assert!(matches!(
        parse_data_message(b"00000010(12345)"),
        Err(Iec62056Error::MalformedFrame(_))
    ));
}

/// Tests the OBIS parser on a single-value readout line.
#[test]
fn test_parse_obis_frame_single_value() {
    let mut frame = vec![0x02];
    frame.extend_from_slice(b"1.8.0(001234.567*kWh)\r\n");
    frame.push(0x03);
    let records = parse_obis_frame(&frame).unwrap();
    assert_eq!(
        records.get("1.8.0"),
        Some(&ObisValue::Single("001234.567*kWh".to_string()))
    );
}

/// A line with several parenthesized fields yields an ordered list.
#[test]
fn test_parse_obis_frame_multi_value() {
    let mut frame = vec![0x02];
    frame.extend_from_slice(b"0.9.1(123456)\r\nP.1(0001)(0002)(0003)\r\n");
    frame.push(0x03);
    let records = parse_obis_frame(&frame).unwrap();
    assert_eq!(
        records.get("0.9.1"),
        Some(&ObisValue::Single("123456".to_string()))
    );
    assert_eq!(
        records.get("P.1"),
        Some(&ObisValue::Multiple(vec![
            "0001".to_string(),
            "0002".to_string(),
            "0003".to_string()
        ]))
    );
}

/// A frame without the block markers is rejected.
#[test]
fn test_parse_obis_frame_requires_markers() {
    assert!(matches!(
        parse_obis_frame(b"1.8.0(001234.567*kWh)\r\n"),
        Err(Iec62056Error::MalformedFrame(_))
    ));
}

proptest! {
    /// Appending the computed BCC to any non-empty body round-trips
    /// through the check.
    #[test]
    fn prop_bcc_round_trip(body in proptest::collection::vec(any::<u8>(), 1..64)) {
        let mut framed = body.clone();
        framed.push(calc_bcc(&body));
        prop_assert!(check_bcc(&framed));
    }

    /// Flipping any single bit after the first byte breaks the check; the
    /// first byte is outside the checksum's coverage.
    #[test]
    fn prop_bcc_detects_single_bit_flip(
        body in proptest::collection::vec(any::<u8>(), 2..64),
        position in any::<usize>(),
        bit in 0u32..8,
    ) {
        let mut framed = body.clone();
        framed.push(calc_bcc(&body));
        let idx = 1 + position % (body.len() - 1);
        framed[idx] ^= 1 << bit;
        prop_assert!(!check_bcc(&framed));
    }
}

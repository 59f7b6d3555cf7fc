//! Shared helpers for the integration tests: short-timeout session setup,
//! canned meter frames and a scripted responder driving the mock port.

#![allow(dead_code)]

use iec62056_rs::constants::{IEC_ETX, IEC_STX};
use iec62056_rs::iec::frame::calc_bcc;
use iec62056_rs::iec::serial_mock::MockSerialPort;
use iec62056_rs::iec::session::{MeterSession, SessionConfig};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Session config with short windows so timeout paths finish quickly.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        response_timeout: Duration::from_millis(200),
        obis_timeout: Duration::from_millis(400),
        start_attempts: None,
        settle_delay: Duration::from_millis(10),
        stabilize_delay: Duration::from_millis(10),
        read_poll: Duration::from_millis(10),
    }
}

/// Starts a session over a fresh mock port; the returned handle shares the
/// port's buffers with the session.
pub fn attach(config: SessionConfig) -> (MeterSession, MockSerialPort) {
    let port = MockSerialPort::new();
    let session = MeterSession::attach(Box::new(port.clone()), config);
    (session, port)
}

/// Identification reply of an ISK mode C meter announcing 9600 Bd.
pub fn identification_reply() -> Vec<u8> {
    b"/ISK5\\@360233353\r\n".to_vec()
}

/// Wraps a payload into a data message with a valid BCC.
pub fn data_frame(payload: &str) -> Vec<u8> {
    let mut frame = vec![IEC_STX];
    frame.extend_from_slice(payload.as_bytes());
    frame.push(IEC_ETX);
    let bcc = calc_bcc(&frame);
    frame.push(bcc);
    frame
}

pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = haystack;
    while let Some(pos) = find_subslice(rest, needle) {
        count += 1;
        rest = &rest[pos + needle.len()..];
    }
    count
}

/// Plays a meter's side of the exchange: for each script step, waits until
/// the expected frame shows up on the line, then queues the reply (an empty
/// reply stays silent). Consumes the transmitted data as it scans.
pub fn spawn_responder(port: MockSerialPort, script: Vec<(Vec<u8>, Vec<u8>)>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen: Vec<u8> = Vec::new();
        for (expect, reply) in script {
            loop {
                seen.extend(port.take_tx_data());
                if let Some(pos) = find_subslice(&seen, &expect) {
                    seen.drain(..pos + expect.len());
                    if !reply.is_empty() {
                        port.queue_rx_data(&reply);
                    }
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    })
}

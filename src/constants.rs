//! IEC 62056-21 Protocol Constants
//!
//! This module defines constants used in the IEC 62056-21 (formerly IEC 1107)
//! protocol implementation, based on the IEC 62056-21 standard.

use std::time::Duration;

/// Start character of an identification request/reply ('/')
pub const IEC_START_CHARACTER: u8 = b'/';

/// Transmission request command character ('?')
pub const IEC_TRANSMISSION_REQUEST: u8 = b'?';

/// End character of the request message ('!')
pub const IEC_END_CHARACTER: u8 = b'!';

/// Completion sequence terminating line-oriented messages
pub const IEC_COMPLETION_SEQUENCE: &[u8] = b"\r\n";

/// Start-of-header character opening a programming command frame
pub const IEC_SOH: u8 = 0x01;

/// Frame start character opening a data block
pub const IEC_STX: u8 = 0x02;

/// Block end character closing a data block
pub const IEC_ETX: u8 = 0x03;

/// Partial block end character (multi-block transfers)
pub const IEC_EOT: u8 = 0x04;

/// Acknowledge character
pub const IEC_ACK: u8 = 0x06;

/// Repeat-request (negative acknowledge) character
pub const IEC_NACK: u8 = 0x15;

/// Baud-rate placeholder sent in the option select message when no rate is
/// negotiated (observed on DRS110M meters)
pub const IEC_BAUD_PLACEHOLDER: u8 = b':';

/// Width of the zero-padded device address in a request message
pub const IEC_DEVICE_ADDRESS_WIDTH: usize = 12;

/// Width of the zero-padded password in a P1 message
pub const IEC_PASSWORD_WIDTH: usize = 8;

/// Mode A baud-rate identification characters (fixed-rate meters announce
/// a digit outside the Mode C table; '4' is the DRS110M value)
pub const MODE_A_BAUDRATES: [(char, u32); 4] =
    [('1', 1200), ('2', 2400), ('3', 4800), ('4', 9600)];

/// Mode B baud-rate identification characters
pub const MODE_B_BAUDRATES: [(char, u32); 7] = [
    ('A', 300),
    ('B', 600),
    ('C', 1200),
    ('D', 2400),
    ('E', 4800),
    ('F', 9600),
    ('G', 19200),
];

/// Mode C baud-rate identification characters
pub const MODE_C_BAUDRATES: [(char, u32); 7] = [
    ('0', 300),
    ('1', 600),
    ('2', 1200),
    ('3', 2400),
    ('4', 4800),
    ('5', 9600),
    ('6', 19200),
];

/// Reaction time window when the third manufacturer letter is uppercase
pub const REACTION_TIME_FAST: Duration = Duration::from_millis(20);

/// Reaction time window when the third manufacturer letter is lowercase
pub const REACTION_TIME_SLOW: Duration = Duration::from_millis(200);

/// Default wait for a reply to a session operation
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default wait for a pushed OBIS data frame
pub const DEFAULT_OBIS_TIMEOUT: Duration = Duration::from_secs(5);

/// Settle interval after proposing a new baud rate, before reconfiguring
/// the local port (Mode C procedure, fixed by convention)
pub const BAUD_SWITCH_SETTLE: Duration = Duration::from_millis(200);

/// Stabilization interval after reconfiguring the local port, before the
/// meter's data frame is expected (Mode C procedure)
pub const BAUD_SWITCH_STABILIZE: Duration = Duration::from_millis(1100);

/// Default per-poll read window of the receive loop
pub const DEFAULT_READ_POLL: Duration = Duration::from_millis(100);

/// Upper bound on bytes consumed from the link per read poll
pub const READ_CHUNK_SIZE: usize = 64;

/// Write-only register clearing the accumulated active energy
pub const REGISTER_CLEAR_ENERGY: u32 = 0x40;

/// Write-only register holding the programming password
pub const REGISTER_PASSWORD: u32 = 0x37;

//! # IEC 62056-21 Frame Codec
//!
//! This module provides functionality to build and classify IEC 62056-21
//! protocol frames, commonly used for reading data from utility meters over
//! RS-232/RS-485/IR links. It leverages the `nom` crate for parsing the
//! identification grammar.
//!
//! ## Features
//! - Build outbound frames: identification request, option select,
//!   programming commands (read, write, password, break) and their
//!   convenience forms (R1/P1/W1/B0/R5).
//! - Classify inbound frames into the five message kinds by their
//!   structural markers.
//! - Compute and verify the block check character (BCC).
//! - Parse identification messages, data messages and OBIS readout frames.
//!
//! ## Usage
//!
//! Building and classifying a register read:
//! ```
//! use iec62056_rs::iec::frame::{classify, r1_message, FrameType};
//!
//! let msg = r1_message(0x10);
//! assert_eq!(classify(&msg), FrameType::ProgrammingCommand);
//! ```

use crate::constants::*;
use crate::error::Iec62056Error;
use bytes::{BufMut, BytesMut};
use nom::bytes::complete::{tag, take, take_until};
use nom::IResult;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Represents the different kinds of IEC 62056-21 frames.
///
/// Classification is structural (marker bytes at fixed offsets) and total:
/// every byte sequence maps to exactly one kind.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FrameType {
    Identification,
    Acknowledge,
    NegativeAcknowledge,
    Data,
    ProgrammingCommand,
    Unrecognized,
}

/// Programming command letters defined by the standard.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProgrammingCommand {
    /// 'P' - password command
    Password,
    /// 'W' - write command
    Write,
    /// 'R' - read command
    Read,
    /// 'E' - execute command
    Execute,
    /// 'B' - exit command (break)
    Break,
}

impl ProgrammingCommand {
    pub fn letter(self) -> u8 {
        match self {
            ProgrammingCommand::Password => b'P',
            ProgrammingCommand::Write => b'W',
            ProgrammingCommand::Read => b'R',
            ProgrammingCommand::Execute => b'E',
            ProgrammingCommand::Break => b'B',
        }
    }
}

/// IEC 62056-21 protocol variants, distinguished by how the baud rate is
/// established.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum ProtocolMode {
    /// Fixed, unannounced baud rate
    A,
    /// Baud rate announced by the meter
    B,
    /// Baud rate negotiated via option select
    C,
}

/// Session status of an identified meter.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initialized,
}

/// A meter's self-description, parsed from its identification message.
#[derive(Debug, Clone, Serialize)]
pub struct MeterIdentity {
    /// Three-letter manufacturer code
    pub manufacturer: String,
    pub protocol_mode: ProtocolMode,
    /// Maximum announced baud rate; `None` in mode A (fixed, unannounced)
    pub max_baudrate: Option<u32>,
    pub baudrate_variable: bool,
    /// Window within which the meter expects our next transmission
    pub reaction_time: Duration,
    /// Identification text following the baud character
    pub identification: String,
    pub status: SessionStatus,
}

/// A single OBIS value: one field, or the ordered list of fields when the
/// data line carried more than one parenthesized group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ObisValue {
    Single(String),
    Multiple(Vec<String>),
}

/// Mapping from OBIS code to its value(s), rebuilt from each captured data
/// frame.
pub type ObisRecordSet = HashMap<String, ObisValue>;

/// Calculates the block check character: XOR of all bytes except the first.
pub fn calc_bcc(data: &[u8]) -> u8 {
    data.iter().skip(1).fold(0, |acc, b| acc ^ b)
}

/// Verifies that the trailing byte equals the XOR of all bytes between
/// (but excluding) the first byte and the BCC itself.
pub fn check_bcc(data: &[u8]) -> bool {
    match data.split_last() {
        Some((bcc, body)) if !body.is_empty() => calc_bcc(body) == *bcc,
        _ => false,
    }
}

/// Builds the initial request message: `/?` `[address]` `!` CRLF.
///
/// Without an address this is a broadcast request and all devices on the
/// line will answer.
pub fn request_message(device_address: Option<u64>) -> Vec<u8> {
    let mut msg = BytesMut::with_capacity(IEC_DEVICE_ADDRESS_WIDTH + 5);
    msg.put_u8(IEC_START_CHARACTER);
    msg.put_u8(IEC_TRANSMISSION_REQUEST);
    if let Some(address) = device_address {
        msg.put_slice(format!("{address:012}").as_bytes());
    }
    msg.put_u8(IEC_END_CHARACTER);
    msg.put_slice(IEC_COMPLETION_SEQUENCE);
    msg.to_vec()
}

/// Builds an acknowledgement/option select message: ACK, protocol digit,
/// baud character, mode digit, CRLF.
///
/// The baud character is the reverse mapping of the Mode C table; without a
/// rate the fixed placeholder `:` is sent (the DRS110M convention).
pub fn option_select_message(
    protocol: u8,
    mode: u8,
    baudrate: Option<u32>,
) -> Result<Vec<u8>, Iec62056Error> {
    debug_assert!(protocol <= 9 && mode <= 9);
    let mut msg = BytesMut::with_capacity(6);
    msg.put_u8(IEC_ACK);
    msg.put_u8(b'0' + protocol);
    match baudrate {
        Some(rate) => {
            let c = mode_c_baud_character(rate).ok_or(Iec62056Error::UnknownBaudRate(rate))?;
            msg.put_u8(c as u8);
        }
        None => msg.put_u8(IEC_BAUD_PLACEHOLDER),
    }
    msg.put_u8(b'0' + mode);
    msg.put_slice(IEC_COMPLETION_SEQUENCE);
    Ok(msg.to_vec())
}

/// Builds a programming command frame: SOH, command letter, type digit,
/// optional STX+payload, ETX, BCC.
///
/// The BCC covers every byte after SOH through ETX inclusive.
pub fn programming_command_message(
    cmd: ProgrammingCommand,
    cmd_type: u8,
    data: Option<&[u8]>,
) -> Vec<u8> {
    debug_assert!(cmd_type <= 9);
    let mut msg = BytesMut::with_capacity(5 + data.map_or(0, <[u8]>::len) + 1);
    msg.put_u8(IEC_SOH);
    msg.put_u8(cmd.letter());
    msg.put_u8(b'0' + cmd_type);
    if let Some(payload) = data {
        msg.put_u8(IEC_STX);
        msg.put_slice(payload);
    }
    msg.put_u8(IEC_ETX);
    let bcc = calc_bcc(&msg);
    msg.put_u8(bcc);
    msg.to_vec()
}

/// R1 - read one register by address.
pub fn r1_message(address: u32) -> Vec<u8> {
    let data = format!("{address:08x}()");
    programming_command_message(ProgrammingCommand::Read, 1, Some(data.as_bytes()))
}

/// P1 - present the programming password.
pub fn p1_message(password: u32) -> Vec<u8> {
    let data = format!("({password:08})");
    programming_command_message(ProgrammingCommand::Password, 1, Some(data.as_bytes()))
}

/// W1 - write one register by address.
pub fn w1_message(address: u32, value: &str) -> Vec<u8> {
    let data = format!("{address:08x}({value})");
    programming_command_message(ProgrammingCommand::Write, 1, Some(data.as_bytes()))
}

/// B0 - log off (break).
pub fn b0_message() -> Vec<u8> {
    programming_command_message(ProgrammingCommand::Break, 0, None)
}

/// R5 - request a named OBIS record (load profiles and similar).
pub fn r5_obis_message(obis_code: &str) -> Vec<u8> {
    let data = format!("{obis_code}(;)");
    programming_command_message(ProgrammingCommand::Read, 5, Some(data.as_bytes()))
}

/// R1 variant requesting a named OBIS value.
pub fn r1_obis_message(obis_code: &str) -> Vec<u8> {
    let data = format!("{obis_code}(;)");
    programming_command_message(ProgrammingCommand::Read, 1, Some(data.as_bytes()))
}

/// Classifies a complete candidate frame by its structural markers.
///
/// A programming command without payload carries no STX, so the fixed-offset
/// STX rule only applies to frames long enough to hold one.
pub fn classify(frame: &[u8]) -> FrameType {
    let Some(first) = frame.first() else {
        return FrameType::Unrecognized;
    };
    match *first {
        IEC_START_CHARACTER if frame.len() > 2 && frame.ends_with(IEC_COMPLETION_SEQUENCE) => {
            FrameType::Identification
        }
        IEC_ACK => FrameType::Acknowledge,
        IEC_NACK => FrameType::NegativeAcknowledge,
        IEC_STX if frame.len() >= 3 && frame[frame.len() - 2] == IEC_ETX => FrameType::Data,
        IEC_SOH
            if frame.len() >= 5
                && frame[frame.len() - 2] == IEC_ETX
                && (frame[3] == IEC_STX || frame.len() == 5) =>
        {
            FrameType::ProgrammingCommand
        }
        _ => FrameType::Unrecognized,
    }
}

fn identification_grammar(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, _) = tag(b"/".as_slice())(input)?;
    let (input, manufacturer) = take(3usize)(input)?;
    let (input, baud_character) = take(1usize)(input)?;
    let (input, identification) = take_until("\r\n")(input)?;
    let (input, _) = tag(b"\r\n".as_slice())(input)?;
    Ok((input, (manufacturer, baud_character, identification)))
}

/// Parses an identification message into a [`MeterIdentity`].
///
/// The manufacturer code occupies bytes 1-3; an uppercase third letter
/// announces the short 20 ms reaction window. Byte 4 carries the baud/mode
/// character: a Mode C digit, a Mode B letter, or anything else for mode A
/// with a fixed, unannounced rate.
pub fn parse_identification(frame: &[u8]) -> Result<MeterIdentity, Iec62056Error> {
    let (rest, (manufacturer, baud_character, identification)) = identification_grammar(frame)
        .map_err(|_| Iec62056Error::MalformedFrame("identification markers absent".into()))?;
    if !rest.is_empty() {
        return Err(Iec62056Error::MalformedFrame(
            "trailing bytes after identification".into(),
        ));
    }

    let manufacturer = std::str::from_utf8(manufacturer)
        .map_err(|_| Iec62056Error::MalformedFrame("manufacturer not ASCII".into()))?
        .to_string();
    let reaction_time = if manufacturer.as_bytes()[2].is_ascii_uppercase() {
        REACTION_TIME_FAST
    } else {
        REACTION_TIME_SLOW
    };

    let c = baud_character[0] as char;
    let (protocol_mode, max_baudrate, baudrate_variable) = if c.is_ascii_digit() {
        let rate = table_lookup(&MODE_C_BAUDRATES, c).ok_or_else(|| {
            Iec62056Error::MalformedFrame(format!("baud character '{c}' outside mode C table"))
        })?;
        (ProtocolMode::C, Some(rate), true)
    } else if c.is_ascii_alphabetic() {
        let rate = table_lookup(&MODE_B_BAUDRATES, c).ok_or_else(|| {
            Iec62056Error::MalformedFrame(format!("baud character '{c}' outside mode B table"))
        })?;
        (ProtocolMode::B, Some(rate), true)
    } else {
        // ':' on DRS110M
        (ProtocolMode::A, None, false)
    };

    let identification = String::from_utf8_lossy(identification).into_owned();

    Ok(MeterIdentity {
        manufacturer,
        protocol_mode,
        max_baudrate,
        baudrate_variable,
        reaction_time,
        identification,
        status: SessionStatus::Initialized,
    })
}

/// Parses a data message into its raw `(key, value)` text pair.
///
/// Numeric interpretation is the caller's responsibility; register replies
/// carry a hex address key, OBIS replies carry the code itself.
pub fn parse_data_message(frame: &[u8]) -> Result<(String, String), Iec62056Error> {
    if classify(frame) != FrameType::Data {
        return Err(Iec62056Error::MalformedFrame(
            "data message markers absent".into(),
        ));
    }
    let body = std::str::from_utf8(&frame[1..frame.len() - 2])
        .map_err(|_| Iec62056Error::MalformedFrame("data message not ASCII".into()))?;
    let body = body.trim_end_matches(')');
    let (key, value) = body
        .split_once('(')
        .ok_or_else(|| Iec62056Error::MalformedFrame("data message lacks '('".into()))?;
    Ok((key.to_string(), value.to_string()))
}

/// Parses an OBIS readout frame into a code-to-value(s) mapping.
///
/// The region between the first STX and the first ETX is split into CRLF
/// lines of the form `code(value)` or `code(val1)(val2)...`; lines with more
/// than one field yield an ordered list. Lines without a field are skipped.
pub fn parse_obis_frame(frame: &[u8]) -> Result<ObisRecordSet, Iec62056Error> {
    let start = frame
        .iter()
        .position(|b| *b == IEC_STX)
        .ok_or_else(|| Iec62056Error::MalformedFrame("OBIS frame lacks STX".into()))?;
    let end = frame
        .iter()
        .position(|b| *b == IEC_ETX)
        .ok_or_else(|| Iec62056Error::MalformedFrame("OBIS frame lacks ETX".into()))?;
    if end < start {
        return Err(Iec62056Error::MalformedFrame("ETX precedes STX".into()));
    }

    let region = String::from_utf8_lossy(&frame[start + 1..end]);
    let mut records = ObisRecordSet::new();
    for line in region.split("\r\n").filter(|l| !l.is_empty()) {
        let mut elements = line.split('(').map(|e| e.trim_end_matches(')'));
        let code = elements.next().unwrap_or_default();
        let mut values: Vec<String> = elements.map(str::to_string).collect();
        let value = match values.len() {
            0 => {
                log::debug!("skipping OBIS line without value: {line}");
                continue;
            }
            1 => ObisValue::Single(values.swap_remove(0)),
            _ => ObisValue::Multiple(values),
        };
        records.insert(code.to_string(), value);
    }
    Ok(records)
}

fn table_lookup(table: &[(char, u32)], wanted: char) -> Option<u32> {
    table
        .iter()
        .find(|(c, _)| *c == wanted)
        .map(|(_, rate)| *rate)
}

/// Reverse mapping of the Mode C baud table.
pub fn mode_c_baud_character(baudrate: u32) -> Option<char> {
    MODE_C_BAUDRATES
        .iter()
        .find(|(_, rate)| *rate == baudrate)
        .map(|(c, _)| *c)
}

/// Forward mapping of the Mode A baud table (fixed-rate announcement digits).
pub fn mode_a_baudrate(code: u32) -> Option<u32> {
    let c = char::from_digit(code, 10)?;
    table_lookup(&MODE_A_BAUDRATES, c)
}

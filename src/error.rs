//! # IEC 62056-21 Error Handling
//!
//! This module defines the Iec62056Error enum, which represents the different
//! error types that can occur in the iec62056-rs crate.

use thiserror::Error;

/// Represents the different error types that can occur in the IEC 62056-21 crate.
#[derive(Debug, Error)]
pub enum Iec62056Error {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates a frame whose structural markers are absent or misplaced.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Indicates a block check character mismatch.
    #[error("Invalid BCC: expected {expected:#04x}, calculated {calculated:#04x}")]
    ChecksumMismatch { expected: u8, calculated: u8 },

    /// Indicates that no matching reply arrived within the configured window.
    #[error("Protocol timeout waiting for {0}")]
    ProtocolTimeout(String),

    /// Indicates a reply addressing a different register than requested.
    #[error("Address mismatch: requested {requested:#x}, answered {answered}")]
    AddressMismatch { requested: u32, answered: String },

    /// Indicates raw register text that does not fit its decode function.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Indicates a register name absent from the register table.
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// Indicates a baud rate without an identification character.
    #[error("Unknown baud rate: {0}")]
    UnknownBaudRate(u32),

    /// Indicates that the worker loops have terminated and the link is gone.
    #[error("Link closed")]
    LinkClosed,
}

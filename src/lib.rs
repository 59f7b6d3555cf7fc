//! # iec62056-rs - A Rust Crate for IEC 62056-21 Meter Readout
//!
//! The iec62056-rs crate provides a Rust-based client implementation of the
//! IEC 62056-21 (formerly IEC 1107) utility-meter readout protocol over a
//! half-duplex serial link (RS-232/RS-485/IR).
//!
//! ## Features
//!
//! - Establish a session with an electricity meter over a serial port
//! - Negotiate baud rate and protocol mode (modes A, B and C)
//! - Authenticate into programming mode and read/write numbered registers
//! - Capture and parse OBIS-coded readout frames
//! - Decode register values through a static, typed register table
//! - Device personalities for DRS110M and PAFAL meters
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! To use the iec62056-rs crate in your Rust project, add the following to
//! your Cargo.toml file:
//!
//! ```toml
//! [dependencies]
//! iec62056-rs = "0.1.0"
//! ```
//!
//! Then, in your Rust code, you can import the necessary modules and
//! functions:
//!
//! ```rust
//! use iec62056_rs::{
//!     connect, MeterSession, SessionConfig, Password,
//!     FrameType, MeterIdentity, RegisterReading, Iec62056Error,
//! };
//! ```

pub mod constants;
pub mod error;
pub mod iec;
pub mod logging;
pub mod vendors;

pub use crate::error::Iec62056Error;
pub use crate::logging::{init_logger, log_info};

// Core protocol types
pub use iec::frame::{FrameType, MeterIdentity, ObisRecordSet, ObisValue, ProtocolMode};
pub use iec::registers::{RegisterDecoder, RegisterDefinition, RegisterReading, RegisterValue};
pub use iec::serial::{SerialConfig, SerialLink};
pub use iec::session::{MeterSession, Password, SessionConfig};

// Device personalities
pub use vendors::{Drs110m, MeterDevice, MeterReport, Pafal};

/// Connect to a meter via serial port with default line settings.
///
/// # Arguments
/// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
///
/// # Returns
/// * `Ok(MeterSession)` - Open session with running worker loops
/// * `Err(Iec62056Error)` - Opening the port failed
pub fn connect(port: &str) -> Result<MeterSession, Iec62056Error> {
    MeterSession::connect(port)
}

/// Connect to a meter via serial port with custom line and session settings.
///
/// # Arguments
/// * `port` - Serial port path
/// * `serial` - Physical line settings (baud rate, 7E1 framing)
/// * `config` - Timeout and retry policy
///
/// # Returns
/// * `Ok(MeterSession)` - Open session with running worker loops
/// * `Err(Iec62056Error)` - Opening the port failed
pub fn connect_with_config(
    port: &str,
    serial: &SerialConfig,
    config: SessionConfig,
) -> Result<MeterSession, Iec62056Error> {
    MeterSession::connect_with_config(port, serial, config)
}

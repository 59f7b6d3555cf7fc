//! # Serial Link Handling
//!
//! This module provides the serial side of the IEC 62056-21 client: the port
//! configuration, the [`SerialLink`] seam the worker loops run against, and
//! the tokio-serial implementation for real hardware.

use crate::error::Iec62056Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

/// Configuration of the physical line.
///
/// IEC 62056-21 uses 7 data bits with even parity; mode C sessions wake the
/// meter at 300 Bd, which is the default here.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: 300,
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            stop_bits: StopBits::One,
        }
    }
}

impl SerialConfig {
    /// 7E1 line at a fixed rate (mode A meters announce none).
    pub fn fixed_baudrate(baudrate: u32) -> Self {
        SerialConfig {
            baudrate,
            ..SerialConfig::default()
        }
    }
}

/// A byte-oriented duplex link the worker loops can own exclusively.
///
/// Implemented by [`SerialStream`] for real ports and by the mock port for
/// tests. Reconfiguration must only be called from the path that owns the
/// current protocol phase; the session serializes it against the loops.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin {
    /// Switches the line to a new baud rate in place.
    fn reconfigure_baudrate(&mut self, baudrate: u32) -> Result<(), Iec62056Error>;

    /// Discards whatever is pending in the input buffer.
    fn flush_input(&mut self) -> Result<(), Iec62056Error>;
}

impl SerialLink for SerialStream {
    fn reconfigure_baudrate(&mut self, baudrate: u32) -> Result<(), Iec62056Error> {
        SerialPort::set_baud_rate(self, baudrate)
            .map_err(|e| Iec62056Error::SerialPortError(e.to_string()))
    }

    fn flush_input(&mut self) -> Result<(), Iec62056Error> {
        SerialPort::clear(self, ClearBuffer::Input)
            .map_err(|e| Iec62056Error::SerialPortError(e.to_string()))
    }
}

/// Opens the serial port with the provided settings.
pub fn open_port(port_name: &str, config: &SerialConfig) -> Result<SerialStream, Iec62056Error> {
    tokio_serial::new(port_name, config.baudrate)
        .data_bits(config.data_bits)
        .parity(config.parity)
        .stop_bits(config.stop_bits)
        .open_native_async()
        .map_err(|e| Iec62056Error::SerialPortError(e.to_string()))
}

//! # Register Model and Value Decoding
//!
//! Static table mapping logical register names to their address, on-wire
//! length, display unit and decoder, plus the decoders themselves. The
//! decoders are a small tagged set of variants rather than free functions,
//! so each is independently testable.

use crate::error::Iec62056Error;
use crate::iec::frame::mode_a_baudrate;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// How a register's raw on-wire text is turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterDecoder {
    /// Fixed-point decimal: integer text scaled down by `decimals` digits.
    ScaledDecimal { decimals: u32 },
    /// Plain integer text, taken as-is.
    Integer,
    /// Meter clock text: `yymmdd0whhmmss` fixed-width fields, `w` being the
    /// weekday digit.
    Clock,
    /// Baud-rate code looked up in the mode A announcement table.
    BaudCode,
    /// Best-effort temperature reconstruction, see [`decode_temperature`].
    Temperature,
}

/// A decoded register value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Decimal(f64),
    Integer(i64),
    Clock(NaiveDateTime),
    Baud(u32),
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Decimal(v) => write!(f, "{v}"),
            RegisterValue::Integer(v) => write!(f, "{v}"),
            RegisterValue::Clock(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            RegisterValue::Baud(v) => write!(f, "{v}"),
        }
    }
}

/// Definition of one numbered register.
#[derive(Debug, Clone)]
pub struct RegisterDefinition {
    pub name: &'static str,
    pub address: u32,
    /// Expected on-wire byte length of the raw value
    pub length: usize,
    pub unit: &'static str,
    pub decoder: RegisterDecoder,
}

/// The built-in register table of the DRS110M family, in readout order.
pub static REGISTERS: &[RegisterDefinition] = &[
    RegisterDefinition {
        name: "Voltage",
        address: 0x0,
        length: 2,
        unit: "V",
        decoder: RegisterDecoder::ScaledDecimal { decimals: 1 },
    },
    RegisterDefinition {
        name: "Current",
        address: 0x1,
        length: 2,
        unit: "A",
        decoder: RegisterDecoder::ScaledDecimal { decimals: 1 },
    },
    RegisterDefinition {
        name: "Frequency",
        address: 0x2,
        length: 2,
        unit: "Hz",
        decoder: RegisterDecoder::ScaledDecimal { decimals: 1 },
    },
    RegisterDefinition {
        name: "Active Power",
        address: 0x3,
        length: 2,
        unit: "kW",
        decoder: RegisterDecoder::ScaledDecimal { decimals: 2 },
    },
    RegisterDefinition {
        name: "Reactive Power",
        address: 0x4,
        length: 2,
        unit: "VAr",
        decoder: RegisterDecoder::ScaledDecimal { decimals: 2 },
    },
    RegisterDefinition {
        name: "Apparent Power",
        address: 0x5,
        length: 2,
        unit: "VA",
        decoder: RegisterDecoder::ScaledDecimal { decimals: 2 },
    },
    RegisterDefinition {
        name: "Active Energy",
        address: 0x10,
        length: 4,
        unit: "Wh",
        decoder: RegisterDecoder::Integer,
    },
    RegisterDefinition {
        name: "Time",
        address: 0x31,
        length: 2,
        unit: "",
        decoder: RegisterDecoder::Clock,
    },
    RegisterDefinition {
        name: "Temperature",
        address: 0x32,
        length: 2,
        unit: "°C",
        decoder: RegisterDecoder::Temperature,
    },
    RegisterDefinition {
        name: "Serial Port",
        address: 0x34,
        length: 6,
        unit: "",
        decoder: RegisterDecoder::Integer,
    },
    RegisterDefinition {
        name: "Baudrate",
        address: 0x35,
        length: 2,
        unit: "",
        decoder: RegisterDecoder::BaudCode,
    },
    RegisterDefinition {
        name: "Meter ID",
        address: 0x36,
        length: 6,
        unit: "",
        decoder: RegisterDecoder::Integer,
    },
];

static REGISTER_INDEX: Lazy<HashMap<&'static str, &'static RegisterDefinition>> =
    Lazy::new(|| REGISTERS.iter().map(|def| (def.name, def)).collect());

/// Looks up a register definition by its logical name.
pub fn register(name: &str) -> Option<&'static RegisterDefinition> {
    REGISTER_INDEX.get(name).copied()
}

/// One captured register reading. Either fully populated (raw text, decoded
/// value and capture timestamp) or, after a failed fetch, fully empty.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterReading {
    pub address: u32,
    pub unit: &'static str,
    pub raw: Option<String>,
    pub value: Option<RegisterValue>,
    pub timestamp: Option<DateTime<Local>>,
}

impl RegisterReading {
    /// A reading with all three capture fields unset.
    pub fn empty(def: &RegisterDefinition) -> Self {
        RegisterReading {
            address: def.address,
            unit: def.unit,
            raw: None,
            value: None,
            timestamp: None,
        }
    }

    /// A reading captured now.
    pub fn captured(def: &RegisterDefinition, raw: String, value: RegisterValue) -> Self {
        RegisterReading {
            address: def.address,
            unit: def.unit,
            raw: Some(raw),
            value: Some(value),
            timestamp: Some(Local::now()),
        }
    }

    pub fn is_populated(&self) -> bool {
        self.raw.is_some()
    }
}

impl fmt::Display for RegisterReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}{}", value, self.unit),
            None => write!(f, "None"),
        }
    }
}

/// Applies a register definition's decoder to the raw text captured from a
/// data message.
///
/// Decoders never panic on out-of-range input; they signal
/// [`Iec62056Error::DecodeError`] instead.
pub fn decode_register(
    def: &RegisterDefinition,
    raw: &str,
) -> Result<RegisterValue, Iec62056Error> {
    let raw = raw.trim();
    match def.decoder {
        RegisterDecoder::ScaledDecimal { decimals } => {
            let value: i64 = raw.parse().map_err(|_| {
                Iec62056Error::DecodeError(format!("'{raw}' is not an integer for {}", def.name))
            })?;
            Ok(RegisterValue::Decimal(
                value as f64 / 10f64.powi(decimals as i32),
            ))
        }
        RegisterDecoder::Integer => {
            let value: i64 = raw.parse().map_err(|_| {
                Iec62056Error::DecodeError(format!("'{raw}' is not an integer for {}", def.name))
            })?;
            Ok(RegisterValue::Integer(value))
        }
        RegisterDecoder::Clock => decode_clock(raw).map(RegisterValue::Clock),
        RegisterDecoder::BaudCode => {
            let code: u32 = raw
                .parse()
                .map_err(|_| Iec62056Error::DecodeError(format!("'{raw}' is not a baud code")))?;
            mode_a_baudrate(code)
                .map(RegisterValue::Baud)
                .ok_or_else(|| Iec62056Error::DecodeError(format!("baud code {code} unknown")))
        }
        RegisterDecoder::Temperature => decode_temperature(raw).map(RegisterValue::Integer),
    }
}

/// Decodes the meter clock text: `yy mm dd 0 <weekday> hh mm ss` packed as
/// fourteen digits. The weekday digit is redundant and ignored.
fn decode_clock(raw: &str) -> Result<NaiveDateTime, Iec62056Error> {
    if raw.len() != 14 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Iec62056Error::DecodeError(format!(
            "'{raw}' is not a 14-digit clock string"
        )));
    }
    let field = |range: std::ops::Range<usize>| raw[range].parse::<u32>().unwrap_or(0);
    let date = NaiveDate::from_ymd_opt(2000 + field(0..2) as i32, field(2..4), field(4..6))
        .ok_or_else(|| Iec62056Error::DecodeError(format!("'{raw}' holds no valid date")))?;
    date.and_hms_opt(field(8..10), field(10..12), field(12..14))
        .ok_or_else(|| Iec62056Error::DecodeError(format!("'{raw}' holds no valid time")))
}

/// Best-effort temperature reconstruction, reverse engineered from DRS110M
/// captures: the meter renders the internal sensor word as decimal digits
/// that line up with its hex nibbles, so each digit is folded back as a
/// nibble. Digits above 9 cannot occur, which makes the mapping lossy;
/// readings should be treated as indicative only.
pub fn decode_temperature(raw: &str) -> Result<i64, Iec62056Error> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Iec62056Error::DecodeError(format!(
            "'{raw}' is not a digit-packed temperature"
        )));
    }
    let mut value: i64 = 0;
    for b in raw.bytes() {
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or_else(|| {
                Iec62056Error::DecodeError(format!("'{raw}' overflows temperature range"))
            })?;
    }
    Ok(value)
}

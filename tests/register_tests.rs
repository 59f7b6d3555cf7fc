//! Unit tests for the register table and the tagged decoder variants.

use chrono::{NaiveDate, NaiveDateTime};
use iec62056_rs::iec::registers::{
    decode_register, decode_temperature, register, RegisterReading, RegisterValue, REGISTERS,
};
use iec62056_rs::Iec62056Error;

fn decode(name: &str, raw: &str) -> Result<RegisterValue, Iec62056Error> {
    decode_register(register(name).unwrap(), raw)
}

/// The table covers the DRS110M register set with stable addresses.
#[test]
fn test_register_table_lookup() {
    let voltage = register("Voltage").unwrap();
    assert_eq!(voltage.address, 0x0);
    assert_eq!(voltage.unit, "V");
    assert_eq!(register("Active Energy").unwrap().address, 0x10);
    assert_eq!(register("Meter ID").unwrap().address, 0x36);
    assert!(register("No Such Register").is_none());
    assert_eq!(REGISTERS.len(), 12);
}

/// One-decimal quantities scale down by ten.
#[test]
fn test_scaled_decimal_one_digit() {
    assert_eq!(decode("Voltage", "2305").unwrap(), RegisterValue::Decimal(230.5));
    assert_eq!(decode("Frequency", "0500").unwrap(), RegisterValue::Decimal(50.0));
}

/// Power registers carry two decimals.
#[test]
fn test_scaled_decimal_two_digits() {
    assert_eq!(
        decode("Active Power", "1234").unwrap(),
        RegisterValue::Decimal(12.34)
    );
}

/// Energy is an unscaled integer count.
#[test]
fn test_integer_energy() {
    assert_eq!(
        decode("Active Energy", "00123456").unwrap(),
        RegisterValue::Integer(123456)
    );
}

/// Non-numeric raw text signals a decode error instead of panicking.
#[test]
fn test_decode_error_on_garbage() {
    assert!(matches!(
        decode("Voltage", "23x5"),
        Err(Iec62056Error::DecodeError(_))
    ));
    assert!(matches!(
        decode("Active Energy", ""),
        Err(Iec62056Error::DecodeError(_))
    ));
}

/// The meter clock is fourteen packed digits: yy mm dd 0 weekday hh mm ss.
#[test]
fn test_clock_decoding() {
    let expected: NaiveDateTime = NaiveDate::from_ymd_opt(2018, 4, 12)
        .unwrap()
        .and_hms_opt(9, 12, 34)
        .unwrap();
    assert_eq!(
        decode("Time", "18041203091234").unwrap(),
        RegisterValue::Clock(expected)
    );
}

/// Clock strings with the wrong length or impossible fields are rejected.
#[test]
fn test_clock_decoding_rejects_invalid() {
    assert!(matches!(
        decode("Time", "1804120309123"),
        Err(Iec62056Error::DecodeError(_))
    ));
    assert!(matches!(
        decode("Time", "18151203091234"),
        Err(Iec62056Error::DecodeError(_))
    ));
    assert!(matches!(
        decode("Time", "180412030912a4"),
        Err(Iec62056Error::DecodeError(_))
    ));
}

/// The baud register holds a mode A announcement code.
#[test]
fn test_baud_code_decoding() {
    assert_eq!(decode("Baudrate", "4").unwrap(), RegisterValue::Baud(9600));
    assert_eq!(decode("Baudrate", "1").unwrap(), RegisterValue::Baud(1200));
    assert!(matches!(
        decode("Baudrate", "9"),
        Err(Iec62056Error::DecodeError(_))
    ));
}

/// Temperature digits fold back as nibbles of the sensor word.
#[test]
fn test_temperature_decoding() {
    assert_eq!(decode_temperature("30").unwrap(), 48);
    assert_eq!(decode_temperature("123").unwrap(), 0x123);
    assert!(matches!(
        decode_temperature("2x"),
        Err(Iec62056Error::DecodeError(_))
    ));
    assert!(matches!(
        decode_temperature(""),
        Err(Iec62056Error::DecodeError(_))
    ));
}

/// A reading is either fully populated or fully empty.
#[test]
fn test_reading_population() {
    let def = register("Voltage").unwrap();
    let empty = RegisterReading::empty(def);
    assert!(!empty.is_populated());
    assert!(empty.raw.is_none() && empty.value.is_none() && empty.timestamp.is_none());

    let captured =
        RegisterReading::captured(def, "2305".to_string(), RegisterValue::Decimal(230.5));
    assert!(captured.is_populated());
    assert!(captured.timestamp.is_some());
    assert_eq!(captured.to_string(), "230.5V");
}

//! Device Personalities for IEC 62056-21 Meters
//!
//! This module provides thin configuration layers over the core session
//! API: fixed line settings, selected registers and the readout flow of a
//! concrete meter family. The protocol logic itself stays in [`crate::iec`].

pub mod drs110m;
pub mod pafal;

pub use drs110m::Drs110m;
pub use pafal::Pafal;

use crate::error::Iec62056Error;
use crate::iec::frame::ObisRecordSet;
use crate::iec::registers::RegisterReading;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// What one readout cycle produced: register readings for programming-mode
/// meters, an OBIS record set for push-mode meters.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MeterReport {
    Registers(HashMap<&'static str, RegisterReading>),
    Obis(ObisRecordSet),
}

/// A meter personality driving one full readout cycle over its session.
#[async_trait]
pub trait MeterDevice: Send {
    /// Personality name, e.g. `DRS110M`.
    fn name(&self) -> &'static str;

    /// Runs one readout cycle and returns the captured values.
    async fn poll(&mut self) -> Result<MeterReport, Iec62056Error>;
}

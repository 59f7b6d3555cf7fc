//! PAFAL energy meter personality.
//!
//! A mode C meter woken at 300 Bd. After identification the session
//! proposes 9600 Bd, switches the local port with the fixed mode C delays
//! and captures the OBIS readout the meter pushes at the new rate. No
//! programming mode is involved.

use crate::error::Iec62056Error;
use crate::iec::frame::ObisRecordSet;
use crate::iec::serial::SerialConfig;
use crate::iec::session::MeterSession;
use crate::vendors::{MeterDevice, MeterReport};
use async_trait::async_trait;

pub struct Pafal {
    session: MeterSession,
    device_address: Option<u64>,
    obis_data: ObisRecordSet,
}

impl Pafal {
    /// Mode C wake-up rate.
    pub const WAKEUP_BAUDRATE: u32 = 300;
    /// Rate proposed after identification.
    pub const TARGET_BAUDRATE: u32 = 9600;

    /// Line settings for this personality (the 300 Bd 7E1 default).
    pub fn serial_config() -> SerialConfig {
        SerialConfig::default()
    }

    pub fn new(session: MeterSession, device_address: Option<u64>) -> Self {
        Pafal {
            session,
            device_address,
            obis_data: ObisRecordSet::new(),
        }
    }

    /// Wakes the meter at 300 Bd, performs the baud switch and merges the
    /// pushed OBIS readout into the accumulated record set.
    pub async fn start_communication(&mut self) -> Result<&ObisRecordSet, Iec62056Error> {
        self.session.change_baudrate(Self::WAKEUP_BAUDRATE).await?;
        self.session.start_communication(self.device_address).await?;
        let records = self.session.negotiate_baudrate(Self::TARGET_BAUDRATE).await?;
        self.obis_data.extend(records);
        Ok(&self.obis_data)
    }

    /// Load profile record, OBIS `P.1`.
    pub async fn request_profile(&mut self) -> Result<ObisRecordSet, Iec62056Error> {
        self.session.request_obis_r5("P.1").await
    }

    /// Event log record, OBIS `P.98`.
    pub async fn request_event_log(&mut self) -> Result<ObisRecordSet, Iec62056Error> {
        self.session.request_obis_r5("P.98").await
    }

    /// Total active energy, OBIS `1.8.0`.
    pub async fn request_total_energy(&mut self) -> Result<ObisRecordSet, Iec62056Error> {
        self.session.request_obis_r1("1.8.0").await
    }

    /// Any single OBIS value by code.
    pub async fn request_value(&mut self, code: &str) -> Result<ObisRecordSet, Iec62056Error> {
        self.session.request_obis_r1(code).await
    }

    /// The OBIS records accumulated across captures.
    pub fn obis_data(&self) -> &ObisRecordSet {
        &self.obis_data
    }
}

#[async_trait]
impl MeterDevice for Pafal {
    fn name(&self) -> &'static str {
        "PAFAL"
    }

    async fn poll(&mut self) -> Result<MeterReport, Iec62056Error> {
        self.start_communication().await?;
        Ok(MeterReport::Obis(self.obis_data.clone()))
    }
}

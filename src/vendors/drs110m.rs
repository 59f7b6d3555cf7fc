//! DRS110M energy meter personality.
//!
//! A mode A meter with a fixed 9600 Bd 7E1 line. All values are read
//! through numbered registers in programming mode; the factory password
//! is 0.

use crate::error::Iec62056Error;
use crate::iec::registers::{register, RegisterReading, REGISTERS};
use crate::iec::serial::SerialConfig;
use crate::iec::session::{MeterSession, Password};
use crate::vendors::{MeterDevice, MeterReport};
use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;

pub struct Drs110m {
    session: MeterSession,
    device_address: u64,
    password: Password,
    registers: Vec<&'static str>,
    values: HashMap<&'static str, RegisterReading>,
}

impl Drs110m {
    /// Fixed line rate of the DRS110M family.
    pub const BAUDRATE: u32 = 9600;

    /// Line settings for this personality.
    pub fn serial_config() -> SerialConfig {
        SerialConfig::fixed_baudrate(Self::BAUDRATE)
    }

    /// A personality polling the whole built-in register table.
    pub fn new(session: MeterSession, device_address: u64, password: Password) -> Self {
        let registers = REGISTERS.iter().map(|def| def.name).collect();
        Drs110m {
            session,
            device_address,
            password,
            registers,
            values: HashMap::new(),
        }
    }

    /// A personality restricted to a subset of the register table.
    pub fn with_registers(
        session: MeterSession,
        device_address: u64,
        password: Password,
        names: &[&str],
    ) -> Result<Self, Iec62056Error> {
        let registers = names
            .iter()
            .map(|name| {
                register(name)
                    .map(|def| def.name)
                    .ok_or_else(|| Iec62056Error::UnknownRegister((*name).into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Drs110m {
            session,
            device_address,
            password,
            registers,
            values: HashMap::new(),
        })
    }

    /// Wakes the meter and logs into programming mode.
    pub async fn start_communication(&mut self) -> Result<(), Iec62056Error> {
        self.session
            .start_communication(Some(self.device_address))
            .await?;
        self.session.start_programming_mode(&self.password).await;
        Ok(())
    }

    /// Runs one full poll cycle: wake, log in, read every configured
    /// register, log off. Registers that answered are cached as the latest
    /// reading; ones that did not keep their previous value.
    pub async fn update_values(&mut self) -> Result<(), Iec62056Error> {
        self.start_communication().await?;
        for name in self.registers.clone() {
            match self.session.get_value(name).await {
                Ok(reading) if reading.is_populated() => {
                    self.values.insert(name, reading);
                }
                Ok(_) => {}
                Err(e) => warn!("skipping register '{name}' this round: {e}"),
            }
        }
        let _ = self.session.log_off();
        Ok(())
    }

    /// The latest cached reading for a register, if any poll captured one.
    pub fn value(&self, name: &str) -> Option<&RegisterReading> {
        self.values.get(name)
    }

    pub fn values(&self) -> &HashMap<&'static str, RegisterReading> {
        &self.values
    }

    /// Renders a cached reading as `Name:valueunit`.
    pub fn render_value(&self, name: &str) -> String {
        match self.values.get(name) {
            Some(reading) => format!("{name}:{reading}"),
            None => format!("{name}:None"),
        }
    }
}

#[async_trait]
impl MeterDevice for Drs110m {
    fn name(&self) -> &'static str {
        "DRS110M"
    }

    async fn poll(&mut self) -> Result<MeterReport, Iec62056Error> {
        self.update_values().await?;
        Ok(MeterReport::Registers(self.values.clone()))
    }
}

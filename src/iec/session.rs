//! # Session State Machine and Worker Loops
//!
//! This module drives the IEC 62056-21 session phases: identification,
//! mode/baud negotiation, programming-mode login, register access and
//! logoff. Two persistent worker tasks own the physical link for the
//! lifetime of the session; a receive loop reassembles bytes into frames
//! and routes them into per-kind inbound queues, a transmit loop drains the
//! outbound queue to the line. Session operations are blocking from the
//! caller's perspective, suspending only on a timed pop of the matching
//! inbound queue.
//!
//! There is no frame correlation on the wire, so replies are matched to
//! requests purely by message kind: keep at most one request of a kind in
//! flight. Overlapping requests of the same kind race on which caller
//! receives which reply.

use crate::constants::*;
use crate::error::Iec62056Error;
use crate::iec::frame::{
    b0_message, check_bcc, classify, option_select_message, p1_message, parse_data_message,
    parse_identification, parse_obis_frame, r1_message, r1_obis_message, r5_obis_message,
    request_message, w1_message, FrameType, MeterIdentity, ObisRecordSet, ProtocolMode,
};
use crate::iec::registers::{decode_register, register, RegisterReading};
use crate::iec::serial::{open_port, SerialConfig, SerialLink};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The programming-mode password, zeroized on drop.
///
/// DRS110M meters ship with the factory password 0, which is the default.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Password(u32);

impl Password {
    pub fn new(value: u32) -> Self {
        Password(value)
    }

    fn value(&self) -> u32 {
        self.0
    }
}

impl Default for Password {
    fn default() -> Self {
        Password(0)
    }
}

/// Timeout and retry policy of the session operations.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait for a reply to a session operation
    pub response_timeout: Duration,
    /// Wait for a pushed OBIS data frame
    pub obis_timeout: Duration,
    /// Attempt cap for `start_communication`; `None` resends forever
    pub start_attempts: Option<NonZeroU32>,
    /// Settle interval between proposing a baud rate and reconfiguring
    pub settle_delay: Duration,
    /// Stabilization interval after reconfiguring, before data is expected
    pub stabilize_delay: Duration,
    /// Per-poll read window of the receive loop
    pub read_poll: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            obis_timeout: DEFAULT_OBIS_TIMEOUT,
            start_attempts: None,
            settle_delay: BAUD_SWITCH_SETTLE,
            stabilize_delay: BAUD_SWITCH_STABILIZE,
            read_poll: DEFAULT_READ_POLL,
        }
    }
}

#[derive(Default)]
struct SharedState {
    meters: HashMap<String, MeterIdentity>,
    protocol_mode: Option<ProtocolMode>,
}

struct InboundQueues {
    identification: mpsc::UnboundedSender<Vec<u8>>,
    acknowledge: mpsc::UnboundedSender<Vec<u8>>,
    data: mpsc::UnboundedSender<Vec<u8>>,
    programming: mpsc::UnboundedSender<Vec<u8>>,
}

/// An open IEC 62056-21 session over one physical line.
///
/// Created once per link; individual communications (identification,
/// programming mode, logoff) are transient phases within its lifetime.
/// Dropping the session stops both worker loops and closes the port.
pub struct MeterSession {
    link: Arc<tokio::sync::Mutex<Box<dyn SerialLink>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    identification_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    acknowledge_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    data_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    programming_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Mutex<SharedState>>,
    device_address: Option<u64>,
    config: SessionConfig,
    rx_task: JoinHandle<()>,
    tx_task: JoinHandle<()>,
}

impl MeterSession {
    /// Opens the serial port with default settings and starts the worker
    /// loops.
    pub fn connect(port_name: &str) -> Result<MeterSession, Iec62056Error> {
        Self::connect_with_config(port_name, &SerialConfig::default(), SessionConfig::default())
    }

    /// Opens the serial port with custom settings and starts the worker
    /// loops.
    pub fn connect_with_config(
        port_name: &str,
        serial: &SerialConfig,
        config: SessionConfig,
    ) -> Result<MeterSession, Iec62056Error> {
        let port = open_port(port_name, serial)?;
        Ok(Self::attach(Box::new(port), config))
    }

    /// Starts a session over an already-open link. The entry point for
    /// tests running against the mock port.
    pub fn attach(link: Box<dyn SerialLink>, config: SessionConfig) -> MeterSession {
        let link = Arc::new(tokio::sync::Mutex::new(link));
        let shared = Arc::new(Mutex::new(SharedState::default()));

        let (identification_tx, identification_rx) = mpsc::unbounded_channel();
        let (acknowledge_tx, acknowledge_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (programming_tx, programming_rx) = mpsc::unbounded_channel();
        let queues = InboundQueues {
            identification: identification_tx,
            acknowledge: acknowledge_tx,
            data: data_tx,
            programming: programming_tx,
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let rx_task = spawn_receive_loop(link.clone(), queues, shared.clone(), config.read_poll);
        let tx_task = spawn_transmit_loop(link.clone(), outbound_rx);

        MeterSession {
            link,
            outbound,
            identification_rx,
            acknowledge_rx,
            data_rx,
            programming_rx,
            shared,
            device_address: None,
            config,
            rx_task,
            tx_task,
        }
    }

    /// The device address negotiated by the last `start_communication`.
    pub fn device_address(&self) -> Option<u64> {
        self.device_address
    }

    /// The protocol mode announced by the last identification message.
    pub fn protocol_mode(&self) -> Option<ProtocolMode> {
        self.shared.lock().unwrap().protocol_mode
    }

    /// Immutable snapshot of every meter identified over this session,
    /// keyed by identification string.
    pub fn meter_directory(&self) -> HashMap<String, MeterIdentity> {
        self.shared.lock().unwrap().meters.clone()
    }

    fn transmit(&self, msg: Vec<u8>) -> Result<(), Iec62056Error> {
        self.outbound.send(msg).map_err(|_| Iec62056Error::LinkClosed)
    }

    /// Wakes the meter: flushes stale input, sends a request message and
    /// waits for the identification reply, resending on every timeout.
    ///
    /// Without an address this is a broadcast; with one, only the addressed
    /// meter answers. Retries are unbounded unless
    /// [`SessionConfig::start_attempts`] caps them.
    pub async fn start_communication(
        &mut self,
        device_address: Option<u64>,
    ) -> Result<(), Iec62056Error> {
        info!("start communication to {device_address:?}");
        {
            let mut port = self.link.lock().await;
            port.flush_input()?;
        }
        let address = device_address.or(self.device_address);
        let msg = request_message(address);
        self.transmit(msg.clone())?;
        let mut attempts = 0u32;
        loop {
            match timeout(self.config.response_timeout, self.identification_rx.recv()).await {
                Ok(Some(_)) => {
                    self.device_address = address;
                    return Ok(());
                }
                Ok(None) => return Err(Iec62056Error::LinkClosed),
                Err(_) => {
                    attempts += 1;
                    if let Some(cap) = self.config.start_attempts {
                        if attempts >= cap.get() {
                            return Err(Iec62056Error::ProtocolTimeout(
                                "identification reply".into(),
                            ));
                        }
                    }
                    error!("timeout on start communication message - next try");
                    self.transmit(msg.clone())?;
                }
            }
        }
    }

    /// Sends an option select (mode/baud switch) message. Fire and forget;
    /// mode C meters answer with their data frame, not an acknowledgement.
    pub fn acknowledge_option_select(
        &self,
        protocol: u8,
        baudrate: Option<u32>,
        mode: u8,
    ) -> Result<(), Iec62056Error> {
        let msg = option_select_message(protocol, mode, baudrate)?;
        debug!("sending option select for protocol {protocol}, baudrate {baudrate:?}, mode {mode}");
        self.transmit(msg)
    }

    /// Logs into programming mode: option select with mode 1, wait for the
    /// password challenge, present the password, wait for the acknowledge.
    ///
    /// Returns whether the meter accepted the password. Timeouts are logged
    /// and reported through the return value; subsequent register reads
    /// come back empty when login failed.
    pub async fn start_programming_mode(&mut self, password: &Password) -> bool {
        info!("start programming mode");
        let msg = match option_select_message(0, 1, None) {
            Ok(msg) => msg,
            Err(_) => return false,
        };
        if self.transmit(msg).is_err() {
            return false;
        }
        match timeout(self.config.response_timeout, self.programming_rx.recv()).await {
            Ok(Some(_challenge)) => debug!("password request received"),
            Ok(None) => return false,
            Err(_) => {
                error!("timeout waiting for password request");
                return false;
            }
        }
        if self.transmit(p1_message(password.value())).is_err() {
            return false;
        }
        match timeout(self.config.response_timeout, self.acknowledge_rx.recv()).await {
            Ok(Some(reply)) if reply.first() == Some(&IEC_ACK) => {
                debug!("password accepted");
                true
            }
            Ok(Some(_)) => {
                warn!("password rejected");
                false
            }
            Ok(None) => false,
            Err(_) => {
                error!("timeout on P1 message");
                false
            }
        }
    }

    /// Reads one register, returning the raw data frame, or `None` when no
    /// reply arrived within the window.
    pub async fn read_register(&mut self, address: u32) -> Option<Vec<u8>> {
        if self.transmit(r1_message(address)).is_err() {
            return None;
        }
        match timeout(self.config.response_timeout, self.data_rx.recv()).await {
            Ok(Some(frame)) => Some(frame),
            _ => {
                error!("no response from register {address:#x}");
                None
            }
        }
    }

    /// Programming-mode login followed by a single register read.
    pub async fn simple_read_register(
        &mut self,
        password: &Password,
        address: u32,
    ) -> Option<Vec<u8>> {
        self.start_programming_mode(password).await;
        self.read_register(address).await
    }

    /// Reads and decodes a register by its logical name.
    ///
    /// A timeout yields a reading with raw, value and timestamp all unset.
    /// A reply keyed to a different address is logged and still decoded.
    pub async fn get_value(&mut self, name: &str) -> Result<RegisterReading, Iec62056Error> {
        let def = register(name).ok_or_else(|| Iec62056Error::UnknownRegister(name.into()))?;
        let Some(frame) = self.read_register(def.address).await else {
            return Ok(RegisterReading::empty(def));
        };
        let (key, raw) = parse_data_message(&frame)?;
        match u32::from_str_radix(&key, 16) {
            Ok(address) if address == def.address => {}
            _ => warn!(
                "{}",
                Iec62056Error::AddressMismatch {
                    requested: def.address,
                    answered: key,
                }
            ),
        }
        let value = decode_register(def, &raw)?;
        Ok(RegisterReading::captured(def, raw, value))
    }

    /// Writes one register and waits for the acknowledge. Returns whether
    /// the meter acknowledged within the window.
    pub async fn write_register(&mut self, address: u32, value: &str) -> bool {
        if self.transmit(w1_message(address, value)).is_err() {
            return false;
        }
        match timeout(self.config.response_timeout, self.acknowledge_rx.recv()).await {
            Ok(Some(reply)) => reply.first() == Some(&IEC_ACK),
            Ok(None) => false,
            Err(_) => {
                error!("timeout on write to register {address:#x}");
                false
            }
        }
    }

    /// Clears the accumulated active energy via its write-only register.
    pub async fn clear_active_energy(&mut self, password: &Password) -> bool {
        if !self.start_programming_mode(password).await {
            return false;
        }
        debug!("clearing active energy");
        self.write_register(REGISTER_CLEAR_ENERGY, "00000000").await
    }

    /// Sends the logoff (break) command. Fire and forget.
    pub fn log_off(&self) -> Result<(), Iec62056Error> {
        self.transmit(b0_message())
    }

    /// Waits for a pushed OBIS data frame and parses it.
    pub async fn capture_obis_frame(&mut self) -> Result<ObisRecordSet, Iec62056Error> {
        match timeout(self.config.obis_timeout, self.data_rx.recv()).await {
            Ok(Some(frame)) => parse_obis_frame(&frame),
            Ok(None) => Err(Iec62056Error::LinkClosed),
            Err(_) => Err(Iec62056Error::ProtocolTimeout("OBIS data frame".into())),
        }
    }

    /// Requests a named OBIS record with an R5 command and parses the
    /// returned data frame.
    pub async fn request_obis_r5(&mut self, code: &str) -> Result<ObisRecordSet, Iec62056Error> {
        self.transmit(r5_obis_message(code))?;
        debug!("requested R5 {code}");
        self.capture_obis_frame().await
    }

    /// Requests a named OBIS value with an R1 command and parses the
    /// returned data frame.
    pub async fn request_obis_r1(&mut self, code: &str) -> Result<ObisRecordSet, Iec62056Error> {
        self.transmit(r1_obis_message(code))?;
        debug!("requested R1 {code}");
        self.capture_obis_frame().await
    }

    /// Reconfigures the local port to a new baud rate.
    pub async fn change_baudrate(&mut self, baudrate: u32) -> Result<(), Iec62056Error> {
        debug!("set serial baudrate {baudrate}");
        let mut port = self.link.lock().await;
        port.reconfigure_baudrate(baudrate)
    }

    /// Mode C baud switch: propose the rate via option select, wait the
    /// settle interval, reconfigure the local port, wait the stabilization
    /// interval, then capture the data frame the meter pushes at the new
    /// rate. The delays are fixed by the standard's mode C procedure, not
    /// negotiated by acknowledgement.
    pub async fn negotiate_baudrate(
        &mut self,
        baudrate: u32,
    ) -> Result<ObisRecordSet, Iec62056Error> {
        self.acknowledge_option_select(0, Some(baudrate), 0)?;
        sleep(self.config.settle_delay).await;
        self.change_baudrate(baudrate).await?;
        sleep(self.config.stabilize_delay).await;
        self.capture_obis_frame().await
    }
}

impl Drop for MeterSession {
    fn drop(&mut self) {
        self.rx_task.abort();
        self.tx_task.abort();
    }
}

fn spawn_receive_loop(
    link: Arc<tokio::sync::Mutex<Box<dyn SerialLink>>>,
    queues: InboundQueues,
    shared: Arc<Mutex<SharedState>>,
    read_poll: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("receive loop started");
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            // The lock is released between polls so transmissions and baud
            // changes interleave with reads on the half-duplex line.
            let read = {
                let mut port = link.lock().await;
                match timeout(read_poll, port.read(&mut chunk)).await {
                    Err(_) => None,
                    Ok(Ok(n)) => Some(n),
                    Ok(Err(e)) => {
                        error!("serial read failed: {e}");
                        break;
                    }
                }
            };
            match read {
                None => {}
                Some(0) => sleep(read_poll).await,
                Some(n) => {
                    debug!("serial read {}", hex::encode(&chunk[..n]));
                    buffer.extend_from_slice(&chunk[..n]);
                    // A data block is only complete once ETX sits before the
                    // BCC; everything else is self-terminating.
                    if buffer[0] == IEC_STX {
                        if buffer.len() >= 3 && buffer[buffer.len() - 2] == IEC_ETX {
                            dispatch(&queues, &shared, std::mem::take(&mut buffer));
                        }
                    } else {
                        dispatch(&queues, &shared, std::mem::take(&mut buffer));
                    }
                }
            }
        }
    })
}

fn dispatch(queues: &InboundQueues, shared: &Arc<Mutex<SharedState>>, frame: Vec<u8>) {
    match classify(&frame) {
        FrameType::Identification => match parse_identification(&frame) {
            Ok(identity) => {
                debug!("identification message from '{}'", identity.identification);
                {
                    let mut state = shared.lock().unwrap();
                    state.protocol_mode = Some(identity.protocol_mode);
                    state
                        .meters
                        .insert(identity.identification.clone(), identity);
                }
                let _ = queues.identification.send(frame);
            }
            Err(e) => warn!("dropping corrupt identification frame: {e}"),
        },
        FrameType::Acknowledge | FrameType::NegativeAcknowledge => {
            let _ = queues.acknowledge.send(frame);
        }
        FrameType::Data => {
            if check_bcc(&frame) {
                let _ = queues.data.send(frame);
            } else {
                debug!("dropping data frame with BCC mismatch: {}", hex::encode(&frame));
            }
        }
        FrameType::ProgrammingCommand => {
            if check_bcc(&frame) {
                let _ = queues.programming.send(frame);
            } else {
                debug!(
                    "dropping programming frame with BCC mismatch: {}",
                    hex::encode(&frame)
                );
            }
        }
        FrameType::Unrecognized => {
            warn!("no corresponding message {}", hex::encode(&frame));
        }
    }
}

fn spawn_transmit_loop(
    link: Arc<tokio::sync::Mutex<Box<dyn SerialLink>>>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("transmit loop started");
        while let Some(msg) = outbound.recv().await {
            let mut port = link.lock().await;
            if let Err(e) = port.write_all(&msg).await {
                error!("serial write failed: {e}");
                break;
            }
            if let Err(e) = port.flush().await {
                error!("serial flush failed: {e}");
                break;
            }
            debug!("serial write {}", hex::encode(&msg));
        }
    })
}

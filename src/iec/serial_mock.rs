//! Mock serial port implementation for testing
//!
//! This module provides a mock serial port that can be used to test the
//! session state machine and worker loops without requiring actual hardware.

use crate::error::Iec62056Error;
use crate::iec::serial::SerialLink;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[derive(Default)]
struct MockState {
    /// Data to be read from the port (incoming)
    rx: VecDeque<u8>,
    /// Data written to the port (outgoing)
    tx: Vec<u8>,
    /// Baud rates passed to reconfigure, in order
    baud_changes: Vec<u32>,
    /// Number of input flushes observed
    input_flushes: usize,
    /// Parked reader, woken when rx data arrives
    read_waker: Option<Waker>,
}

/// Mock serial port that simulates bidirectional communication.
///
/// Clones share the same buffers, so a test can hold one handle while the
/// session owns another. Reads park until data is queued instead of spinning
/// on empty buffers.
#[derive(Clone, Default)]
pub struct MockSerialPort {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    pub fn new() -> Self {
        MockSerialPort::default()
    }

    /// Queue data to be read from the port.
    pub fn queue_rx_data(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.rx.extend(data);
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
    }

    /// Get a snapshot of the data written to the port so far.
    pub fn tx_data(&self) -> Vec<u8> {
        self.state.lock().unwrap().tx.clone()
    }

    /// Drain the data written to the port.
    pub fn take_tx_data(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().unwrap().tx)
    }

    /// Baud rates the session reconfigured to, in order.
    pub fn baud_changes(&self) -> Vec<u32> {
        self.state.lock().unwrap().baud_changes.clone()
    }

    /// Number of input-buffer flushes the session performed.
    pub fn input_flushes(&self) -> usize {
        self.state.lock().unwrap().input_flushes
    }

    /// Clear all buffers.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.rx.clear();
        state.tx.clear();
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.state.lock().unwrap();
        if state.rx.is_empty() {
            state.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let available = state.rx.len().min(buf.remaining());
        let data: Vec<u8> = state.rx.drain(..available).collect();
        buf.put_slice(&data);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.state.lock().unwrap().tx.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl SerialLink for MockSerialPort {
    fn reconfigure_baudrate(&mut self, baudrate: u32) -> Result<(), Iec62056Error> {
        self.state.lock().unwrap().baud_changes.push(baudrate);
        Ok(())
    }

    fn flush_input(&mut self) -> Result<(), Iec62056Error> {
        let mut state = self.state.lock().unwrap();
        state.rx.clear();
        state.input_flushes += 1;
        Ok(())
    }
}

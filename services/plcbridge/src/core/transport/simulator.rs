//! In-memory controller
//!
//! Backs the `plc.simulate` switch and the test suite. Memory is shared by all
//! sessions opened from the same `SimulatedPlc`, so a reconnect sees the same
//! registers. Faults can be injected for connects, exchanges and short reads.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Connector, PlcSession, TransportError};
use crate::core::mc::{DeviceAddress, DeviceType};

/// A write observed by the simulator, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    Words { head: DeviceAddress, values: Vec<u16> },
    Bits { head: DeviceAddress, values: Vec<bool> },
}

#[derive(Debug, Default)]
struct Memory {
    words: HashMap<(DeviceType, u32), u16>,
    bits: HashMap<(DeviceType, u32), bool>,
    writes: Vec<WriteRecord>,
}

#[derive(Debug, Default)]
struct SimState {
    memory: Mutex<Memory>,
    latency: Mutex<Duration>,

    fail_connect: AtomicBool,
    fail_exchanges: AtomicU32,
    short_word_reads: AtomicU32,
    short_bit_reads: AtomicU32,

    connect_attempts: AtomicU64,
    sessions_opened: AtomicU64,
    exchanges: AtomicU64,
    in_flight: AtomicUsize,
    overlaps: AtomicU64,
}

fn key(head: &DeviceAddress, i: usize) -> (DeviceType, u32) {
    (head.device, head.number.wrapping_add(i as u32))
}

/// Simulated controller; cloning shares the same memory and fault knobs
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlc {
    state: Arc<SimState>,
}

impl SimulatedPlc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload word registers starting at `head`
    pub fn set_words(&self, head: &DeviceAddress, values: &[u16]) {
        let mut memory = self.state.memory.lock();
        for (i, value) in values.iter().enumerate() {
            memory.words.insert(key(head, i), *value);
        }
    }

    /// Preload bit devices starting at `head`
    pub fn set_bits(&self, head: &DeviceAddress, values: &[bool]) {
        let mut memory = self.state.memory.lock();
        for (i, value) in values.iter().enumerate() {
            memory.bits.insert(key(head, i), *value);
        }
    }

    pub fn word(&self, addr: &DeviceAddress) -> u16 {
        let memory = self.state.memory.lock();
        memory.words.get(&key(addr, 0)).copied().unwrap_or(0)
    }

    pub fn bit(&self, addr: &DeviceAddress) -> bool {
        let memory = self.state.memory.lock();
        memory.bits.get(&key(addr, 0)).copied().unwrap_or(false)
    }

    /// Every write accepted so far, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.memory.lock().writes.clone()
    }

    /// Refuse (or accept again) new connections
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` exchanges with an IO error
    pub fn fail_next_exchanges(&self, n: u32) {
        self.state.fail_exchanges.store(n, Ordering::SeqCst);
    }

    /// Answer the next `n` word reads with one word fewer than requested
    pub fn short_next_word_reads(&self, n: u32) {
        self.state.short_word_reads.store(n, Ordering::SeqCst);
    }

    /// Answer the next `n` bit reads with one bit fewer than requested
    pub fn short_next_bit_reads(&self, n: u32) {
        self.state.short_bit_reads.store(n, Ordering::SeqCst);
    }

    /// Hold every exchange open for `latency` before answering
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock() = latency;
    }

    pub fn connect_attempts(&self) -> u64 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> u64 {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    /// Exchanges that reached the controller (failed ones included)
    pub fn exchanges(&self) -> u64 {
        self.state.exchanges.load(Ordering::SeqCst)
    }

    /// Times an exchange started while another was still in flight
    pub fn overlaps(&self) -> u64 {
        self.state.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for SimulatedPlc {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn PlcSession>, TransportError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{host}:{port}: simulated connection refused"
            )));
        }
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimSession {
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

/// Session against the simulated controller
#[derive(Debug)]
pub struct SimSession {
    state: Arc<SimState>,
    open: bool,
}

/// Marks one exchange in flight for its lifetime
struct InFlight<'a>(&'a SimState);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Requested length, or one less if a short read is pending
fn read_len(shorten: &AtomicU32, count: usize) -> usize {
    if take_one(shorten) {
        count.saturating_sub(1)
    } else {
        count
    }
}

/// Decrement `counter` if it is non-zero; returns whether it was
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl SimSession {
    /// Common exchange bookkeeping: overlap detection, latency, injected failure
    async fn begin(&self) -> Result<InFlight<'_>, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        let state = &*self.state;
        if state.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            state.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let guard = InFlight(state);
        state.exchanges.fetch_add(1, Ordering::SeqCst);

        let latency = *state.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if take_one(&state.fail_exchanges) {
            return Err(TransportError::IoError(
                "simulated connection reset".to_string(),
            ));
        }
        Ok(guard)
    }
}

#[async_trait]
impl PlcSession for SimSession {
    async fn read_words(
        &mut self,
        head: &DeviceAddress,
        count: usize,
    ) -> Result<Vec<u16>, TransportError> {
        let _guard = self.begin().await?;
        let len = read_len(&self.state.short_word_reads, count);
        let memory = self.state.memory.lock();
        Ok((0..len)
            .map(|i| memory.words.get(&key(head, i)).copied().unwrap_or(0))
            .collect())
    }

    async fn read_bits(
        &mut self,
        head: &DeviceAddress,
        count: usize,
    ) -> Result<Vec<bool>, TransportError> {
        let _guard = self.begin().await?;
        let len = read_len(&self.state.short_bit_reads, count);
        let memory = self.state.memory.lock();
        Ok((0..len)
            .map(|i| memory.bits.get(&key(head, i)).copied().unwrap_or(false))
            .collect())
    }

    async fn write_words(
        &mut self,
        head: &DeviceAddress,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let _guard = self.begin().await?;
        let mut memory = self.state.memory.lock();
        for (i, value) in values.iter().enumerate() {
            memory.words.insert(key(head, i), *value);
        }
        memory.writes.push(WriteRecord::Words {
            head: *head,
            values: values.to_vec(),
        });
        Ok(())
    }

    async fn write_bits(
        &mut self,
        head: &DeviceAddress,
        values: &[bool],
    ) -> Result<(), TransportError> {
        let _guard = self.begin().await?;
        let mut memory = self.state.memory.lock();
        for (i, value) in values.iter().enumerate() {
            memory.bits.insert(key(head, i), *value);
        }
        memory.writes.push(WriteRecord::Bits {
            head: *head,
            values: values.to_vec(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    async fn close(&mut self) {
        self.open = false;
    }
}

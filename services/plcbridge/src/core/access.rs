//! Guarded register access
//!
//! Every read and write against the controller goes through one
//! `RegisterAccess`. It owns the only session, serializes exchanges behind a
//! single async mutex, opens a session lazily and throws it away after any
//! transport failure.
//!
//! After a failure the failing caller releases the lock before sleeping out
//! the cool-down, so unrelated callers are never stalled behind the sleep.
//! While the cool-down runs and no session exists, callers fail fast without
//! touching the transport.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::mc::DeviceAddress;
use super::transport::{ConnectionState, Connector, PlcSession, TransportError};
use crate::error::{BridgeError, Result};

/// Where to reach the controller and how long to back off after a failure
#[derive(Debug, Clone)]
pub struct AccessSettings {
    pub host: String,
    pub port: u16,
    pub cooldown: Duration,
}

/// One register primitive, carried through the guarded exchange
enum Request<'a> {
    ReadWords(&'a DeviceAddress, usize),
    ReadBits(&'a DeviceAddress, usize),
    WriteWords(&'a DeviceAddress, &'a [u16]),
    WriteBits(&'a DeviceAddress, &'a [bool]),
}

enum Reply {
    Words(Vec<u16>),
    Bits(Vec<bool>),
    Done,
}

impl Request<'_> {
    fn name(&self) -> &'static str {
        match self {
            Request::ReadWords(..) => "read_words",
            Request::ReadBits(..) => "read_bits",
            Request::WriteWords(..) => "write_words",
            Request::WriteBits(..) => "write_bits",
        }
    }

    fn head(&self) -> &DeviceAddress {
        match self {
            Request::ReadWords(head, _)
            | Request::ReadBits(head, _)
            | Request::WriteWords(head, _)
            | Request::WriteBits(head, _) => head,
        }
    }

    async fn send(&self, session: &mut dyn PlcSession) -> std::result::Result<Reply, TransportError> {
        match *self {
            Request::ReadWords(head, count) => session.read_words(head, count).await.map(Reply::Words),
            Request::ReadBits(head, count) => session.read_bits(head, count).await.map(Reply::Bits),
            Request::WriteWords(head, values) => {
                session.write_words(head, values).await.map(|_| Reply::Done)
            },
            Request::WriteBits(head, values) => {
                session.write_bits(head, values).await.map(|_| Reply::Done)
            },
        }
    }
}

#[derive(Debug, Default)]
struct AccessCounters {
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    exchanges: AtomicU64,
    failed_exchanges: AtomicU64,
    rejected_cooling_down: AtomicU64,
}

/// Point-in-time view of the controller link
#[derive(Debug, Clone, Serialize)]
pub struct AccessStatus {
    pub host: String,
    pub port: u16,
    pub state: ConnectionState,
    pub connect_attempts: u64,
    pub connects: u64,
    pub connect_failures: u64,
    pub exchanges: u64,
    pub failed_exchanges: u64,
    pub rejected_cooling_down: u64,
}

/// Serialized, self-healing access to controller registers
pub struct RegisterAccess {
    connector: Arc<dyn Connector>,
    settings: AccessSettings,
    session: Mutex<Option<Box<dyn PlcSession>>>,
    /// Mirrors `session.is_some()` for lock-free status reads
    connected: AtomicBool,
    cooldown_until: parking_lot::Mutex<Option<Instant>>,
    counters: AccessCounters,
}

impl std::fmt::Debug for RegisterAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterAccess")
            .field("settings", &self.settings)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RegisterAccess {
    pub fn new(connector: Arc<dyn Connector>, settings: AccessSettings) -> Self {
        Self {
            connector,
            settings,
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
            cooldown_until: parking_lot::Mutex::new(None),
            counters: AccessCounters::default(),
        }
    }

    pub async fn read_words(&self, head: &DeviceAddress, count: usize) -> Result<Vec<u16>> {
        match self.run(Request::ReadWords(head, count)).await? {
            Reply::Words(words) => Ok(words),
            _ => Err(BridgeError::state("word read produced a non-word reply")),
        }
    }

    pub async fn read_bits(&self, head: &DeviceAddress, count: usize) -> Result<Vec<bool>> {
        match self.run(Request::ReadBits(head, count)).await? {
            Reply::Bits(bits) => Ok(bits),
            _ => Err(BridgeError::state("bit read produced a non-bit reply")),
        }
    }

    pub async fn write_words(&self, head: &DeviceAddress, values: &[u16]) -> Result<()> {
        self.run(Request::WriteWords(head, values)).await.map(|_| ())
    }

    pub async fn write_bits(&self, head: &DeviceAddress, values: &[bool]) -> Result<()> {
        self.run(Request::WriteBits(head, values)).await.map(|_| ())
    }

    /// Bit write that must not be dropped because of another caller's failure
    ///
    /// A rejection caused by a cool-down already running waits out the rest of
    /// it and tries again. Failures of this write's own exchange or connect
    /// attempt are returned as usual.
    pub async fn write_bits_after_cooldown(&self, head: &DeviceAddress, values: &[bool]) -> Result<()> {
        loop {
            if let Some(remaining) = self.cooldown_remaining() {
                debug!("write_bits {head} waiting {remaining:?} for link cool-down");
                tokio::time::sleep(remaining).await;
            }
            match self.write_bits(head, values).await {
                Err(BridgeError::ConnectionError(_)) if self.cooldown_remaining().is_some() => {},
                other => return other,
            }
        }
    }

    /// Eager connect at startup; a failure here only means the first
    /// register operation will try again
    pub async fn warm_up(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.open_session().await?);
        }
        Ok(())
    }

    /// Close the current session, if any
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut current) = session.take() {
            current.close().await;
            info!(
                "Closed controller session {}:{}",
                self.settings.host, self.settings.port
            );
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> AccessStatus {
        let state = if self.connected.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else if self.cooldown_remaining().is_some() {
            ConnectionState::CoolingDown
        } else {
            ConnectionState::Disconnected
        };
        let c = &self.counters;
        AccessStatus {
            host: self.settings.host.clone(),
            port: self.settings.port,
            state,
            connect_attempts: c.connect_attempts.load(Ordering::Relaxed),
            connects: c.connects.load(Ordering::Relaxed),
            connect_failures: c.connect_failures.load(Ordering::Relaxed),
            exchanges: c.exchanges.load(Ordering::Relaxed),
            failed_exchanges: c.failed_exchanges.load(Ordering::Relaxed),
            rejected_cooling_down: c.rejected_cooling_down.load(Ordering::Relaxed),
        }
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let until = (*self.cooldown_until.lock())?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    async fn open_session(&self) -> Result<Box<dyn PlcSession>> {
        let AccessSettings { host, port, .. } = &self.settings;
        self.counters.connect_attempts.fetch_add(1, Ordering::Relaxed);

        match self.connector.connect(host, *port).await {
            Ok(session) => {
                self.counters.connects.fetch_add(1, Ordering::Relaxed);
                self.connected.store(true, Ordering::SeqCst);
                info!("Connected to controller {host}:{port}");
                Ok(session)
            },
            Err(e) => {
                self.counters.connect_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Controller connect {host}:{port} failed: {e}");
                Err(BridgeError::connection(e.to_string()))
            },
        }
    }

    async fn run(&self, request: Request<'_>) -> Result<Reply> {
        let mut guard = self.session.lock().await;

        if guard.is_none() {
            if let Some(remaining) = self.cooldown_remaining() {
                self.counters
                    .rejected_cooling_down
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    "{} {} rejected, link cooling down for {:?}",
                    request.name(),
                    request.head(),
                    remaining
                );
                return Err(BridgeError::connection(format!(
                    "controller link cooling down ({}ms left)",
                    remaining.as_millis()
                )));
            }
            *guard = Some(self.open_session().await?);
        }

        let Some(session) = guard.as_mut() else {
            return Err(BridgeError::state("controller session vanished under lock"));
        };

        self.counters.exchanges.fetch_add(1, Ordering::Relaxed);
        let error = match request.send(session.as_mut()).await {
            Ok(reply) => return Ok(reply),
            Err(e) if !e.breaks_session() => return Err(e.into()),
            Err(e) => e,
        };

        self.counters.failed_exchanges.fetch_add(1, Ordering::Relaxed);
        if let Some(mut broken) = guard.take() {
            broken.close().await;
        }
        self.connected.store(false, Ordering::SeqCst);

        let until = Instant::now() + self.settings.cooldown;
        *self.cooldown_until.lock() = Some(until);
        drop(guard);

        warn!(
            "{} {} failed: {}; session dropped, cooling down {:?}",
            request.name(),
            request.head(),
            error,
            self.settings.cooldown
        );
        tokio::time::sleep_until(until).await;
        Err(error.into())
    }
}

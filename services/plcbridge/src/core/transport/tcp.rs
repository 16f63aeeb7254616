//! MC protocol session over TCP
//!
//! One request is written, then exactly one response is read back before the
//! next request may go out. Every exchange is bounded by the I/O timeout.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Connector, PlcSession, TransportError};
use crate::core::mc::frame::{self, Route, Units, RESPONSE_HEADER_LEN};
use crate::core::mc::DeviceAddress;

/// Opens 3E binary sessions against a controller's MC port
#[derive(Debug, Clone)]
pub struct McConnector {
    /// Bound for connect and for each exchange
    pub timeout: Duration,
    pub route: Route,
}

impl McConnector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            route: Route::default(),
        }
    }
}

#[async_trait]
impl Connector for McConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn PlcSession>, TransportError> {
        let addr = format!("{host}:{port}");
        debug!("Connecting to controller at {addr}");

        let stream = match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed(format!("{addr}: {e}")));
            },
            Err(_) => {
                return Err(TransportError::ConnectionFailed(format!(
                    "{addr}: connect timed out after {:?}",
                    self.timeout
                )));
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {e}");
        }

        Ok(Box::new(McSession {
            stream: Some(stream),
            peer: addr,
            timeout: self.timeout,
            route: self.route,
        }))
    }
}

/// A connected 3E binary session
#[derive(Debug)]
pub struct McSession {
    stream: Option<TcpStream>,
    peer: String,
    timeout: Duration,
    route: Route,
}

impl McSession {
    fn timer(&self) -> u16 {
        frame::monitoring_timer(self.timeout)
    }

    /// Send one request frame and return the response data after the end code
    async fn exchange(&mut self, request: Bytes) -> Result<Vec<u8>, TransportError> {
        let io_timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let round_trip = async {
            stream.write_all(&request).await?;

            let mut head = [0u8; RESPONSE_HEADER_LEN];
            stream.read_exact(&mut head).await?;
            let len = frame::parse_response_header(&head)?;

            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await?;
            Ok::<_, TransportError>(body)
        };

        let body = timeout(io_timeout, round_trip).await.map_err(|_| {
            TransportError::Timeout(format!("no response within {:?}", io_timeout))
        })??;

        Ok(frame::check_end_code(&body)?.to_vec())
    }
}

#[async_trait]
impl PlcSession for McSession {
    async fn read_words(
        &mut self,
        head: &DeviceAddress,
        count: usize,
    ) -> Result<Vec<u16>, TransportError> {
        let request = frame::encode_batch_read(self.route, self.timer(), head, Units::Word, count)?;
        let data = self.exchange(request).await?;
        frame::decode_words(&data, count)
    }

    async fn read_bits(
        &mut self,
        head: &DeviceAddress,
        count: usize,
    ) -> Result<Vec<bool>, TransportError> {
        let request = frame::encode_batch_read(self.route, self.timer(), head, Units::Bit, count)?;
        let data = self.exchange(request).await?;
        frame::decode_bits(&data, count)
    }

    async fn write_words(
        &mut self,
        head: &DeviceAddress,
        values: &[u16],
    ) -> Result<(), TransportError> {
        let request = frame::encode_batch_write_words(self.route, self.timer(), head, values)?;
        self.exchange(request).await.map(|_| ())
    }

    async fn write_bits(
        &mut self,
        head: &DeviceAddress,
        values: &[bool],
    ) -> Result<(), TransportError> {
        let request = frame::encode_batch_write_bits(self.route, self.timer(), head, values)?;
        self.exchange(request).await.map(|_| ())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Ignoring shutdown error for {}: {e}", self.peer);
            }
        }
    }
}

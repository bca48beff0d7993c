use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use dash_ingest_core::*;
use tokio::net::UdpSocket;

#[derive(Clone, Debug)]
pub struct UdpConfig {
    pub bind_addr: String,    // e.g. "0.0.0.0:5005"
    pub max_datagram: usize,  // larger datagrams are truncated and fail to parse
    pub max_per_poll: usize,  // per-tick read budget
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:5005".into(), max_datagram: 8192, max_per_poll: 512 }
    }
}

fn unavailable(addr: &str, source: std::io::Error) -> IngestError {
    IngestError::SourceUnavailable { addr: addr.to_string(), source }
}

/// Non-blocking socket drained on the tick thread.
pub struct UdpJsonSource {
    socket: StdUdpSocket,
    buf: Vec<u8>,
    max_per_poll: usize,
    stats: Arc<IngestStats>,
}

impl UdpJsonSource {
    pub fn bind(cfg: &UdpConfig) -> Result<Self, IngestError> {
        let socket = StdUdpSocket::bind(&cfg.bind_addr).map_err(|e| unavailable(&cfg.bind_addr, e))?;
        socket.set_nonblocking(true).map_err(|e| unavailable(&cfg.bind_addr, e))?;
        tracing::info!(addr = %cfg.bind_addr, "listening for telemetry packets");
        Ok(Self {
            socket,
            buf: vec![0u8; cfg.max_datagram.max(1)],
            max_per_poll: cfg.max_per_poll.max(1),
            stats: Arc::new(IngestStats::default()),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl TelemetrySource for UdpJsonSource {
    fn poll(&mut self, out: &mut Vec<TelemetryMessage>) {
        for _ in 0..self.max_per_poll {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, _peer)) => {
                    if let Some(msg) = ingest_payload(&self.buf[..len], &self.stats) {
                        out.push(msg);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // e.g. ICMP port-unreachable surfacing as ConnectionReset on Windows
                    tracing::warn!(error = %e, "udp receive failed");
                    break;
                }
            }
        }
    }

    fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }
}

/// Async receiver feeding the bounded payload queue from a tokio task.
pub struct UdpFeed {
    socket: UdpSocket,
    max_datagram: usize,
}

impl UdpFeed {
    pub async fn bind(cfg: &UdpConfig) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(&cfg.bind_addr).await.map_err(|e| unavailable(&cfg.bind_addr, e))?;
        tracing::info!(addr = %cfg.bind_addr, "listening for telemetry packets (background)");
        Ok(Self { socket, max_datagram: cfg.max_datagram.max(1) })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait::async_trait]
impl TelemetryFeed for UdpFeed {
    async fn run(&self, tx: PayloadTx) -> Result<(), IngestError> {
        let mut buf = vec![0u8; self.max_datagram];
        loop {
            let (len, _peer) = self.socket.recv_from(&mut buf).await?;
            match tx.offer(Bytes::copy_from_slice(&buf[..len])) {
                Ok(_) => {}
                Err(IngestError::QueueClosed) => {
                    tracing::debug!("payload queue closed, stopping udp feed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

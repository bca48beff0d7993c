//! Live-feed message parsing and the source traits used by the pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use model::{Channel, ChannelKind, ChannelValue, Diagnostics};
use serde_json::{Map, Value};

/// One parsed packet. Only the fields present in the payload are listed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryMessage {
    pub fields: Vec<(Channel, ChannelValue)>,
    /// Known keys whose value had the wrong type; they were skipped.
    pub invalid_fields: u32,
}

impl TelemetryMessage {
    pub fn get(&self, channel: Channel) -> Option<ChannelValue> {
        self.fields.iter().rev().find(|(c, _)| *c == channel).map(|(_, v)| *v)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("telemetry source unavailable at {addr}: {source}")]
    SourceUnavailable {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("payload queue closed")]
    QueueClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Malformed payloads are counted and dropped, never surfaced to the tick.
    pub fn is_parse(&self) -> bool {
        matches!(self, IngestError::Encoding(_) | IngestError::Json(_) | IngestError::NotAnObject)
    }
}

pub fn parse_message(payload: &[u8]) -> Result<TelemetryMessage, IngestError> {
    let text = std::str::from_utf8(payload)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Object(obj) => Ok(message_from_object(&obj)),
        _ => Err(IngestError::NotAnObject),
    }
}

fn message_from_object(obj: &Map<String, Value>) -> TelemetryMessage {
    let mut msg = TelemetryMessage::default();
    for (key, raw) in obj {
        let Some(channel) = Channel::from_wire_name(key) else {
            continue;
        };
        match field_value(channel, raw) {
            Some(v) => msg.fields.push((channel, v)),
            None => msg.invalid_fields += 1,
        }
    }
    msg
}

fn field_value(channel: Channel, raw: &Value) -> Option<ChannelValue> {
    match channel.kind() {
        ChannelKind::Continuous => {
            let x = raw.as_f64()?;
            // f64 outside the f32 range would become infinite; saturate instead
            Some(ChannelValue::Scalar(x.clamp(f32::MIN as f64, f32::MAX as f64) as f32))
        }
        ChannelKind::Discrete => match raw {
            Value::Bool(b) => Some(ChannelValue::Flag(*b)),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Some(ChannelValue::Flag(false)),
                Some(1) => Some(ChannelValue::Flag(true)),
                _ => None,
            },
            _ => None,
        },
    }
}

/// Counters shared between a source (possibly on another thread) and the pipeline.
#[derive(Debug, Default)]
pub struct IngestStats {
    packets_received: AtomicU64,
    parse_errors: AtomicU64,
    invalid_fields: AtomicU64,
    packets_dropped: AtomicU64,
}

impl IngestStats {
    pub fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_fields(&self, n: u32) {
        if n > 0 {
            self.invalid_fields.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Range violations are counted by the pipeline and left at zero here.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            range_violations: 0,
            invalid_fields: self.invalid_fields.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Parse one payload, updating `stats`. Failures are counted and swallowed.
pub fn ingest_payload(payload: &[u8], stats: &IngestStats) -> Option<TelemetryMessage> {
    stats.record_packet();
    match parse_message(payload) {
        Ok(msg) => {
            stats.record_invalid_fields(msg.invalid_fields);
            Some(msg)
        }
        Err(e) => {
            stats.record_parse_error();
            tracing::debug!(len = payload.len(), error = %e, "discarding malformed packet");
            None
        }
    }
}

/// A live source polled once per frame tick.
pub trait TelemetrySource: Send {
    /// Append every message that is ready right now. Must not block.
    fn poll(&mut self, out: &mut Vec<TelemetryMessage>);

    fn stats(&self) -> Arc<IngestStats>;
}

/// A producer of raw payloads running off the tick thread
#[async_trait::async_trait]
pub trait TelemetryFeed: Send + Sync {
    async fn run(&self, tx: PayloadTx) -> Result<(), IngestError>;
}

#[derive(Clone)]
pub struct PayloadTx {
    tx: crossbeam_channel::Sender<Bytes>,
    stats: Arc<IngestStats>,
}

impl PayloadTx {
    /// Queue a payload. Returns `Ok(false)` when the queue is full and the
    /// payload was dropped.
    pub fn offer(&self, payload: Bytes) -> Result<bool, IngestError> {
        match self.tx.try_send(payload) {
            Ok(()) => Ok(true),
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                self.stats.record_dropped();
                tracing::warn!("ingest queue full, dropping payload");
                Ok(false)
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => Err(IngestError::QueueClosed),
        }
    }
}

/// Tick-side end of a bounded payload queue. Parsing happens here, on the
/// tick thread, so all counters move in one place.
pub struct ChannelSource {
    rx: crossbeam_channel::Receiver<Bytes>,
    stats: Arc<IngestStats>,
}

impl TelemetrySource for ChannelSource {
    fn poll(&mut self, out: &mut Vec<TelemetryMessage>) {
        // only what is queued now; a fast producer cannot stall the tick
        for _ in 0..self.rx.len() {
            let Ok(payload) = self.rx.try_recv() else {
                break;
            };
            if let Some(msg) = ingest_payload(&payload, &self.stats) {
                out.push(msg);
            }
        }
    }

    fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }
}

pub fn channel(capacity: usize) -> (PayloadTx, ChannelSource) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let stats = Arc::new(IngestStats::default());
    (PayloadTx { tx, stats: stats.clone() }, ChannelSource { rx, stats })
}

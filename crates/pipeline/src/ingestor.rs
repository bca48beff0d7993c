//! Turns parsed live messages into per-channel live records.

use std::sync::Arc;
use std::time::Instant;

use dash_config::ChannelTable;
use dash_ingest_core::{IngestStats, TelemetryMessage, TelemetrySource};
use model::{ChannelKind, ChannelValue, Diagnostics, CHANNEL_COUNT};

use crate::state::{ChannelState, LiveSample};
use crate::watchdog::Watchdog;

pub struct Ingestor {
    source: Option<Box<dyn TelemetrySource>>,
    stats: Arc<IngestStats>,
    range_violations: u64,
}

impl Ingestor {
    /// `None` runs simulator-only; every channel stays `NoData`.
    pub fn new(source: Option<Box<dyn TelemetrySource>>) -> Self {
        let stats = source.as_ref().map(|s| s.stats()).unwrap_or_default();
        Self { source, stats, range_violations: 0 }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Everything the source has ready. Never waits.
    pub fn poll(&mut self) -> Vec<TelemetryMessage> {
        let mut out = Vec::new();
        if let Some(src) = self.source.as_mut() {
            src.poll(&mut out);
        }
        out
    }

    /// Apply one message. Present fields overwrite the channel's live record,
    /// absent ones are left alone. Out-of-range scalars are clamped and counted.
    pub fn accept(
        &mut self,
        msg: &TelemetryMessage,
        states: &mut [ChannelState; CHANNEL_COUNT],
        table: &ChannelTable,
        watchdog: &Watchdog,
        now: Instant,
    ) {
        for &(channel, value) in &msg.fields {
            let spec = table.get(channel).spec;
            let value = match (value, spec.kind) {
                (ChannelValue::Scalar(v), ChannelKind::Continuous) if spec.contains(v) => value,
                (ChannelValue::Scalar(v), ChannelKind::Continuous) if !v.is_nan() => {
                    self.range_violations += 1;
                    let clamped = spec.clamp(v);
                    tracing::debug!(%channel, value = v, clamped, "live value out of range");
                    ChannelValue::Scalar(clamped)
                }
                (ChannelValue::Flag(_), ChannelKind::Discrete) => value,
                _ => {
                    tracing::debug!(%channel, ?value, "ignoring unusable live value");
                    continue;
                }
            };

            let state = &mut states[channel.index()];
            if !watchdog.classify(channel, state.last_live_at(), now).is_valid() {
                state.reseed = true;
            }
            state.last_live = Some(LiveSample { value, at: now });
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics { range_violations: self.range_violations, ..self.stats.diagnostics() }
    }
}

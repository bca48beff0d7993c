use std::sync::Arc;
use std::time::{Duration, Instant};

use model::{Diagnostics, Provenance, TelemetrySnapshot};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvenanceCounts {
    pub live: usize,
    pub simulated: usize,
    pub frozen: usize,
}

impl ProvenanceCounts {
    pub fn of(snapshot: &TelemetrySnapshot) -> Self {
        snapshot.iter().fold(Self::default(), |mut c, r| {
            match r.provenance {
                Provenance::Live => c.live += 1,
                Provenance::Simulated => c.simulated += 1,
                Provenance::Frozen => c.frozen += 1,
            }
            c
        })
    }
}

/// Running totals for the frame loop.
pub struct FrameStats {
    session_id: Uuid,
    period: Duration,
    started: Instant,
    frames: u64,
    live_frames: u64,
    overruns: u64,
    total_tick: Duration,
    max_tick: Duration,
    last: Option<Arc<TelemetrySnapshot>>,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub session_id: Uuid,
    pub frames: u64,
    /// Frames with at least one live channel.
    pub live_frames: u64,
    /// Ticks whose processing took longer than a frame period.
    pub overruns: u64,
    pub elapsed: Duration,
    pub mean_tick: Duration,
    pub max_tick: Duration,
    pub diagnostics: Diagnostics,
}

impl FrameStats {
    pub fn new(session_id: Uuid, period: Duration) -> Self {
        Self {
            session_id,
            period,
            started: Instant::now(),
            frames: 0,
            live_frames: 0,
            overruns: 0,
            total_tick: Duration::ZERO,
            max_tick: Duration::ZERO,
            last: None,
        }
    }

    pub fn record(&mut self, snapshot: &Arc<TelemetrySnapshot>, cost: Duration) {
        self.frames += 1;
        if ProvenanceCounts::of(snapshot).live > 0 {
            self.live_frames += 1;
        }
        if cost > self.period {
            self.overruns += 1;
            tracing::debug!(cost_us = cost.as_micros() as u64, "frame over budget");
        }
        self.total_tick += cost;
        self.max_tick = self.max_tick.max(cost);
        self.last = Some(snapshot.clone());
    }

    pub fn log_status(&self) {
        let Some(last) = &self.last else { return };
        let c = ProvenanceCounts::of(last);
        let d = last.diagnostics;
        tracing::info!(
            seq = last.sequence,
            live = c.live,
            simulated = c.simulated,
            frozen = c.frozen,
            packets = d.packets_received,
            parse_errors = d.parse_errors,
            range_violations = d.range_violations,
            dropped = d.packets_dropped,
            "status"
        );
    }

    pub fn finish(self) -> Summary {
        let mean_tick = match u32::try_from(self.frames) {
            Ok(n) if n > 0 => self.total_tick / n,
            _ => Duration::ZERO,
        };
        Summary {
            session_id: self.session_id,
            frames: self.frames,
            live_frames: self.live_frames,
            overruns: self.overruns,
            elapsed: self.started.elapsed(),
            mean_tick,
            max_tick: self.max_tick,
            diagnostics: self.last.map(|s| s.diagnostics).unwrap_or_default(),
        }
    }
}

pub fn log_summary(s: &Summary) {
    let d = s.diagnostics;
    tracing::info!(
        session = %s.session_id,
        frames = s.frames,
        live_frames = s.live_frames,
        overruns = s.overruns,
        elapsed_ms = s.elapsed.as_millis() as u64,
        mean_tick_us = s.mean_tick.as_micros() as u64,
        max_tick_us = s.max_tick.as_micros() as u64,
        packets = d.packets_received,
        parse_errors = d.parse_errors,
        invalid_fields = d.invalid_fields,
        range_violations = d.range_violations,
        dropped = d.packets_dropped,
        "session finished"
    );
}

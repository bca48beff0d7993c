//! Single-writer, many-reader snapshot handoff.
//!
//! The publisher swaps a fully built `Arc<TelemetrySnapshot>` into a shared
//! slot; readers load whichever `Arc` is current and can never observe a
//! half-written frame.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use model::{ChannelReading, Diagnostics, TelemetrySnapshot, CHANNEL_COUNT};
use time::OffsetDateTime;
use uuid::Uuid;

pub struct SnapshotPublisher {
    slot: Arc<ArcSwapOption<TelemetrySnapshot>>,
    session_id: Uuid,
    sequence: u64,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self { slot: Arc::new(ArcSwapOption::empty()), session_id: Uuid::new_v4(), sequence: 0 }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Sequence number of the last published snapshot; 0 before the first.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn publish(
        &mut self,
        readings: [ChannelReading; CHANNEL_COUNT],
        frame_time_ms: u64,
        wall_time: OffsetDateTime,
        diagnostics: Diagnostics,
    ) -> Arc<TelemetrySnapshot> {
        self.sequence += 1;
        let snapshot = Arc::new(TelemetrySnapshot {
            session_id: self.session_id,
            sequence: self.sequence,
            frame_time_ms,
            wall_time,
            readings,
            diagnostics,
        });
        self.slot.store(Some(snapshot.clone()));
        snapshot
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader { slot: self.slot.clone() }
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the latest snapshot. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct SnapshotReader {
    slot: Arc<ArcSwapOption<TelemetrySnapshot>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.slot.load_full()
    }
}

use std::time::Instant;

use model::{ChannelValue, Liveness, Provenance};

/// Last accepted live value and the tick that accepted it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveSample {
    pub value: ChannelValue,
    pub at: Instant,
}

/// Per-channel record owned by the pipeline and only touched during a tick.
/// Filter internals live in the [`FilterBank`](crate::filter::FilterBank).
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub last_live: Option<LiveSample>,
    /// Set when a live sample arrives after `NoData` or `Stale`; the filter is
    /// reseeded from that sample instead of blending into old history.
    pub reseed: bool,
    pub liveness: Liveness,
    /// Filter output from the most recent live-valid tick.
    pub filtered: Option<ChannelValue>,
    pub provenance: Option<Provenance>,
}

impl ChannelState {
    pub fn last_live_at(&self) -> Option<Instant> {
        self.last_live.map(|s| s.at)
    }
}

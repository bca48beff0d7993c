//! Freshness tracking for live data.
//!
//! Age is measured from the tick that accepted the last live sample. A channel
//! is `Live` for the first half of its window, `GoingStale` for the second
//! half and `Stale` from the instant the window has fully elapsed. Recovery is
//! immediate: the first accepted sample makes the channel `Live` again.

use std::time::{Duration, Instant};

use dash_config::ChannelTable;
use model::{Channel, Liveness, CHANNEL_COUNT};

use crate::state::ChannelState;

pub struct Watchdog {
    windows: [Duration; CHANNEL_COUNT],
}

impl Watchdog {
    pub fn new(table: &ChannelTable) -> Self {
        Self { windows: Channel::ALL.map(|c| table.get(c).freshness) }
    }

    pub fn window(&self, channel: Channel) -> Duration {
        self.windows[channel.index()]
    }

    pub fn classify(&self, channel: Channel, last_at: Option<Instant>, now: Instant) -> Liveness {
        let Some(at) = last_at else {
            return Liveness::NoData;
        };
        let window = self.window(channel);
        let age = now.saturating_duration_since(at);
        if age >= window {
            Liveness::Stale
        } else if age < window / 2 {
            Liveness::Live
        } else {
            Liveness::GoingStale
        }
    }

    /// Reclassify every channel at `now`.
    pub fn evaluate(&self, states: &mut [ChannelState; CHANNEL_COUNT], now: Instant) {
        for channel in Channel::ALL {
            let state = &mut states[channel.index()];
            let next = self.classify(channel, state.last_live_at(), now);
            match (state.liveness.is_valid(), next.is_valid()) {
                (true, false) => {
                    tracing::info!(%channel, window_ms = self.window(channel).as_millis() as u64, "live data went stale");
                }
                (false, true) if state.liveness == Liveness::Stale => {
                    tracing::info!(%channel, "live data resumed");
                }
                (false, true) => {
                    tracing::debug!(%channel, "first live data");
                }
                _ => {}
            }
            state.liveness = next;
        }
    }
}

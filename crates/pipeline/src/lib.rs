//! Frame-synchronous telemetry pipeline.
//!
//! Each [`Pipeline::tick`] drains the live source, samples the simulator,
//! re-evaluates freshness, smooths live-valid channels, arbitrates every
//! channel and publishes one immutable [`TelemetrySnapshot`].

pub mod arbiter;
pub mod filter;
pub mod ingestor;
pub mod publisher;
pub mod simulator;
pub mod state;
pub mod watchdog;

use std::sync::Arc;
use std::time::Instant;

use dash_config::{ChannelTable, DashConfig};
use dash_ingest_core::TelemetrySource;
use model::{Channel, ChannelReading, ChannelValue, Diagnostics, TelemetrySnapshot, CHANNEL_COUNT};
use time::OffsetDateTime;
use uuid::Uuid;

use filter::FilterBank;
use ingestor::Ingestor;
use publisher::{SnapshotPublisher, SnapshotReader};
use simulator::Simulator;
use state::ChannelState;
use watchdog::Watchdog;

/// One value for one channel, from the simulator or the live feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub channel: Channel,
    pub value: ChannelValue,
    pub at: Instant,
}

pub struct Pipeline {
    config: Arc<DashConfig>,
    table: ChannelTable,
    epoch: Instant,
    last_tick: Option<Instant>,
    simulator: Simulator,
    ingestor: Ingestor,
    filters: FilterBank,
    watchdog: Watchdog,
    states: [ChannelState; CHANNEL_COUNT],
    publisher: SnapshotPublisher,
}

impl Pipeline {
    /// `epoch` is time zero for the simulator and for `frame_time_ms`.
    pub fn new(config: Arc<DashConfig>, source: Option<Box<dyn TelemetrySource>>, epoch: Instant) -> Self {
        let table = config.settings();
        let publisher = SnapshotPublisher::new();
        tracing::info!(
            session = %publisher.session_id(),
            frame_rate = config.frame_rate,
            live = source.is_some(),
            "pipeline started"
        );
        Self {
            simulator: Simulator::new(epoch, &table, &config.simulator),
            ingestor: Ingestor::new(source),
            filters: FilterBank::new(&table, config.frame_period()),
            watchdog: Watchdog::new(&table),
            states: Default::default(),
            last_tick: None,
            publisher,
            table,
            epoch,
            config,
        }
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }

    pub fn session_id(&self) -> Uuid {
        self.publisher.session_id()
    }

    pub fn reader(&self) -> SnapshotReader {
        self.publisher.reader()
    }

    pub fn state(&self, channel: Channel) -> &ChannelState {
        &self.states[channel.index()]
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.ingestor.diagnostics()
    }

    pub fn tick_now(&mut self) -> Arc<TelemetrySnapshot> {
        self.tick(Instant::now(), OffsetDateTime::now_utc())
    }

    /// Run one frame. A `now` earlier than the previous tick is treated as
    /// the previous tick.
    pub fn tick(&mut self, now: Instant, wall_time: OffsetDateTime) -> Arc<TelemetrySnapshot> {
        let now = match self.last_tick {
            Some(prev) if now < prev => prev,
            _ => now,
        };
        self.last_tick = Some(now);

        for msg in self.ingestor.poll() {
            self.ingestor.accept(&msg, &mut self.states, &self.table, &self.watchdog, now);
        }
        let simulated = self.simulator.sample(now);
        self.watchdog.evaluate(&mut self.states, now);

        let readings = Channel::ALL.map(|channel| {
            let state = &mut self.states[channel.index()];
            if state.liveness.is_valid() {
                if let Some(live) = state.last_live {
                    let out = if std::mem::take(&mut state.reseed) {
                        self.filters.reset(channel, live.value, now)
                    } else {
                        self.filters.update(channel, live.value, now)
                    };
                    state.filtered = Some(out);
                }
            }

            let (value, provenance) =
                arbiter::select(self.table.get(channel), state, simulated[channel.index()].value);
            if state.provenance != Some(provenance) {
                tracing::debug!(%channel, ?provenance, "provenance changed");
                state.provenance = Some(provenance);
            }
            ChannelReading { channel, value, provenance, liveness: state.liveness }
        });

        let frame_time_ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
        self.publisher.publish(readings, frame_time_ms, wall_time, self.ingestor.diagnostics())
    }
}

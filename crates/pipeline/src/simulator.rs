//! Continuous baseline values for every channel, driven by elapsed time.
//!
//! The waveforms are slow sinusoids so consecutive frames never jump. Optional
//! noise is a mean-reverting random walk from a seeded generator: it stays
//! within `±amplitude` and moves at most `0.2 × amplitude` per sample, so it
//! cannot break frame-to-frame continuity either.

use std::f32::consts::TAU;
use std::time::Instant;

use dash_config::{ChannelTable, SimulatorSection};
use model::{Channel, ChannelSpec, ChannelValue, CHANNEL_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::RawSample;

const FUEL_TOP: f32 = 0.95;
const FUEL_BOTTOM: f32 = 0.05;
const FUEL_START: f32 = 0.7;
/// Fraction of a tank used per second.
const FUEL_RATE: f32 = 0.0005;

fn noise_amplitude(channel: Channel) -> f32 {
    match channel {
        Channel::SpeedKmh => 1.2,
        Channel::Rpm => 50.0,
        _ => 0.0,
    }
}

pub struct Simulator {
    epoch: Instant,
    rng: StdRng,
    noise: bool,
    walk: [f32; CHANNEL_COUNT],
    specs: [ChannelSpec; CHANNEL_COUNT],
}

impl Simulator {
    pub fn new(epoch: Instant, table: &ChannelTable, cfg: &SimulatorSection) -> Self {
        Self {
            epoch,
            rng: StdRng::seed_from_u64(cfg.seed),
            noise: cfg.noise,
            walk: [0.0; CHANNEL_COUNT],
            specs: Channel::ALL.map(|c| table.get(c).spec),
        }
    }

    /// One sample per channel at `now`, each inside its configured range.
    pub fn sample(&mut self, now: Instant) -> [RawSample; CHANNEL_COUNT] {
        let t = now.saturating_duration_since(self.epoch).as_secs_f32();
        if self.noise {
            self.step_noise();
        }

        let speed = 120.0 * wave(t, 0.35, 0.0) + self.walk[Channel::SpeedKmh.index()];
        let rpm = 1000.0 + 3500.0 * wave(t, 0.9, 0.0) + self.walk[Channel::Rpm.index()];
        let load = rpm / 8000.0;
        let blink = (t * TAU * 0.8).sin() > 0.0;

        Channel::ALL.map(|channel| {
            let value = match channel {
                Channel::SpeedKmh => ChannelValue::Scalar(speed),
                Channel::Rpm => ChannelValue::Scalar(rpm),
                Channel::FuelLevel => ChannelValue::Scalar(fuel_level(t)),
                Channel::CoolantTempC => ChannelValue::Scalar(70.0 + 20.0 * wave(t, 0.2, 0.0)),
                Channel::OilTempC => ChannelValue::Scalar(85.0 + 25.0 * wave(t, 0.17, 1.2)),
                Channel::OilPressureBar => ChannelValue::Scalar(1.0 + load * 5.5 + 0.1 * (t * 1.7).sin()),
                Channel::TurboBar => ChannelValue::Scalar(-0.2 + load * 2.5 + 0.1 * (t * 0.7).sin()),
                Channel::BattV => ChannelValue::Scalar(13.4 + 0.4 * (t * 0.3).sin()),
                Channel::LambdaValue => ChannelValue::Scalar(0.95 + 0.15 * (t * 1.3).sin()),
                Channel::LeftBlinker => ChannelValue::Flag(blink),
                Channel::RightBlinker => ChannelValue::Flag(!blink),
                Channel::Handbrake => ChannelValue::Flag((t * 0.07).sin() > 0.95),
                Channel::LightsParking => ChannelValue::Flag((t * 0.15).sin() > 0.6),
                Channel::LightsLow => ChannelValue::Flag((t * 0.09 + 1.1).sin() > 0.2),
                Channel::LightsHigh => ChannelValue::Flag((t * 0.12 - 0.5).sin() > 0.8),
            };
            RawSample { channel, value: self.bounded(channel, value), at: now }
        })
    }

    fn step_noise(&mut self) {
        for channel in Channel::ALL {
            let a = noise_amplitude(channel);
            if a == 0.0 {
                continue;
            }
            let w = &mut self.walk[channel.index()];
            *w = (*w * 0.9 + self.rng.gen_range(-a..=a) * 0.1).clamp(-a, a);
        }
    }

    fn bounded(&self, channel: Channel, value: ChannelValue) -> ChannelValue {
        match value {
            ChannelValue::Scalar(v) => ChannelValue::Scalar(self.specs[channel.index()].clamp(v)),
            flag => flag,
        }
    }
}

/// 0..1 sinusoid.
fn wave(t: f32, rate: f32, phase: f32) -> f32 {
    0.5 + 0.5 * (t * rate + phase).sin()
}

/// Triangle wave between the bottom and top marks, starting at `FUEL_START`
/// and draining first.
fn fuel_level(t: f32) -> f32 {
    let span = FUEL_TOP - FUEL_BOTTOM;
    let x = ((FUEL_TOP - FUEL_START) + t * FUEL_RATE) % (2.0 * span);
    if x <= span {
        FUEL_TOP - x
    } else {
        FUEL_TOP - (2.0 * span - x)
    }
}

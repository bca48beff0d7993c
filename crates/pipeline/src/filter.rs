//! Per-channel smoothing.
//!
//! Continuous channels run a single-pole low-pass (`Exponential`) or a
//! fixed-window moving average. Discrete channels go through a debouncer that
//! only accepts a new state after it has been stable for a minimum duration.
//! Every filter is seeded from a real sample, never from zero.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dash_config::{ChannelSettings, ChannelTable, FilterKind};
use model::{Channel, ChannelValue};

#[derive(Debug, Clone)]
pub enum ChannelFilter {
    PassThrough,
    Exponential {
        tau: Duration,
        state: Option<(f32, Instant)>,
    },
    MovingAverage {
        len: usize,
        window: VecDeque<f32>,
    },
    Debounce {
        min_stable: Duration,
        stable: Option<bool>,
        candidate: Option<(bool, Instant)>,
    },
}

impl ChannelFilter {
    pub fn for_settings(s: &ChannelSettings, frame_period: Duration) -> Self {
        if s.channel.is_discrete() {
            return ChannelFilter::Debounce { min_stable: s.debounce, stable: None, candidate: None };
        }
        if s.time_constant.is_zero() {
            return ChannelFilter::PassThrough;
        }
        match s.filter {
            FilterKind::Exponential => ChannelFilter::Exponential { tau: s.time_constant, state: None },
            FilterKind::MovingAverage => {
                let frame = frame_period.as_nanos().max(1);
                let len = (s.time_constant.as_nanos().div_ceil(frame) as usize).max(1);
                ChannelFilter::MovingAverage { len, window: VecDeque::with_capacity(len) }
            }
        }
    }

    /// Forget history and start over from `seed`.
    pub fn reset(&mut self, seed: ChannelValue, now: Instant) -> ChannelValue {
        match (self, seed) {
            (ChannelFilter::Exponential { state, .. }, ChannelValue::Scalar(x)) => *state = Some((x, now)),
            (ChannelFilter::MovingAverage { len, window }, ChannelValue::Scalar(x)) => {
                window.clear();
                window.extend(std::iter::repeat(x).take(*len));
            }
            (ChannelFilter::Debounce { stable, candidate, .. }, ChannelValue::Flag(b)) => {
                *stable = Some(b);
                *candidate = None;
            }
            _ => {}
        }
        seed
    }

    pub fn update(&mut self, raw: ChannelValue, now: Instant) -> ChannelValue {
        match (self, raw) {
            (ChannelFilter::Exponential { tau, state }, ChannelValue::Scalar(x)) => {
                let y = match *state {
                    None => x,
                    Some((prev, at)) => {
                        let dt = now.saturating_duration_since(at).as_secs_f32();
                        let alpha = 1.0 - (-dt / tau.as_secs_f32()).exp();
                        prev + alpha * (x - prev)
                    }
                };
                *state = Some((y, now));
                ChannelValue::Scalar(y)
            }
            (ChannelFilter::MovingAverage { len, window }, ChannelValue::Scalar(x)) => {
                if window.is_empty() {
                    window.extend(std::iter::repeat(x).take(*len));
                } else {
                    if window.len() >= *len {
                        window.pop_front();
                    }
                    window.push_back(x);
                }
                // f64 keeps the mean of a constant window exact
                let sum: f64 = window.iter().map(|v| *v as f64).sum();
                ChannelValue::Scalar((sum / window.len() as f64) as f32)
            }
            (ChannelFilter::Debounce { min_stable, stable, candidate }, ChannelValue::Flag(b)) => {
                match *stable {
                    None => *stable = Some(b),
                    Some(s) if s == b => *candidate = None,
                    Some(_) => {
                        let since = match *candidate {
                            Some((c, since)) if c == b => since,
                            _ => {
                                *candidate = Some((b, now));
                                now
                            }
                        };
                        if now.saturating_duration_since(since) >= *min_stable {
                            *stable = Some(b);
                            *candidate = None;
                        }
                    }
                }
                ChannelValue::Flag(stable.unwrap_or(b))
            }
            (_, raw) => raw,
        }
    }
}

/// One filter per channel; state persists across frames.
pub struct FilterBank {
    filters: Vec<ChannelFilter>,
}

impl FilterBank {
    pub fn new(table: &ChannelTable, frame_period: Duration) -> Self {
        Self { filters: table.iter().map(|s| ChannelFilter::for_settings(s, frame_period)).collect() }
    }

    pub fn update(&mut self, channel: Channel, raw: ChannelValue, now: Instant) -> ChannelValue {
        self.filters[channel.index()].update(raw, now)
    }

    pub fn reset(&mut self, channel: Channel, seed: ChannelValue, now: Instant) -> ChannelValue {
        self.filters[channel.index()].reset(seed, now)
    }

    pub fn filter(&self, channel: Channel) -> &ChannelFilter {
        &self.filters[channel.index()]
    }
}

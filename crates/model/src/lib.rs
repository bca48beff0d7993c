//! Channel model and the per-frame snapshot handed to the rendering layer.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const CHANNEL_COUNT: usize = 15;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    SpeedKmh,
    Rpm,
    FuelLevel,
    CoolantTempC,
    OilTempC,
    OilPressureBar,
    TurboBar,
    BattV,
    LambdaValue,
    LeftBlinker,
    RightBlinker,
    Handbrake,
    LightsParking,
    LightsLow,
    LightsHigh,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::SpeedKmh,
        Channel::Rpm,
        Channel::FuelLevel,
        Channel::CoolantTempC,
        Channel::OilTempC,
        Channel::OilPressureBar,
        Channel::TurboBar,
        Channel::BattV,
        Channel::LambdaValue,
        Channel::LeftBlinker,
        Channel::RightBlinker,
        Channel::Handbrake,
        Channel::LightsParking,
        Channel::LightsLow,
        Channel::LightsHigh,
    ];

    /// Position in [`Channel::ALL`], usable as an array index.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Field name used by the live feed's JSON messages.
    pub fn wire_name(self) -> &'static str {
        match self {
            Channel::SpeedKmh => "speed_kmh",
            Channel::Rpm => "rpm",
            Channel::FuelLevel => "fuel_level",
            Channel::CoolantTempC => "coolant_temp_c",
            Channel::OilTempC => "oil_temp_c",
            Channel::OilPressureBar => "oil_pressure_bar",
            Channel::TurboBar => "turbo_bar",
            Channel::BattV => "batt_v",
            Channel::LambdaValue => "lambda_value",
            Channel::LeftBlinker => "left_blinker",
            Channel::RightBlinker => "right_blinker",
            Channel::Handbrake => "handbrake",
            Channel::LightsParking => "lights_parking",
            Channel::LightsLow => "lights_low",
            Channel::LightsHigh => "lights_high",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.wire_name() == name)
    }

    pub fn kind(self) -> ChannelKind {
        match self {
            Channel::LeftBlinker
            | Channel::RightBlinker
            | Channel::Handbrake
            | Channel::LightsParking
            | Channel::LightsLow
            | Channel::LightsHigh => ChannelKind::Discrete,
            _ => ChannelKind::Continuous,
        }
    }

    pub fn is_discrete(self) -> bool {
        self.kind() == ChannelKind::Discrete
    }

    /// Built-in range and unit; configuration may narrow or widen the range.
    pub fn default_spec(self) -> ChannelSpec {
        let (min, max, unit) = match self {
            Channel::SpeedKmh => (0.0, 260.0, Unit::KilometersPerHour),
            Channel::Rpm => (0.0, 8500.0, Unit::Rpm),
            Channel::FuelLevel => (0.0, 1.0, Unit::Fraction),
            Channel::CoolantTempC => (10.0, 120.0, Unit::Celsius),
            Channel::OilTempC => (60.0, 130.0, Unit::Celsius),
            Channel::OilPressureBar => (0.0, 7.0, Unit::Bar),
            Channel::TurboBar => (-1.0, 3.0, Unit::Bar),
            Channel::BattV => (9.0, 16.0, Unit::Volt),
            Channel::LambdaValue => (0.6, 3.0, Unit::Lambda),
            _ => return ChannelSpec::discrete(),
        };
        ChannelSpec { kind: ChannelKind::Continuous, min, max, unit }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Continuous,
    Discrete,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    KilometersPerHour,
    Rpm,
    Fraction,
    Celsius,
    Bar,
    Volt,
    Lambda,
    OnOff,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChannelSpec {
    pub kind: ChannelKind,
    pub min: f32,
    pub max: f32,
    pub unit: Unit,
}

impl ChannelSpec {
    pub fn discrete() -> Self {
        Self { kind: ChannelKind::Discrete, min: 0.0, max: 1.0, unit: Unit::OnOff }
    }

    pub fn contains(&self, v: f32) -> bool {
        (self.min..=self.max).contains(&v)
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ChannelValue {
    Scalar(f32),
    Flag(bool),
}

impl ChannelValue {
    pub fn as_scalar(self) -> Option<f32> {
        match self {
            ChannelValue::Scalar(v) => Some(v),
            ChannelValue::Flag(_) => None,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            ChannelValue::Flag(b) => Some(b),
            ChannelValue::Scalar(_) => None,
        }
    }

    /// True when the value is a flag, or a finite scalar inside `spec`.
    pub fn fits(self, spec: &ChannelSpec) -> bool {
        match (self, spec.kind) {
            (ChannelValue::Scalar(v), ChannelKind::Continuous) => v.is_finite() && spec.contains(v),
            (ChannelValue::Flag(_), ChannelKind::Discrete) => true,
            _ => false,
        }
    }
}

/// Where a published value came from.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Simulated,
    Frozen,
}

/// Freshness of a channel's live data as judged by the watchdog.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    #[default]
    NoData,
    Live,
    GoingStale,
    Stale,
}

impl Liveness {
    /// `Live` and `GoingStale` both still count as authoritative.
    pub fn is_valid(self) -> bool {
        matches!(self, Liveness::Live | Liveness::GoingStale)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChannelReading {
    pub channel: Channel,
    pub value: ChannelValue,
    pub provenance: Provenance,
    pub liveness: Liveness,
}

/// Cumulative ingestion counters, copied into every snapshot.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct Diagnostics {
    pub packets_received: u64,
    pub parse_errors: u64,
    pub range_violations: u64,
    pub invalid_fields: u64,
    pub packets_dropped: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TelemetrySnapshot {
    #[serde(with = "uuid::serde::simple")]
    pub session_id: Uuid,
    pub sequence: u64,
    /// Monotonic milliseconds since the pipeline started.
    pub frame_time_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub wall_time: OffsetDateTime,
    pub readings: [ChannelReading; CHANNEL_COUNT],
    pub diagnostics: Diagnostics,
}

impl TelemetrySnapshot {
    pub fn get(&self, channel: Channel) -> &ChannelReading {
        &self.readings[channel.index()]
    }

    pub fn value(&self, channel: Channel) -> ChannelValue {
        self.get(channel).value
    }

    pub fn scalar(&self, channel: Channel) -> Option<f32> {
        self.value(channel).as_scalar()
    }

    pub fn flag(&self, channel: Channel) -> Option<bool> {
        self.value(channel).as_flag()
    }

    pub fn provenance(&self, channel: Channel) -> Provenance {
        self.get(channel).provenance
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelReading> {
        self.readings.iter()
    }
}

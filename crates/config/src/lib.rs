use anyhow::{bail, Context, Result};
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}, time::Duration};
use serde::{Serialize, Deserialize};
use model::*;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Show the simulator's value while live data is missing.
    Simulated,
    /// Hold the last live value until live data resumes.
    Freeze,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Exponential,
    MovingAverage,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_constant_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UdpSection {
    pub enabled: bool,
    pub bind_addr: String,
    pub max_datagram: usize,
    pub max_per_poll: usize,
}

impl Default for UdpSection {
    fn default() -> Self {
        Self { enabled: false, bind_addr: "0.0.0.0:5005".into(), max_datagram: 8192, max_per_poll: 512 }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorSection {
    pub seed: u64,
    pub noise: bool,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self { seed: 0x5eed, noise: true }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DashConfig {
    pub frame_rate: u32,
    /// Freshness window for channels without their own `freshness_ms`.
    pub freshness_ms: u64,
    /// Capacity of the payload queue used by background ingestion.
    pub ingest_queue: usize,
    pub udp: UdpSection,
    pub simulator: SimulatorSection,
    pub channels: BTreeMap<Channel, ChannelOverride>,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            freshness_ms: 500,
            ingest_queue: 1024,
            udp: UdpSection::default(),
            simulator: SimulatorSection::default(),
            channels: BTreeMap::new(),
        }
    }
}

/// Resolved, immutable per-channel parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelSettings {
    pub channel: Channel,
    pub spec: ChannelSpec,
    pub time_constant: Duration,
    pub freshness: Duration,
    pub fallback: FallbackPolicy,
    pub filter: FilterKind,
    pub debounce: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelTable([ChannelSettings; CHANNEL_COUNT]);

impl ChannelTable {
    pub fn get(&self, channel: Channel) -> &ChannelSettings {
        &self.0[channel.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSettings> {
        self.0.iter()
    }
}

fn default_time_constant_ms(channel: Channel) -> u64 {
    match channel {
        Channel::SpeedKmh => 150,
        Channel::Rpm => 80,
        Channel::FuelLevel => 2000,
        Channel::CoolantTempC | Channel::OilTempC => 1500,
        Channel::OilPressureBar => 200,
        Channel::TurboBar => 100,
        Channel::BattV => 500,
        Channel::LambdaValue => 150,
        _ => 0,
    }
}

fn default_fallback(channel: Channel) -> FallbackPolicy {
    match channel {
        // a simulated fuel gauge would suggest refuelling
        Channel::FuelLevel => FallbackPolicy::Freeze,
        _ => FallbackPolicy::Simulated,
    }
}

impl DashConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: DashConfig = serde_json::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate().with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    /// Like [`DashConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=240).contains(&self.frame_rate) {
            bail!("frame_rate must be within 1..=240, got {}", self.frame_rate);
        }
        if self.freshness_ms == 0 {
            bail!("freshness_ms must be positive");
        }
        if self.ingest_queue == 0 {
            bail!("ingest_queue must be positive");
        }
        if self.udp.max_datagram == 0 || self.udp.max_per_poll == 0 {
            bail!("udp.max_datagram and udp.max_per_poll must be positive");
        }
        for (channel, o) in &self.channels {
            if channel.is_discrete() && (o.min.is_some() || o.max.is_some()) {
                bail!("{channel}: discrete channels have no range");
            }
            if o.freshness_ms == Some(0) {
                bail!("{channel}: freshness_ms must be positive");
            }
        }
        for s in self.settings().iter() {
            let spec = s.spec;
            if !spec.min.is_finite() || !spec.max.is_finite() || spec.min >= spec.max {
                bail!("{}: invalid range {}..{}", s.channel, spec.min, spec.max);
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> ChannelTable {
        ChannelTable(Channel::ALL.map(|channel| self.resolve(channel)))
    }

    fn resolve(&self, channel: Channel) -> ChannelSettings {
        let o = self.channels.get(&channel).cloned().unwrap_or_default();
        let mut spec = channel.default_spec();
        if !channel.is_discrete() {
            spec.min = o.min.unwrap_or(spec.min);
            spec.max = o.max.unwrap_or(spec.max);
        }
        ChannelSettings {
            channel,
            spec,
            time_constant: Duration::from_millis(o.time_constant_ms.unwrap_or(default_time_constant_ms(channel))),
            freshness: Duration::from_millis(o.freshness_ms.unwrap_or(self.freshness_ms)),
            fallback: o.fallback.unwrap_or(default_fallback(channel)),
            filter: o.filter.unwrap_or(FilterKind::Exponential),
            debounce: Duration::from_millis(o.debounce_ms.unwrap_or(0)),
        }
    }
}

/// `<user config dir>/dashd/config.json`, when the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|d| d.join("dashd").join("config.json"))
}

//! Per-channel choice between live, simulated and frozen values.

use dash_config::{ChannelSettings, FallbackPolicy};
use model::{ChannelValue, Provenance};

use crate::state::ChannelState;

/// Pick this frame's value for one channel.
///
/// `simulated` must already be inside the channel's range; it is the answer of
/// last resort so no channel is ever left without a value.
pub fn select(settings: &ChannelSettings, state: &ChannelState, simulated: ChannelValue) -> (ChannelValue, Provenance) {
    let (value, provenance) = match (state.liveness.is_valid(), state.filtered, settings.fallback) {
        (true, Some(v), _) => (v, Provenance::Live),
        (false, Some(v), FallbackPolicy::Freeze) => (v, Provenance::Frozen),
        _ => (simulated, Provenance::Simulated),
    };
    if value.fits(&settings.spec) {
        return (value, provenance);
    }
    match value {
        ChannelValue::Scalar(v) if !v.is_nan() => (ChannelValue::Scalar(settings.spec.clamp(v)), provenance),
        _ => (simulated, Provenance::Simulated),
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dash_config::{ChannelOverride, DashConfig};
use dash_ingest_core::PayloadTx;
use dash_pipeline::Pipeline;
use model::{Channel, Diagnostics, Liveness, Provenance, TelemetrySnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;

const FRAME: Duration = Duration::from_millis(16);
const WALL: OffsetDateTime = OffsetDateTime::UNIX_EPOCH;

fn live(cfg: DashConfig, epoch: Instant) -> (Pipeline, PayloadTx) {
    let (tx, src) = dash_ingest_core::channel(256);
    (Pipeline::new(Arc::new(cfg), Some(Box::new(src)), epoch), tx)
}

fn offline(cfg: DashConfig, epoch: Instant) -> Pipeline {
    Pipeline::new(Arc::new(cfg), None, epoch)
}

fn send(tx: &PayloadTx, payload: &str) {
    assert!(tx.offer(Bytes::copy_from_slice(payload.as_bytes())).unwrap());
}

fn frame(epoch: Instant, k: u32) -> Instant {
    epoch + FRAME * k
}

fn assert_in_range(snap: &TelemetrySnapshot, cfg: &DashConfig) {
    let table = cfg.settings();
    for r in snap.iter() {
        assert!(r.value.fits(&table.get(r.channel).spec), "{} out of range: {:?}", r.channel, r.value);
    }
}

const FULL: &str = r#"{"speed_kmh": 88.0, "rpm": 3200, "fuel_level": 0.61, "coolant_temp_c": 91,
    "oil_temp_c": 97, "oil_pressure_bar": 3.1, "turbo_bar": 0.4, "batt_v": 13.8, "lambda_value": 1.0,
    "left_blinker": false, "right_blinker": true, "handbrake": false, "lights_parking": true,
    "lights_low": true, "lights_high": false}"#;

#[test]
fn without_live_data_everything_is_simulated() {
    let cfg = DashConfig::default();
    let epoch = Instant::now();
    let mut p = offline(cfg.clone(), epoch);
    for k in 0..600 {
        let snap = p.tick(frame(epoch, k), WALL);
        assert_in_range(&snap, &cfg);
        assert!(snap.iter().all(|r| r.provenance == Provenance::Simulated && r.liveness == Liveness::NoData));
    }
    assert_eq!(p.diagnostics(), Diagnostics::default());
}

#[test]
fn over_range_rpm_is_clamped_and_counted() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    let before = p.tick(frame(epoch, 0), WALL);
    assert_eq!(before.diagnostics.range_violations, 0);

    send(&tx, r#"{"rpm": 9000}"#);
    let snap = p.tick(frame(epoch, 1), WALL);
    assert_eq!(snap.scalar(Channel::Rpm), Some(8500.0));
    assert_eq!(snap.provenance(Channel::Rpm), Provenance::Live);
    assert_eq!(snap.diagnostics.range_violations, 1);
    assert_eq!(snap.diagnostics.packets_received, 1);
}

#[test]
fn fallback_happens_exactly_at_window_expiry() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    let mut twin = offline(DashConfig::default(), epoch);

    send(&tx, r#"{"rpm": 4000, "fuel_level": 0.42}"#);
    for k in 0..=31 {
        // 31 * 16 = 496 ms, still inside the 500 ms window
        let snap = p.tick(frame(epoch, k), WALL);
        twin.tick(frame(epoch, k), WALL);
        assert_eq!(snap.provenance(Channel::Rpm), Provenance::Live, "tick {k}");
        assert_eq!(snap.scalar(Channel::Rpm), Some(4000.0));
        assert_eq!(snap.provenance(Channel::FuelLevel), Provenance::Live);
    }

    let snap = p.tick(frame(epoch, 32), WALL);
    let reference = twin.tick(frame(epoch, 32), WALL);
    assert_eq!(snap.get(Channel::Rpm).liveness, Liveness::Stale);
    assert_eq!(snap.provenance(Channel::Rpm), Provenance::Simulated);
    assert_eq!(snap.value(Channel::Rpm), reference.value(Channel::Rpm));
    assert_eq!(snap.provenance(Channel::FuelLevel), Provenance::Frozen);
    assert_eq!(snap.scalar(Channel::FuelLevel), Some(0.42));

    for k in 33..200 {
        let snap = p.tick(frame(epoch, k), WALL);
        assert_eq!(snap.provenance(Channel::FuelLevel), Provenance::Frozen);
        assert_eq!(snap.scalar(Channel::FuelLevel), Some(0.42));
    }
}

#[test]
fn malformed_packet_only_moves_the_counters() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    let (mut twin, twin_tx) = live(DashConfig::default(), epoch);

    send(&tx, FULL);
    send(&twin_tx, FULL);
    p.tick(frame(epoch, 0), WALL);
    twin.tick(frame(epoch, 0), WALL);

    send(&tx, r#"{"rpm": 51"#);
    let prev = p.reader().latest().unwrap();
    let snap = p.tick(frame(epoch, 1), WALL);
    let reference = twin.tick(frame(epoch, 1), WALL);

    assert_eq!(snap.readings, reference.readings);
    assert_eq!(snap.readings, prev.readings);
    assert_eq!(snap.sequence, prev.sequence + 1);
    assert_eq!(snap.diagnostics.parse_errors, prev.diagnostics.parse_errors + 1);
    assert_eq!(snap.diagnostics.packets_received, 2);
}

#[test]
fn partial_update_leaves_other_channels_alone() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    let mut twin = offline(DashConfig::default(), epoch);

    // nothing live yet: only the two fields go live
    send(&tx, r#"{"rpm": 2500, "fuel_level": 0.3}"#);
    let snap = p.tick(frame(epoch, 0), WALL);
    let reference = twin.tick(frame(epoch, 0), WALL);
    for r in snap.iter() {
        if matches!(r.channel, Channel::Rpm | Channel::FuelLevel) {
            assert_eq!(r.provenance, Provenance::Live);
        } else {
            assert_eq!(r.provenance, Provenance::Simulated, "{}", r.channel);
            assert_eq!(r.value, reference.value(r.channel));
        }
    }

    // everything live: a partial packet keeps the other live values
    send(&tx, FULL);
    let before = p.tick(frame(epoch, 1), WALL);
    send(&tx, r#"{"rpm": 6000, "fuel_level": 0.25}"#);
    let after = p.tick(frame(epoch, 2), WALL);
    for r in after.iter() {
        assert_eq!(r.provenance, Provenance::Live, "{}", r.channel);
        if !matches!(r.channel, Channel::Rpm | Channel::FuelLevel) {
            assert_eq!(r.value, before.value(r.channel), "{}", r.channel);
        }
    }
    let rpm = after.scalar(Channel::Rpm).unwrap();
    assert!(rpm > before.scalar(Channel::Rpm).unwrap() && rpm < 6000.0, "rpm {rpm}");
}

#[test]
fn sequence_numbers_step_by_one() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    let mut last = 0;
    for k in 0..500 {
        if k % 7 == 0 {
            send(&tx, FULL);
        }
        let snap = p.tick(frame(epoch, k), WALL);
        assert_eq!(snap.sequence, last + 1);
        assert_eq!(snap.session_id, p.session_id());
        last = snap.sequence;
    }
}

#[test]
fn constant_live_input_is_steady() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    for k in 0..300 {
        send(&tx, r#"{"rpm": 3000, "coolant_temp_c": 88.5}"#);
        let snap = p.tick(frame(epoch, k), WALL);
        assert_eq!(snap.scalar(Channel::Rpm), Some(3000.0));
        assert_eq!(snap.scalar(Channel::CoolantTempC), Some(88.5));
    }
}

#[test]
fn resume_after_stale_starts_from_the_new_sample() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    send(&tx, r#"{"rpm": 2000}"#);
    p.tick(frame(epoch, 0), WALL);
    for k in 1..60 {
        p.tick(frame(epoch, k), WALL);
    }
    assert_eq!(p.state(Channel::Rpm).liveness, Liveness::Stale);

    send(&tx, r#"{"rpm": 6000}"#);
    let snap = p.tick(frame(epoch, 60), WALL);
    assert_eq!(snap.provenance(Channel::Rpm), Provenance::Live);
    assert_eq!(snap.scalar(Channel::Rpm), Some(6000.0));
}

#[test]
fn live_updates_are_smoothed() {
    let epoch = Instant::now();
    let (mut p, tx) = live(DashConfig::default(), epoch);
    send(&tx, r#"{"rpm": 1000}"#);
    p.tick(frame(epoch, 0), WALL);

    send(&tx, r#"{"rpm": 6000}"#);
    let mut prev = 1000.0;
    for k in 1..=25 {
        if k % 4 == 0 {
            send(&tx, r#"{"rpm": 6000}"#);
        }
        let rpm = p.tick(frame(epoch, k), WALL).scalar(Channel::Rpm).unwrap();
        assert!(rpm > prev && rpm <= 6000.0);
        prev = rpm;
    }
    // five time constants of 80 ms
    assert!(6000.0 - prev < 50.0, "rpm {prev}");
}

#[test]
fn debounced_indicator_ignores_a_single_frame_glitch() {
    let mut cfg = DashConfig::default();
    cfg.channels.insert(Channel::LeftBlinker, ChannelOverride { debounce_ms: Some(40), ..Default::default() });
    let epoch = Instant::now();
    let (mut p, tx) = live(cfg, epoch);

    send(&tx, r#"{"left_blinker": false}"#);
    assert_eq!(p.tick(frame(epoch, 0), WALL).flag(Channel::LeftBlinker), Some(false));
    send(&tx, r#"{"left_blinker": true}"#);
    assert_eq!(p.tick(frame(epoch, 1), WALL).flag(Channel::LeftBlinker), Some(false));
    send(&tx, r#"{"left_blinker": 0}"#);
    assert_eq!(p.tick(frame(epoch, 2), WALL).flag(Channel::LeftBlinker), Some(false));

    send(&tx, r#"{"left_blinker": true}"#);
    let shown: Vec<_> = (3..=7).map(|k| p.tick(frame(epoch, k), WALL).flag(Channel::LeftBlinker)).collect();
    // candidate since 48 ms, accepted once it has held for 40 ms
    assert_eq!(shown, vec![Some(false), Some(false), Some(false), Some(true), Some(true)]);
}

#[test]
fn clock_going_backwards_is_ignored() {
    let epoch = Instant::now();
    let mut p = offline(DashConfig::default(), epoch);
    let a = p.tick(epoch + Duration::from_millis(100), WALL);
    let b = p.tick(epoch + Duration::from_millis(50), WALL);
    assert_eq!(a.frame_time_ms, 100);
    assert_eq!(b.frame_time_ms, 100);
    assert_eq!(b.sequence, 2);
}

#[test]
fn random_traffic_never_escapes_the_ranges() {
    let mut cfg = DashConfig::default();
    cfg.channels.insert(Channel::SpeedKmh, ChannelOverride { filter: Some(dash_config::FilterKind::MovingAverage), ..Default::default() });
    cfg.channels.insert(Channel::OilTempC, ChannelOverride { time_constant_ms: Some(0), ..Default::default() });
    let epoch = Instant::now();
    let (mut p, tx) = live(cfg.clone(), epoch);
    let mut rng = StdRng::seed_from_u64(99);

    let mut last = 0;
    let mut now = epoch;
    for _ in 0..3000 {
        // bursts, silences and garbage
        if rng.gen_bool(0.4) {
            for _ in 0..rng.gen_range(1..4) {
                let payload = match rng.gen_range(0..10) {
                    0 => "{\"rpm\": [1, 2]".to_string(),
                    1 => "not json at all".to_string(),
                    _ => {
                        let mut fields = Vec::new();
                        for c in Channel::ALL {
                            if !rng.gen_bool(0.3) {
                                continue;
                            }
                            if c.is_discrete() {
                                fields.push(format!("\"{}\": {}", c.wire_name(), rng.gen_bool(0.5)));
                            } else {
                                fields.push(format!("\"{}\": {}", c.wire_name(), rng.gen_range(-20000.0..20000.0f32)));
                            }
                        }
                        format!("{{{}}}", fields.join(", "))
                    }
                };
                send(&tx, &payload);
            }
        }
        now += if rng.gen_bool(0.01) { Duration::from_millis(700) } else { FRAME };
        let snap = p.tick(now, WALL);
        assert_in_range(&snap, &cfg);
        assert_eq!(snap.sequence, last + 1);
        last = snap.sequence;
    }
    let d = p.diagnostics();
    assert!(d.parse_errors > 0);
    assert!(d.range_violations > 0);
}

//! Sends synthetic live telemetry to a running `dashd` over UDP at ~30 Hz.
//!
//! `demo_sender --host 127.0.0.1 --port 5005`

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "demo_sender")]
#[command(about = "Sends JSON telemetry packets to dashd", long_about = None)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 5005)]
    port: u16,

    /// Only send rpm and fuel_level
    #[arg(long)]
    partial: bool,

    /// Replace every n-th packet with a truncated one
    #[arg(long)]
    garbage_every: Option<u64>,

    /// Packets per second
    #[arg(long, default_value_t = 30)]
    rate: u32,
}

fn wave(t: f64, rate: f64) -> f64 {
    0.5 + 0.5 * (t * rate).sin()
}

fn payload(t: f64, partial: bool) -> Value {
    let rpm = 1200.0 + 5000.0 * wave(t, 1.1);
    let fuel = 0.5 + 0.4 * (t * 0.2).sin();
    if partial {
        return json!({ "rpm": rpm, "fuel_level": fuel });
    }
    json!({
        "speed_kmh": 100.0 + 60.0 * wave(t, 0.6),
        "rpm": rpm,
        "fuel_level": fuel,
        "coolant_temp_c": 80.0 + 10.0 * (t * 0.3).sin(),
        "oil_temp_c": 95.0 + 12.0 * (t * 0.27).sin(),
        "oil_pressure_bar": 2.0 + 2.5 * wave(t, 0.9),
        "turbo_bar": -0.1 + 2.2 * wave(t, 0.8),
        "batt_v": 13.8 + 0.3 * (t * 0.25).sin(),
        "lambda_value": 1.0 + 0.1 * (t * 1.5).sin(),
        "left_blinker": (t * 5.0).sin() > 0.0,
        "right_blinker": (t * 5.0).sin() <= 0.0,
        "handbrake": (t * 0.7).sin() > 0.92,
        "lights_parking": true,
        "lights_low": true,
        "lights_high": (t * 0.3).sin() > 0.85,
    })
}

fn encode(n: u64, t: f64, args: &Args) -> Result<Vec<u8>> {
    let mut data = serde_json::to_vec(&payload(t, args.partial))?;
    if args.garbage_every.is_some_and(|every| every > 0 && n % every == 0) {
        data.truncate(data.len() / 2);
    }
    Ok(data)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let target = format!("{}:{}", args.host, args.port);
    let socket = UdpSocket::bind("0.0.0.0:0").await.context("bind sender socket")?;
    tracing::info!(%target, partial = args.partial, rate = args.rate, "sending telemetry");

    let mut cadence = tokio::time::interval(Duration::from_secs(1) / args.rate.max(1));
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let t0 = Instant::now();
    let mut sent: u64 = 0;
    loop {
        tokio::select! {
            _ = cadence.tick() => {}
            _ = &mut ctrl_c => break,
        }
        sent += 1;
        let data = encode(sent, t0.elapsed().as_secs_f64(), &args)?;
        if let Err(e) = socket.send_to(&data, &target).await {
            // nobody listening yet is fine
            tracing::debug!(error = %e, "send failed");
        }
    }
    tracing::info!(sent, "stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dash_ingest_core::parse_message;
    use model::Channel;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("demo_sender").chain(extra.iter().copied()))
    }

    #[test]
    fn full_payload_parses_with_every_channel() {
        let data = encode(1, 12.5, &args(&[])).unwrap();
        let msg = parse_message(&data).unwrap();
        assert_eq!(msg.fields.len(), 15);
        assert_eq!(msg.invalid_fields, 0);
        assert_eq!(msg.get(Channel::LightsLow).and_then(|v| v.as_flag()), Some(true));
    }

    #[test]
    fn partial_and_garbage_modes() {
        let a = args(&["--partial", "--garbage-every", "3"]);
        let msg = parse_message(&encode(1, 0.0, &a).unwrap()).unwrap();
        let channels: Vec<_> = msg.fields.iter().map(|(c, _)| *c).collect();
        assert_eq!(channels.len(), 2);
        assert!(channels.contains(&Channel::Rpm) && channels.contains(&Channel::FuelLevel));
        assert!(parse_message(&encode(3, 0.0, &a).unwrap()).is_err());
    }
}

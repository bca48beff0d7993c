use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dash_config::DashConfig;
use dash_ingest_core::{TelemetryFeed, TelemetrySource};
use dash_ingest_udp::{UdpConfig, UdpFeed, UdpJsonSource};
use dash_pipeline::Pipeline;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::report::{FrameStats, Summary};
use crate::IngestMode;

pub struct RunOptions {
    pub frames: Option<u64>,
    pub json: bool,
    pub report_every: Duration,
}

/// Live side of a run: the source polled by the pipeline and, in threaded
/// mode, the task filling its queue.
#[derive(Default)]
pub struct LiveInput {
    pub source: Option<Box<dyn TelemetrySource>>,
    pub feed: Option<JoinHandle<()>>,
}

fn udp_config(cfg: &DashConfig) -> UdpConfig {
    UdpConfig {
        bind_addr: cfg.udp.bind_addr.clone(),
        max_datagram: cfg.udp.max_datagram,
        max_per_poll: cfg.udp.max_per_poll,
    }
}

/// Binding failures are fatal here, at startup, and nowhere else.
pub async fn open_input(cfg: &DashConfig, mode: IngestMode) -> Result<LiveInput> {
    if !cfg.udp.enabled {
        tracing::info!("no live source configured, running on the simulator");
        return Ok(LiveInput::default());
    }
    let udp = udp_config(cfg);
    match mode {
        IngestMode::Inline => {
            let source = UdpJsonSource::bind(&udp).context("open telemetry socket")?;
            Ok(LiveInput { source: Some(Box::new(source)), feed: None })
        }
        IngestMode::Threaded => {
            let feed = UdpFeed::bind(&udp).await.context("open telemetry socket")?;
            let (tx, source) = dash_ingest_core::channel(cfg.ingest_queue);
            let handle = tokio::spawn(async move {
                if let Err(e) = feed.run(tx).await {
                    tracing::error!(error = %e, "telemetry feed stopped");
                }
            });
            Ok(LiveInput { source: Some(Box::new(source)), feed: Some(handle) })
        }
    }
}

/// Fixed-rate frame loop. Ends on Ctrl-C or after `opts.frames` frames.
pub async fn run(config: Arc<DashConfig>, input: LiveInput, opts: RunOptions) -> Result<Summary> {
    let LiveInput { source, feed } = input;
    let period = config.frame_period();
    let mut pipeline = Pipeline::new(config, source, Instant::now());
    // the JSON printer stands where a renderer would: it only sees the reader
    let reader = pipeline.reader();

    let mut cadence = tokio::time::interval(period);
    cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stats = FrameStats::new(pipeline.session_id(), period);
    let mut last_report = Instant::now();
    loop {
        tokio::select! {
            _ = cadence.tick() => {}
            res = &mut ctrl_c => {
                res.context("listen for ctrl-c")?;
                tracing::info!("interrupted, stopping frame loop");
                break;
            }
        }

        let started = Instant::now();
        let snapshot = pipeline.tick_now();
        stats.record(&snapshot, started.elapsed());

        if opts.json {
            if let Some(latest) = reader.latest() {
                let mut out = std::io::stdout().lock();
                serde_json::to_writer(&mut out, &*latest).context("write snapshot")?;
                writeln!(out).context("write snapshot")?;
            }
        }
        if !opts.report_every.is_zero() && last_report.elapsed() >= opts.report_every {
            stats.log_status();
            last_report = Instant::now();
        }
        if opts.frames.is_some_and(|n| snapshot.sequence >= n) {
            break;
        }
    }

    if let Some(handle) = feed {
        handle.abort();
    }
    Ok(stats.finish())
}

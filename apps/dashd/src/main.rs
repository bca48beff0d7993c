mod report;
mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dash_config::{default_config_path, DashConfig};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IngestMode {
    /// Drain the socket on the frame tick.
    Inline,
    /// Receive on a background task into a bounded queue.
    Threaded,
}

#[derive(Parser, Debug)]
#[command(name = "dashd")]
#[command(about = "Arbitrates live and simulated vehicle telemetry into one snapshot per frame", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file; defaults to <config dir>/dashd/config.json when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame rate override
    #[arg(long)]
    fps: Option<u32>,

    /// Listen for live JSON packets on 0.0.0.0:<port>
    #[arg(long, conflicts_with = "no_udp")]
    udp_port: Option<u16>,

    /// Simulator only, even if the config enables UDP
    #[arg(long)]
    no_udp: bool,

    #[arg(long, value_enum, default_value_t = IngestMode::Inline)]
    ingest: IngestMode,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Print every published snapshot as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Seconds between status lines; 0 disables them
    #[arg(long, default_value_t = 5)]
    report_every: u64,
}

impl Cli {
    fn resolve_config(&self) -> Result<DashConfig> {
        let mut cfg = match (&self.config, default_config_path()) {
            (Some(path), _) => DashConfig::load(path)?,
            (None, Some(path)) => DashConfig::load_or_default(&path)?,
            (None, None) => DashConfig::default(),
        };
        if let Some(fps) = self.fps {
            cfg.frame_rate = fps;
        }
        if let Some(port) = self.udp_port {
            cfg.udp.enabled = true;
            cfg.udp.bind_addr = format!("0.0.0.0:{port}");
        }
        if self.no_udp {
            cfg.udp.enabled = false;
        }
        cfg.validate().context("invalid command line settings")?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries --json output, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(cli.resolve_config()?);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        frame_rate = config.frame_rate,
        udp = config.udp.enabled,
        ingest = ?cli.ingest,
        "dashd starting"
    );

    let input = session::open_input(&config, cli.ingest).await?;
    let opts = session::RunOptions {
        frames: cli.frames,
        json: cli.json,
        report_every: Duration::from_secs(cli.report_every),
    };
    let summary = session::run(config, input, opts).await?;
    report::log_summary(&summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let path = std::env::temp_dir().join(format!("dashd-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"frame_rate": 50, "udp": {"enabled": false}}"#).unwrap();
        let arg = path.to_string_lossy().into_owned();
        let arg = arg.as_str();

        let cfg = Cli::parse_from(["dashd", "--config", arg]).resolve_config().unwrap();
        assert_eq!(cfg.frame_rate, 50);
        assert!(!cfg.udp.enabled);

        let cli = Cli::parse_from(["dashd", "--config", arg, "--udp-port", "6000", "--fps", "30", "--ingest", "threaded"]);
        assert_eq!(cli.ingest, IngestMode::Threaded);
        let cfg = cli.resolve_config().unwrap();
        assert_eq!(cfg.frame_rate, 30);
        assert!(cfg.udp.enabled);
        assert_eq!(cfg.udp.bind_addr, "0.0.0.0:6000");

        assert!(Cli::parse_from(["dashd", "--config", arg, "--fps", "0"]).resolve_config().is_err());
        std::fs::remove_file(&path).unwrap();
        assert!(Cli::parse_from(["dashd", "--config", arg]).resolve_config().is_err());
    }

    #[test]
    fn no_udp_conflicts_with_port() {
        assert!(Cli::try_parse_from(["dashd", "--udp-port", "6000", "--no-udp"]).is_err());
        assert!(Cli::try_parse_from(["dashd", "--fps", "lots"]).is_err());
    }
}

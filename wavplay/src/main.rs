//! wavplay - play a WAV file on a PCM playback device
//!
//! Exit status is 0 after normal end of file and 1 on any failure
//! (unreadable file, device open/configure/write error, malformed header).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wavplay::config::{CliOverrides, PlayerConfig};
use wavplay::device::CpalBackend;
use wavplay::player::play_path;

/// Command-line arguments for wavplay
#[derive(Parser, Debug)]
#[command(name = "wavplay")]
#[command(about = "Stream a WAV file to an audio playback device")]
#[command(version)]
struct Args {
    /// WAV file to play
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Playback device name ("default" for the system default)
    #[arg(short, long)]
    device: Option<String>,

    /// Frames per write / device period
    #[arg(short, long)]
    frames: Option<usize>,

    /// Target device buffer latency in milliseconds
    #[arg(long)]
    latency_ms: Option<u32>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Config file (TOML)
    #[arg(short, long, env = "WAVPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            device: self.device.clone(),
            frames_per_period: self.frames,
            latency_ms: self.latency_ms,
            log_level: self.log_level.clone(),
            config_file: self.config.clone(),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = PlayerConfig::resolve(args.overrides());

    let log_level = config.as_ref().map(|c| c.log_level.as_str()).unwrap_or("info");
    init_tracing(log_level);

    let outcome = config
        .context("Failed to load configuration")
        .and_then(|config| run(&args, &config));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("wavplay={}", level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(args: &Args, config: &PlayerConfig) -> Result<()> {
    info!(
        "wavplay {} [{}]",
        env!("CARGO_PKG_VERSION"),
        env!("WAVPLAY_BUILD_INFO")
    );

    let backend = CpalBackend::new();

    if args.list_devices {
        for name in backend.list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let path = args.file.as_deref().context("No input file given")?;

    let stats = play_path(&backend, path, config)
        .with_context(|| format!("Playback of {} failed", path.display()))?;

    info!(
        "Finished {}: {} frames, {} underruns",
        path.display(),
        stats.frames_delivered,
        stats.underruns
    );
    Ok(())
}

// pantrack command line
// Runs the camera-to-pan-actuator pipeline and a few bring-up helpers

use anyhow::Context;
use clap::{Parser, Subcommand};
use pantrack_core::{LoggingConfig, PipelineConfig, SerialConfig};
use pantrack_eye::{
    probe_devices, ColorBlobDetector, DirectoryOpener, Pipeline, PipelineTelemetry, DEFAULT_PROBE_LIMIT,
};
use pantrack_motor::{Actuator, LoggingActuator, SerialActuator, Waypoint};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TELEMETRY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "pantrack")]
#[command(about = "Camera detection to pan actuator pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured camera loop and the rotation worker until Ctrl-C
    Run {
        /// Configuration file (JSON, TOML or YAML); defaults apply when omitted
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Root directory of per-device frame folders (overrides capture.frames_root)
        #[arg(long)]
        frames_dir: Option<PathBuf>,

        /// Log commands instead of writing to the serial port
        #[arg(long)]
        dry_run: bool,

        /// Reference colour for the blob detector, as R,G,B
        #[arg(long, default_value = "255,0,0", value_parser = parse_rgb)]
        target_color: [u8; 3],

        /// Per-channel colour tolerance for the blob detector
        #[arg(long, default_value = "60")]
        tolerance: u8,
    },

    /// List devices that open under a frames root
    Cameras {
        #[arg(long, default_value = "./frames")]
        frames_root: PathBuf,

        /// Highest device index to try (exclusive)
        #[arg(long, default_value_t = DEFAULT_PROBE_LIMIT)]
        max: u32,
    },

    /// Send a full-range test sweep to the actuator and exit
    Sweep {
        #[arg(long)]
        port: String,

        #[arg(long, default_value = "115200")]
        baud: u32,

        #[arg(long, default_value = "7,90,100")]
        first: Waypoint,

        #[arg(long, default_value = "7,-90,100")]
        second: Waypoint,
    },

    /// Configuration helpers
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        print_default: bool,

        /// Load and validate a configuration file
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

fn parse_rgb(value: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected R,G,B but got '{}'", value));
    }
    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{}' is not a value between 0 and 255", part))?;
    }
    Ok(rgb)
}

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level '{}'", config.level))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            frames_dir,
            dry_run,
            target_color,
            tolerance,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(dir) = frames_dir {
                config.capture.frames_root = dir.display().to_string();
            }
            init_logging(&config.logging)?;
            run(config, dry_run, target_color, tolerance).await?;
        }
        Commands::Cameras { frames_root, max } => {
            init_logging(&LoggingConfig::default())?;
            let opener = DirectoryOpener::new(frames_root);
            let devices = probe_devices(&opener, max);
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }
        Commands::Sweep {
            port,
            baud,
            first,
            second,
        } => {
            init_logging(&LoggingConfig::default())?;
            let serial = SerialConfig {
                port,
                baud_rate: baud,
                ..SerialConfig::default()
            };
            let actuator = SerialActuator::new(serial);
            tokio::task::spawn_blocking(move || actuator.sweep(first, second))
                .await
                .context("sweep task failed")?
                .context("sweep failed")?;
            println!("Sent {} then {}", first, second);
        }
        Commands::Config {
            print_default,
            check,
        } => {
            if let Some(path) = &check {
                load_config(Some(path))?;
                println!("{} is valid", path.display());
            }
            if print_default {
                print!("{}", toml::to_string_pretty(&PipelineConfig::default())?);
            } else if check.is_none() {
                println!("Nothing to do: pass --print-default or --check <file>");
            }
        }
    }

    Ok(())
}

async fn run(config: PipelineConfig, dry_run: bool, target_color: [u8; 3], tolerance: u8) -> anyhow::Result<()> {
    let opener = Arc::new(DirectoryOpener::new(&config.capture.frames_root));
    let detector = Arc::new(ColorBlobDetector::new(target_color, tolerance));
    let actuator: Arc<dyn Actuator> = if dry_run {
        Arc::new(LoggingActuator::new())
    } else {
        Arc::new(SerialActuator::new(config.serial.clone()))
    };

    info!(
        "Starting pantrack: {} camera(s), frames from {}, actuator {}",
        config.cameras.len(),
        config.capture.frames_root,
        actuator.name()
    );

    let pipeline = Pipeline::new(config, opener, detector, actuator)?;
    pipeline.start();

    let mut ticker = tokio::time::interval(TELEMETRY_INTERVAL);
    ticker.tick().await;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
            _ = ticker.tick() => log_telemetry(&pipeline.telemetry()),
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

fn log_telemetry(telemetry: &PipelineTelemetry) {
    for camera in &telemetry.cameras {
        info!(
            camera_id = camera.camera_id.0,
            frames = camera.frames_processed,
            read_failures = camera.read_failures,
            detector_failures = camera.detector_failures,
            dispatches = camera.dispatches,
            skipped = camera.skipped_dispatches,
            reopens = camera.reopens,
            "camera telemetry"
        );
    }
    let actuation = &telemetry.actuation;
    info!(
        pending = actuation.pending,
        enqueued = actuation.enqueued,
        coalesced = actuation.coalesced,
        dropped = actuation.dropped,
        issued = actuation.commands_issued,
        transport_failures = actuation.transport_failures,
        state = ?telemetry.worker_state,
        "actuation telemetry"
    );
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use meeting_recorder::{
    CaptureSession, Config, FileInputProvider, HttpRemote, UploadHandoff,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Largest upload backoff exponent (2^6 = 64s)
const MAX_BACKOFF_EXP: u32 = 6;

#[derive(Parser)]
#[command(name = "meeting-recorder", about = "Capture a meeting and hand it to the recording server")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/meeting-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List input devices
    Devices,

    /// Record from a device, then upload the WAV
    Record {
        /// Device id (defaults to the platform default)
        #[arg(long)]
        device: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// Stop after this many seconds (otherwise wait for Ctrl-C)
        #[arg(long, value_parser = parse_seconds)]
        seconds: Option<Duration>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Upload attempts before giving up
        #[arg(long, default_value_t = 3)]
        upload_attempts: u32,
    },

    /// Show the server's recording status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recording server: {}", cfg.remote.base_url);

    let remote = Arc::new(HttpRemote::new(cfg.remote.base_url.clone()));
    let provider = Arc::new(FileInputProvider::new(&cfg.devices.input_dir));

    match cli.command {
        Command::Status => {
            let status = remote.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Devices => {
            let mut session = CaptureSession::new(provider, remote, cfg.session());
            for device in session.list_devices().await? {
                let marker = if device.is_default { " (default)" } else { "" };
                println!("{}\t{}{}", device.id, device.label, marker);
            }
        }
        Command::Record {
            device,
            title,
            seconds,
            tags,
            notes,
            upload_attempts,
        } => {
            let mut session = CaptureSession::new(provider, remote.clone(), cfg.session());
            session.list_devices().await?;

            let device_id = match device {
                Some(id) => id,
                None => match session.devices().default_device() {
                    Some(d) => d.id.clone(),
                    None => bail!("No input devices found in {}", cfg.devices.input_dir),
                },
            };
            session.select(&device_id)?;
            session.start(title).await?;

            wait_for_stop(&mut session, seconds).await;

            let outcome = session.stop().await?;
            if let Some(error) = &outcome.remote_error {
                warn!("Server bookkeeping incomplete: {}", error);
            }

            let mut handoff = UploadHandoff::new(outcome.recording)
                .with_tags(tags)
                .with_notes(notes);

            while !handoff.is_delivered() {
                match handoff.upload(remote.as_ref()).await {
                    Ok(()) => break,
                    Err(e) if handoff.attempts() < upload_attempts => {
                        let backoff = upload_backoff(handoff.attempts());
                        warn!("{}; retrying in {:?}", e, backoff);
                        sleep(backoff).await;
                    }
                    Err(e) => return Err(e).context("Giving up on upload"),
                }
            }

            session.reset();
            info!("Done");
        }
    }

    Ok(())
}

/// Delay before the next upload attempt: 2s, 4s, 8s, ... capped at 64s
fn upload_backoff(attempts: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempts.min(MAX_BACKOFF_EXP)))
}

/// Parse `--seconds` as a positive, finite duration
fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("not a number: {}", e))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("must be a positive number of seconds, got {}", value));
    }

    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

/// Render a level meter until the time limit or Ctrl-C
async fn wait_for_stop(session: &mut CaptureSession, deadline: Option<Duration>) {
    let mut meter = interval(Duration::from_millis(500));

    info!("Recording... press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = meter.tick() => {
                if let Some(frame) = session.visualization_frame() {
                    let level = (frame.peak() * 40.0) as usize;
                    info!("[{:<40}]", "#".repeat(level.min(40)));
                }
                match (session.elapsed(), deadline) {
                    (Some(elapsed), Some(limit)) if elapsed >= limit => break,
                    (None, _) => break,
                    _ => {}
                }
            }
        }
    }
}

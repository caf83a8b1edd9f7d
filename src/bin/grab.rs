use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use framegrab::capture::{
    CaptureDriver, CaptureSession, DisplayModeId, FieldDominance, SimulatedDriver,
};
use framegrab::{DeinterlaceMethod, GrabberSettings, SettingsStore};

/// Consumer poll period (~60 Hz).
const POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "grab")]
#[command(about = "Grab frames from a simulated capture card and print diagnostics")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Display mode id (see 'grab modes')
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<DisplayModeId>,

    /// Capture device index
    #[arg(short, long)]
    device: Option<usize>,

    /// Blend interlaced fields
    #[arg(long)]
    deinterlace: bool,

    /// Deinterlace from an untouched copy of each frame
    #[arg(long)]
    buffered_deinterlace: bool,

    /// Stop after this many new frames
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Settings file (JSON); command-line flags override it
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the display mode catalogue
    Modes,
}

fn parse_mode(s: &str) -> Result<DisplayModeId, String> {
    DisplayModeId::from_str_id(s)
        .ok_or_else(|| format!("unknown mode '{s}', run 'grab modes' for the list"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => SettingsStore::load(path)?,
        None => GrabberSettings::default(),
    };

    // Set RUST_LOG to override, e.g. RUST_LOG=framegrab=trace
    let default_level = if cli.verbose || settings.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Some(Commands::Modes) => {
            list_modes();
            Ok(())
        }
        None => {
            if let Some(mode) = cli.mode {
                settings.mode = Some(mode);
            }
            if let Some(device) = cli.device {
                settings.device_index = device;
            }
            if cli.deinterlace || cli.buffered_deinterlace {
                settings.deinterlace = true;
            }
            if cli.buffered_deinterlace {
                settings.deinterlace_method = DeinterlaceMethod::Buffered;
            }
            grab(settings, cli.frames)
        }
    }
}

fn list_modes() {
    println!("{:<14} {:<18} {:>11} {:>8}  scan", "id", "name", "size", "fps");
    for id in DisplayModeId::ALL {
        let mode = id.descriptor();
        let size = format!("{}x{}", mode.width, mode.height);
        let scan = match mode.field_dominance {
            FieldDominance::Progressive => "progressive",
            FieldDominance::Interlaced => "interlaced",
        };
        println!(
            "{:<14} {:<18} {size:>11} {:>8.2}  {scan}",
            id.as_id_str(),
            id.display_name(),
            mode.frame_rate.fps(),
        );
    }
}

fn grab(mut settings: GrabberSettings, frames: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mode = *settings.mode.get_or_insert(DisplayModeId::Hd1080p30);
    let descriptor = mode.descriptor();

    let driver: Arc<dyn CaptureDriver> = Arc::new(SimulatedDriver::new());
    let mut session = CaptureSession::new(driver, &settings);
    session.start(descriptor.width, descriptor.height)?;

    // Generous budget: twice the nominal capture time plus start-up slack
    let budget = descriptor.frame_rate.frame_interval() * (frames as u32).saturating_mul(2)
        + Duration::from_secs(5);
    let deadline = Instant::now() + budget;

    let mut seen = 0;
    while seen < frames {
        let (is_new, frame) = session.poll_frame();
        if is_new {
            seen += 1;
            let pixels = frame.pixels();
            let centre = pixels.get(pixels.len() / 2).copied().unwrap_or_default();
            tracing::debug!(
                "Frame {seen}/{frames}: seq {} centre rgb({}, {}, {})",
                frame.sequence(),
                centre.r,
                centre.g,
                centre.b
            );
        }
        drop(frame);

        if Instant::now() > deadline {
            tracing::warn!("Timed out after {seen} of {frames} frames");
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    session.stop();
    println!("{}", serde_json::to_string_pretty(&session.diagnostics())?);
    Ok(())
}

mod terminal_display;

use std::io::BufRead;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use facecam_core::capture::domain::capture_device::CaptureDevice;
use facecam_core::capture::infrastructure::ffmpeg_camera::{CaptureOptions, FfmpegCamera};
use facecam_core::capture::infrastructure::still_image_camera::StillImageCamera;
use facecam_core::detection::domain::detection_parameters::{DetectionParameters, OverlayColor};
use facecam_core::detection::infrastructure::model_resolver::ModelLocation;
use facecam_core::persistence::infrastructure::image_file_writer::ImageFileWriter;
use facecam_core::persistence::snapshot_store::SnapshotStore;
use facecam_core::session::session_controller::{SessionController, SessionHandle, StopReason};
use facecam_core::session::session_logger::StdoutSessionLogger;
use facecam_core::session::startup::cascade_frame_processor;
use facecam_core::shared::constants::{
    CASCADE_MODEL_NAME, DEFAULT_DEVICE, DEFAULT_MIN_NEIGHBORS, DEFAULT_OUTPUT_DIR,
    DEFAULT_OVERLAY_HEX, DEFAULT_SCALE_FACTOR, IMAGE_EXTENSIONS, MIN_NEIGHBORS_MAX,
    MIN_NEIGHBORS_MIN, SCALE_FACTOR_MAX, SCALE_FACTOR_MIN,
};

use terminal_display::TerminalDisplay;

/// Live webcam face detection.
///
/// While running, type a command and press Enter:
/// Enter or `s` saves the current frame, `h` toggles continuous saving,
/// `q` quits.
#[derive(Parser, Debug)]
#[command(name = "facecam")]
struct Cli {
    /// Capture device or ffmpeg input URL.
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: String,

    /// Use a still image as the camera instead of a device.
    #[arg(long, conflicts_with = "device")]
    image: Option<PathBuf>,

    /// Requested capture width in pixels.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Requested capture height in pixels.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Requested capture frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Detection pyramid scale factor (1.05-1.5).
    #[arg(long, default_value_t = DEFAULT_SCALE_FACTOR)]
    scale_factor: f64,

    /// Neighbouring detections needed to keep a face (1-10).
    #[arg(long, default_value_t = DEFAULT_MIN_NEIGHBORS)]
    min_neighbors: u32,

    /// Outline colour as #RRGGBB.
    #[arg(long, default_value = DEFAULT_OVERLAY_HEX)]
    color: String,

    /// Directory that receives saved snapshots.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Snapshot file format: jpg or png.
    #[arg(long, default_value = "jpg")]
    format: String,

    /// Path to the cascade model (downloaded when omitted).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Keep the latest annotated frame in this PNG file.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Save every frame that contains a face.
    #[arg(long)]
    save_every_frame: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let params = validate(&cli)?;

    log::info!("Resolving model: {CASCADE_MODEL_NAME}");
    let location = ModelLocation {
        explicit: cli.model.clone(),
        bundled_dir: bundled_model_dir(),
    };
    let processor = cascade_frame_processor(&location, Some(Box::new(download_progress)))?;

    let store = SnapshotStore::new(
        &cli.output_dir,
        cli.format.as_str(),
        Box::new(ImageFileWriter::new()),
    );
    let display = TerminalDisplay::new(cli.preview.clone());

    let mut controller = SessionController::new(
        open_device(&cli),
        processor,
        store,
        Box::new(display),
        params,
    )
    .with_logger(Box::new(StdoutSessionLogger::default()));
    if let Some(limit) = cli.max_frames {
        controller = controller.with_max_frames(limit);
    }

    let handle = controller.handle();
    if cli.save_every_frame {
        handle.hold_save(true);
    }
    spawn_keyboard_listener(handle, cli.save_every_frame);

    let summary = controller.run()?;
    eprintln!();
    match summary.reason {
        StopReason::Requested => log::info!("Stopped by user"),
        StopReason::FrameLimit => log::info!("Reached frame limit"),
    }
    log::info!(
        "{} frames shown, {} snapshot(s) saved to {}",
        summary.frames,
        summary.saved,
        cli.output_dir.display()
    );
    Ok(())
}

fn open_device(cli: &Cli) -> Box<dyn CaptureDevice> {
    match &cli.image {
        Some(path) => Box::new(StillImageCamera::new(path)),
        None => {
            let options = CaptureOptions {
                width: cli.width,
                height: cli.height,
                fps: cli.fps,
            };
            Box::new(FfmpegCamera::new(cli.device.as_str(), options))
        }
    }
}

/// Reads commands from stdin on a background thread.
///
/// The thread ends quietly when stdin closes; the session keeps running.
fn spawn_keyboard_listener(handle: SessionHandle, mut held: bool) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match line.trim() {
                "" | "s" => handle.request_save(),
                "h" => {
                    held = !held;
                    handle.hold_save(held);
                    eprintln!("\rContinuous save {}", if held { "on" } else { "off" });
                }
                "q" => {
                    handle.stop();
                    break;
                }
                other => eprintln!("\rUnknown command '{other}' (Enter/s: save, h: hold, q: quit)"),
            }
        }
    });
}

fn validate(cli: &Cli) -> Result<DetectionParameters, Box<dyn std::error::Error>> {
    if !(SCALE_FACTOR_MIN..=SCALE_FACTOR_MAX).contains(&cli.scale_factor) {
        return Err(format!(
            "Scale factor must be between {SCALE_FACTOR_MIN} and {SCALE_FACTOR_MAX}, got {}",
            cli.scale_factor
        )
        .into());
    }
    if !(MIN_NEIGHBORS_MIN..=MIN_NEIGHBORS_MAX).contains(&cli.min_neighbors) {
        return Err(format!(
            "Min neighbors must be between {MIN_NEIGHBORS_MIN} and {MIN_NEIGHBORS_MAX}, got {}",
            cli.min_neighbors
        )
        .into());
    }
    let color: OverlayColor = cli.color.parse()?;

    if cli.format != "jpg" && cli.format != "png" {
        return Err(format!("Format must be 'jpg' or 'png', got '{}'", cli.format).into());
    }
    if let Some(image) = &cli.image {
        if !image.is_file() {
            return Err(format!("Image file not found: {}", image.display()).into());
        }
        if !is_image(image) {
            return Err(format!("Not a supported image file: {}", image.display()).into());
        }
    }
    if cli.max_frames == Some(0) {
        return Err("Max frames must be at least 1".into());
    }
    if cli.fps == Some(0) {
        return Err("Frame rate must be at least 1".into());
    }
    if cli.width == Some(0) || cli.height == Some(0) {
        return Err("Capture size must be non-zero".into());
    }

    Ok(DetectionParameters::new(
        cli.scale_factor,
        cli.min_neighbors,
        color,
    ))
}

fn is_image(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// `models/` next to the executable, for development checkouts.
fn bundled_model_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

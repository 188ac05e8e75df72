use std::path::{Path, PathBuf};

use facecam_core::persistence::snapshot_store::SaveOutcome;
use facecam_core::session::display_sink::{DisplaySink, SessionEvent};
use facecam_core::shared::frame::Frame;

/// Shows the session on a terminal.
///
/// Keeps a one-line status on stderr and, when a preview path is given,
/// rewrites that PNG with every new frame.
pub struct TerminalDisplay {
    preview: Option<PathBuf>,
    frames: usize,
    preview_failed: bool,
}

impl TerminalDisplay {
    pub fn new(preview: Option<PathBuf>) -> Self {
        Self {
            preview,
            frames: 0,
            preview_failed: false,
        }
    }

    fn write_preview(path: &Path, rgb: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let img = image::RgbImage::from_raw(rgb.width(), rgb.height(), rgb.data().to_vec())
            .ok_or("Failed to create image from frame data")?;
        // Write next to the target and rename, so viewers never see half a file.
        let staging = path.with_extension("partial.png");
        img.save(&staging)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }
}

impl DisplaySink for TerminalDisplay {
    fn show(&mut self, rgb: &Frame) {
        self.frames += 1;
        eprint!("\rFrame {} ({}x{})", self.frames, rgb.width(), rgb.height());

        if let Some(path) = &self.preview {
            match Self::write_preview(path, rgb) {
                Ok(()) => self.preview_failed = false,
                Err(e) => {
                    // Only complain once per run of failures.
                    if !self.preview_failed {
                        log::warn!("Could not update preview {}: {e}", path.display());
                    }
                    self.preview_failed = true;
                }
            }
        }
    }

    fn report(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Started(info) => {
                eprintln!(
                    "Capturing from {} at {}x{}. Enter/s: save, h: hold, q: quit",
                    info.description, info.width, info.height
                );
            }
            SessionEvent::Save(SaveOutcome::Saved(artifact)) => {
                eprintln!(
                    "\rImage saved as {} ({} face(s))",
                    artifact.path.display(),
                    artifact.region_count
                );
            }
            SessionEvent::Save(SaveOutcome::NothingSaved) => {
                eprintln!("\rNo faces detected. Image not saved.");
            }
            SessionEvent::Warning(e) => eprintln!("\rWarning: {e}"),
        }
    }
}

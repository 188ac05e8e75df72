use std::path::Path;

use crate::persistence::domain::image_writer::ImageWriter;
use crate::shared::frame::Frame;

/// Writes a single frame to an image file using the `image` crate.
///
/// Frames are converted to RGB first, so BGR captures land on disk with
/// their true colours.
pub struct ImageFileWriter;

impl ImageFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let rgb = frame.to_rgb();
        let img = image::RgbImage::from_raw(rgb.width(), rgb.height(), rgb.into_data())
            .ok_or("Failed to create image from frame data")?;

        img.save(path)?;
        Ok(())
    }
}

use std::path::PathBuf;

use crate::capture::domain::capture_device::{CaptureDevice, CaptureError, CaptureInfo};
use crate::shared::frame::{ChannelOrder, Frame};

/// Presents a single image file as a camera that keeps showing the same
/// picture.
///
/// Useful for demos and for exercising the session without a webcam.
/// With a frame limit, the "camera" fails its read after that many frames,
/// like an unplugged device.
pub struct StillImageCamera {
    path: PathBuf,
    frame_limit: Option<usize>,
    image: Option<Frame>,
    frames_read: usize,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_limit: None,
            image: None,
            frames_read: 0,
        }
    }

    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }
}

impl CaptureDevice for StillImageCamera {
    fn open(&mut self) -> Result<CaptureInfo, CaptureError> {
        let rgb = image::open(&self.path)
            .map_err(|e| CaptureError::Open {
                source_name: self.path.display().to_string(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        let (width, height) = rgb.dimensions();

        // Present the picture the way a webcam would: BGR.
        let bgr: Vec<u8> = rgb
            .into_raw()
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();

        self.image = Some(Frame::new(bgr, width, height, ChannelOrder::Bgr, 0));
        self.frames_read = 0;
        log::info!(
            "Opened still image {} as capture source: {width}x{height}",
            self.path.display()
        );

        Ok(CaptureInfo {
            width,
            height,
            fps: 0.0,
            description: self.path.display().to_string(),
        })
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let image = self.image.as_ref().ok_or(CaptureError::NotOpen)?;
        if self.frame_limit.is_some_and(|limit| self.frames_read >= limit) {
            return Err(CaptureError::EndOfStream);
        }
        let frame = Frame::new(
            image.data().to_vec(),
            image.width(),
            image.height(),
            ChannelOrder::Bgr,
            self.frames_read,
        );
        self.frames_read += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        self.image = None;
    }

    fn is_open(&self) -> bool {
        self.image.is_some()
    }
}

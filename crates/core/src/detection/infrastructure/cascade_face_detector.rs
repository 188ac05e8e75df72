use std::path::Path;

use rustface::{Detector, ImageData};

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::{ChannelOrder, Frame};
use crate::shared::region::Region;

/// Smallest face (in pixels) the cascade looks for.
pub const MIN_FACE_SIZE: u32 = 20;
/// Sliding window step, in pixels, on every pyramid level.
pub const WINDOW_STEP: u32 = 4;
/// Score contributed by each merged candidate window.
///
/// The cascade's non-maximum suppression adds up the scores of the windows
/// it merges, so a threshold of `n * SCORE_PER_NEIGHBOR` keeps faces backed
/// by roughly `n` overlapping hits. Three neighbours lands near the
/// detector's customary threshold of 2.0.
pub const SCORE_PER_NEIGHBOR: f64 = 0.7;

const MIN_PYRAMID_SCALE: f32 = 0.01;
const MAX_PYRAMID_SCALE: f32 = 0.99;

/// Face detector backed by the SeetaFace funnel-structured cascade.
///
/// The model is loaded once at construction; a missing or corrupt model
/// file is reported here rather than on the first frame.
pub struct CascadeFaceDetector {
    detector: Box<dyn Detector>,
}

impl CascadeFaceDetector {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let path = model_path
            .to_str()
            .ok_or_else(|| format!("model path is not valid UTF-8: {}", model_path.display()))?;
        let detector = rustface::create_detector(path)
            .map_err(|e| format!("failed to load cascade model {}: {e}", model_path.display()))?;
        log::info!("Loaded cascade model from {}", model_path.display());
        Ok(Self::with_detector(detector))
    }

    fn with_detector(mut detector: Box<dyn Detector>) -> Self {
        detector.set_min_face_size(MIN_FACE_SIZE);
        detector.set_slide_window_step(WINDOW_STEP, WINDOW_STEP);
        Self { detector }
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(
        &mut self,
        gray: &Frame,
        scale_factor: f64,
        min_neighbors: u32,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        if gray.order() != ChannelOrder::Gray {
            return Err("cascade detector expects a single-channel frame".into());
        }
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }

        self.detector
            .set_pyramid_scale_factor(pyramid_scale(scale_factor));
        self.detector
            .set_score_thresh(score_threshold(min_neighbors));

        let image = ImageData::new(gray.data(), gray.width(), gray.height());
        let faces = self.detector.detect(&image);

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Region::new(
                    bbox.x(),
                    bbox.y(),
                    i32::try_from(bbox.width()).unwrap_or(i32::MAX),
                    i32::try_from(bbox.height()).unwrap_or(i32::MAX),
                )
                .with_score(face.score())
            })
            .collect())
    }
}

/// Maps a "grow by this much per level" factor (> 1) onto the cascade's
/// "shrink by this much per level" pyramid factor (< 1).
pub fn pyramid_scale(scale_factor: f64) -> f32 {
    if scale_factor.is_nan() || scale_factor <= 1.0 {
        return MAX_PYRAMID_SCALE;
    }
    ((1.0 / scale_factor) as f32).clamp(MIN_PYRAMID_SCALE, MAX_PYRAMID_SCALE)
}

pub fn score_threshold(min_neighbors: u32) -> f64 {
    f64::from(min_neighbors.max(1)) * SCORE_PER_NEIGHBOR
}

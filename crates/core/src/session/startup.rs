use thiserror::Error;

use crate::annotation::infrastructure::rect_outline_annotator::RectOutlineAnnotator;
use crate::capture::domain::capture_device::CaptureError;
use crate::detection::infrastructure::cascade_face_detector::CascadeFaceDetector;
use crate::detection::infrastructure::model_resolver::{
    self, ModelLocation, ModelResolveError, ProgressFn,
};
use crate::pipeline::frame_processor::FrameProcessor;
use crate::shared::constants::{CASCADE_MODEL_NAME, CASCADE_MODEL_URL};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to obtain face detection model: {0}")]
    Model(#[from] ModelResolveError),
    #[error("failed to load face detector: {0}")]
    Detector(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Resolves the cascade model and builds a processor around it.
pub fn cascade_frame_processor(
    location: &ModelLocation,
    progress: Option<ProgressFn>,
) -> Result<FrameProcessor, StartupError> {
    let model_path =
        model_resolver::resolve(CASCADE_MODEL_NAME, CASCADE_MODEL_URL, location, progress)?;
    let detector =
        CascadeFaceDetector::new(&model_path).map_err(|e| StartupError::Detector(e.to_string()))?;
    Ok(FrameProcessor::new(
        Box::new(detector),
        Box::new(RectOutlineAnnotator::default()),
    ))
}

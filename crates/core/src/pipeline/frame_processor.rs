use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Output of one [`FrameProcessor::process`] call.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    /// Copy of the input with an outline drawn around every region.
    pub annotated: Frame,
    /// Detected faces, each fully inside the frame.
    pub regions: Vec<Region>,
}

/// Detects faces in a frame and outlines them.
///
/// Owns its detector and annotator; holds no other state between calls.
pub struct FrameProcessor {
    detector: Box<dyn FaceDetector>,
    annotator: Box<dyn FrameAnnotator>,
}

impl FrameProcessor {
    pub fn new(detector: Box<dyn FaceDetector>, annotator: Box<dyn FrameAnnotator>) -> Self {
        Self {
            detector,
            annotator,
        }
    }

    pub fn process(
        &mut self,
        frame: &Frame,
        params: &DetectionParameters,
    ) -> Result<ProcessedFrame, Box<dyn std::error::Error>> {
        let gray = frame.to_gray();
        let raw = self
            .detector
            .detect(&gray, params.scale_factor, params.min_neighbors)?;

        let (width, height) = (frame.width(), frame.height());
        let regions: Vec<Region> = raw
            .iter()
            .filter_map(|r| r.clamp_to(width, height))
            .collect();
        if regions.len() != raw.len() {
            log::debug!(
                "Frame {}: dropped {} region(s) outside the frame",
                frame.index(),
                raw.len() - regions.len()
            );
        }

        let mut annotated = frame.clone();
        self.annotator
            .annotate(&mut annotated, &regions, params.overlay_color)?;

        Ok(ProcessedFrame { annotated, regions })
    }
}

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for the pre-trained face detector.
///
/// Receives a single-channel intensity frame and the two user tunables.
/// `&mut self` because detector backends keep scratch buffers between calls.
pub trait FaceDetector {
    fn detect(
        &mut self,
        gray: &Frame,
        scale_factor: f64,
        min_neighbors: u32,
    ) -> Result<Vec<Region>, Box<dyn std::error::Error>>;
}

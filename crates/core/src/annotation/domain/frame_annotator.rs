use crate::detection::domain::detection_parameters::OverlayColor;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Domain interface for marking detected regions on a frame.
///
/// Implementations modify the frame in-place and must honour the frame's
/// channel order when writing the colour.
pub trait FrameAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        regions: &[Region],
        color: OverlayColor,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

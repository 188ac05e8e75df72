use image::{ImageBuffer, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::detection::domain::detection_parameters::OverlayColor;
use crate::shared::constants::OUTLINE_THICKNESS;
use crate::shared::frame::{ChannelOrder, Frame};
use crate::shared::region::Region;

/// Draws a hollow rectangle of fixed stroke width around each region.
///
/// Strokes grow inward from the region edge so the outline never leaves
/// the region (and therefore never leaves the frame).
pub struct RectOutlineAnnotator {
    thickness: u32,
}

impl RectOutlineAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            thickness: thickness.max(1),
        }
    }
}

impl Default for RectOutlineAnnotator {
    fn default() -> Self {
        Self::new(OUTLINE_THICKNESS)
    }
}

impl FrameAnnotator for RectOutlineAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        regions: &[Region],
        color: OverlayColor,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let pixel = match frame.order() {
            ChannelOrder::Bgr => Rgb(color.to_bgr()),
            ChannelOrder::Rgb => Rgb(color.to_rgb()),
            ChannelOrder::Gray => return Err("cannot draw a coloured outline on a gray frame".into()),
        };

        let (width, height) = (frame.width(), frame.height());
        // The buffer is only used as a 3-channel canvas; `pixel` is already
        // in the frame's order.
        let mut canvas: ImageBuffer<Rgb<u8>, &mut [u8]> =
            ImageBuffer::from_raw(width, height, frame.data_mut())
                .ok_or("frame buffer does not match its dimensions")?;

        for region in regions {
            let Some(visible) = region.clamp_to(width, height) else {
                continue;
            };
            for inset in 0..self.thickness as i32 {
                let w = visible.width - 2 * inset;
                let h = visible.height - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(visible.x + inset, visible.y + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, pixel);
            }
        }
        Ok(())
    }
}

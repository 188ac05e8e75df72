/// An axis-aligned face rectangle in frame pixel coordinates.
///
/// Produced fresh for every frame; carries no identity across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Detector confidence. Informational only.
    pub score: f64,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            score: 0.0,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// True when the rectangle is non-empty and fully inside a
    /// `frame_width` x `frame_height` frame.
    pub fn is_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x >= 0
            && self.y >= 0
            && i64::from(self.right()) <= i64::from(frame_width)
            && i64::from(self.bottom()) <= i64::from(frame_height)
    }

    /// Intersection with the frame rectangle, or `None` when nothing of
    /// the region is visible.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let fw = i32::try_from(frame_width).unwrap_or(i32::MAX);
        let fh = i32::try_from(frame_height).unwrap_or(i32::MAX);

        let x1 = self.x.clamp(0, fw);
        let y1 = self.y.clamp(0, fh);
        let x2 = self.x.saturating_add(self.width).clamp(0, fw);
        let y2 = self.y.saturating_add(self.height).clamp(0, fh);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            score: self.score,
        })
    }
}

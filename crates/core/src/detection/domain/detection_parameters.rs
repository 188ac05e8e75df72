use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_MIN_NEIGHBORS, DEFAULT_SCALE_FACTOR, MIN_NEIGHBORS_MAX, MIN_NEIGHBORS_MIN,
    SCALE_FACTOR_MAX, SCALE_FACTOR_MIN,
};

#[derive(Error, Debug, PartialEq)]
#[error("invalid colour {0:?}: expected #RRGGBB")]
pub struct ParseColorError(String);

/// Outline colour chosen by the user, stored as RGB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl OverlayColor {
    pub const BLUE: OverlayColor = OverlayColor { r: 0, g: 0, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self, ParseColorError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ParseColorError(hex.to_string()));
        }
        let component = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| ParseColorError(hex.to_string()))
        };
        Ok(Self {
            r: component(0..2)?,
            g: component(2..4)?,
            b: component(4..6)?,
        })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Component order used when drawing on captured (BGR) frames.
    pub fn to_bgr(self) -> [u8; 3] {
        [self.b, self.g, self.r]
    }
}

impl Default for OverlayColor {
    fn default() -> Self {
        Self::BLUE
    }
}

impl FromStr for OverlayColor {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for OverlayColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// User-tunable knobs applied to every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParameters {
    /// Ratio between adjacent detection pyramid scales.
    pub scale_factor: f64,
    /// How many overlapping candidate windows a face needs to be kept.
    pub min_neighbors: u32,
    pub overlay_color: OverlayColor,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            overlay_color: OverlayColor::default(),
        }
    }
}

impl DetectionParameters {
    pub fn new(scale_factor: f64, min_neighbors: u32, overlay_color: OverlayColor) -> Self {
        Self {
            scale_factor,
            min_neighbors,
            overlay_color,
        }
    }

    /// Pins both tunables into their slider ranges, the way the input
    /// widgets do. A NaN scale factor falls back to the default.
    pub fn clamped(self) -> Self {
        let scale_factor = if self.scale_factor.is_nan() {
            DEFAULT_SCALE_FACTOR
        } else {
            self.scale_factor.clamp(SCALE_FACTOR_MIN, SCALE_FACTOR_MAX)
        };
        Self {
            scale_factor,
            min_neighbors: self.min_neighbors.clamp(MIN_NEIGHBORS_MIN, MIN_NEIGHBORS_MAX),
            overlay_color: self.overlay_color,
        }
    }
}

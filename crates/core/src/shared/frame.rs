use ndarray::{s, ArrayView3};

/// Byte order of the samples of one pixel.
///
/// Capture devices deliver `Bgr`; display sinks want `Rgb`. The detector
/// only ever sees `Gray`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Bgr,
    Rgb,
    Gray,
}

impl ChannelOrder {
    pub fn channels(self) -> u8 {
        match self {
            ChannelOrder::Bgr | ChannelOrder::Rgb => 3,
            ChannelOrder::Gray => 1,
        }
    }
}

// OpenCV's fixed-point BT.601 luma weights (scaled by 2^14).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// A single captured frame: contiguous bytes in row-major order.
///
/// The channel order travels with the pixels so conversions for the
/// detector and the display never guess.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    order: ChannelOrder,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, order: ChannelOrder, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (order.channels() as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            order,
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.order.channels()
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Horizontal flip: column `x` becomes column `width - 1 - x`.
    pub fn mirror(&self) -> Frame {
        let data: Vec<u8> = self
            .as_ndarray()
            .slice(s![.., ..;-1, ..])
            .iter()
            .copied()
            .collect();
        Frame::new(data, self.width, self.height, self.order, self.index)
    }

    /// Single-channel intensity image, as required by the detector.
    pub fn to_gray(&self) -> Frame {
        let data = match self.order {
            ChannelOrder::Gray => self.data.clone(),
            ChannelOrder::Bgr => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[2], px[1], px[0]))
                .collect(),
            ChannelOrder::Rgb => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        };
        Frame::new(data, self.width, self.height, ChannelOrder::Gray, self.index)
    }

    /// Copy in RGB order, for display sinks and image encoders.
    pub fn to_rgb(&self) -> Frame {
        let data = match self.order {
            ChannelOrder::Rgb => self.data.clone(),
            ChannelOrder::Bgr => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            ChannelOrder::Gray => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
        };
        Frame::new(data, self.width, self.height, ChannelOrder::Rgb, self.index)
    }

    /// Raw RGBA bytes with opaque alpha, the layout GUI toolkits upload.
    pub fn to_rgba(&self) -> Vec<u8> {
        self.to_rgb()
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], u8::MAX])
            .collect()
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels() as usize,
        )
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1)))
        >> LUMA_SHIFT;
    y.min(255) as u8
}

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("could not open capture source {source_name}: {reason}")]
    Open { source_name: String, reason: String },
    #[error("failed to grab frame: {0}")]
    Read(String),
    #[error("capture source ended")]
    EndOfStream,
    #[error("capture source is not open")]
    NotOpen,
}

/// What the capture source reported when it was opened.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate; 0.0 when the source doesn't say.
    pub fps: f64,
    pub description: String,
}

/// Domain interface for a live frame source (webcam or stand-in).
///
/// `read` blocks until the next frame is available. Frames come back in
/// [`ChannelOrder::Bgr`](crate::shared::frame::ChannelOrder::Bgr).
pub trait CaptureDevice {
    fn open(&mut self) -> Result<CaptureInfo, CaptureError>;

    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Releases the underlying handle. Safe to call more than once.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

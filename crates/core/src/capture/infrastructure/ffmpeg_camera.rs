use crate::capture::domain::capture_device::{CaptureDevice, CaptureError, CaptureInfo};
use crate::shared::frame::{ChannelOrder, Frame};

/// Requested capture mode. Unset fields leave the device default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

impl CaptureOptions {
    fn to_dictionary(&self) -> ffmpeg_next::Dictionary<'static> {
        let mut dict = ffmpeg_next::Dictionary::new();
        if let (Some(w), Some(h)) = (self.width, self.height) {
            dict.set("video_size", &format!("{w}x{h}"));
        }
        if let Some(fps) = self.fps {
            dict.set("framerate", &fps.to_string());
        }
        dict
    }
}

/// Grabs frames from a webcam through libavdevice (ffmpeg-next).
///
/// `url` is anything libavformat can open: `/dev/video0` on Linux (probed
/// as v4l2), a network stream, or a video file. Each decoded frame is
/// converted to BGR24 and wrapped in a [`Frame`].
pub struct FfmpegCamera {
    url: String,
    options: CaptureOptions,
    stream: Option<OpenStream>,
}

struct OpenStream {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    frame_index: usize,
    /// Input is exhausted and the decoder has been told so.
    flushing: bool,
}

impl FfmpegCamera {
    pub fn new(url: impl Into<String>, options: CaptureOptions) -> Self {
        Self {
            url: url.into(),
            options,
            stream: None,
        }
    }

    fn open_error(&self, reason: impl ToString) -> CaptureError {
        CaptureError::Open {
            source_name: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

impl CaptureDevice for FfmpegCamera {
    fn open(&mut self) -> Result<CaptureInfo, CaptureError> {
        ffmpeg_next::init().map_err(|e| self.open_error(e))?;

        let ictx = ffmpeg_next::format::input_with_dictionary(&self.url, self.options.to_dictionary())
            .map_err(|e| self.open_error(e))?;

        let (stream_index, decoder, fps) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or_else(|| self.open_error("no video stream found"))?;
            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| self.open_error(e))?;
            let decoder = codec_ctx.decoder().video().map_err(|e| self.open_error(e))?;
            let rate = stream.rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            (stream.index(), decoder, fps)
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::BGR24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| self.open_error(e))?;

        let description = decoder
            .codec()
            .map(|c| format!("{} ({})", self.url, c.name()))
            .unwrap_or_else(|| self.url.clone());

        log::info!("Opened capture source {description}: {width}x{height} @ {fps:.1} fps");

        self.stream = Some(OpenStream {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            frame_index: 0,
            flushing: false,
        });

        Ok(CaptureInfo {
            width,
            height,
            fps,
            description,
        })
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotOpen)?;

        loop {
            if let Some(frame) = stream.receive()? {
                return Ok(frame);
            }
            if stream.flushing {
                return Err(CaptureError::EndOfStream);
            }

            let Some((packet_stream, packet)) = stream.ictx.packets().next() else {
                // Frames still buffered in the decoder come out after EOF.
                let _ = stream.decoder.send_eof();
                stream.flushing = true;
                continue;
            };
            if packet_stream.index() != stream.stream_index {
                continue;
            }
            stream
                .decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Read(e.to_string()))?;
        }
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Released capture source {}", self.url);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl OpenStream {
    fn receive(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let mut bgr = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler
            .run(&decoded, &mut bgr)
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        let pixels = extract_packed_pixels(&bgr, self.width, self.height);
        let frame = Frame::new(
            pixels,
            self.width,
            self.height,
            ChannelOrder::Bgr,
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Copies a 3-byte-per-pixel ffmpeg frame into a tightly packed buffer.
///
/// ffmpeg rows may carry padding (stride > width*3); it is dropped here.
fn extract_packed_pixels(
    frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}

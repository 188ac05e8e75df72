use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use facecam_core::capture::domain::capture_device::CaptureDevice;
use facecam_core::capture::infrastructure::ffmpeg_camera::{CaptureOptions, FfmpegCamera};
use facecam_core::capture::infrastructure::still_image_camera::StillImageCamera;
use facecam_core::detection::domain::detection_parameters::DetectionParameters;
use facecam_core::detection::infrastructure::model_resolver::ModelLocation;
use facecam_core::persistence::infrastructure::image_file_writer::ImageFileWriter;
use facecam_core::persistence::snapshot_store::{SaveOutcome, SnapshotStore};
use facecam_core::session::display_sink::{DisplaySink, SessionEvent};
use facecam_core::session::session_controller::{RunSummary, SessionController, SessionHandle};
use facecam_core::session::startup::cascade_frame_processor;
use facecam_core::shared::frame::Frame;

/// Frames waiting for the UI. Older frames are dropped when it falls behind.
const FRAME_BUFFER: usize = 2;

pub enum CameraMessage {
    DownloadProgress(u64, u64),
    /// The session exists and accepts commands.
    Ready(SessionHandle),
    Started(String),
    Saved(PathBuf, usize),
    NothingSaved,
    Warning(String),
    Finished(Result<RunSummary, String>),
}

pub struct CameraParams {
    pub device: String,
    pub image: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub params: DetectionParameters,
    pub hold_save: bool,
}

pub struct CameraWorker {
    pub messages: Receiver<CameraMessage>,
    pub frames: Receiver<Frame>,
}

pub fn spawn(params: CameraParams) -> CameraWorker {
    let (tx, messages) = crossbeam_channel::unbounded::<CameraMessage>();
    let (frame_tx, frames) = crossbeam_channel::bounded::<Frame>(FRAME_BUFFER);

    thread::spawn(move || {
        let result = run_camera(&tx, frame_tx, &params).map_err(|e| e.to_string());
        let _ = tx.send(CameraMessage::Finished(result));
    });

    CameraWorker { messages, frames }
}

fn run_camera(
    tx: &Sender<CameraMessage>,
    frames: Sender<Frame>,
    params: &CameraParams,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let tx_dl = tx.clone();
    let processor = cascade_frame_processor(
        &ModelLocation::default(),
        Some(Box::new(move |dl, total| {
            let _ = tx_dl.send(CameraMessage::DownloadProgress(dl, total));
        })),
    )?;

    let device: Box<dyn CaptureDevice> = match &params.image {
        Some(path) => Box::new(StillImageCamera::new(path)),
        None => Box::new(FfmpegCamera::new(
            params.device.as_str(),
            CaptureOptions::default(),
        )),
    };
    let store = SnapshotStore::new(
        &params.output_dir,
        "jpg",
        Box::new(ImageFileWriter::new()),
    );
    let display = ChannelDisplay {
        frames,
        messages: tx.clone(),
    };

    let mut controller =
        SessionController::new(device, processor, store, Box::new(display), params.params);
    let handle = controller.handle();
    if params.hold_save {
        handle.hold_save(true);
    }
    let _ = tx.send(CameraMessage::Ready(handle));

    Ok(controller.run()?)
}

/// Forwards frames and session events to the UI thread.
struct ChannelDisplay {
    frames: Sender<Frame>,
    messages: Sender<CameraMessage>,
}

impl DisplaySink for ChannelDisplay {
    fn show(&mut self, rgb: &Frame) {
        match self.frames.try_send(rgb.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => log::debug!("UI stopped listening for frames"),
        }
    }

    fn report(&mut self, event: SessionEvent) {
        let message = match event {
            SessionEvent::Started(info) => CameraMessage::Started(format!(
                "{} ({}x{})",
                info.description, info.width, info.height
            )),
            SessionEvent::Save(SaveOutcome::Saved(artifact)) => {
                CameraMessage::Saved(artifact.path, artifact.region_count)
            }
            SessionEvent::Save(SaveOutcome::NothingSaved) => CameraMessage::NothingSaved,
            SessionEvent::Warning(e) => CameraMessage::Warning(e.to_string()),
        };
        let _ = self.messages.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecam_core::capture::domain::capture_device::CaptureInfo;
    use facecam_core::persistence::snapshot_store::SavedArtifact;
    use facecam_core::shared::frame::ChannelOrder;

    fn display() -> (ChannelDisplay, Receiver<Frame>, Receiver<CameraMessage>) {
        let (frame_tx, frames) = crossbeam_channel::bounded(FRAME_BUFFER);
        let (tx, messages) = crossbeam_channel::unbounded();
        (
            ChannelDisplay {
                frames: frame_tx,
                messages: tx,
            },
            frames,
            messages,
        )
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0; 2 * 2 * 3], 2, 2, ChannelOrder::Rgb, index)
    }

    #[test]
    fn test_frames_beyond_buffer_are_dropped() {
        let (mut sink, frames, _messages) = display();
        for i in 0..5 {
            sink.show(&frame(i));
        }
        let received: Vec<usize> = frames.try_iter().map(|f| f.index()).collect();
        assert_eq!(received, vec![0, 1]);
    }

    #[test]
    fn test_show_after_ui_gone_does_not_panic() {
        let (mut sink, frames, _messages) = display();
        drop(frames);
        sink.show(&frame(0));
    }

    #[test]
    fn test_events_are_forwarded() {
        let (mut sink, _frames, messages) = display();
        sink.report(SessionEvent::Started(CaptureInfo {
            width: 640,
            height: 480,
            fps: 30.0,
            description: "/dev/video0".into(),
        }));
        sink.report(SessionEvent::Save(SaveOutcome::Saved(SavedArtifact {
            path: PathBuf::from("detected_faces/face_detected_20240101_120000.jpg"),
            region_count: 2,
        })));
        sink.report(SessionEvent::Save(SaveOutcome::NothingSaved));

        let received: Vec<CameraMessage> = messages.try_iter().collect();
        assert!(matches!(&received[0], CameraMessage::Started(s) if s == "/dev/video0 (640x480)"));
        assert!(matches!(&received[1], CameraMessage::Saved(_, 2)));
        assert!(matches!(&received[2], CameraMessage::NothingSaved));
    }
}

use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::capture::domain::capture_device::{CaptureDevice, CaptureError};
use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::persistence::snapshot_store::{PersistError, SaveOutcome, SnapshotStore};
use crate::pipeline::frame_processor::FrameProcessor;
use crate::session::display_sink::{DisplaySink, SessionEvent};
use crate::session::session_logger::{NullSessionLogger, SessionLogger};
use crate::session::startup::StartupError;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("capture failed: {0}")]
    CaptureRead(#[source] CaptureError),
    #[error("frame processing failed: {0}")]
    Processing(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("session cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Terminated,
}

/// Host-to-session control messages.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    /// Save the next processed frame, once.
    Save,
    /// While `true`, every processed frame is saved.
    HoldSave(bool),
    UpdateParameters(DetectionParameters),
    Stop,
}

/// Cloneable remote control for a running session.
///
/// Commands sent after the session ended are dropped.
#[derive(Clone)]
pub struct SessionHandle {
    sender: Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) {
        let _ = self.sender.send(command);
    }

    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    pub fn request_save(&self) {
        self.send(SessionCommand::Save);
    }

    pub fn hold_save(&self, held: bool) {
        self.send(SessionCommand::HoldSave(held));
    }

    pub fn update_parameters(&self, params: DetectionParameters) {
        self.send(SessionCommand::UpdateParameters(params));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    FrameLimit,
}

/// How a session that ended without error went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: usize,
    pub saved: usize,
    pub reason: StopReason,
}

/// Drives the capture → detect → display → save loop.
///
/// Owns the capture device for its whole life and releases it exactly
/// once, when the session terminates or the controller is dropped.
pub struct SessionController {
    device: Box<dyn CaptureDevice>,
    processor: FrameProcessor,
    store: SnapshotStore,
    sink: Box<dyn DisplaySink>,
    logger: Box<dyn SessionLogger>,
    params: DetectionParameters,
    max_frames: Option<usize>,
    state: SessionState,
    released: bool,
    save_requested: bool,
    save_held: bool,
    stop_requested: bool,
    sender: Sender<SessionCommand>,
    commands: Receiver<SessionCommand>,
}

impl SessionController {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        processor: FrameProcessor,
        store: SnapshotStore,
        sink: Box<dyn DisplaySink>,
        params: DetectionParameters,
    ) -> Self {
        let (sender, commands) = crossbeam_channel::unbounded();
        Self {
            device,
            processor,
            store,
            sink,
            logger: Box::new(NullSessionLogger),
            params: params.clamped(),
            max_frames: None,
            state: SessionState::Idle,
            released: false,
            save_requested: false,
            save_held: false,
            stop_requested: false,
            sender,
            commands,
        }
    }

    /// Stop on its own after `limit` frames.
    pub fn with_max_frames(mut self, limit: usize) -> Self {
        self.max_frames = Some(limit);
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn parameters(&self) -> DetectionParameters {
        self.params
    }

    /// Opens the capture device. `Idle → Running`, or `Terminated` when
    /// the device cannot be opened.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                action: "start",
                state: self.state,
            });
        }

        match self.device.open() {
            Ok(info) => {
                log::info!(
                    "Capture opened: {} ({}x{} @ {:.1} fps)",
                    info.description,
                    info.width,
                    info.height,
                    info.fps
                );
                self.state = SessionState::Running;
                self.sink.report(SessionEvent::Started(info));
                Ok(())
            }
            Err(e) => {
                log::error!("Cannot start session: {e}");
                self.terminate();
                Err(StartupError::Capture(e).into())
            }
        }
    }

    /// Runs the loop until a stop command, the frame limit, or a failure.
    ///
    /// Starts the session first if it is still idle. Always leaves the
    /// session `Terminated`.
    pub fn run(&mut self) -> Result<RunSummary, SessionError> {
        if self.state == SessionState::Idle {
            self.start()?;
        }
        if self.state != SessionState::Running {
            return Err(SessionError::InvalidState {
                action: "run",
                state: self.state,
            });
        }

        let result = self.run_loop();
        self.terminate();
        self.logger.summary();
        match &result {
            Ok(summary) => log::info!(
                "Session ended ({:?}) after {} frames, {} saved",
                summary.reason,
                summary.frames,
                summary.saved
            ),
            Err(e) => log::error!("Session ended: {e}"),
        }
        result
    }

    fn run_loop(&mut self) -> Result<RunSummary, SessionError> {
        let mut frames = 0;
        let mut saved = 0;

        loop {
            self.drain_commands();
            if self.stop_requested {
                return Ok(RunSummary {
                    frames,
                    saved,
                    reason: StopReason::Requested,
                });
            }
            if self.max_frames.is_some_and(|limit| frames >= limit) {
                return Ok(RunSummary {
                    frames,
                    saved,
                    reason: StopReason::FrameLimit,
                });
            }

            let t0 = Instant::now();
            let captured = self.device.read().map_err(SessionError::CaptureRead)?;
            self.logger.timing("capture", elapsed_ms(t0));

            let t0 = Instant::now();
            let mirrored = captured.mirror();
            let processed = self
                .processor
                .process(&mirrored, &self.params)
                .map_err(|e| SessionError::Processing(e.to_string()))?;
            self.logger.timing("process", elapsed_ms(t0));
            self.logger.metric("faces", processed.regions.len() as f64);
            log::debug!(
                "Frame {}: {} face(s)",
                processed.annotated.index(),
                processed.regions.len()
            );

            let t0 = Instant::now();
            self.sink.show(&processed.annotated.to_rgb());
            self.logger.timing("display", elapsed_ms(t0));

            if self.save_requested || self.save_held {
                self.save_requested = false;
                let t0 = Instant::now();
                if self.save(&processed.annotated, processed.regions.len()) {
                    saved += 1;
                }
                self.logger.timing("save", elapsed_ms(t0));
            }

            frames += 1;
            self.logger.frame(frames);
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                SessionCommand::Save => self.save_requested = true,
                SessionCommand::HoldSave(held) => {
                    log::info!("Continuous save {}", if held { "on" } else { "off" });
                    self.save_held = held;
                }
                SessionCommand::UpdateParameters(params) => {
                    self.params = params.clamped();
                    log::debug!("Detection parameters now {:?}", self.params);
                }
                SessionCommand::Stop => self.stop_requested = true,
            }
        }
    }

    /// Returns whether a file was written.
    fn save(&mut self, annotated: &Frame, region_count: usize) -> bool {
        match self.store.save(annotated, region_count) {
            Ok(SaveOutcome::Saved(artifact)) => {
                log::info!(
                    "Saved {} face(s) to {}",
                    artifact.region_count,
                    artifact.path.display()
                );
                self.sink
                    .report(SessionEvent::Save(SaveOutcome::Saved(artifact)));
                true
            }
            Ok(SaveOutcome::NothingSaved) => {
                log::warn!("No faces detected, nothing saved");
                self.sink.report(SessionEvent::Save(SaveOutcome::NothingSaved));
                false
            }
            Err(e) => {
                log::warn!("{e}");
                self.sink.report(SessionEvent::Warning(e.into()));
                false
            }
        }
    }

    fn terminate(&mut self) {
        if !self.released {
            self.device.release();
            self.released = true;
        }
        self.state = SessionState::Terminated;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::infrastructure::rect_outline_annotator::RectOutlineAnnotator;
    use crate::capture::domain::capture_device::CaptureInfo;
    use crate::detection::domain::detection_parameters::OverlayColor;
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::persistence::domain::image_writer::ImageWriter;
    use crate::shared::frame::ChannelOrder;
    use crate::shared::region::Region;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    const W: u32 = 32;
    const H: u32 = 24;

    #[derive(Default)]
    struct CameraLog {
        opens: usize,
        reads: usize,
        releases: usize,
    }

    /// Left half white, right half black, so mirroring is observable.
    struct StubCamera {
        fail_open: bool,
        fail_after: Option<usize>,
        log: Arc<Mutex<CameraLog>>,
        /// Commands to send (through the handle) when a given read happens.
        on_read: Vec<(usize, SessionCommand)>,
        handle: Option<SessionHandle>,
    }

    impl StubCamera {
        fn new(log: Arc<Mutex<CameraLog>>) -> Self {
            Self {
                fail_open: false,
                fail_after: None,
                log,
                on_read: Vec::new(),
                handle: None,
            }
        }
    }

    impl CaptureDevice for StubCamera {
        fn open(&mut self) -> Result<CaptureInfo, CaptureError> {
            self.log.lock().unwrap().opens += 1;
            if self.fail_open {
                return Err(CaptureError::Open {
                    source_name: "stub".into(),
                    reason: "no such device".into(),
                });
            }
            Ok(CaptureInfo {
                width: W,
                height: H,
                fps: 30.0,
                description: "stub".into(),
            })
        }

        fn read(&mut self) -> Result<Frame, CaptureError> {
            let reads = {
                let mut log = self.log.lock().unwrap();
                log.reads += 1;
                log.reads
            };
            if self.fail_after.is_some_and(|n| reads > n) {
                return Err(CaptureError::Read("unplugged".into()));
            }
            if let Some(handle) = &self.handle {
                for (at, command) in &self.on_read {
                    if *at == reads {
                        handle.send(command.clone());
                    }
                }
            }
            let mut data = Vec::with_capacity((W * H * 3) as usize);
            for _y in 0..H {
                for x in 0..W {
                    let v = if x < W / 2 { 255 } else { 0 };
                    data.extend_from_slice(&[v, v, v]);
                }
            }
            Ok(Frame::new(data, W, H, ChannelOrder::Bgr, reads - 1))
        }

        fn release(&mut self) {
            self.log.lock().unwrap().releases += 1;
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    struct StubDetector {
        regions: Vec<Region>,
        seen: Arc<Mutex<Vec<(f64, u32, u8)>>>,
    }

    impl FaceDetector for StubDetector {
        fn detect(
            &mut self,
            gray: &Frame,
            scale_factor: f64,
            min_neighbors: u32,
        ) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            self.seen
                .lock()
                .unwrap()
                .push((scale_factor, min_neighbors, gray.data()[0]));
            Ok(self.regions.clone())
        }
    }

    struct RecordingWriter {
        paths: Arc<Mutex<Vec<PathBuf>>>,
        fail: bool,
    }

    impl ImageWriter for RecordingWriter {
        fn write(&self, path: &Path, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail {
                return Err("read-only filesystem".into());
            }
            self.paths.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Default)]
    struct SinkLog {
        shown: Vec<Frame>,
        events: Vec<SessionEvent>,
    }

    struct RecordingSink {
        log: Arc<Mutex<SinkLog>>,
    }

    impl DisplaySink for RecordingSink {
        fn show(&mut self, rgb: &Frame) {
            self.log.lock().unwrap().shown.push(rgb.clone());
        }

        fn report(&mut self, event: SessionEvent) {
            self.log.lock().unwrap().events.push(event);
        }
    }

    struct Harness {
        camera: Arc<Mutex<CameraLog>>,
        sink: Arc<Mutex<SinkLog>>,
        written: Arc<Mutex<Vec<PathBuf>>>,
        detector_calls: Arc<Mutex<Vec<(f64, u32, u8)>>>,
        _dir: tempfile::TempDir,
    }

    fn build(
        configure: impl FnOnce(&mut StubCamera),
        regions: Vec<Region>,
        writer_fails: bool,
    ) -> (SessionController, Harness) {
        let camera_log = Arc::new(Mutex::new(CameraLog::default()));
        let sink_log = Arc::new(Mutex::new(SinkLog::default()));
        let written = Arc::new(Mutex::new(Vec::new()));
        let detector_calls = Arc::new(Mutex::new(Vec::new()));
        let dir = tempfile::tempdir().unwrap();

        let mut camera = StubCamera::new(camera_log.clone());
        configure(&mut camera);
        let processor = FrameProcessor::new(
            Box::new(StubDetector {
                regions,
                seen: detector_calls.clone(),
            }),
            Box::new(RectOutlineAnnotator::default()),
        );
        let store = SnapshotStore::new(
            dir.path().join("detected_faces"),
            "jpg",
            Box::new(RecordingWriter {
                paths: written.clone(),
                fail: writer_fails,
            }),
        );

        // The camera needs a handle to the controller it feeds.
        let (sender, commands) = crossbeam_channel::unbounded();
        camera.handle = Some(SessionHandle {
            sender: sender.clone(),
        });
        let mut controller = SessionController::new(
            Box::new(camera),
            processor,
            store,
            Box::new(RecordingSink {
                log: sink_log.clone(),
            }),
            DetectionParameters::default(),
        );
        controller.sender = sender;
        controller.commands = commands;

        let harness = Harness {
            camera: camera_log,
            sink: sink_log,
            written,
            detector_calls,
            _dir: dir,
        };
        (controller, harness)
    }

    fn face() -> Region {
        Region::new(8, 6, 12, 12)
    }

    #[test]
    fn test_new_session_is_idle() {
        let (controller, harness) = build(|_| {}, vec![], false);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(harness.camera.lock().unwrap().opens, 0);
    }

    #[test]
    fn test_start_opens_device_and_reports() {
        let (mut controller, harness) = build(|_| {}, vec![], false);
        controller.start().unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        let sink = harness.sink.lock().unwrap();
        assert!(matches!(sink.events[0], SessionEvent::Started(ref info) if info.width == W));
    }

    #[test]
    fn test_capture_unavailable_is_startup_error_without_frames() {
        let (mut controller, harness) = build(|c| c.fail_open = true, vec![], false);
        let err = controller.run().unwrap_err();

        assert!(matches!(
            err,
            SessionError::Startup(StartupError::Capture(CaptureError::Open { .. }))
        ));
        assert_eq!(controller.state(), SessionState::Terminated);
        assert!(harness.sink.lock().unwrap().shown.is_empty());
        assert_eq!(harness.camera.lock().unwrap().reads, 0);
        drop(controller);
        assert_eq!(harness.camera.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (mut controller, _harness) = build(|_| {}, vec![], false);
        controller.start().unwrap();
        assert!(matches!(
            controller.start(),
            Err(SessionError::InvalidState { action: "start", .. })
        ));
    }

    #[test]
    fn test_frame_limit_ends_session() {
        let (controller, harness) = build(|_| {}, vec![], false);
        let mut controller = controller.with_max_frames(3);
        let summary = controller.run().unwrap();

        assert_eq!(
            summary,
            RunSummary {
                frames: 3,
                saved: 0,
                reason: StopReason::FrameLimit
            }
        );
        assert_eq!(harness.sink.lock().unwrap().shown.len(), 3);
        assert_eq!(controller.state(), SessionState::Terminated);
    }

    #[test]
    fn test_displayed_frames_are_mirrored_rgb() {
        let (controller, harness) = build(|_| {}, vec![], false);
        let mut controller = controller.with_max_frames(1);
        controller.run().unwrap();

        let sink = harness.sink.lock().unwrap();
        let shown = &sink.shown[0];
        assert_eq!(shown.order(), ChannelOrder::Rgb);
        // The white half moved from the left to the right.
        assert_eq!(&shown.data()[..3], &[0, 0, 0]);
        let last = shown.data().len() - 3;
        assert_eq!(&shown.data()[last..], &[255, 255, 255]);
    }

    #[test]
    fn test_detector_sees_mirrored_gray_frame() {
        let (controller, harness) = build(|_| {}, vec![], false);
        let mut controller = controller.with_max_frames(1);
        controller.run().unwrap();
        let calls = harness.detector_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2, 0);
    }

    #[test]
    fn test_read_failure_ends_session_and_releases_once() {
        let (mut controller, harness) = build(|c| c.fail_after = Some(2), vec![], false);
        let err = controller.run().unwrap_err();

        assert!(matches!(err, SessionError::CaptureRead(CaptureError::Read(_))));
        assert_eq!(controller.state(), SessionState::Terminated);
        assert_eq!(harness.sink.lock().unwrap().shown.len(), 2);
        drop(controller);
        assert_eq!(harness.camera.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_stop_command_ends_session() {
        let (mut controller, harness) = build(
            |c| c.on_read = vec![(4, SessionCommand::Stop)],
            vec![],
            false,
        );
        let summary = controller.run().unwrap();
        assert_eq!(summary.reason, StopReason::Requested);
        assert_eq!(summary.frames, 4);
        assert_eq!(harness.camera.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_stop_before_run_processes_nothing() {
        let (controller, harness) = build(|_| {}, vec![], false);
        controller.handle().stop();
        let mut controller = controller;
        let summary = controller.run().unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(harness.camera.lock().unwrap().reads, 0);
    }

    #[test]
    fn test_save_request_with_face_writes_one_file() {
        let (controller, harness) = build(
            |c| c.on_read = vec![(2, SessionCommand::Save)],
            vec![face()],
            false,
        );
        let mut controller = controller.with_max_frames(5);
        let summary = controller.run().unwrap();

        assert_eq!(summary.saved, 1);
        let written = harness.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("face_detected_"));
        assert!(name.ends_with(".jpg"));

        let sink = harness.sink.lock().unwrap();
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::Save(SaveOutcome::Saved(a)) if a.region_count == 1)));
    }

    #[test]
    fn test_save_request_without_face_writes_nothing() {
        let (controller, harness) = build(
            |c| c.on_read = vec![(1, SessionCommand::Save)],
            vec![],
            false,
        );
        let mut controller = controller.with_max_frames(3);
        let summary = controller.run().unwrap();

        assert_eq!(summary.saved, 0);
        assert!(harness.written.lock().unwrap().is_empty());
        let sink = harness.sink.lock().unwrap();
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::Save(SaveOutcome::NothingSaved))));
    }

    #[test]
    fn test_save_is_one_shot() {
        let (controller, harness) = build(
            |c| c.on_read = vec![(1, SessionCommand::Save), (3, SessionCommand::Save)],
            vec![face()],
            false,
        );
        let mut controller = controller.with_max_frames(6);
        controller.run().unwrap();
        let written = harness.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_ne!(written[0], written[1]);
    }

    #[test]
    fn test_held_save_writes_every_frame() {
        let (controller, harness) = build(
            |c| {
                c.on_read = vec![
                    (1, SessionCommand::HoldSave(true)),
                    (5, SessionCommand::HoldSave(false)),
                ]
            },
            vec![face()],
            false,
        );
        let mut controller = controller.with_max_frames(8);
        let summary = controller.run().unwrap();

        // Commands sent during read N take effect from frame N + 1.
        assert_eq!(summary.saved, 4);
        let written = harness.written.lock().unwrap();
        let unique: std::collections::HashSet<_> = written.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_persist_failure_is_reported_and_session_continues() {
        let (controller, harness) = build(
            |c| c.on_read = vec![(1, SessionCommand::Save)],
            vec![face()],
            true,
        );
        let mut controller = controller.with_max_frames(3);
        let summary = controller.run().unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.saved, 0);
        let sink = harness.sink.lock().unwrap();
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, SessionEvent::Warning(SessionError::Persist(_)))));
    }

    #[test]
    fn test_parameter_update_applies_to_later_frames() {
        let updated = DetectionParameters::new(1.3, 7, OverlayColor::new(255, 0, 0));
        let (controller, harness) = build(
            |c| c.on_read = vec![(2, SessionCommand::UpdateParameters(updated))],
            vec![],
            false,
        );
        let mut controller = controller.with_max_frames(3);
        controller.run().unwrap();

        let calls = harness.detector_calls.lock().unwrap();
        assert_eq!(calls[0].1, 3);
        // The command lands during read 2, so frame 2 still uses the old values.
        assert_eq!(calls[1].1, 3);
        assert_eq!(calls[2].1, 7);
        assert_eq!(controller.parameters(), updated);
    }

    #[test]
    fn test_parameter_update_is_clamped() {
        let (controller, _harness) = build(|_| {}, vec![], false);
        controller.handle().update_parameters(DetectionParameters::new(
            9.0,
            50,
            OverlayColor::BLUE,
        ));
        let mut controller = controller.with_max_frames(1);
        controller.run().unwrap();
        assert_eq!(controller.parameters().min_neighbors, 10);
    }

    #[test]
    fn test_drop_without_start_releases_once() {
        let (controller, harness) = build(|_| {}, vec![], false);
        drop(controller);
        assert_eq!(harness.camera.lock().unwrap().releases, 1);
    }
}

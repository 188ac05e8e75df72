use crate::capture::domain::capture_device::CaptureInfo;
use crate::persistence::snapshot_store::SaveOutcome;
use crate::session::session_controller::SessionError;
use crate::shared::frame::Frame;

/// Something the session reports to its host besides frames.
#[derive(Debug)]
pub enum SessionEvent {
    Started(CaptureInfo),
    Save(SaveOutcome),
    /// A recoverable failure; the session keeps running.
    Warning(SessionError),
}

/// Where annotated frames go to be seen.
///
/// Each call to `show` replaces whatever was shown before.
pub trait DisplaySink {
    fn show(&mut self, rgb: &Frame);

    fn report(&mut self, _event: SessionEvent) {}
}

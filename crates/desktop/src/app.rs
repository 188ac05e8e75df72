use std::path::PathBuf;
use std::time::Duration;

use iced::widget::{button, checkbox, column, container, image, row, slider, text, text_input, Space};
use iced::{Alignment, Element, Length, Subscription, Task, Theme};

use facecam_core::detection::domain::detection_parameters::{DetectionParameters, OverlayColor};
use facecam_core::session::session_controller::SessionHandle;
use facecam_core::shared::constants::{
    DEFAULT_DEVICE, DEFAULT_OUTPUT_DIR, MIN_NEIGHBORS_MAX, MIN_NEIGHBORS_MIN, SCALE_FACTOR_MAX,
    SCALE_FACTOR_MIN, SCALE_FACTOR_STEP,
};

use crate::theme;
use crate::workers::camera_worker::{self, CameraMessage, CameraParams, CameraWorker};

/// How often the UI collects frames from the camera thread.
const FRAME_POLL: Duration = Duration::from_millis(15);
/// How often the light/dark preference of the OS is re-read.
const THEME_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub enum Message {
    ColorChanged(String),
    ScaleFactorChanged(f64),
    MinNeighborsChanged(u32),
    SaveRequested,
    HoldSaveToggled(bool),
    DeviceChanged(String),
    Start,
    Stop,
    OpenOutputFolder,
    Tick,
    PollSystemTheme,
}

pub struct App {
    params: DetectionParameters,
    color_input: String,
    color_valid: bool,
    hold_save: bool,
    device: String,
    output_dir: PathBuf,
    worker: Option<CameraWorker>,
    handle: Option<SessionHandle>,
    stop_pending: bool,
    frame: Option<image::Handle>,
    status: String,
    theme: Theme,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let mut app = Self::idle();
        app.start_camera();
        (app, Task::none())
    }

    fn idle() -> Self {
        let params = DetectionParameters::default();
        Self {
            params,
            color_input: params.overlay_color.to_hex(),
            color_valid: true,
            hold_save: false,
            device: DEFAULT_DEVICE.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            worker: None,
            handle: None,
            stop_pending: false,
            frame: None,
            status: "Camera stopped".to_string(),
            theme: theme::resolve_theme(),
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ColorChanged(value) => {
                match value.parse::<OverlayColor>() {
                    Ok(color) => {
                        self.params.overlay_color = color;
                        self.color_valid = true;
                        self.push_parameters();
                    }
                    Err(_) => self.color_valid = false,
                }
                self.color_input = value;
            }
            Message::ScaleFactorChanged(value) => {
                // Sliders hand back values like 1.1300000000000001.
                let snapped = (value / SCALE_FACTOR_STEP).round() * SCALE_FACTOR_STEP;
                self.params.scale_factor = snapped;
                self.params = self.params.clamped();
                self.push_parameters();
            }
            Message::MinNeighborsChanged(value) => {
                self.params.min_neighbors = value;
                self.params = self.params.clamped();
                self.push_parameters();
            }
            Message::SaveRequested => match &self.handle {
                Some(handle) => handle.request_save(),
                None => self.status = "Start the camera before saving".to_string(),
            },
            Message::HoldSaveToggled(held) => {
                self.hold_save = held;
                if let Some(handle) = &self.handle {
                    handle.hold_save(held);
                }
            }
            Message::DeviceChanged(device) => {
                self.device = device;
            }
            Message::Start => {
                if self.worker.is_none() {
                    self.start_camera();
                }
            }
            Message::Stop => match &self.handle {
                Some(handle) => handle.stop(),
                None if self.worker.is_some() => self.stop_pending = true,
                None => {}
            },
            Message::OpenOutputFolder => {
                if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
                    self.status = format!("Cannot create {}: {e}", self.output_dir.display());
                } else if let Err(e) = open::that(&self.output_dir) {
                    log::warn!("Failed to open {}: {e}", self.output_dir.display());
                }
            }
            Message::Tick => self.poll_worker(),
            Message::PollSystemTheme => self.theme = theme::resolve_theme(),
        }
        Task::none()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let running = self.worker.is_some();

        let video: Element<'_, Message> = match &self.frame {
            Some(handle) => image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .into(),
            None => container(text("No video").size(16))
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into(),
        };

        let color_field = text_input("#0000FF", &self.color_input)
            .on_input(Message::ColorChanged)
            .width(120.0);
        let color_hint = if self.color_valid {
            text(format!("Using {}", self.params.overlay_color)).size(12)
        } else {
            text("Expected #RRGGBB").size(12)
        };

        let scale_slider = slider(
            SCALE_FACTOR_MIN..=SCALE_FACTOR_MAX,
            self.params.scale_factor,
            Message::ScaleFactorChanged,
        )
        .step(SCALE_FACTOR_STEP);
        let neighbors_slider = slider(
            MIN_NEIGHBORS_MIN..=MIN_NEIGHBORS_MAX,
            self.params.min_neighbors,
            Message::MinNeighborsChanged,
        )
        .step(1u32);

        let device_field = {
            let field = text_input(DEFAULT_DEVICE, &self.device);
            if running {
                field
            } else {
                field.on_input(Message::DeviceChanged)
            }
        };
        let camera_button = if running {
            button(text("Stop Camera")).on_press(Message::Stop)
        } else {
            button(text("Start Camera")).on_press(Message::Start)
        };

        let save_button = button(text("Save Image with Detected Faces"))
            .on_press_maybe(self.handle.as_ref().map(|_| Message::SaveRequested))
            .style(button::primary)
            .width(Length::Fill);

        let controls = column![
            text("Rectangle Color").size(14),
            row![color_field, color_hint]
                .spacing(8)
                .align_y(Alignment::Center),
            Space::new().height(12),
            text(format!("Scale Factor: {:.2}", self.params.scale_factor)).size(14),
            scale_slider,
            Space::new().height(12),
            text(format!("Min Neighbors: {}", self.params.min_neighbors)).size(14),
            neighbors_slider,
            Space::new().height(20),
            save_button,
            checkbox(self.hold_save)
                .label("Save every frame with faces")
                .on_toggle(Message::HoldSaveToggled),
            button(text("Open Saved Images"))
                .on_press(Message::OpenOutputFolder)
                .style(button::text),
            Space::new().height(Length::Fill),
            text("Camera").size(14),
            device_field,
            camera_button,
        ]
        .spacing(6)
        .width(280.0);

        let status = text(self.status.clone())
            .size(12)
            .color(theme::muted_color(&self.theme));

        column![
            row![
                container(video)
                    .width(Length::Fill)
                    .height(Length::Fill),
                controls
            ]
            .spacing(16)
            .height(Length::Fill),
            status,
        ]
        .spacing(8)
        .padding(16)
        .into()
    }

    pub fn theme(&self) -> Theme {
        self.theme.clone()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let system_theme = iced::time::every(THEME_POLL).map(|_| Message::PollSystemTheme);
        if self.worker.is_some() {
            Subscription::batch([
                iced::time::every(FRAME_POLL).map(|_| Message::Tick),
                system_theme,
            ])
        } else {
            system_theme
        }
    }

    fn start_camera(&mut self) {
        let device = self.device.trim();
        // Anything that looks like a picture is replayed as a still camera.
        let image = image_path(device);
        self.worker = Some(camera_worker::spawn(CameraParams {
            device: device.to_string(),
            image,
            output_dir: self.output_dir.clone(),
            params: self.params,
            hold_save: self.hold_save,
        }));
        self.stop_pending = false;
        self.status = "Loading face detector...".to_string();
    }

    fn push_parameters(&self) {
        if let Some(handle) = &self.handle {
            handle.update_parameters(self.params);
        }
    }

    fn poll_worker(&mut self) {
        let Some(worker) = &self.worker else {
            return;
        };

        if let Some(frame) = worker.frames.try_iter().last() {
            self.frame = Some(image::Handle::from_rgba(
                frame.width(),
                frame.height(),
                frame.to_rgba(),
            ));
        }

        let messages: Vec<CameraMessage> = worker.messages.try_iter().collect();
        for message in messages {
            self.apply(message);
        }
    }

    fn apply(&mut self, message: CameraMessage) {
        match message {
            CameraMessage::DownloadProgress(downloaded, total) => {
                self.status = if total > 0 {
                    let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
                    format!("Downloading face detection model... {pct}%")
                } else {
                    format!("Downloading face detection model... {downloaded} bytes")
                };
            }
            CameraMessage::Ready(handle) => {
                // Catch up on anything changed while the session was starting.
                handle.update_parameters(self.params);
                handle.hold_save(self.hold_save);
                if self.stop_pending {
                    handle.stop();
                }
                self.handle = Some(handle);
            }
            CameraMessage::Started(description) => {
                self.status = format!("Capturing from {description}");
            }
            CameraMessage::Saved(path, faces) => {
                self.status = format!("Image saved as {} ({faces} face(s))", path.display());
            }
            CameraMessage::NothingSaved => {
                self.status = "No faces detected. Image not saved.".to_string();
            }
            CameraMessage::Warning(warning) => {
                self.status = warning;
            }
            CameraMessage::Finished(result) => {
                self.worker = None;
                self.handle = None;
                self.status = match result {
                    Ok(summary) => format!(
                        "Camera stopped after {} frames, {} image(s) saved",
                        summary.frames, summary.saved
                    ),
                    Err(e) => format!("Camera error: {e}"),
                };
            }
        }
    }
}

fn image_path(device: &str) -> Option<PathBuf> {
    let path = PathBuf::from(device);
    let ext = path.extension()?.to_str()?.to_lowercase();
    facecam_core::shared::constants::IMAGE_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecam_core::session::session_controller::{RunSummary, StopReason};

    #[test]
    fn test_valid_color_updates_parameters() {
        let mut app = App::idle();
        let _ = app.update(Message::ColorChanged("#FF0000".into()));
        assert!(app.color_valid);
        assert_eq!(app.params.overlay_color, OverlayColor::new(255, 0, 0));
    }

    #[test]
    fn test_partial_color_keeps_previous_value() {
        let mut app = App::idle();
        let _ = app.update(Message::ColorChanged("#FF00".into()));
        assert!(!app.color_valid);
        assert_eq!(app.color_input, "#FF00");
        assert_eq!(app.params.overlay_color, OverlayColor::BLUE);
    }

    #[test]
    fn test_scale_factor_is_snapped_and_clamped() {
        let mut app = App::idle();
        let _ = app.update(Message::ScaleFactorChanged(1.2300000000000002));
        assert!((app.params.scale_factor - 1.23).abs() < 1e-9);
        let _ = app.update(Message::ScaleFactorChanged(3.0));
        assert!((app.params.scale_factor - SCALE_FACTOR_MAX).abs() < 1e-9);
    }

    #[test]
    fn test_min_neighbors_is_clamped() {
        let mut app = App::idle();
        let _ = app.update(Message::MinNeighborsChanged(0));
        assert_eq!(app.params.min_neighbors, MIN_NEIGHBORS_MIN);
    }

    #[test]
    fn test_save_without_camera_reports_status() {
        let mut app = App::idle();
        let _ = app.update(Message::SaveRequested);
        assert!(app.status.contains("Start the camera"));
    }

    #[test]
    fn test_finished_clears_worker_state() {
        let mut app = App::idle();
        app.apply(CameraMessage::Finished(Ok(RunSummary {
            frames: 12,
            saved: 2,
            reason: StopReason::Requested,
        })));
        assert!(app.worker.is_none());
        assert!(app.status.contains("12 frames"));

        app.apply(CameraMessage::Finished(Err("no such device".into())));
        assert_eq!(app.status, "Camera error: no such device");
    }

    #[test]
    fn test_theme_is_cached_until_polled() {
        let mut app = App::idle();
        app.theme = Theme::Light;
        assert_eq!(
            app.theme().palette().background,
            Theme::Light.palette().background
        );

        let _ = app.update(Message::PollSystemTheme);
        assert_eq!(
            app.theme().palette().background,
            theme::resolve_theme().palette().background
        );
    }

    #[test]
    fn test_image_paths_become_still_cameras() {
        assert_eq!(image_path("face.PNG"), Some(PathBuf::from("face.PNG")));
        assert_eq!(image_path("/dev/video0"), None);
        assert_eq!(image_path("rtsp://camera.local/stream"), None);
    }
}

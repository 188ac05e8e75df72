pub const CASCADE_MODEL_NAME: &str = "seeta_fd_frontal_v1.0.bin";
pub const CASCADE_MODEL_URL: &str =
    "https://github.com/atomashpolskiy/rustface/raw/master/model/seeta_fd_frontal_v1.0.bin";

pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// Directory (relative to the working directory) that receives snapshots.
pub const DEFAULT_OUTPUT_DIR: &str = "detected_faces";
pub const SNAPSHOT_PREFIX: &str = "face_detected_";
/// `YYYYMMDD_HHMMSS`, local time.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const SCALE_FACTOR_MIN: f64 = 1.05;
pub const SCALE_FACTOR_MAX: f64 = 1.5;
pub const SCALE_FACTOR_STEP: f64 = 0.01;
pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;

pub const MIN_NEIGHBORS_MIN: u32 = 1;
pub const MIN_NEIGHBORS_MAX: u32 = 10;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 3;

pub const DEFAULT_OVERLAY_HEX: &str = "#0000FF";

/// Stroke width, in pixels, of the rectangle drawn around each face.
pub const OUTLINE_THICKNESS: u32 = 2;

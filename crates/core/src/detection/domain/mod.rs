pub mod detection_parameters;
pub mod face_detector;

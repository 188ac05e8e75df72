pub mod display_sink;
pub mod session_controller;
pub mod session_logger;
pub mod startup;

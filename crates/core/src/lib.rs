pub mod annotation;
pub mod capture;
pub mod detection;
pub mod persistence;
pub mod pipeline;
pub mod session;
pub mod shared;

//! facevote-capture — Still-image capture for the voting station.
//!
//! Decodes image files into RGB frames for face detection and feature
//! extraction, and writes face crops back out for review.

pub mod frame;
pub mod still;

pub use frame::save_region;
pub use still::{decode_frame, load_frame, CaptureError};

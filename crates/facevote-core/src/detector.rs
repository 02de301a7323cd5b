//! Face detection seam.
//!
//! The station treats detection as an external collaborator: anything that
//! turns a frame into candidate face rectangles, best candidate first.
//! Two simple detectors ship with the crate for still captures that are
//! already framed on a single face.

use crate::types::{Frame, Region};
use thiserror::Error;

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DEFAULT_DARK_THRESHOLD: f32 = 0.95;
/// Luma values below this are "near-black".
const DARK_PIXEL_CUTOFF: u8 = 32;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Locates face regions in a frame.
pub trait FaceDetector {
    /// Regions sorted best-first. An empty vector means no face.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, DetectorError>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, DetectorError> {
        (**self).detect(frame)
    }
}

/// Treats the whole capture as one face unless the frame is dark.
#[derive(Debug, Clone)]
pub struct WholeFrameDetector {
    dark_threshold: f32,
}

impl WholeFrameDetector {
    pub fn new(dark_threshold: f32) -> Self {
        Self { dark_threshold }
    }
}

impl Default for WholeFrameDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DARK_THRESHOLD)
    }
}

impl FaceDetector for WholeFrameDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, DetectorError> {
        if is_dark_frame(&frame.luma(), self.dark_threshold) {
            tracing::debug!(
                brightness = frame.avg_brightness(),
                "whole-frame detector: frame too dark"
            );
            return Ok(Vec::new());
        }
        Ok(vec![Region::new(0, 0, frame.width(), frame.height())])
    }
}

/// Reports a fixed, operator-supplied rectangle, clipped to the frame.
#[derive(Debug, Clone)]
pub struct FixedRegionDetector {
    region: Region,
}

impl FixedRegionDetector {
    pub fn new(region: Region) -> Self {
        Self { region }
    }
}

impl FaceDetector for FixedRegionDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, DetectorError> {
        Ok(self
            .region
            .clip(frame.width(), frame.height())
            .into_iter()
            .collect())
    }
}

/// Check if a luma plane is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < DARK_PIXEL_CUTOFF).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

//! Conversions between `image` buffers and core frames.

use std::path::Path;

use facevote_core::types::FrameError;
use facevote_core::{Frame, Region};
use image::{imageops, DynamicImage, RgbImage};

use crate::still::CaptureError;

/// Convert any decoded image to an RGB8 frame, dropping alpha.
pub fn from_image(img: DynamicImage) -> Result<Frame, FrameError> {
    let rgb = img.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(rgb.into_raw(), width, height)
}

/// Copy a frame back into an `RgbImage`.
pub fn to_image(frame: &Frame) -> Result<RgbImage, FrameError> {
    RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec()).ok_or(
        FrameError::InvalidLength {
            expected: frame.width() as usize * frame.height() as usize * 3,
            actual: frame.data().len(),
        },
    )
}

/// Write the face crop for `region` to `path` (format from the extension).
pub fn save_region(frame: &Frame, region: &Region, path: &Path) -> Result<(), CaptureError> {
    let clipped = region
        .clip(frame.width(), frame.height())
        .ok_or(CaptureError::Frame(FrameError::Empty))?;
    let img = to_image(frame)?;
    imageops::crop_imm(&img, clipped.x, clipped.y, clipped.width, clipped.height)
        .to_image()
        .save(path)?;
    tracing::debug!(path = %path.display(), ?clipped, "face crop saved");
    Ok(())
}

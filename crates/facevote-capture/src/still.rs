//! Still-image captures.
//!
//! The station does not drive a camera itself; a capture is any image file
//! (or in-memory encoded image) the `image` crate can decode.

use std::path::Path;

use facevote_core::types::FrameError;
use facevote_core::Frame;
use thiserror::Error;

use crate::frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture not found: {0}")]
    NotFound(String),
    #[error("image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

/// Decode an image file into an RGB frame.
pub fn load_frame(path: &Path) -> Result<Frame, CaptureError> {
    if !path.exists() {
        return Err(CaptureError::NotFound(path.display().to_string()));
    }
    let frame = frame::from_image(image::open(path)?)?;

    tracing::info!(
        path = %path.display(),
        width = frame.width(),
        height = frame.height(),
        brightness = frame.avg_brightness(),
        "capture loaded"
    );
    Ok(frame)
}

/// Decode an encoded image held in memory (PNG, JPEG, ...).
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, CaptureError> {
    Ok(frame::from_image(image::load_from_memory(bytes)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_load_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("face.png");
        RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])).save(&path).unwrap();

        let frame = load_frame(&path).unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert_eq!(&frame.data()[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_frame(&dir.path().join("absent.png")).unwrap_err();
        assert!(matches!(err, CaptureError::NotFound(_)));
    }

    #[test]
    fn test_undecodable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("face.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(load_frame(&path), Err(CaptureError::Decode(_))));
    }

    #[test]
    fn test_decode_from_memory() {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(4, 4, Rgb([200, 0, 0]))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.data().len(), 4 * 4 * 3);
    }
}

//! Feature extraction: crop a detected face, resize it to 50x50 with
//! bilinear interpolation and flatten it row-major, channels interleaved.

use crate::error::VoteError;
use crate::types::{FeatureVector, Frame, Region, CHANNELS, CROP_SIZE, FEATURE_LEN};

/// Crop `region` out of `frame` and turn it into a [`FeatureVector`].
///
/// The region is clipped to the frame first; a region with nothing left
/// after clipping is treated as no face at all.
pub fn extract(frame: &Frame, region: &Region) -> Result<FeatureVector, VoteError> {
    let crop = region
        .clip(frame.width(), frame.height())
        .ok_or(VoteError::NoFaceDetected)?;

    let stride = frame.width() as usize * CHANNELS;
    let (cx, cy) = (crop.x as usize, crop.y as usize);
    let (cw, ch) = (crop.width as usize, crop.height as usize);
    let data = frame.data();

    let scale_x = cw as f32 / CROP_SIZE as f32;
    let scale_y = ch as f32 / CROP_SIZE as f32;

    let mut values = Vec::with_capacity(FEATURE_LEN);
    for y in 0..CROP_SIZE {
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (src_y.floor() as usize).min(ch - 1);
        let y1 = (y0 + 1).min(ch - 1);
        let fy = src_y - y0 as f32;

        for x in 0..CROP_SIZE {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (src_x.floor() as usize).min(cw - 1);
            let x1 = (x0 + 1).min(cw - 1);
            let fx = src_x - x0 as f32;

            let at = |px: usize, py: usize, c: usize| -> f32 {
                data[(cy + py) * stride + (cx + px) * CHANNELS + c] as f32
            };

            for c in 0..CHANNELS {
                let val = at(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + at(x1, y0, c) * fx * (1.0 - fy)
                    + at(x0, y1, c) * (1.0 - fx) * fy
                    + at(x1, y1, c) * fx * fy;
                values.push(val.round().clamp(0.0, 255.0));
            }
        }
    }

    FeatureVector::from_values(values)
}

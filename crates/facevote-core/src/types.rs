use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::VoteError;

/// Number of digits in a voter identifier.
pub const IDENTIFIER_LEN: usize = 12;

/// Side length of the square face crop a feature vector is sampled from.
pub const CROP_SIZE: usize = 50;
/// Colour channels per crop pixel (RGB).
pub const CHANNELS: usize = 3;
/// Length of every stored feature vector.
pub const FEATURE_LEN: usize = CROP_SIZE * CROP_SIZE * CHANNELS;

/// Ledger column formats.
pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// The option that records an explicit abstention.
pub const ABSTENTION: &str = "NOTA";
/// Choices offered by a station that has no explicit configuration.
pub const DEFAULT_CHOICES: [&str; 4] = ["BJP", "CONGRESS", "APB", ABSTENTION];

/// A 12-digit numeric voter identifier.
///
/// Construction always validates, so a value of this type is never malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate and wrap a raw identifier: exactly 12 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, VoteError> {
        if raw.len() == IDENTIFIER_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(VoteError::InvalidIdentifier {
                length: raw.chars().count(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Masked form with only the last four digits visible: `XXXX-XXXX-9012`.
    pub fn masked(&self) -> String {
        format!("XXXX-XXXX-{}", &self.0[IDENTIFIER_LEN - 4..])
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = VoteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// Flattened 50x50 RGB face crop, one `f32` per channel sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn from_values(values: Vec<f32>) -> Result<Self, VoteError> {
        if values.len() != FEATURE_LEN {
            return Err(VoteError::FeatureLength {
                expected: FEATURE_LEN,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// A vector with every sample set to `value`.
    pub fn filled(value: f32) -> Self {
        Self(vec![value; FEATURE_LEN])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance to another vector.
    pub fn distance(&self, other: &FeatureVector) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = VoteError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::from_values(values)
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(v: FeatureVector) -> Self {
        v.0
    }
}

/// A ballot option, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Choice(String);

impl Choice {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace only. Such a choice is never recorded.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn is_abstention(&self) -> bool {
        self.0.eq_ignore_ascii_case(ABSTENTION)
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub identifier: Identifier,
    pub choice: Choice,
    /// Local wall-clock time of the cast, truncated to whole seconds.
    pub cast_at: NaiveDateTime,
}

impl Ballot {
    /// `DD-MM-YYYY`
    pub fn date(&self) -> String {
        self.cast_at.format(DATE_FORMAT).to_string()
    }

    /// `HH:MM:SS`
    pub fn time(&self) -> String {
        self.cast_at.format(TIME_FORMAT).to_string()
    }
}

/// Pixel rectangle reported by a face detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersect with a `width`x`height` frame. `None` when nothing remains.
    pub fn clip(&self, width: u32, height: u32) -> Option<Region> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Region::new(self.x, self.y, w, h))
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    /// Parses `x,y,w,h`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid region {s:?}: {e}"))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Region::new(*x, *y, *w, *h)),
            _ => Err(format!("invalid region {s:?}: expected x,y,w,h")),
        }
    }
}

/// A decoded still capture: interleaved RGB8 pixels.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * CHANNELS;
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Luma plane (BT.601 weights), one byte per pixel.
    pub fn luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(CHANNELS)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Average luma brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let luma = self.luma();
        luma.iter().map(|&b| b as f32).sum::<f32>() / luma.len() as f32
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame has no pixels")]
    Empty,
    #[error("invalid RGB length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accepts_twelve_digits() {
        let id = Identifier::parse("123456789012").unwrap();
        assert_eq!(id.as_str(), "123456789012");
    }

    #[test]
    fn test_identifier_rejects_short() {
        assert!(matches!(
            Identifier::parse("12345"),
            Err(VoteError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_identifier_rejects_non_numeric() {
        assert!(Identifier::parse("12345678901a").is_err());
        assert!(Identifier::parse(" 23456789012").is_err());
        assert!(Identifier::parse("١٢٣٤٥٦٧٨٩٠١٢").is_err());
    }

    #[test]
    fn test_invalid_identifier_not_echoed() {
        let err = Identifier::parse("98765432101").unwrap_err();
        assert!(matches!(err, VoteError::InvalidIdentifier { length: 11 }));
        assert!(!err.to_string().contains("98765432101"));
        assert!(!format!("{err:?}").contains("98765432101"));
    }

    #[test]
    fn test_identifier_masked() {
        let id = Identifier::parse("123456789012").unwrap();
        assert_eq!(id.masked(), "XXXX-XXXX-9012");
    }

    #[test]
    fn test_identifier_deserialize_validates() {
        let ok: Result<Identifier, _> = serde_json::from_str("\"111111111111\"");
        assert!(ok.is_ok());
        let bad: Result<Identifier, _> = serde_json::from_str("\"1111\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_feature_vector_length_enforced() {
        assert!(FeatureVector::from_values(vec![0.0; FEATURE_LEN]).is_ok());
        assert!(matches!(
            FeatureVector::from_values(vec![0.0; 10]),
            Err(VoteError::FeatureLength { expected: FEATURE_LEN, actual: 10 })
        ));
    }

    #[test]
    fn test_feature_vector_distance() {
        let a = FeatureVector::filled(0.0);
        let b = FeatureVector::filled(1.0);
        assert!((a.distance(&b) - (FEATURE_LEN as f32).sqrt()).abs() < 1e-3);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_choice_abstention() {
        assert!(Choice::new("NOTA").is_abstention());
        assert!(!Choice::new("CONGRESS").is_abstention());
    }

    #[test]
    fn test_choice_blank() {
        assert!(Choice::new("").is_blank());
        assert!(Choice::new("  ").is_blank());
        assert!(!Choice::new(" Write In ").is_blank());
    }

    #[test]
    fn test_ballot_formats() {
        let cast_at = chrono::NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 1)
            .unwrap();
        let ballot = Ballot {
            identifier: Identifier::parse("111111111111").unwrap(),
            choice: Choice::new("CONGRESS"),
            cast_at,
        };
        assert_eq!(ballot.date(), "07-03-2024");
        assert_eq!(ballot.time(), "09:05:01");
    }

    #[test]
    fn test_region_clip() {
        let r = Region::new(90, 90, 20, 20);
        assert_eq!(r.clip(100, 100), Some(Region::new(90, 90, 10, 10)));
        assert_eq!(Region::new(100, 0, 5, 5).clip(100, 100), None);
        assert_eq!(Region::new(0, 0, 0, 5).clip(100, 100), None);
    }

    #[test]
    fn test_region_parse() {
        assert_eq!("1, 2,3,4".parse::<Region>(), Ok(Region::new(1, 2, 3, 4)));
        assert!("1,2,3".parse::<Region>().is_err());
        assert!("a,b,c,d".parse::<Region>().is_err());
    }

    #[test]
    fn test_frame_length_checked() {
        assert!(Frame::new(vec![0; 12], 2, 2).is_ok());
        assert!(matches!(
            Frame::new(vec![0; 11], 2, 2),
            Err(FrameError::InvalidLength { expected: 12, actual: 11 })
        ));
        assert!(matches!(Frame::new(vec![], 0, 0), Err(FrameError::Empty)));
    }

    #[test]
    fn test_frame_luma() {
        let frame = Frame::new(vec![255, 255, 255, 0, 0, 0], 2, 1).unwrap();
        assert_eq!(frame.luma(), vec![255, 0]);
        assert!((frame.avg_brightness() - 127.5).abs() < 1e-3);
    }
}

//! Crop geometry for the ad preview.
//!
//! All arithmetic is done on integers and floors to whole pixels, so a
//! rectangle produced here always lies inside the image it was derived from.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CropError {
    #[error("source image has no pixels ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("invalid aspect ratio `{0}`")]
    InvalidRatio(String),
}

/// Target aspect ratio expressed as `width:height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const PREVIEW: AspectRatio = AspectRatio {
        width: 9,
        height: 5,
    };

    pub fn new(width: u32, height: u32) -> Result<Self, CropError> {
        if width == 0 || height == 0 {
            return Err(CropError::InvalidRatio(format!("{width}:{height}")));
        }
        Ok(Self { width, height })
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PREVIEW
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = CropError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || CropError::InvalidRatio(input.to_string());
        let (w, h) = input.trim().split_once(':').ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        AspectRatio::new(width, height).map_err(|_| invalid())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    #[cfg(test)]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            origin_x: 0,
            origin_y: 0,
            width,
            height,
        }
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.origin_x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.origin_y) + u64::from(self.height) <= u64::from(height)
    }
}

/// Largest centered rectangle of `ratio` that fits inside `width`x`height`.
///
/// Sources narrower than the ratio keep their full width and lose height
/// (split evenly top and bottom); wider sources keep their full height.
/// A side that would floor to zero is held at one pixel.
pub fn crop_to_aspect(width: u32, height: u32, ratio: AspectRatio) -> Result<CropRect, CropError> {
    if width == 0 || height == 0 {
        return Err(CropError::EmptySource { width, height });
    }
    let (w, h) = (u64::from(width), u64::from(height));
    let (rw, rh) = (u64::from(ratio.width), u64::from(ratio.height));

    if w * rh <= h * rw {
        let crop_height = ((w * rh) / rw).clamp(1, h);
        Ok(CropRect {
            origin_x: 0,
            origin_y: ((h - crop_height) / 2) as u32,
            width,
            height: crop_height as u32,
        })
    } else {
        let crop_width = ((h * rw) / rh).clamp(1, w);
        Ok(CropRect {
            origin_x: ((w - crop_width) / 2) as u32,
            origin_y: 0,
            width: crop_width as u32,
            height,
        })
    }
}

/// Right two-thirds of an already cropped image, full height, in that
/// image's own coordinates. Text is overlaid on this part of the preview.
pub fn analysis_region(cropped_width: u32, cropped_height: u32) -> CropRect {
    let width = cropped_width.max(1);
    let height = cropped_height.max(1);
    let region_width = ((u64::from(width) * 2) / 3).max(1) as u32;
    CropRect {
        origin_x: width - region_width,
        origin_y: 0,
        width: region_width,
        height,
    }
}

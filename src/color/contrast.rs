use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cutoff on the 0–255 luma scale below which a background counts as dark.
pub const DEFAULT_LUMA_THRESHOLD: f64 = 150.0;

const LUMA_WEIGHTS: (f64, f64, f64) = (0.299, 0.587, 0.114);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("expected 6 hex digits, got `{0}`")]
    Length(String),
    #[error("invalid hex digits in `{0}`")]
    Digits(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    #[allow(dead_code)]
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let digits = input.trim();
        let digits = digits.strip_prefix('#').unwrap_or(digits);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ColorParseError::Length(input.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ColorParseError::Digits(input.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// BT.601 luma, 0.0 (black) to 255.0 (white).
    pub fn luminance(self) -> f64 {
        let (wr, wg, wb) = LUMA_WEIGHTS;
        wr * f64::from(self.r) + wg * f64::from(self.g) + wb * f64::from(self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Which text color stays readable over a given background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColorDecision {
    /// Light text, for dark backgrounds.
    Light,
    /// Dark text, for light backgrounds.
    Dark,
}

impl TextColorDecision {
    pub fn css(self) -> &'static str {
        match self {
            TextColorDecision::Light => "white",
            TextColorDecision::Dark => "#1a1a1a",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastPolicy {
    threshold: f64,
}

impl Default for ContrastPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LUMA_THRESHOLD,
        }
    }
}

impl ContrastPolicy {
    /// Out-of-range or non-finite thresholds fall back to the default.
    pub fn with_threshold(threshold: f64) -> Self {
        if threshold.is_finite() && (0.0..=255.0).contains(&threshold) {
            Self { threshold }
        } else {
            Self::default()
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decide(&self, color: Rgb) -> TextColorDecision {
        if color.luminance() < self.threshold {
            TextColorDecision::Light
        } else {
            TextColorDecision::Dark
        }
    }
}

/// Decision under the default threshold.
#[allow(dead_code)]
pub fn decide_text_color(color: Rgb) -> TextColorDecision {
    ContrastPolicy::default().decide(color)
}

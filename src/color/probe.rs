use crate::color::contrast::Rgb;
use crate::http::build_client;
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, codecs::jpeg::JpegEncoder};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Field lookup order used to pick one color out of any report shape.
pub const FIELD_PRIORITY: &[&str] = &[
    "average",
    "primary",
    "dominant",
    "vibrant",
    "background",
    "muted",
    "secondary",
    "detail",
];

const THUMBNAIL_EDGE: u32 = 100;
const BUCKET_SHIFT: u8 = 4;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("region is empty")]
    EmptyRegion,
    #[error("extractor request failed: {0}")]
    Request(String),
    #[error("invalid extractor response: {0}")]
    InvalidResponse(String),
}

/// Palette as reported by a color-extraction backend. The set of fields
/// depends on which platform produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PaletteReport {
    Android {
        #[serde(default)]
        average: Option<String>,
        #[serde(default)]
        dominant: Option<String>,
        #[serde(default)]
        vibrant: Option<String>,
        #[serde(default)]
        muted: Option<String>,
    },
    Ios {
        #[serde(default)]
        primary: Option<String>,
        #[serde(default)]
        secondary: Option<String>,
        #[serde(default)]
        background: Option<String>,
        #[serde(default)]
        detail: Option<String>,
    },
    Web {
        #[serde(default)]
        dominant: Option<String>,
        #[serde(default)]
        vibrant: Option<String>,
        #[serde(default)]
        muted: Option<String>,
    },
}

impl PaletteReport {
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match (self, name) {
            (PaletteReport::Android { average, .. }, "average") => average,
            (PaletteReport::Android { dominant, .. }, "dominant") => dominant,
            (PaletteReport::Android { vibrant, .. }, "vibrant") => vibrant,
            (PaletteReport::Android { muted, .. }, "muted") => muted,
            (PaletteReport::Ios { primary, .. }, "primary") => primary,
            (PaletteReport::Ios { secondary, .. }, "secondary") => secondary,
            (PaletteReport::Ios { background, .. }, "background") => background,
            (PaletteReport::Ios { detail, .. }, "detail") => detail,
            (PaletteReport::Web { dominant, .. }, "dominant") => dominant,
            (PaletteReport::Web { vibrant, .. }, "vibrant") => vibrant,
            (PaletteReport::Web { muted, .. }, "muted") => muted,
            _ => return None,
        };
        value.as_deref()
    }

    /// First field in [`FIELD_PRIORITY`] that holds a valid hex color.
    pub fn normalize(&self) -> Option<(&'static str, Rgb)> {
        FIELD_PRIORITY.iter().find_map(|name| {
            self.field(name)
                .and_then(|raw| Rgb::from_hex(raw).ok())
                .map(|rgb| (*name, rgb))
        })
    }
}

#[async_trait]
pub trait ColorExtractor: Send + Sync {
    async fn extract(&self, region: &DynamicImage) -> Result<PaletteReport, ExtractError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbedColor {
    pub color: Rgb,
    /// Report field the color came from; `None` when the fallback was used.
    pub field: Option<&'static str>,
}

impl ProbedColor {
    pub fn fallback() -> Self {
        Self {
            color: Rgb::BLACK,
            field: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.field.is_none()
    }
}

#[derive(Clone)]
pub struct DominantColorProbe {
    extractor: Arc<dyn ColorExtractor>,
}

impl DominantColorProbe {
    pub fn new(extractor: Arc<dyn ColorExtractor>) -> Self {
        Self { extractor }
    }

    pub fn pixel() -> Self {
        Self::new(Arc::new(PixelPaletteExtractor))
    }

    /// Never fails: extractor errors and unusable reports yield black.
    pub async fn probe(&self, region: &DynamicImage) -> ProbedColor {
        match self.extractor.extract(region).await {
            Ok(report) => match report.normalize() {
                Some((field, color)) => {
                    debug!(target = "studio.probe", field, color = %color, "palette_normalized");
                    ProbedColor {
                        color,
                        field: Some(field),
                    }
                }
                None => {
                    warn!(target = "studio.probe", ?report, "palette_without_usable_field");
                    ProbedColor::fallback()
                }
            },
            Err(err) => {
                warn!(target = "studio.probe", error = %err, "palette_extraction_failed");
                ProbedColor::fallback()
            }
        }
    }
}

/// Local extractor: reports the mean of the most populated color bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelPaletteExtractor;

#[async_trait]
impl ColorExtractor for PixelPaletteExtractor {
    async fn extract(&self, region: &DynamicImage) -> Result<PaletteReport, ExtractError> {
        let dominant = dominant_color(region).ok_or(ExtractError::EmptyRegion)?;
        Ok(PaletteReport::Web {
            dominant: Some(dominant.to_hex()),
            vibrant: None,
            muted: None,
        })
    }
}

fn dominant_color(region: &DynamicImage) -> Option<Rgb> {
    if region.width() == 0 || region.height() == 0 {
        return None;
    }
    let thumbnail = if region.width() > THUMBNAIL_EDGE || region.height() > THUMBNAIL_EDGE {
        region.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE)
    } else {
        region.clone()
    };

    let mut buckets: HashMap<(u8, u8, u8), (u64, [u64; 3])> = HashMap::new();
    for (_, _, pixel) in thumbnail.pixels() {
        let [r, g, b, _] = pixel.0;
        let key = (r >> BUCKET_SHIFT, g >> BUCKET_SHIFT, b >> BUCKET_SHIFT);
        let entry = buckets.entry(key).or_insert((0, [0; 3]));
        entry.0 += 1;
        entry.1[0] += u64::from(r);
        entry.1[1] += u64::from(g);
        entry.1[2] += u64::from(b);
    }

    // ties resolve on the bucket key so the result is deterministic
    let (_, (count, sums)) = buckets
        .into_iter()
        .max_by(|(ka, (ca, _)), (kb, (cb, _))| ca.cmp(cb).then_with(|| kb.cmp(ka)))?;
    let mean = |sum: u64| (sum / count) as u8;
    Some(Rgb::new(mean(sums[0]), mean(sums[1]), mean(sums[2])))
}

/// Delegates extraction to an HTTP palette service.
#[derive(Clone)]
pub struct RemotePaletteExtractor {
    http: Client,
    url: String,
}

impl RemotePaletteExtractor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: build_client(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ColorExtractor for RemotePaletteExtractor {
    async fn extract(&self, region: &DynamicImage) -> Result<PaletteReport, ExtractError> {
        let mut body = Vec::new();
        JpegEncoder::new_with_quality(&mut body, 80)
            .encode_image(&region.to_rgb8())
            .map_err(|err| ExtractError::Request(err.to_string()))?;

        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(body)
            .send()
            .await
            .map_err(|err| ExtractError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractError::Request(format!("HTTP {}", response.status())));
        }

        response
            .json::<PaletteReport>()
            .await
            .map_err(|err| ExtractError::InvalidResponse(err.to_string()))
    }
}

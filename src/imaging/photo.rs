use crate::imaging::crop::CropRect;
use chrono::NaiveDateTime;
use image::{DynamicImage, GenericImageView, codecs::jpeg::JpegEncoder};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const JPEG_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("image has no pixels")]
    Empty,
    #[error("crop {rect:?} falls outside {width}x{height}")]
    OutOfBounds {
        rect: CropRect,
        width: u32,
        height: u32,
    },
    #[error("could not encode jpeg: {0}")]
    Encode(String),
    #[error("photo cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A picked or captured photo, decoded once.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    image: Arc<DynamicImage>,
}

impl SourceImage {
    pub fn decode(uri: impl Into<String>, bytes: &[u8]) -> Result<Self, PhotoError> {
        let image =
            image::load_from_memory(bytes).map_err(|err| PhotoError::Decode(err.to_string()))?;
        Self::from_image(uri, image)
    }

    pub fn from_image(uri: impl Into<String>, image: DynamicImage) -> Result<Self, PhotoError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PhotoError::Empty);
        }
        Ok(Self {
            uri: uri.into(),
            width,
            height,
            image: Arc::new(image),
        })
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// JPEG produced by applying a [`CropRect`] to a [`SourceImage`]. Owns a
/// file in the photo cache until [`CroppedImage::discard`] is called.
#[derive(Debug, Clone)]
pub struct CroppedImage {
    pub uri: String,
    pub path: PathBuf,
    pub rect: CropRect,
    pub width: u32,
    pub height: u32,
    bytes: Arc<Vec<u8>>,
    pixels: Arc<DynamicImage>,
}

impl CroppedImage {
    /// Crops, re-encodes at `quality` and writes the result under `cache_dir`.
    /// Blocking; callers on the runtime should use `spawn_blocking`.
    pub fn from_source(
        source: &SourceImage,
        rect: CropRect,
        quality: u8,
        cache_dir: &Path,
    ) -> Result<Self, PhotoError> {
        if !rect.fits_within(source.width, source.height) || rect.width == 0 || rect.height == 0 {
            return Err(PhotoError::OutOfBounds {
                rect,
                width: source.width,
                height: source.height,
            });
        }
        let pixels = source
            .image()
            .crop_imm(rect.origin_x, rect.origin_y, rect.width, rect.height);
        let bytes = encode_jpeg(&pixels, quality)?;

        std::fs::create_dir_all(cache_dir)?;
        let path = cache_dir.join(format!("crop-{}.{JPEG_EXTENSION}", Uuid::new_v4().simple()));
        std::fs::write(&path, &bytes)?;
        debug!(target = "studio.photo", path = %path.display(), bytes = bytes.len(), "crop_written");

        Ok(Self {
            uri: file_uri(&path),
            path,
            rect,
            width: rect.width,
            height: rect.height,
            bytes: Arc::new(bytes),
            pixels: Arc::new(pixels),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(JPEG_EXTENSION)
    }

    /// Sub-region of the cropped pixels, in cropped-image coordinates.
    pub fn region(&self, rect: CropRect) -> DynamicImage {
        self.pixels
            .crop_imm(rect.origin_x, rect.origin_y, rect.width, rect.height)
    }

    pub async fn discard(&self) {
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            debug!(target = "studio.photo", path = %self.path.display(), error = %err, "crop_remove_failed");
        }
    }
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(&image.to_rgb8())
        .map_err(|err| PhotoError::Encode(err.to_string()))?;
    Ok(buffer)
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// `IMG_YYYYMMDD_HHMMSS.<ext>` from local wall-clock time.
pub fn upload_file_name(at: NaiveDateTime, extension: &str) -> String {
    format!("IMG_{}.{}", at.format("%Y%m%d_%H%M%S"), extension.to_lowercase())
}

pub fn mime_for_extension(extension: &str) -> String {
    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "" => "image".to_string(),
        other => format!("image/{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::crop::{AspectRatio, crop_to_aspect};
    use chrono::NaiveDate;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 { Rgb([20, 20, 20]) } else { Rgb([230, 230, 230]) }
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_reads_dimensions() {
        let source = SourceImage::decode("picked.png", &png_bytes(40, 30)).unwrap();
        assert_eq!((source.width, source.height), (40, 30));
        assert_eq!(source.uri, "picked.png");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            SourceImage::decode("x", b"definitely not an image"),
            Err(PhotoError::Decode(_))
        ));
    }

    #[test]
    fn crop_writes_jpeg_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceImage::decode("picked.png", &png_bytes(90, 120)).unwrap();
        let rect = crop_to_aspect(source.width, source.height, AspectRatio::PREVIEW).unwrap();
        let cropped = CroppedImage::from_source(&source, rect, 70, dir.path()).unwrap();

        assert_eq!((cropped.width, cropped.height), (90, 50));
        assert!(cropped.path.exists());
        assert!(cropped.uri.starts_with("file://"));
        assert_eq!(cropped.extension(), "jpg");
        // JPEG SOI marker
        assert_eq!(&cropped.bytes()[..2], &[0xFF, 0xD8]);
        let reread = image::load_from_memory(cropped.bytes()).unwrap();
        assert_eq!(reread.dimensions(), (90, 50));
    }

    #[test]
    fn crop_outside_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceImage::decode("picked.png", &png_bytes(10, 10)).unwrap();
        let rect = CropRect {
            origin_x: 5,
            origin_y: 0,
            width: 10,
            height: 10,
        };
        assert!(matches!(
            CroppedImage::from_source(&source, rect, 70, dir.path()),
            Err(PhotoError::OutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn discard_removes_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceImage::decode("picked.png", &png_bytes(20, 20)).unwrap();
        let cropped =
            CroppedImage::from_source(&source, CropRect::full(20, 20), 60, dir.path()).unwrap();
        cropped.discard().await;
        assert!(!cropped.path.exists());
        // second discard only logs
        cropped.discard().await;
    }

    #[test]
    fn upload_names_follow_camera_pattern() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 2)
            .unwrap();
        assert_eq!(upload_file_name(at, "JPG"), "IMG_20250307_090502.jpg");
    }

    #[test]
    fn mime_is_inferred_from_extension() {
        assert_eq!(mime_for_extension("jpg"), "image/jpeg");
        assert_eq!(mime_for_extension("JPEG"), "image/jpeg");
        assert_eq!(mime_for_extension("png"), "image/png");
        assert_eq!(mime_for_extension(""), "image");
    }
}

use crate::color::{ContrastPolicy, DominantColorProbe};
use crate::config::StudioConfig;
use crate::imaging::crop::CropError;
use crate::imaging::{
    AspectRatio, CroppedImage, PhotoError, SourceImage, analysis_region, crop_to_aspect,
};
use crate::models::PhotoPreview;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Photo(#[from] PhotoError),
    #[error(transparent)]
    Crop(#[from] CropError),
    #[error("photo {generation} was replaced by a newer pick ({latest})")]
    Superseded { generation: u64, latest: u64 },
    #[error("image worker failed: {0}")]
    Worker(String),
}

struct CurrentPhoto {
    photo: CroppedImage,
    preview: PhotoPreview,
}

/// Runs pick → crop → analyze and keeps the photo attached to the draft.
///
/// Every pick takes a new generation number. A pick that finishes after a
/// newer one has started is thrown away, so a slow analysis can never
/// overwrite a fresher photo.
pub struct PreviewStudio {
    generation: AtomicU64,
    current: Mutex<Option<CurrentPhoto>>,
    probe: DominantColorProbe,
    contrast: ContrastPolicy,
    aspect: AspectRatio,
    jpeg_quality: u8,
    cache_dir: PathBuf,
}

impl PreviewStudio {
    pub fn new(config: &StudioConfig, probe: DominantColorProbe) -> Self {
        Self {
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            probe,
            contrast: config.contrast,
            aspect: config.aspect,
            jpeg_quality: config.jpeg_quality,
            cache_dir: config.cache_dir.clone(),
        }
    }

    /// Decodes raw image bytes off the runtime, then runs [`Self::process`].
    pub async fn pick(&self, uri: String, bytes: Vec<u8>) -> Result<PhotoPreview, PreviewError> {
        let source = tokio::task::spawn_blocking(move || SourceImage::decode(uri, &bytes))
            .await
            .map_err(|err| PreviewError::Worker(err.to_string()))??;
        self.process(source).await
    }

    pub async fn process(&self, source: SourceImage) -> Result<PhotoPreview, PreviewError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(target = "studio.preview", generation, uri = %source.uri, "pick_started");

        let (aspect, quality, cache_dir) = (self.aspect, self.jpeg_quality, self.cache_dir.clone());
        let worker_source = source.clone();
        let (photo, analysis, region) = tokio::task::spawn_blocking(move || {
            let rect = crop_to_aspect(worker_source.width, worker_source.height, aspect)?;
            let photo = CroppedImage::from_source(&worker_source, rect, quality, &cache_dir)?;
            let analysis = analysis_region(photo.width, photo.height);
            let region = photo.region(analysis);
            Ok::<_, PreviewError>((photo, analysis, region))
        })
        .await
        .map_err(|err| PreviewError::Worker(err.to_string()))??;

        let color = self.probe.probe(&region).await;
        let text_color = self.contrast.decide(color.color);
        let preview = PhotoPreview {
            generation,
            source_uri: source.uri.clone(),
            source_width: source.width,
            source_height: source.height,
            aspect,
            crop: photo.rect,
            analysis,
            luminance: color.color.luminance(),
            color,
            text_color,
            text_css: text_color.css(),
            local_uri: photo.uri.clone(),
        };

        let mut current = self.current.lock().await;
        let latest = self.generation.load(Ordering::SeqCst);
        if latest != generation {
            drop(current);
            photo.discard().await;
            debug!(target = "studio.preview", generation, latest, "pick_superseded");
            return Err(PreviewError::Superseded { generation, latest });
        }
        let previous = current.replace(CurrentPhoto {
            photo,
            preview: preview.clone(),
        });
        drop(current);
        if let Some(previous) = previous {
            previous.photo.discard().await;
        }

        info!(
            target = "studio.preview",
            generation,
            color = %preview.color.color,
            text_color = preview.text_css,
            fallback = preview.color.is_fallback(),
            "preview_ready"
        );
        Ok(preview)
    }

    pub async fn current_photo(&self) -> Option<CroppedImage> {
        self.current.lock().await.as_ref().map(|c| c.photo.clone())
    }

    pub async fn current_preview(&self) -> Option<PhotoPreview> {
        self.current.lock().await.as_ref().map(|c| c.preview.clone())
    }

    pub async fn discard_current(&self) -> bool {
        let previous = self.current.lock().await.take();
        match previous {
            Some(previous) => {
                previous.photo.discard().await;
                true
            }
            None => false,
        }
    }

    /// Drops the current photo after a successful submit, unless the user
    /// already picked a different one in the meantime.
    pub async fn release_submitted(&self, submitted: &CroppedImage) {
        let mut current = self.current.lock().await;
        let same = current
            .as_ref()
            .is_some_and(|c| c.photo.path == submitted.path);
        let released = if same { current.take() } else { None };
        drop(current);
        if let Some(released) = released {
            released.photo.discard().await;
        }
    }
}

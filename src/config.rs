use crate::color::ContrastPolicy;
use crate::imaging::AspectRatio;
use std::{env, path::PathBuf, str::FromStr};
use tracing::warn;

const DEFAULT_JPEG_QUALITY: u8 = 70;
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_BODY_LIMIT: usize = 12 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub contrast: ContrastPolicy,
    pub aspect: AspectRatio,
    pub jpeg_quality: u8,
    pub cache_dir: PathBuf,
    pub palette_service_url: Option<String>,
    pub port: u16,
    pub body_limit: usize,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            contrast: ContrastPolicy::default(),
            aspect: AspectRatio::PREVIEW,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            cache_dir: env::temp_dir().join("digicurva-ad-studio"),
            palette_service_url: None,
            port: DEFAULT_PORT,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let contrast = env_parse::<f64>("TEXT_CONTRAST_THRESHOLD")
            .map(ContrastPolicy::with_threshold)
            .unwrap_or(defaults.contrast);
        let aspect = env_parse::<AspectRatio>("PREVIEW_ASPECT").unwrap_or(defaults.aspect);
        let jpeg_quality = env_parse::<u8>("JPEG_QUALITY")
            .filter(|q| (1..=100).contains(q))
            .unwrap_or(defaults.jpeg_quality);
        let cache_dir = env::var("PHOTO_CACHE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);
        let palette_service_url = env::var("PALETTE_SERVICE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let port = env_parse::<u16>("PORT").unwrap_or(defaults.port);
        let body_limit = env_parse::<usize>("REQUEST_MAX_BYTES")
            .filter(|v| *v > 0)
            .unwrap_or(defaults.body_limit);

        Self {
            contrast,
            aspect,
            jpeg_quality,
            cache_dir,
            palette_service_url,
            port,
            body_limit,
        }
    }
}

/// Reads and parses `key`; unparsable values are logged and treated as unset.
pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target = "studio.config", key, value = %raw, "ignoring_invalid_env_value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_preview_tuning() {
        let config = StudioConfig::default();
        assert_eq!(config.aspect, AspectRatio::PREVIEW);
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.contrast.threshold(), 150.0);
        assert!(config.palette_service_url.is_none());
    }

    #[test]
    fn env_parse_ignores_garbage() {
        // key is unique to this test so parallel tests don't interfere
        unsafe { env::set_var("STUDIO_TEST_BAD_NUMBER", "twelve") };
        assert_eq!(env_parse::<u16>("STUDIO_TEST_BAD_NUMBER"), None);
        unsafe { env::set_var("STUDIO_TEST_GOOD_RATIO", "16:9") };
        assert_eq!(
            env_parse::<AspectRatio>("STUDIO_TEST_GOOD_RATIO"),
            AspectRatio::new(16, 9).ok()
        );
        assert_eq!(env_parse::<u16>("STUDIO_TEST_UNSET_KEY"), None);
    }
}

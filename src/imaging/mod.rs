pub mod crop;
pub mod photo;

pub use crop::{AspectRatio, CropRect, analysis_region, crop_to_aspect};
pub use photo::{CroppedImage, PhotoError, SourceImage};

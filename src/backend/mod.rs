//! Remote ad endpoints: image upload, ad record creation, payment link.

pub mod client;
pub mod config;

use crate::imaging::CroppedImage;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use client::HttpAdBackend;
pub use config::Endpoints;

/// Identifier the backend assigns to a created ad. Always positive.
pub type AdRecordId = u64;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    InvalidBody(String),
    #[error("response missing `{0}`")]
    MalformedResponse(&'static str),
}

/// Form body for the ad record endpoint. Field names are the backend's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdRecordForm {
    pub titulo: String,
    pub mensaje: String,
    pub usuario_id: u64,
    pub fecha_inicio: String,
    pub fecha_fin: String,
    pub costo: u32,
    pub url_imagen: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentLinkForm {
    pub id_anuncio: AdRecordId,
    pub precio: u32,
}

#[async_trait]
pub trait AdBackend: Send + Sync {
    /// Returns the public URL of the stored image.
    async fn upload_image(&self, photo: &CroppedImage) -> Result<String, StageError>;

    async fn create_ad(&self, form: &AdRecordForm) -> Result<AdRecordId, StageError>;

    async fn payment_link(&self, form: &PaymentLinkForm) -> Result<String, StageError>;
}

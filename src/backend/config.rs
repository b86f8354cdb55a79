use once_cell::sync::Lazy;
use std::env;

pub static API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("AD_API_ROOT")
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://ljusstudie.site".to_string())
});

pub static UPLOAD_IMAGE_URL: Lazy<String> = Lazy::new(|| {
    env::var("AD_UPLOAD_URL")
        .unwrap_or_else(|_| format!("{}/SubirImagenBucker/subirImage.php", *API_ROOT))
});

pub static CREATE_AD_URL: Lazy<String> = Lazy::new(|| {
    env::var("AD_CREATE_URL")
        .unwrap_or_else(|_| format!("{}/DigiCurvaServer/crear_anuncio.php", *API_ROOT))
});

pub static PAYMENT_LINK_URL: Lazy<String> = Lazy::new(|| {
    env::var("AD_PAYMENT_LINK_URL")
        .unwrap_or_else(|_| format!("{}/DigiCurvaServer/generar_pago.php", *API_ROOT))
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub upload_image: String,
    pub create_ad: String,
    pub payment_link: String,
}

impl Endpoints {
    pub fn from_env() -> Self {
        Self {
            upload_image: UPLOAD_IMAGE_URL.clone(),
            create_ad: CREATE_AD_URL.clone(),
            payment_link: PAYMENT_LINK_URL.clone(),
        }
    }

    /// All three endpoints under one base URL, with the production paths.
    #[cfg(test)]
    pub fn under(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            upload_image: format!("{root}/SubirImagenBucker/subirImage.php"),
            create_ad: format!("{root}/DigiCurvaServer/crear_anuncio.php"),
            payment_link: format!("{root}/DigiCurvaServer/generar_pago.php"),
        }
    }
}

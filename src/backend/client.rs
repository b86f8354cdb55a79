use super::{AdBackend, AdRecordForm, AdRecordId, Endpoints, PaymentLinkForm, StageError};
use crate::http::build_client;
use crate::imaging::CroppedImage;
use crate::imaging::photo::{mime_for_extension, upload_file_name};
use async_trait::async_trait;
use chrono::Local;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{DefaultOnError, DeserializeAs, serde_as};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpAdBackend {
    http: Client,
    endpoints: Endpoints,
}

impl HttpAdBackend {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            http: build_client(),
            endpoints,
        }
    }

    pub fn from_env() -> Self {
        Self::new(Endpoints::from_env())
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
    /// Free-form; some deployments send `false` here on success.
    #[serde(default)]
    error: Option<Value>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct CreateAdResponse {
    #[serde_as(as = "DefaultOnError<Option<RecordIdAs>>")]
    #[serde(default)]
    id_anuncio: Option<i64>,
}

/// Accepts a record id sent as an integer, a whole float or a numeric string.
struct RecordIdAs;

impl<'de> DeserializeAs<'de, i64> for RecordIdAs {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        coerce_record_id(&value)
            .ok_or_else(|| de::Error::custom(format!("`{value}` is not an integer id")))
    }
}

fn coerce_record_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct PaymentLinkResponse {
    #[serde(default)]
    paypal_link: Option<String>,
}

#[async_trait]
impl AdBackend for HttpAdBackend {
    async fn upload_image(&self, photo: &CroppedImage) -> Result<String, StageError> {
        let extension = photo.extension().to_string();
        let file_name = upload_file_name(Local::now().naive_local(), &extension);
        let part = Part::bytes(photo.bytes().to_vec())
            .file_name(file_name.clone())
            .mime_str(&mime_for_extension(&extension))
            .map_err(|err| StageError::Transport(err.to_string()))?;
        let form = Form::new().part("image", part).text("name", file_name.clone());

        debug!(target = "studio.backend", url = %self.endpoints.upload_image, file_name = %file_name, "uploading_image");
        let response = self
            .http
            .post(&self.endpoints.upload_image)
            .multipart(form)
            .send()
            .await
            .map_err(|err| StageError::Transport(err.to_string()))?;

        let payload: UploadResponse = read_json(response).await?;
        let reported = payload.error.as_ref().and_then(Value::as_str);
        if let Some(message) = reported.filter(|message| !message.trim().is_empty()) {
            warn!(target = "studio.backend", error = %message, "upload_reported_error");
        }
        payload
            .url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or(StageError::MalformedResponse("url"))
    }

    async fn create_ad(&self, form: &AdRecordForm) -> Result<AdRecordId, StageError> {
        let response = self
            .http
            .post(&self.endpoints.create_ad)
            .form(form)
            .send()
            .await
            .map_err(|err| StageError::Transport(err.to_string()))?;

        let payload: CreateAdResponse = read_json(response).await?;
        payload
            .id_anuncio
            .filter(|id| *id > 0)
            .map(|id| id as AdRecordId)
            .ok_or(StageError::MalformedResponse("id_anuncio"))
    }

    async fn payment_link(&self, form: &PaymentLinkForm) -> Result<String, StageError> {
        let response = self
            .http
            .post(&self.endpoints.payment_link)
            .form(form)
            .send()
            .await
            .map_err(|err| StageError::Transport(err.to_string()))?;

        let payload: PaymentLinkResponse = read_json(response).await?;
        payload
            .paypal_link
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty())
            .ok_or(StageError::MalformedResponse("paypal_link"))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StageError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StageError::Status(status.as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| StageError::InvalidBody(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{CropRect, SourceImage};
    use axum::{
        Form, Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use image::{DynamicImage, RgbImage};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        bodies: Arc<Mutex<Vec<String>>>,
        forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn photo(dir: &tempfile::TempDir) -> CroppedImage {
        let source =
            SourceImage::from_image("picked", DynamicImage::ImageRgb8(RgbImage::new(18, 10)))
                .unwrap();
        CroppedImage::from_source(&source, CropRect::full(18, 10), 70, dir.path()).unwrap()
    }

    fn sample_form() -> AdRecordForm {
        AdRecordForm {
            titulo: "Bicicleta".into(),
            mensaje: "Rodada 26, poco uso".into(),
            usuario_id: 5,
            fecha_inicio: "2025-02-03".into(),
            fecha_fin: "2025-02-10".into(),
            costo: 70,
            url_imagen: "https://cdn.example.com/a.jpg".into(),
        }
    }

    fn backend(base: &str) -> HttpAdBackend {
        HttpAdBackend::new(Endpoints::under(base))
    }

    #[tokio::test]
    async fn upload_sends_multipart_image_and_name() {
        let captured = Captured::default();
        let router = Router::new()
            .route(
                "/SubirImagenBucker/subirImage.php",
                post(
                    |State(c): State<Captured>, headers: HeaderMap, body: Bytes| async move {
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let text = String::from_utf8_lossy(&body).to_string();
                        c.bodies.lock().unwrap().push(format!("{content_type}\n{text}"));
                        Json(json!({"url": "https://cdn.example.com/IMG_1.jpg"}))
                    },
                ),
            )
            .with_state(captured.clone());
        let base = serve(router).await;
        let dir = tempfile::tempdir().unwrap();

        let url = backend(&base).upload_image(&photo(&dir)).await.unwrap();
        assert_eq!(url, "https://cdn.example.com/IMG_1.jpg");

        let bodies = captured.bodies.lock().unwrap();
        let body = &bodies[0];
        assert!(body.starts_with("multipart/form-data"));
        assert!(body.contains("name=\"image\"; filename=\"IMG_"));
        assert!(body.contains("Content-Type: image/jpeg"));
        assert!(body.contains("name=\"name\""));
    }

    #[tokio::test]
    async fn upload_without_url_is_malformed() {
        let router = Router::new().route(
            "/SubirImagenBucker/subirImage.php",
            post(|| async { Json(json!({"error": "bucket full"})) }),
        );
        let base = serve(router).await;
        let dir = tempfile::tempdir().unwrap();
        let err = backend(&base).upload_image(&photo(&dir)).await.unwrap_err();
        assert!(matches!(err, StageError::MalformedResponse("url")));
    }

    #[tokio::test]
    async fn upload_accepts_non_string_error_field() {
        let router = Router::new().route(
            "/SubirImagenBucker/subirImage.php",
            post(|| async { Json(json!({"url": "https://cdn.example.com/x.jpg", "error": false})) }),
        );
        let base = serve(router).await;
        let dir = tempfile::tempdir().unwrap();
        let url = backend(&base).upload_image(&photo(&dir)).await.unwrap();
        assert_eq!(url, "https://cdn.example.com/x.jpg");
    }

    #[tokio::test]
    async fn create_ad_posts_backend_field_names() {
        let captured = Captured::default();
        let router = Router::new()
            .route(
                "/DigiCurvaServer/crear_anuncio.php",
                post(
                    |State(c): State<Captured>, Form(fields): Form<HashMap<String, String>>| async move {
                        c.forms.lock().unwrap().push(fields);
                        Json(json!({"id_anuncio": 42}))
                    },
                ),
            )
            .with_state(captured.clone());
        let base = serve(router).await;

        let id = backend(&base).create_ad(&sample_form()).await.unwrap();
        assert_eq!(id, 42);

        let forms = captured.forms.lock().unwrap();
        let fields = &forms[0];
        assert_eq!(fields["titulo"], "Bicicleta");
        assert_eq!(fields["mensaje"], "Rodada 26, poco uso");
        assert_eq!(fields["usuario_id"], "5");
        assert_eq!(fields["fecha_inicio"], "2025-02-03");
        assert_eq!(fields["fecha_fin"], "2025-02-10");
        assert_eq!(fields["costo"], "70");
        assert_eq!(fields["url_imagen"], "https://cdn.example.com/a.jpg");
    }

    #[tokio::test]
    async fn create_ad_coerces_string_ids() {
        let router = Router::new().route(
            "/DigiCurvaServer/crear_anuncio.php",
            post(|| async { Json(json!({"id_anuncio": "17", "ok": true})) }),
        );
        let base = serve(router).await;
        assert_eq!(backend(&base).create_ad(&sample_form()).await.unwrap(), 17);
    }

    #[tokio::test]
    async fn create_ad_coerces_float_and_padded_ids() {
        let router = Router::new()
            .route(
                "/float/DigiCurvaServer/crear_anuncio.php",
                post(|| async { Json(json!({"id_anuncio": 42.0})) }),
            )
            .route(
                "/padded/DigiCurvaServer/crear_anuncio.php",
                post(|| async { Json(json!({"id_anuncio": " 42 "})) }),
            )
            .route(
                "/fraction/DigiCurvaServer/crear_anuncio.php",
                post(|| async { Json(json!({"id_anuncio": 42.5})) }),
            )
            .route(
                "/bool/DigiCurvaServer/crear_anuncio.php",
                post(|| async { Json(json!({"id_anuncio": true})) }),
            );
        let base = serve(router).await;
        let create = |prefix: &str| backend(&format!("{base}/{prefix}"));

        assert_eq!(create("float").create_ad(&sample_form()).await.unwrap(), 42);
        assert_eq!(create("padded").create_ad(&sample_form()).await.unwrap(), 42);
        for prefix in ["fraction", "bool"] {
            let err = create(prefix).create_ad(&sample_form()).await.unwrap_err();
            assert!(matches!(err, StageError::MalformedResponse("id_anuncio")));
        }
    }

    #[test]
    fn record_id_coercion() {
        assert_eq!(coerce_record_id(&json!(7)), Some(7));
        assert_eq!(coerce_record_id(&json!(7.0)), Some(7));
        assert_eq!(coerce_record_id(&json!("\t7\n")), Some(7));
        assert_eq!(coerce_record_id(&json!(7.25)), None);
        assert_eq!(coerce_record_id(&json!(-3.0)), None);
        assert_eq!(coerce_record_id(&json!("7a")), None);
        assert_eq!(coerce_record_id(&json!(null)), None);
        assert_eq!(coerce_record_id(&json!([7])), None);
    }

    #[tokio::test]
    async fn create_ad_without_positive_id_is_malformed() {
        let router = Router::new()
            .route(
                "/DigiCurvaServer/crear_anuncio.php",
                post(|| async { Json(json!({"status": "ok"})) }),
            )
            .route(
                "/zero/DigiCurvaServer/crear_anuncio.php",
                post(|| async { Json(json!({"id_anuncio": 0})) }),
            );
        let base = serve(router).await;
        let missing = backend(&base).create_ad(&sample_form()).await.unwrap_err();
        assert!(matches!(missing, StageError::MalformedResponse("id_anuncio")));
        let zero = backend(&format!("{base}/zero"))
            .create_ad(&sample_form())
            .await
            .unwrap_err();
        assert!(matches!(zero, StageError::MalformedResponse("id_anuncio")));
    }

    #[tokio::test]
    async fn payment_link_round_trip() {
        let captured = Captured::default();
        let router = Router::new()
            .route(
                "/DigiCurvaServer/generar_pago.php",
                post(
                    |State(c): State<Captured>, Form(fields): Form<HashMap<String, String>>| async move {
                        c.forms.lock().unwrap().push(fields);
                        Json(json!({"paypal_link": "https://paypal.example/pay/42"}))
                    },
                ),
            )
            .with_state(captured.clone());
        let base = serve(router).await;
        let link = backend(&base)
            .payment_link(&PaymentLinkForm {
                id_anuncio: 42,
                precio: 150,
            })
            .await
            .unwrap();
        assert_eq!(link, "https://paypal.example/pay/42");
        let forms = captured.forms.lock().unwrap();
        assert_eq!(forms[0]["id_anuncio"], "42");
        assert_eq!(forms[0]["precio"], "150");
    }

    #[tokio::test]
    async fn payment_link_missing_field_is_malformed() {
        let router = Router::new().route(
            "/DigiCurvaServer/generar_pago.php",
            post(|| async { Json(json!({"paypal_link": "  "})) }),
        );
        let base = serve(router).await;
        let err = backend(&base)
            .payment_link(&PaymentLinkForm {
                id_anuncio: 1,
                precio: 70,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::MalformedResponse("paypal_link")));
    }

    #[tokio::test]
    async fn server_errors_and_bad_bodies_are_classified() {
        let router = Router::new()
            .route(
                "/DigiCurvaServer/crear_anuncio.php",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null)) }),
            )
            .route(
                "/DigiCurvaServer/generar_pago.php",
                post(|| async { "<html>not json</html>" }),
            );
        let base = serve(router).await;
        let backend = backend(&base);
        assert!(matches!(
            backend.create_ad(&sample_form()).await.unwrap_err(),
            StageError::Status(500)
        ));
        assert!(matches!(
            backend
                .payment_link(&PaymentLinkForm {
                    id_anuncio: 1,
                    precio: 70
                })
                .await
                .unwrap_err(),
            StageError::InvalidBody(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let err = backend("http://127.0.0.1:1")
            .create_ad(&sample_form())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Transport(_)));
    }
}

mod backend;
mod color;
mod config;
mod http;
mod imaging;
mod metrics;
mod models;
mod pipeline;
mod plans;
mod preview;
mod session;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use backend::{AdBackend, HttpAdBackend};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use color::{DominantColorProbe, RemotePaletteExtractor};
use config::StudioConfig;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, PhotoPreview, PhotoRequest, SessionRequest, SessionResponse, SubmitAdRequest,
};
use pipeline::{AdDraft, AdSubmission, AdUploadOrchestrator, SubmitError, SubmitErrorKind};
use preview::{PreviewError, PreviewStudio};
use serde_json::{Value, json};
use session::SessionContext;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "studio.api", "server crashed: {err:#}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = StudioConfig::from_env();
    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;
    let http_backend = HttpAdBackend::from_env();
    info!(
        target = "studio.api",
        create_ad = %http_backend.endpoints().create_ad,
        "ad backend configured"
    );
    let backend: Arc<dyn AdBackend> = Arc::new(http_backend);
    let state = AppState::new(&config, backend, prometheus_handle);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(
        target = "studio.api",
        cache_dir = %config.cache_dir.display(),
        contrast_threshold = config.contrast.threshold(),
        "listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state, config.body_limit).into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    session: SessionContext,
    studio: Arc<PreviewStudio>,
    orchestrator: AdUploadOrchestrator,
    openapi: Arc<Value>,
    prometheus_handle: PrometheusHandle,
}

impl AppState {
    fn new(
        config: &StudioConfig,
        backend: Arc<dyn AdBackend>,
        prometheus_handle: PrometheusHandle,
    ) -> Self {
        let probe = match &config.palette_service_url {
            Some(url) => DominantColorProbe::new(Arc::new(RemotePaletteExtractor::new(url))),
            None => DominantColorProbe::pixel(),
        };
        let session = SessionContext::new();
        let openapi = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
            .unwrap_or_else(|_| json!({ "openapi": "3.0.3" }));
        Self {
            orchestrator: AdUploadOrchestrator::new(backend, session.clone()),
            studio: Arc::new(PreviewStudio::new(config, probe)),
            session,
            openapi: Arc::new(openapi),
            prometheus_handle,
        }
    }
}

fn app(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/plans", get(list_plans))
        .route("/plans/{id}/window", get(plan_window))
        .route(
            "/session",
            get(session_get).post(session_set).delete(session_close),
        )
        .route("/photos", post(pick_photo))
        .route(
            "/photos/current",
            get(current_photo).delete(discard_photo),
        )
        .route("/ads", post(submit_ad))
        .route("/ads/state", get(submission_state))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "digicurva-ad-studio",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>DigiCurva Ad Studio API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

async fn list_plans() -> Json<&'static [plans::Plan]> {
    crate::metrics::inc_requests("/plans");
    Json(plans::catalog())
}

/// Active dates an ad bought today would get. Unknown ids use the default term.
async fn plan_window(Path(id): Path<u32>) -> Json<plans::PlanWindow> {
    Json(plans::compute_window_now(id))
}

fn session_view(session: &SessionContext, accepted: Option<bool>) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: session.get(),
        logged_in: session.is_logged_in(),
        accepted,
    })
}

async fn session_get(State(state): State<AppState>) -> Json<SessionResponse> {
    session_view(&state.session, None)
}

/// Stores the logged-in user. The first id wins; `accepted` is false when a
/// session already exists or the id is zero.
async fn session_set(
    State(state): State<AppState>,
    Json(payload): Json<SessionRequest>,
) -> Json<SessionResponse> {
    crate::metrics::inc_requests("/session");
    let accepted = state.session.set(payload.user_id);
    session_view(&state.session, Some(accepted))
}

async fn session_close(State(state): State<AppState>) -> Json<SessionResponse> {
    state.session.close();
    session_view(&state.session, None)
}

/// Pick → crop → analyze.
///
/// - Method: `POST`
/// - Path: `/photos`
/// - Body: `PhotoRequest` (base64 image, optionally a data URL)
/// - Response: `PhotoPreview`
async fn pick_photo(
    State(state): State<AppState>,
    Json(payload): Json<PhotoRequest>,
) -> Result<Json<PhotoPreview>, AppError> {
    crate::metrics::inc_requests("/photos");
    let encoded = match payload.data.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload.data.as_str(),
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| AppError::BadRequest("data", err.to_string()))?;
    let uri = payload
        .file_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("upload-{}", uuid::Uuid::new_v4()));

    let preview = state.studio.pick(uri, bytes).await?;
    Ok(Json(preview))
}

async fn current_photo(State(state): State<AppState>) -> Result<Json<PhotoPreview>, AppError> {
    state
        .studio
        .current_preview()
        .await
        .map(Json)
        .ok_or(AppError::NotFound("photo"))
}

async fn discard_photo(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.studio.discard_current().await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("photo"))
    }
}

/// Submit the ad with the photo currently attached to the draft.
///
/// - Method: `POST`
/// - Path: `/ads`
/// - Body: `SubmitAdRequest`
/// - Response: `AdSubmission` (record id, payment link, per-stage transcript)
async fn submit_ad(
    State(state): State<AppState>,
    Json(payload): Json<SubmitAdRequest>,
) -> Result<Json<AdSubmission>, AppError> {
    crate::metrics::inc_requests("/ads");
    let plan = plans::find(payload.plan_id).copied().ok_or_else(|| {
        AppError::BadRequest("plan_id", format!("unknown plan {}", payload.plan_id))
    })?;
    let photo = state.studio.current_photo().await;
    let draft = AdDraft {
        title: payload.title,
        description: payload.description,
        photo: photo.clone(),
        plan,
    };

    let submission = state.orchestrator.submit(draft).await?;
    if let Some(photo) = &photo {
        state.studio.release_submitted(photo).await;
    }
    Ok(Json(submission))
}

async fn submission_state(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "state": state.orchestrator.state() }))
}

#[derive(Debug)]
enum AppError {
    Submit(SubmitError),
    Preview(PreviewError),
    BadRequest(&'static str, String),
    NotFound(&'static str),
}

impl From<SubmitError> for AppError {
    fn from(value: SubmitError) -> Self {
        Self::Submit(value)
    }
}

impl From<PreviewError> for AppError {
    fn from(value: PreviewError) -> Self {
        Self::Preview(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            AppError::Submit(err) => {
                let status = match err.kind() {
                    SubmitErrorKind::Validation => StatusCode::BAD_REQUEST,
                    SubmitErrorKind::Busy => StatusCode::CONFLICT,
                    SubmitErrorKind::Fatal => StatusCode::BAD_GATEWAY,
                };
                (status, err.stage().to_string(), Some(err.detail().to_string()))
            }
            AppError::Preview(err) => {
                let status = match &err {
                    PreviewError::Superseded { .. } => StatusCode::CONFLICT,
                    PreviewError::Photo(imaging::PhotoError::Decode(_))
                    | PreviewError::Photo(imaging::PhotoError::Empty)
                    | PreviewError::Crop(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    PreviewError::Photo(_) | PreviewError::Worker(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                if status.is_server_error() {
                    warn!(target = "studio.api", error = %err, "photo_processing_failed");
                }
                (status, "photo".to_string(), Some(err.to_string()))
            }
            AppError::BadRequest(field, detail) => {
                (StatusCode::BAD_REQUEST, field.to_string(), Some(detail))
            }
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, what.to_string(), None),
        };
        (status, Json(ApiError { error, detail })).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

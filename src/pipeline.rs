use crate::backend::{AdBackend, AdRecordForm, AdRecordId, PaymentLinkForm, StageError};
use crate::imaging::CroppedImage;
use crate::models::StageReport;
use crate::plans::{Plan, PlanWindow, compute_window};
use crate::session::SessionContext;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

const VALIDATE_STAGE: &str = "validate";
const UPLOAD_STAGE: &str = "upload_image";
const CREATE_STAGE: &str = "create_ad";
const PAYMENT_STAGE: &str = "payment_link";

/// Everything the ad form holds at the moment the user submits.
#[derive(Debug, Clone)]
pub struct AdDraft {
    pub title: String,
    pub description: String,
    pub photo: Option<CroppedImage>,
    pub plan: Plan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Uploading,
    RecordCreating,
    LinkFetching,
    Completed,
    Failed,
}

impl SubmissionState {
    pub fn in_flight(self) -> bool {
        matches!(
            self,
            SubmissionState::Uploading
                | SubmissionState::RecordCreating
                | SubmissionState::LinkFetching
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum UploadOutcome {
    ImageUrl(String),
    NoImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Payment,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdSubmission {
    pub ad_id: AdRecordId,
    pub payment_link: Option<String>,
    pub upload: UploadOutcome,
    /// Value sent as `url_imagen`.
    pub image_reference: String,
    pub window: PlanWindow,
    pub next: NextStep,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct SubmitError {
    stage: &'static str,
    message: String,
    kind: SubmitErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// Missing required input; no request was sent.
    Validation,
    /// Another submission is still running; no request was sent.
    Busy,
    /// The ad record could not be created.
    Fatal,
}

impl SubmitError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage: field,
            message: message.into(),
            kind: SubmitErrorKind::Validation,
        }
    }

    pub fn busy() -> Self {
        Self {
            stage: VALIDATE_STAGE,
            message: "a submission is already in progress".into(),
            kind: SubmitErrorKind::Busy,
        }
    }

    pub fn fatal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: SubmitErrorKind::Fatal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> SubmitErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

/// Whether a stage failure ends the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StagePolicy {
    Required,
    BestEffort,
}

#[derive(Clone)]
pub struct AdUploadOrchestrator {
    backend: Arc<dyn AdBackend>,
    session: SessionContext,
    state: Arc<watch::Sender<SubmissionState>>,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl AdUploadOrchestrator {
    pub fn new(backend: Arc<dyn AdBackend>, session: SessionContext) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            backend,
            session,
            state: Arc::new(state),
            today: local_today,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn state(&self) -> SubmissionState {
        *self.state.borrow()
    }

    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    /// Upload → create record → payment link.
    ///
    /// Only the record stage can fail the submission. Upload and payment-link
    /// failures are logged and the ad goes ahead without them.
    pub async fn submit(&self, draft: AdDraft) -> Result<AdSubmission, SubmitError> {
        validate(&draft)?;

        let first = if draft.photo.is_some() {
            SubmissionState::Uploading
        } else {
            SubmissionState::RecordCreating
        };
        let mut guard = InFlight::claim(&self.state, first)?;

        let result = self.run_stages(draft).await;
        guard.finish(if result.is_ok() {
            SubmissionState::Completed
        } else {
            SubmissionState::Failed
        });
        result
    }

    async fn run_stages(&self, draft: AdDraft) -> Result<AdSubmission, SubmitError> {
        let mut stages = Vec::new();
        let window = compute_window(draft.plan.id, (self.today)());

        let upload = match &draft.photo {
            Some(photo) => {
                match capture_stage(
                    UPLOAD_STAGE,
                    StagePolicy::BestEffort,
                    &mut stages,
                    self.backend.upload_image(photo),
                    |url| json!({ "url": url }),
                )
                .await
                {
                    Ok(url) => UploadOutcome::ImageUrl(url),
                    Err(_) => UploadOutcome::NoImage,
                }
            }
            None => {
                stages.push(StageReport::new(
                    UPLOAD_STAGE,
                    0,
                    json!({ "status": "skipped", "reason": "no_photo" }),
                ));
                UploadOutcome::NoImage
            }
        };

        let image_reference = match (&upload, &draft.photo) {
            (UploadOutcome::ImageUrl(url), _) => url.clone(),
            (UploadOutcome::NoImage, Some(photo)) => photo.uri.clone(),
            (UploadOutcome::NoImage, None) => String::new(),
        };

        self.state.send_replace(SubmissionState::RecordCreating);
        let form = AdRecordForm {
            titulo: draft.title.trim().to_string(),
            mensaje: draft.description.trim().to_string(),
            usuario_id: self.session.id_or_sentinel(),
            fecha_inicio: window.start_param(),
            fecha_fin: window.end_param(),
            costo: draft.plan.price,
            url_imagen: image_reference.clone(),
        };
        let ad_id = capture_stage(
            CREATE_STAGE,
            StagePolicy::Required,
            &mut stages,
            self.backend.create_ad(&form),
            |id| json!({ "id_anuncio": id }),
        )
        .await
        .map_err(|err| SubmitError::fatal(CREATE_STAGE, err.to_string()))?;

        self.state.send_replace(SubmissionState::LinkFetching);
        let payment_link = capture_stage(
            PAYMENT_STAGE,
            StagePolicy::BestEffort,
            &mut stages,
            self.backend.payment_link(&PaymentLinkForm {
                id_anuncio: ad_id,
                precio: draft.plan.price,
            }),
            |link| json!({ "paypal_link": link }),
        )
        .await
        .ok();

        info!(
            target = "studio.pipeline",
            ad_id,
            plan_id = draft.plan.id,
            has_image_url = matches!(upload, UploadOutcome::ImageUrl(_)),
            has_payment_link = payment_link.is_some(),
            "ad_submitted"
        );

        Ok(AdSubmission {
            ad_id,
            payment_link,
            upload,
            image_reference,
            window,
            next: NextStep::Payment,
            stages,
        })
    }
}

fn validate(draft: &AdDraft) -> Result<(), SubmitError> {
    if draft.title.trim().is_empty() {
        return Err(SubmitError::validation("title", "title is required"));
    }
    if draft.description.trim().is_empty() {
        return Err(SubmitError::validation(
            "description",
            "description is required",
        ));
    }
    Ok(())
}

async fn capture_stage<T, Fut>(
    name: &'static str,
    policy: StagePolicy,
    stages: &mut Vec<StageReport>,
    fut: Fut,
    describe: impl FnOnce(&T) -> Value,
) -> Result<T, StageError>
where
    Fut: Future<Output = Result<T, StageError>>,
{
    let started = Instant::now();
    let outcome = fut.await;
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);

    let output = match (&outcome, policy) {
        (Ok(value), _) => {
            let mut output = describe(value);
            if let Value::Object(map) = &mut output {
                map.insert("status".into(), json!("ok"));
            }
            output
        }
        (Err(err), StagePolicy::BestEffort) => {
            warn!(target = "studio.pipeline", stage = name, error = %err, "stage_failed_absorbed");
            crate::metrics::stage_absorbed(name);
            json!({ "status": "absorbed", "error": err.to_string() })
        }
        (Err(err), StagePolicy::Required) => {
            error!(target = "studio.pipeline", stage = name, error = %err, "stage_failed_fatal");
            json!({ "status": "failed", "error": err.to_string() })
        }
    };
    stages.push(StageReport::new(name, elapsed_ms, output));
    outcome
}

/// Marks the orchestrator busy for one submission. If the submission future
/// is dropped before finishing, the state goes back to idle.
struct InFlight<'a> {
    state: &'a watch::Sender<SubmissionState>,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn claim(
        state: &'a watch::Sender<SubmissionState>,
        first: SubmissionState,
    ) -> Result<Self, SubmitError> {
        let claimed = state.send_if_modified(|current| {
            if current.in_flight() {
                false
            } else {
                *current = first;
                true
            }
        });
        if claimed {
            Ok(Self { state, done: false })
        } else {
            Err(SubmitError::busy())
        }
    }

    fn finish(&mut self, terminal: SubmissionState) {
        self.state.send_replace(terminal);
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state.send_replace(SubmissionState::Idle);
        }
    }
}

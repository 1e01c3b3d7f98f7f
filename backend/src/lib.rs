pub mod config;
pub mod delivery;
pub mod error;
pub mod intake;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use santa_core::{
    Assignment, ContactDirectory, DrawOutcome, Roster, SkippedDeclaration, SubmissionRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub use config::Config;
use delivery::{
    deliver_all, DeliveryError, DeliveryReport, MailgunMailer, Mailer, NetlifyEmailsMailer, Notice,
};
use error::ApiError;

const MAILGUN_NOT_CONFIGURED: &str =
    "Mailgun API Key or Domain is not set in environment variables.";
const NETLIFY_EMAILS_NOT_CONFIGURED: &str = "Required email environment variables are not set. \
     Please configure the Netlify Email Integration.";
const TEST_RECIPIENT_NOT_CONFIGURED: &str = "No test recipient is configured.";

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    mailgun: Option<Arc<dyn Mailer>>,
    netlify_emails: Option<Arc<dyn Mailer>>,
}

impl AppState {
    pub fn from_config(config: Config) -> Self {
        let client = reqwest::Client::new();
        let mailgun = config.mailgun.clone().map(|settings| {
            Arc::new(MailgunMailer::new(client.clone(), settings)) as Arc<dyn Mailer>
        });
        let netlify_emails = config.netlify_emails.clone().map(|settings| {
            Arc::new(NetlifyEmailsMailer::new(client.clone(), settings)) as Arc<dyn Mailer>
        });
        Self::with_mailers(config, mailgun, netlify_emails)
    }

    pub fn with_mailers(
        config: Config,
        mailgun: Option<Arc<dyn Mailer>>,
        netlify_emails: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            mailgun,
            netlify_emails,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/assignments/generate", post(generate_assignments))
        .route("/draw", post(run_draw))
        .route("/emails/send", post(send_emails))
        .route("/emails/test", get(test_email))
        .with_state(state)
}

#[derive(Deserialize)]
struct DrawParams {
    seed: Option<u64>,
}

#[derive(Serialize)]
struct GenerateResponse {
    success: bool,
    message: String,
    assignments: Vec<Assignment>,
    skipped: Vec<SkippedDeclaration>,
}

#[derive(Serialize)]
struct DrawResponse {
    success: bool,
    message: String,
    assignments: Vec<Assignment>,
    delivery: DeliveryReport,
}

#[derive(Serialize)]
struct SendEmailsResponse {
    success: bool,
    message: String,
    delivery: DeliveryReport,
}

fn draw(
    roster: &Roster,
    submissions: &[SubmissionRecord],
    seed: Option<u64>,
) -> Result<DrawOutcome, ApiError> {
    let mut rng = seed
        .map(ChaCha8Rng::seed_from_u64)
        .unwrap_or_else(ChaCha8Rng::from_entropy);
    let outcome = santa_core::resolve_assignments(roster, submissions, &mut rng)?;

    for skipped in &outcome.skipped {
        warn!(
            giver = %skipped.giver,
            receiver = %skipped.receiver,
            reason = ?skipped.reason,
            "purchased declaration skipped"
        );
    }
    info!(
        assignments = outcome.len(),
        locked = outcome.locked_count,
        matched = outcome.matched_count,
        "draw resolved"
    );
    Ok(outcome)
}

#[tracing::instrument(skip_all, fields(draw_id = %Uuid::new_v4()))]
async fn generate_assignments(
    State(state): State<AppState>,
    Query(params): Query<DrawParams>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let roster = intake::load_roster(&state.config.roster_path).await?;
    let submissions = intake::load_csv_submissions(&state.config.submissions_csv_path).await?;
    let outcome = draw(&roster, &submissions, params.seed)?;

    Ok(Json(GenerateResponse {
        success: outcome.success,
        message: outcome.summary(),
        assignments: outcome.assignments,
        skipped: outcome.skipped,
    }))
}

#[tracing::instrument(skip_all, fields(draw_id = %Uuid::new_v4()))]
async fn run_draw(
    State(state): State<AppState>,
    Query(params): Query<DrawParams>,
) -> Result<Json<DrawResponse>, ApiError> {
    let mailer = state
        .mailgun
        .clone()
        .ok_or(ApiError::MailerNotConfigured(MAILGUN_NOT_CONFIGURED))?;
    let roster = intake::load_roster(&state.config.roster_path).await?;
    let submissions =
        intake::load_json_submissions(&state.config.submissions_json_path).await?;
    let outcome = draw(&roster, &submissions, params.seed)?;

    let contacts = ContactDirectory::from_submissions(&submissions);
    let delivery = deliver_all(mailer.as_ref(), &outcome.assignments, &contacts).await;
    info!(
        attempted = delivery.attempted,
        delivered = delivery.delivered(),
        "draw notices sent"
    );

    Ok(Json(DrawResponse {
        success: outcome.success,
        message: format!(
            "Successfully processed the draw. {} assignments were finalized and {} emails were sent.",
            outcome.len(),
            delivery.attempted
        ),
        assignments: outcome.assignments,
        delivery,
    }))
}

fn parse_assignments(mut payload: serde_json::Value) -> Result<Vec<Assignment>, ApiError> {
    let invalid = || ApiError::InvalidPayload("Invalid or missing assignments payload.".into());
    match payload.get_mut("assignments") {
        Some(list) if list.is_array() => {
            serde_json::from_value(list.take()).map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

#[tracing::instrument(skip_all, fields(batch_id = %Uuid::new_v4()))]
async fn send_emails(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<SendEmailsResponse>, ApiError> {
    let mailer = state
        .netlify_emails
        .clone()
        .ok_or(ApiError::MailerNotConfigured(NETLIFY_EMAILS_NOT_CONFIGURED))?;
    let Json(payload) =
        payload.map_err(|rejection| ApiError::InvalidPayload(rejection.body_text()))?;
    let assignments = parse_assignments(payload)?;
    let submissions = intake::load_csv_submissions(&state.config.submissions_csv_path).await?;

    let contacts = ContactDirectory::from_submissions(&submissions);
    let delivery = deliver_all(mailer.as_ref(), &assignments, &contacts).await;
    info!(
        attempted = delivery.attempted,
        delivered = delivery.delivered(),
        "assignment notices queued"
    );

    Ok(Json(SendEmailsResponse {
        success: true,
        message: format!(
            "{} emails were successfully queued for sending.",
            delivery.attempted
        ),
        delivery,
    }))
}

async fn test_email(State(state): State<AppState>) -> Result<(StatusCode, String), ApiError> {
    let mailer = state
        .netlify_emails
        .clone()
        .ok_or(ApiError::MailerNotConfigured(NETLIFY_EMAILS_NOT_CONFIGURED))?;
    let to = state
        .config
        .test_recipient
        .clone()
        .ok_or(ApiError::MailerNotConfigured(TEST_RECIPIENT_NOT_CONFIGURED))?;

    match mailer.send(to.clone(), Notice::Test).await {
        Ok(()) => Ok((
            StatusCode::OK,
            format!("Test email sent successfully! Check the inbox for {to}."),
        )),
        Err(DeliveryError::Rejected { status, body }) => Ok((
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            format!("Failed to send test email. Status: {status}. Body: {body}"),
        )),
        Err(err) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("An unexpected error occurred: {err}"),
        )),
    }
}

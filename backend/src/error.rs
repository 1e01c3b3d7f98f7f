use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use santa_core::AssignmentError;
use serde::Serialize;
use tracing::error;

use crate::intake::IntakeError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Assignment(#[from] AssignmentError),
    #[error("{0}")]
    Intake(#[from] IntakeError),
    #[error("{0}")]
    MailerNotConfigured(&'static str),
    #[error("{0}")]
    InvalidPayload(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Assignment(err) if err.requires_manual_intervention() => {
                StatusCode::CONFLICT
            }
            ApiError::Assignment(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Intake(_) | ApiError::MailerNotConfigured(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!(%status, error = %self, "request failed");
        let message = match &self {
            ApiError::MailerNotConfigured(reason) => reason.to_string(),
            other => format!("An error occurred: {other}"),
        };
        (
            status,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

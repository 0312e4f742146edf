// src/error.rs
use axum::{
    extract::rejection::JsonRejection,
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::eligibility::DenialReason;

pub const SIGN_IN_PATH: &str = "/sign-in";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("{0}")]
    Validation(String),

    #[error("poll has ended")]
    PollEnded,

    #[error("{0}")]
    Conflict(String),

    #[error("{context}")]
    Storage {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Replaces the user-facing message of a storage failure. Other variants pass through.
    pub fn context(self, context: &'static str) -> Self {
        match self {
            AppError::Storage { source, .. } => AppError::Storage { context, source },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PollEnded => StatusCode::GONE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Storage { .. } | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(source: sqlx::Error) -> Self {
        AppError::Storage {
            context: "storage operation failed",
            source,
        }
    }
}

/// Bodies that do not parse are reported like any other invalid input.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<DenialReason> for AppError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::PollNotFound => AppError::NotFound(reason.to_string()),
            DenialReason::PollEnded => AppError::PollEnded,
            DenialReason::AuthenticationRequired => AppError::AuthenticationRequired,
            DenialReason::AlreadyVoted => AppError::Conflict(reason.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Storage { context, source } = &self {
            error!("{context}: {source}");
        }

        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));

        match self {
            AppError::AuthenticationRequired => {
                (status, [(LOCATION, SIGN_IN_PATH)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

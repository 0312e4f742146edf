// src/identity.rs
use axum::extract::FromRequestParts;
use http::{request::Parts, HeaderName};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::UserId;
use crate::state::AppState;

pub const MALFORMED_IDENTITY: &str = "malformed identity header";

/// Answers "who is making this request", once per request.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, parts: &Parts) -> Result<Option<UserId>, AppError>;
}

/// Trusts a header set by the authenticating gateway in front of the service.
pub struct HeaderIdentityProvider {
    header: HeaderName,
}

impl HeaderIdentityProvider {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl IdentityProvider for HeaderIdentityProvider {
    fn identify(&self, parts: &Parts) -> Result<Option<UserId>, AppError> {
        let Some(value) = parts.headers.get(&self.header) else {
            return Ok(None);
        };

        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(Some)
            .ok_or_else(|| {
                warn!(header = %self.header, "Rejecting malformed identity header");
                AppError::Unauthorized(MALFORMED_IDENTITY.to_string())
            })
    }
}

/// The caller's identity, if any.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<UserId>);

/// An authenticated caller; anonymous requests are turned away.
#[derive(Debug, Clone, Copy)]
pub struct RequireUser(pub UserId);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state.identity.identify(parts).map(MaybeUser)
    }
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .identity
            .identify(parts)?
            .map(RequireUser)
            .ok_or(AppError::AuthenticationRequired)
    }
}

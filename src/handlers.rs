// handlers.rs
use axum::{
    extract::{FromRequest, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::eligibility::{DenialReason, Eligibility};
use crate::error::AppError;
use crate::identity::{MaybeUser, RequireUser};
use crate::models::{PollRequest, PollSummary, PollWithOptions, ShareLinks, VoteRequest};
use crate::state::AppState;
use crate::tally::PollResults;

/// `Json` whose rejections come back as `AppError` bodies.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// A path id that is not a UUID cannot name a poll.
fn poll_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("poll not found".to_string()))
}

pub async fn health() -> &'static str {
    "ok"
}

/// List the caller's polls
pub async fn list_polls(
    State(state): State<AppState>,
    RequireUser(owner): RequireUser,
) -> Result<Json<Vec<PollSummary>>, AppError> {
    Ok(Json(state.polls.list_my_polls(owner).await?))
}

pub async fn create_poll(
    State(state): State<AppState>,
    RequireUser(owner): RequireUser,
    ApiJson(request): ApiJson<PollRequest>,
) -> Result<(StatusCode, Json<PollWithOptions>), AppError> {
    let created = state.polls.create_poll(owner, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PollWithOptions>, AppError> {
    Ok(Json(state.polls.get_poll(poll_id(&id)?).await?))
}

pub async fn update_poll(
    State(state): State<AppState>,
    RequireUser(caller): RequireUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<PollRequest>,
) -> Result<Json<PollWithOptions>, AppError> {
    let updated = state
        .polls
        .edit_poll(caller, poll_id(&id)?, request)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    RequireUser(caller): RequireUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.polls.delete_poll(caller, poll_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Tells the page whether to show the vote form, and if not, why
pub async fn eligibility(
    State(state): State<AppState>,
    MaybeUser(voter): MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<Eligibility>, AppError> {
    match state.polls.eligibility(poll_id(&id)?, voter).await? {
        Eligibility::Denied(DenialReason::PollNotFound) => {
            Err(DenialReason::PollNotFound.into())
        }
        decision => Ok(Json(decision)),
    }
}

pub async fn submit_vote(
    State(state): State<AppState>,
    MaybeUser(voter): MaybeUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<VoteRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let vote = state
        .polls
        .submit_vote(poll_id(&id)?, request.option_id, voter)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "vote_id": vote.id })),
    ))
}

pub async fn results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PollResults>, AppError> {
    Ok(Json(state.polls.results(poll_id(&id)?).await?))
}

pub async fn share(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShareLinks>, AppError> {
    Ok(Json(state.polls.share(poll_id(&id)?).await?))
}

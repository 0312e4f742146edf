// src/eligibility.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Poll, UserId};
use crate::repository::PollRepository;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    #[error("poll not found")]
    PollNotFound,

    #[error("poll has ended")]
    PollEnded,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("already voted")]
    AlreadyVoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Eligibility {
    Allowed,
    Denied(DenialReason),
}

impl Eligibility {
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Eligibility::Allowed => Ok(()),
            Eligibility::Denied(reason) => Err(reason.into()),
        }
    }
}

/// Decides whether a vote attempt may proceed. Checks run in a fixed order and
/// the first failing one wins.
pub fn evaluate(
    poll: Option<&Poll>,
    voter: Option<UserId>,
    prior_vote: bool,
    now: DateTime<Utc>,
) -> Eligibility {
    let Some(poll) = poll else {
        return Eligibility::Denied(DenialReason::PollNotFound);
    };
    if poll.has_ended(now) {
        return Eligibility::Denied(DenialReason::PollEnded);
    }
    if poll.require_auth && voter.is_none() {
        return Eligibility::Denied(DenialReason::AuthenticationRequired);
    }
    if voter.is_some() && prior_vote {
        return Eligibility::Denied(DenialReason::AlreadyVoted);
    }
    Eligibility::Allowed
}

/// Read-only. Anonymous voters are never looked up, so they are never
/// reported as having voted.
pub async fn check_eligibility(
    repo: &dyn PollRepository,
    poll_id: Uuid,
    voter: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<Eligibility, AppError> {
    let poll = repo.find_poll(poll_id).await?;

    let prior_vote = match (&poll, voter) {
        (Some(_), Some(voter_id)) => repo.find_vote_by_voter(poll_id, voter_id).await?.is_some(),
        _ => false,
    };

    Ok(evaluate(poll.as_ref(), voter, prior_vote, now))
}

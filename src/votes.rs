// src/votes.rs
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewVote, UserId, Vote};
use crate::repository::PollRepository;

/// Persists a single vote. Callers must have obtained `Eligibility::Allowed`
/// for this poll and voter first.
pub async fn record_vote(
    repo: &dyn PollRepository,
    poll_id: Uuid,
    option_id: Uuid,
    voter: Option<UserId>,
) -> Result<Vote, AppError> {
    let new_vote = NewVote {
        poll_id,
        option_id,
        voter_id: voter,
    };

    match repo.insert_vote(&new_vote).await {
        Ok(vote) => {
            info!(%poll_id, %option_id, anonymous = voter.is_none(), "Vote recorded");
            Ok(vote)
        }
        Err(err @ AppError::Conflict(_)) => {
            warn!(%poll_id, "Duplicate vote rejected by storage");
            Err(err)
        }
        Err(err) => {
            error!(%poll_id, "Error submitting vote: {err:?}");
            Err(err.context("failed to submit vote"))
        }
    }
}

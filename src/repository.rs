// src/repository.rs
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewVote, Poll, PollFields, PollOption, UserId, Vote};

/// Storage for polls, their options and votes.
///
/// Implementations must cascade `delete_poll` to the poll's options and votes,
/// and `delete_options` to the votes cast for those options. At most one vote
/// may exist per poll for a given non-null voter; a second insert fails with
/// [`AppError::Conflict`].
#[async_trait]
pub trait PollRepository: Send + Sync {
    async fn insert_poll(&self, owner_id: UserId, fields: &PollFields) -> Result<Poll, AppError>;

    /// Returns `None` when the poll does not exist.
    async fn update_poll(&self, poll_id: Uuid, fields: &PollFields)
        -> Result<Option<Poll>, AppError>;

    /// Returns whether a poll was removed.
    async fn delete_poll(&self, poll_id: Uuid) -> Result<bool, AppError>;

    async fn find_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, AppError>;

    /// Newest first.
    async fn list_polls_by_owner(&self, owner_id: UserId) -> Result<Vec<Poll>, AppError>;

    /// Inserts every option or none of them, numbering them from zero in input order.
    async fn insert_options(
        &self,
        poll_id: Uuid,
        texts: &[String],
    ) -> Result<Vec<PollOption>, AppError>;

    async fn delete_options(&self, poll_id: Uuid) -> Result<u64, AppError>;

    /// Ordered by `order_index`.
    async fn find_options(&self, poll_id: Uuid) -> Result<Vec<PollOption>, AppError>;

    async fn find_votes(&self, poll_id: Uuid) -> Result<Vec<Vote>, AppError>;

    async fn find_vote_by_voter(
        &self,
        poll_id: Uuid,
        voter_id: UserId,
    ) -> Result<Option<Vote>, AppError>;

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote, AppError>;

    async fn count_votes(&self, poll_id: Uuid) -> Result<i64, AppError>;
}

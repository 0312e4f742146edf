// src/memory.rs
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewVote, Poll, PollFields, PollOption, UserId, Vote};
use crate::repository::PollRepository;

#[derive(Default)]
struct Tables {
    polls: Vec<Poll>,
    options: Vec<PollOption>,
    votes: Vec<Vote>,
}

/// Process-local [`PollRepository`]. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryPollRepository {
    tables: Mutex<Tables>,
    #[cfg(test)]
    fail_option_inserts: AtomicBool,
}

impl MemoryPollRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `insert_options` call fail with a storage error.
    #[cfg(test)]
    pub fn fail_option_inserts(&self, fail: bool) {
        self.fail_option_inserts.store(fail, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn option_inserts_fail(&self) -> bool {
        self.fail_option_inserts.load(Ordering::Relaxed)
    }

    #[cfg(not(test))]
    fn option_inserts_fail(&self) -> bool {
        false
    }
}

fn foreign_key_violation(what: &str) -> AppError {
    sqlx::Error::Protocol(format!("foreign key violation: {what} does not exist")).into()
}

#[async_trait]
impl PollRepository for MemoryPollRepository {
    async fn insert_poll(&self, owner_id: UserId, fields: &PollFields) -> Result<Poll, AppError> {
        let now = Utc::now();
        let poll = Poll {
            id: Uuid::new_v4(),
            title: fields.title.clone(),
            description: fields.description.clone(),
            question: fields.question.clone(),
            allow_multiple: fields.allow_multiple,
            require_auth: fields.require_auth,
            end_date: fields.end_date,
            owner_id,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.polls.push(poll.clone());
        Ok(poll)
    }

    async fn update_poll(
        &self,
        poll_id: Uuid,
        fields: &PollFields,
    ) -> Result<Option<Poll>, AppError> {
        let mut tables = self.tables.lock().await;
        let Some(poll) = tables.polls.iter_mut().find(|p| p.id == poll_id) else {
            return Ok(None);
        };
        poll.title = fields.title.clone();
        poll.description = fields.description.clone();
        poll.question = fields.question.clone();
        poll.allow_multiple = fields.allow_multiple;
        poll.require_auth = fields.require_auth;
        poll.end_date = fields.end_date;
        poll.updated_at = Utc::now();
        Ok(Some(poll.clone()))
    }

    async fn delete_poll(&self, poll_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let before = tables.polls.len();
        tables.polls.retain(|p| p.id != poll_id);
        if tables.polls.len() == before {
            return Ok(false);
        }
        tables.options.retain(|o| o.poll_id != poll_id);
        tables.votes.retain(|v| v.poll_id != poll_id);
        Ok(true)
    }

    async fn find_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.polls.iter().find(|p| p.id == poll_id).cloned())
    }

    async fn list_polls_by_owner(&self, owner_id: UserId) -> Result<Vec<Poll>, AppError> {
        let tables = self.tables.lock().await;
        // Later inserts come first when timestamps tie.
        let mut polls: Vec<Poll> = tables
            .polls
            .iter()
            .rev()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn insert_options(
        &self,
        poll_id: Uuid,
        texts: &[String],
    ) -> Result<Vec<PollOption>, AppError> {
        if self.option_inserts_fail() {
            return Err(sqlx::Error::Protocol("option insert rejected".to_string()).into());
        }

        let mut tables = self.tables.lock().await;
        if !tables.polls.iter().any(|p| p.id == poll_id) {
            return Err(foreign_key_violation("poll"));
        }
        if tables.options.iter().any(|o| o.poll_id == poll_id) {
            return Err(AppError::Conflict(
                "poll already has options at these positions".to_string(),
            ));
        }

        let now = Utc::now();
        let options: Vec<PollOption> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| PollOption {
                id: Uuid::new_v4(),
                poll_id,
                text: text.clone(),
                order_index: index as i32,
                created_at: now,
            })
            .collect();
        tables.options.extend(options.iter().cloned());
        Ok(options)
    }

    async fn delete_options(&self, poll_id: Uuid) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().await;
        let removed: Vec<Uuid> = tables
            .options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .map(|o| o.id)
            .collect();
        tables.options.retain(|o| o.poll_id != poll_id);
        tables.votes.retain(|v| !removed.contains(&v.option_id));
        Ok(removed.len() as u64)
    }

    async fn find_options(&self, poll_id: Uuid) -> Result<Vec<PollOption>, AppError> {
        let tables = self.tables.lock().await;
        let mut options: Vec<PollOption> = tables
            .options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.order_index);
        Ok(options)
    }

    async fn find_votes(&self, poll_id: Uuid) -> Result<Vec<Vote>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn find_vote_by_voter(
        &self,
        poll_id: Uuid,
        voter_id: UserId,
    ) -> Result<Option<Vote>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .iter()
            .find(|v| v.poll_id == poll_id && v.voter_id == Some(voter_id))
            .cloned())
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote, AppError> {
        let mut tables = self.tables.lock().await;
        if !tables.polls.iter().any(|p| p.id == vote.poll_id) {
            return Err(foreign_key_violation("poll"));
        }
        if !tables.options.iter().any(|o| o.id == vote.option_id) {
            return Err(foreign_key_violation("option"));
        }
        if let Some(voter_id) = vote.voter_id {
            let duplicate = tables
                .votes
                .iter()
                .any(|v| v.poll_id == vote.poll_id && v.voter_id == Some(voter_id));
            if duplicate {
                return Err(AppError::Conflict("already voted".to_string()));
            }
        }

        let row = Vote {
            id: Uuid::new_v4(),
            poll_id: vote.poll_id,
            option_id: vote.option_id,
            voter_id: vote.voter_id,
            voter_ip: None,
            voter_user_agent: None,
            created_at: Utc::now(),
        };
        tables.votes.push(row.clone());
        Ok(row)
    }

    async fn count_votes(&self, poll_id: Uuid) -> Result<i64, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.votes.iter().filter(|v| v.poll_id == poll_id).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> PollFields {
        PollFields {
            title: "Lunch".to_string(),
            description: None,
            question: "Where?".to_string(),
            allow_multiple: false,
            require_auth: false,
            end_date: None,
        }
    }

    async fn seeded() -> (MemoryPollRepository, Poll, Vec<PollOption>) {
        let repo = MemoryPollRepository::new();
        let poll = repo
            .insert_poll(Uuid::new_v4(), &fields())
            .await
            .expect("insert poll");
        let options = repo
            .insert_options(poll.id, &["Tacos".to_string(), "Ramen".to_string()])
            .await
            .expect("insert options");
        (repo, poll, options)
    }

    #[tokio::test]
    async fn option_insert_failures_can_be_switched_off() {
        let repo = MemoryPollRepository::new();
        let poll = repo
            .insert_poll(Uuid::new_v4(), &fields())
            .await
            .expect("insert poll");
        let texts = ["Pho".to_string()];

        repo.fail_option_inserts(true);
        assert!(matches!(
            repo.insert_options(poll.id, &texts).await,
            Err(AppError::Storage { .. })
        ));

        repo.fail_option_inserts(false);
        let added = repo.insert_options(poll.id, &texts).await.expect("insert");
        assert_eq!(added.len(), 1);
    }

    #[tokio::test]
    async fn deleting_options_removes_their_votes() {
        let (repo, poll, options) = seeded().await;
        repo.insert_vote(&NewVote {
            poll_id: poll.id,
            option_id: options[0].id,
            voter_id: None,
        })
        .await
        .expect("vote");

        assert_eq!(repo.delete_options(poll.id).await.expect("delete"), 2);
        assert_eq!(repo.count_votes(poll.id).await.expect("count"), 0);
        assert!(repo.find_options(poll.id).await.expect("options").is_empty());
    }

    #[tokio::test]
    async fn one_vote_per_identified_voter() {
        let (repo, poll, options) = seeded().await;
        let voter = Some(Uuid::new_v4());
        let vote = NewVote {
            poll_id: poll.id,
            option_id: options[1].id,
            voter_id: voter,
        };
        repo.insert_vote(&vote).await.expect("first vote");
        let err = repo.insert_vote(&vote).await.expect_err("duplicate");
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn vote_for_unknown_option_is_a_storage_error() {
        let (repo, poll, _) = seeded().await;
        let err = repo
            .insert_vote(&NewVote {
                poll_id: poll.id,
                option_id: Uuid::new_v4(),
                voter_id: None,
            })
            .await
            .expect_err("dangling option");
        assert!(matches!(err, AppError::Storage { .. }));
    }

    #[tokio::test]
    async fn update_of_missing_poll_returns_none() {
        let repo = MemoryPollRepository::new();
        let updated = repo
            .update_poll(Uuid::new_v4(), &fields())
            .await
            .expect("update");
        assert!(updated.is_none());
    }
}

// src/db.rs
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::models::{NewVote, Poll, PollFields, PollOption, UserId, Vote};
use crate::repository::PollRepository;

const UNIQUE_VIOLATION: &str = "23505";

pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool<Postgres>, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// The partial unique index on `votes` turns a concurrent repeat vote into 23505.
fn vote_insert_error(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict("already voted".to_string())
    } else {
        err.into()
    }
}

/// PostgreSQL-backed [`PollRepository`]. Cascades and vote uniqueness are
/// enforced by the schema in `migrations/`.
#[derive(Clone)]
pub struct PgPollRepository {
    pool: PgPool,
}

impl PgPollRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollRepository for PgPollRepository {
    async fn insert_poll(&self, owner_id: UserId, fields: &PollFields) -> Result<Poll, AppError> {
        let poll = sqlx::query_as::<_, Poll>(
            r#"
            INSERT INTO polls
                (title, description, question, allow_multiple, require_auth, end_date, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.question)
        .bind(fields.allow_multiple)
        .bind(fields.require_auth)
        .bind(fields.end_date)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(poll)
    }

    async fn update_poll(
        &self,
        poll_id: Uuid,
        fields: &PollFields,
    ) -> Result<Option<Poll>, AppError> {
        let poll = sqlx::query_as::<_, Poll>(
            r#"
            UPDATE polls
            SET title = $2, description = $3, question = $4, allow_multiple = $5,
                require_auth = $6, end_date = $7, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(poll_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.question)
        .bind(fields.allow_multiple)
        .bind(fields.require_auth)
        .bind(fields.end_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(poll)
    }

    async fn delete_poll(&self, poll_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, AppError> {
        let poll = sqlx::query_as::<_, Poll>("SELECT * FROM polls WHERE id = $1")
            .bind(poll_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(poll)
    }

    async fn list_polls_by_owner(&self, owner_id: UserId) -> Result<Vec<Poll>, AppError> {
        let polls = sqlx::query_as::<_, Poll>(
            "SELECT * FROM polls WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(polls)
    }

    async fn insert_options(
        &self,
        poll_id: Uuid,
        texts: &[String],
    ) -> Result<Vec<PollOption>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut options = Vec::with_capacity(texts.len());

        for (index, text) in texts.iter().enumerate() {
            let option = sqlx::query_as::<_, PollOption>(
                r#"
                INSERT INTO poll_options (poll_id, text, order_index)
                VALUES ($1, $2, $3)
                RETURNING *
                "#,
            )
            .bind(poll_id)
            .bind(text)
            .bind(index as i32)
            .fetch_one(&mut *tx)
            .await?;
            options.push(option);
        }

        tx.commit().await?;
        debug!(%poll_id, count = options.len(), "Inserted poll options");

        Ok(options)
    }

    async fn delete_options(&self, poll_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM poll_options WHERE poll_id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_options(&self, poll_id: Uuid) -> Result<Vec<PollOption>, AppError> {
        let options = sqlx::query_as::<_, PollOption>(
            "SELECT * FROM poll_options WHERE poll_id = $1 ORDER BY order_index ASC",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    async fn find_votes(&self, poll_id: Uuid) -> Result<Vec<Vote>, AppError> {
        let votes = sqlx::query_as::<_, Vote>(
            "SELECT * FROM votes WHERE poll_id = $1 ORDER BY created_at ASC",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(votes)
    }

    async fn find_vote_by_voter(
        &self,
        poll_id: Uuid,
        voter_id: UserId,
    ) -> Result<Option<Vote>, AppError> {
        let vote = sqlx::query_as::<_, Vote>(
            "SELECT * FROM votes WHERE poll_id = $1 AND voter_id = $2 LIMIT 1",
        )
        .bind(poll_id)
        .bind(voter_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vote)
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<Vote, AppError> {
        // voter_ip and voter_user_agent are not collected yet
        sqlx::query_as::<_, Vote>(
            r#"
            INSERT INTO votes (poll_id, option_id, voter_id, voter_ip, voter_user_agent)
            VALUES ($1, $2, $3, NULL, NULL)
            RETURNING *
            "#,
        )
        .bind(vote.poll_id)
        .bind(vote.option_id)
        .bind(vote.voter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(vote_insert_error)
    }

    async fn count_votes(&self, poll_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM votes WHERE poll_id = $1")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity handed to us by the upstream auth provider.
pub type UserId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub question: String,
    pub allow_multiple: bool,
    pub require_auth: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    /// A poll closes once the current time reaches its end date.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        matches!(self.end_date, Some(end) if end <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub text: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vote {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_id: Option<UserId>,
    pub voter_ip: Option<String>,
    pub voter_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated, trimmed poll columns, shared by create and edit.
#[derive(Debug, Clone, PartialEq)]
pub struct PollFields {
    pub title: String,
    pub description: Option<String>,
    pub question: String,
    pub allow_multiple: bool,
    pub require_auth: bool,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVote {
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub voter_id: Option<UserId>,
}

/// Body of a create or edit request.
#[derive(Debug, Clone, Deserialize)]
pub struct PollRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub option_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollWithOptions {
    #[serde(flatten)]
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

/// One row of the owner's poll list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollSummary {
    #[serde(flatten)]
    pub poll: Poll,
    pub option_count: usize,
    pub total_votes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareLinks {
    pub url: String,
    pub twitter: String,
}

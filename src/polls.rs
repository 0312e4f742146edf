// src/polls.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::eligibility::{self, Eligibility};
use crate::error::AppError;
use crate::models::{
    Poll, PollFields, PollRequest, PollSummary, PollWithOptions, ShareLinks, UserId, Vote,
};
use crate::repository::PollRepository;
use crate::tally::{self, PollResults};
use crate::votes;

pub const MIN_OPTIONS: usize = 2;
const SHARE_TEXT: &str = "Check out this poll!";
const TWITTER_INTENT_URL: &str = "https://twitter.com/intent/tweet";

/// A create/edit request after trimming and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PollDraft {
    pub fields: PollFields,
    pub options: Vec<String>,
}

impl PollDraft {
    /// Trims every field and drops blank options. `created_at` is set when
    /// validating a new poll, whose end date must lie in the future.
    pub fn parse(
        request: PollRequest,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AppError> {
        let title = request.title.trim().to_string();
        let question = request.question.trim().to_string();
        if title.is_empty() || question.is_empty() {
            return Err(AppError::Validation(
                "title and question are required".to_string(),
            ));
        }

        let options: Vec<String> = request
            .options
            .iter()
            .map(|option| option.trim())
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect();
        if options.len() < MIN_OPTIONS {
            return Err(AppError::Validation(format!(
                "at least {MIN_OPTIONS} non-empty options are required"
            )));
        }

        if let (Some(now), Some(end_date)) = (created_at, request.end_date) {
            if end_date <= now {
                return Err(AppError::Validation(
                    "end date must be in the future".to_string(),
                ));
            }
        }

        let description = request
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            fields: PollFields {
                title,
                description,
                question,
                allow_multiple: request.allow_multiple,
                require_auth: request.require_auth,
                end_date: request.end_date,
            },
            options,
        })
    }
}

pub struct PollService {
    repo: Arc<dyn PollRepository>,
    public_base_url: String,
}

impl PollService {
    pub fn new(repo: Arc<dyn PollRepository>, public_base_url: impl Into<String>) -> Self {
        Self {
            repo,
            public_base_url: public_base_url.into(),
        }
    }

    async fn require_poll(&self, poll_id: Uuid) -> Result<Poll, AppError> {
        self.repo
            .find_poll(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound("poll not found".to_string()))
    }

    async fn require_owned_poll(&self, caller: UserId, poll_id: Uuid) -> Result<Poll, AppError> {
        let poll = self.require_poll(poll_id).await?;
        if poll.owner_id != caller {
            warn!(%poll_id, %caller, "Rejected change by non-owner");
            return Err(AppError::Unauthorized(
                "not the owner of this poll".to_string(),
            ));
        }
        Ok(poll)
    }

    /// Persists the poll, then its options. If the options cannot be stored
    /// the poll is deleted again so no option-less poll is left behind.
    pub async fn create_poll(
        &self,
        owner: UserId,
        request: PollRequest,
    ) -> Result<PollWithOptions, AppError> {
        let draft = PollDraft::parse(request, Some(Utc::now()))?;

        let poll = self
            .repo
            .insert_poll(owner, &draft.fields)
            .await
            .map_err(|err| err.context("failed to create poll"))?;

        match self.repo.insert_options(poll.id, &draft.options).await {
            Ok(options) => {
                info!(poll_id = %poll.id, options = options.len(), "Poll created");
                Ok(PollWithOptions { poll, options })
            }
            Err(err) => {
                error!(poll_id = %poll.id, "Error creating poll options: {err:?}");
                if let Err(cleanup) = self.repo.delete_poll(poll.id).await {
                    error!(poll_id = %poll.id, "Failed to remove orphaned poll: {cleanup:?}");
                }
                Err(err.context("failed to create poll options"))
            }
        }
    }

    /// Replaces the poll's fields and its whole option set. Option ids change
    /// and votes cast for the old options are dropped with them.
    pub async fn edit_poll(
        &self,
        caller: UserId,
        poll_id: Uuid,
        request: PollRequest,
    ) -> Result<PollWithOptions, AppError> {
        self.require_owned_poll(caller, poll_id).await?;
        let draft = PollDraft::parse(request, None)?;

        let poll = self
            .repo
            .update_poll(poll_id, &draft.fields)
            .await
            .map_err(|err| err.context("failed to update poll"))?
            .ok_or_else(|| AppError::NotFound("poll not found".to_string()))?;

        self.repo
            .delete_options(poll_id)
            .await
            .map_err(|err| err.context("failed to update poll options"))?;
        let options = self
            .repo
            .insert_options(poll_id, &draft.options)
            .await
            .map_err(|err| {
                error!(%poll_id, "Error updating poll options: {err:?}");
                err.context("failed to update poll options")
            })?;

        info!(%poll_id, options = options.len(), "Poll updated");
        Ok(PollWithOptions { poll, options })
    }

    /// Options and votes go with the poll.
    pub async fn delete_poll(&self, caller: UserId, poll_id: Uuid) -> Result<(), AppError> {
        self.require_owned_poll(caller, poll_id).await?;

        let deleted = self
            .repo
            .delete_poll(poll_id)
            .await
            .map_err(|err| err.context("failed to delete poll"))?;
        if !deleted {
            return Err(AppError::NotFound("poll not found".to_string()));
        }

        info!(%poll_id, "Poll deleted");
        Ok(())
    }

    pub async fn get_poll(&self, poll_id: Uuid) -> Result<PollWithOptions, AppError> {
        let poll = self.require_poll(poll_id).await?;
        let options = self.repo.find_options(poll_id).await?;
        Ok(PollWithOptions { poll, options })
    }

    pub async fn list_my_polls(&self, owner: UserId) -> Result<Vec<PollSummary>, AppError> {
        let polls = self.repo.list_polls_by_owner(owner).await?;
        let mut summaries = Vec::with_capacity(polls.len());

        for poll in polls {
            let option_count = self.repo.find_options(poll.id).await?.len();
            let total_votes = self.repo.count_votes(poll.id).await?;
            summaries.push(PollSummary {
                poll,
                option_count,
                total_votes,
            });
        }

        Ok(summaries)
    }

    pub async fn eligibility(
        &self,
        poll_id: Uuid,
        voter: Option<UserId>,
    ) -> Result<Eligibility, AppError> {
        eligibility::check_eligibility(self.repo.as_ref(), poll_id, voter, Utc::now()).await
    }

    /// Checks eligibility, confirms the option belongs to the poll, then
    /// records the vote.
    pub async fn submit_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        voter: Option<UserId>,
    ) -> Result<Vote, AppError> {
        if let Err(denied) = self.eligibility(poll_id, voter).await?.into_result() {
            warn!(%poll_id, "Vote denied: {denied}");
            return Err(denied);
        }

        let options = self.repo.find_options(poll_id).await?;
        if !options.iter().any(|option| option.id == option_id) {
            return Err(AppError::NotFound("option not found".to_string()));
        }

        votes::record_vote(self.repo.as_ref(), poll_id, option_id, voter).await
    }

    pub async fn results(&self, poll_id: Uuid) -> Result<PollResults, AppError> {
        let poll = self.get_poll(poll_id).await?;
        let votes = self.repo.find_votes(poll_id).await?;
        Ok(tally::summarize(poll, &votes))
    }

    pub async fn share(&self, poll_id: Uuid) -> Result<ShareLinks, AppError> {
        let poll = self.require_poll(poll_id).await?;
        share_links(&self.public_base_url, poll.id)
    }
}

pub fn share_links(public_base_url: &str, poll_id: Uuid) -> Result<ShareLinks, AppError> {
    let url = format!("{public_base_url}/polls/{poll_id}");
    let query = serde_urlencoded::to_string([("url", url.as_str()), ("text", SHARE_TEXT)])
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(ShareLinks {
        twitter: format!("{TWITTER_INTENT_URL}?{query}"),
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::DenialReason;
    use crate::memory::MemoryPollRepository;
    use chrono::Duration;

    fn request(options: &[&str]) -> PollRequest {
        PollRequest {
            title: "Colours".to_string(),
            question: "Favourite colour?".to_string(),
            description: None,
            options: options.iter().map(|o| o.to_string()).collect(),
            allow_multiple: false,
            require_auth: false,
            end_date: None,
        }
    }

    fn service() -> (PollService, Arc<MemoryPollRepository>) {
        let repo = Arc::new(MemoryPollRepository::new());
        let service = PollService::new(repo.clone(), "https://polls.example.com");
        (service, repo)
    }

    #[test]
    fn draft_trims_and_drops_blank_options() {
        let mut req = request(&["  Red ", "", "   ", "Blue"]);
        req.title = "  Colours  ".to_string();
        req.description = Some("   ".to_string());
        let draft = PollDraft::parse(req, None).expect("valid");
        assert_eq!(draft.fields.title, "Colours");
        assert_eq!(draft.fields.description, None);
        assert_eq!(draft.options, ["Red", "Blue"]);
    }

    #[test]
    fn draft_requires_title_and_question() {
        let mut req = request(&["Red", "Blue"]);
        req.question = "   ".to_string();
        assert!(matches!(
            PollDraft::parse(req, None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn new_poll_cannot_end_in_the_past() {
        let now = Utc::now();
        let mut req = request(&["Red", "Blue"]);
        req.end_date = Some(now - Duration::hours(1));
        assert!(PollDraft::parse(req.clone(), Some(now)).is_err());
        // edits may close a poll early
        assert!(PollDraft::parse(req, None).is_ok());
    }

    #[tokio::test]
    async fn single_option_poll_is_rejected_and_not_stored() {
        let (service, repo) = service();
        let owner = Uuid::new_v4();
        let err = service
            .create_poll(owner, request(&["Red", "  "]))
            .await
            .expect_err("one option");
        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo.list_polls_by_owner(owner).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn failed_options_remove_the_poll() {
        let (service, repo) = service();
        let owner = Uuid::new_v4();
        repo.fail_option_inserts(true);

        let err = service
            .create_poll(owner, request(&["Red", "Blue"]))
            .await
            .expect_err("options fail");
        assert_eq!(err.to_string(), "failed to create poll options");
        assert!(repo.list_polls_by_owner(owner).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn anonymous_votes_are_tallied_and_never_deduplicated() {
        let (service, _) = service();
        let created = service
            .create_poll(Uuid::new_v4(), request(&["Red", "Blue"]))
            .await
            .expect("create");
        let poll_id = created.poll.id;
        let red = created.options[0].id;

        service.submit_vote(poll_id, red, None).await.expect("first vote");
        let results = service.results(poll_id).await.expect("results");
        let counts: Vec<(&str, usize)> = results
            .results
            .iter()
            .map(|r| (r.option_text.as_str(), r.vote_count))
            .collect();
        assert_eq!(counts, [("Red", 1), ("Blue", 0)]);
        assert_eq!(results.total_votes, 1);

        assert_eq!(
            service.eligibility(poll_id, None).await.expect("check"),
            Eligibility::Allowed
        );
        service.submit_vote(poll_id, red, None).await.expect("second vote");
        let results = service.results(poll_id).await.expect("results");
        assert_eq!(results.results[0].vote_count, 2);
        assert_eq!(results.results[0].percentage, 100.0);
    }

    #[tokio::test]
    async fn identified_voter_votes_once() {
        let (service, repo) = service();
        let created = service
            .create_poll(Uuid::new_v4(), request(&["Red", "Blue"]))
            .await
            .expect("create");
        let voter = Some(Uuid::new_v4());

        service
            .submit_vote(created.poll.id, created.options[0].id, voter)
            .await
            .expect("first vote");
        let err = service
            .submit_vote(created.poll.id, created.options[1].id, voter)
            .await
            .expect_err("second vote");
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(repo.count_votes(created.poll.id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn auth_required_poll_rejects_anonymous_votes() {
        let (service, _) = service();
        let mut req = request(&["Red", "Blue"]);
        req.require_auth = true;
        let created = service.create_poll(Uuid::new_v4(), req).await.expect("create");

        let err = service
            .submit_vote(created.poll.id, created.options[0].id, None)
            .await
            .expect_err("anonymous");
        assert!(matches!(err, AppError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn ended_poll_rejects_votes() {
        let (service, repo) = service();
        let owner = Uuid::new_v4();
        let fields = PollFields {
            title: "Old".to_string(),
            description: None,
            question: "Too late?".to_string(),
            allow_multiple: false,
            require_auth: false,
            end_date: Some(Utc::now() - Duration::days(1)),
        };
        let poll = repo.insert_poll(owner, &fields).await.expect("poll");
        let options = repo
            .insert_options(poll.id, &["Yes".to_string(), "No".to_string()])
            .await
            .expect("options");

        for voter in [None, Some(Uuid::new_v4()), Some(owner)] {
            assert_eq!(
                service.eligibility(poll.id, voter).await.expect("check"),
                Eligibility::Denied(DenialReason::PollEnded)
            );
            let err = service
                .submit_vote(poll.id, options[0].id, voter)
                .await
                .expect_err("ended");
            assert!(matches!(err, AppError::PollEnded));
        }
    }

    #[tokio::test]
    async fn vote_for_option_of_another_poll_is_not_found() {
        let (service, _) = service();
        let first = service
            .create_poll(Uuid::new_v4(), request(&["A", "B"]))
            .await
            .expect("first");
        let second = service
            .create_poll(Uuid::new_v4(), request(&["C", "D"]))
            .await
            .expect("second");

        let err = service
            .submit_vote(first.poll.id, second.options[0].id, None)
            .await
            .expect_err("foreign option");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_replaces_every_option() {
        let (service, _) = service();
        let owner = Uuid::new_v4();
        let created = service
            .create_poll(owner, request(&["A", "B"]))
            .await
            .expect("create");
        let old_ids: Vec<Uuid> = created.options.iter().map(|o| o.id).collect();

        service
            .edit_poll(owner, created.poll.id, request(&["A", "B", "C"]))
            .await
            .expect("edit");

        let fetched = service.get_poll(created.poll.id).await.expect("fetch");
        let indexes: Vec<i32> = fetched.options.iter().map(|o| o.order_index).collect();
        assert_eq!(indexes, [0, 1, 2]);
        assert!(fetched.options.iter().all(|o| !old_ids.contains(&o.id)));
        let texts: Vec<&str> = fetched.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn only_the_owner_may_edit_or_delete() {
        let (service, _) = service();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let created = service
            .create_poll(owner, request(&["A", "B"]))
            .await
            .expect("create");

        let err = service
            .edit_poll(intruder, created.poll.id, request(&["X", "Y"]))
            .await
            .expect_err("edit");
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = service
            .delete_poll(intruder, created.poll.id)
            .await
            .expect_err("delete");
        assert!(matches!(err, AppError::Unauthorized(_)));

        let untouched = service.get_poll(created.poll.id).await.expect("fetch");
        assert_eq!(untouched.options, created.options);
    }

    #[tokio::test]
    async fn editing_a_missing_poll_is_not_found() {
        let (service, _) = service();
        let err = service
            .edit_poll(Uuid::new_v4(), Uuid::new_v4(), request(&["A", "B"]))
            .await
            .expect_err("missing");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_options_and_votes() {
        let (service, repo) = service();
        let owner = Uuid::new_v4();
        let created = service
            .create_poll(owner, request(&["A", "B", "C"]))
            .await
            .expect("create");
        let poll_id = created.poll.id;
        for i in 0..5 {
            let option = &created.options[i % created.options.len()];
            service
                .submit_vote(poll_id, option.id, Some(Uuid::new_v4()))
                .await
                .expect("vote");
        }
        assert_eq!(repo.count_votes(poll_id).await.expect("count"), 5);

        service.delete_poll(owner, poll_id).await.expect("delete");

        assert!(repo.find_poll(poll_id).await.expect("find").is_none());
        assert!(repo.find_options(poll_id).await.expect("options").is_empty());
        assert!(repo.find_votes(poll_id).await.expect("votes").is_empty());
    }

    #[tokio::test]
    async fn lists_owner_polls_with_counts() {
        let (service, _) = service();
        let owner = Uuid::new_v4();
        let created = service
            .create_poll(owner, request(&["A", "B", "C"]))
            .await
            .expect("create");
        service
            .create_poll(Uuid::new_v4(), request(&["X", "Y"]))
            .await
            .expect("someone else's poll");
        service
            .submit_vote(created.poll.id, created.options[2].id, None)
            .await
            .expect("vote");

        let mine = service.list_my_polls(owner).await.expect("list");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].option_count, 3);
        assert_eq!(mine[0].total_votes, 1);
    }

    #[test]
    fn share_links_encode_the_poll_url() {
        let poll_id = Uuid::nil();
        let links = share_links("https://polls.example.com", poll_id).expect("links");
        assert_eq!(
            links.url,
            "https://polls.example.com/polls/00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            links.twitter,
            "https://twitter.com/intent/tweet?url=https%3A%2F%2Fpolls.example.com%2Fpolls%2F00000000-0000-0000-0000-000000000000&text=Check+out+this+poll%21"
        );
    }
}

// src/tally.rs
use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{PollOption, PollWithOptions, Vote};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionTally {
    pub option_id: Uuid,
    pub text: String,
    pub count: usize,
}

/// Display row of the results chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResult {
    pub option_id: Uuid,
    pub option_text: String,
    pub vote_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResults {
    #[serde(flatten)]
    pub poll: PollWithOptions,
    pub total_votes: usize,
    pub results: Vec<PollResult>,
}

/// Counts votes per option, in `order_index` order. Options without votes are
/// kept with a zero count.
pub fn aggregate(options: &[PollOption], votes: &[Vote]) -> Vec<OptionTally> {
    let mut counts: HashMap<Uuid, usize> = HashMap::with_capacity(options.len());
    for vote in votes {
        *counts.entry(vote.option_id).or_default() += 1;
    }

    let mut ordered: Vec<&PollOption> = options.iter().collect();
    ordered.sort_by_key(|option| option.order_index);

    ordered
        .into_iter()
        .map(|option| OptionTally {
            option_id: option.id,
            text: option.text.clone(),
            count: counts.get(&option.id).copied().unwrap_or(0),
        })
        .collect()
}

/// Percentage of `total`, rounded to one decimal place.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 * 1000.0 / total as f64).round() / 10.0
}

pub fn summarize(poll: PollWithOptions, votes: &[Vote]) -> PollResults {
    let total_votes = votes.len();
    let results = aggregate(&poll.options, votes)
        .into_iter()
        .map(|tally| PollResult {
            option_id: tally.option_id,
            option_text: tally.text,
            vote_count: tally.count,
            percentage: percentage(tally.count, total_votes),
        })
        .collect();

    PollResults {
        poll,
        total_votes,
        results,
    }
}

pub mod ballot;
pub mod borda;
pub mod plurality;
pub mod visibility;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::VoteData;
use crate::models::{Poll, PollStatus, VoteType};

// Generic structure for poll results
#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll_id: String,
    pub vote_type: VoteType,
    pub method: &'static str,
    pub status: PollStatus,
    pub total_votes: i64,
    pub total_voters: i64,
    /// IDs of every option sharing the top score. Empty without votes.
    pub winners: Vec<String>,
    pub summary: String,
    pub options: Vec<VoteCount>,
    pub computed_at: DateTime<Utc>,
}

// Per-option tally
#[derive(Debug, Clone, Serialize)]
pub struct VoteCount {
    pub option_id: String,
    pub option_text: String,
    pub position: i64,
    /// Ballots that picked (or ranked) this option.
    pub votes: i64,
    /// Ballots ranking this option first. Ranking polls only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_place: Option<i64>,
    /// Plurality count, or Borda points for ranking polls.
    pub score: i64,
    pub percentage: f64,
    pub rank: usize,
}

pub fn calculate_results(poll: &Poll, data: &VoteData, now: DateTime<Utc>) -> PollResults {
    let (method, total_votes, mut counts) = match poll.vote_type {
        VoteType::Single | VoteType::Multiple => {
            let (total, counts) = plurality::tally(poll, &data.selections);
            ("plurality", total, counts)
        }
        VoteType::Ranking => {
            let ballots = borda::normalize(&data.rankings, &data.legacy_rankings);
            let (total, counts) = borda::tally(poll, &ballots);
            ("borda", total, counts)
        }
    };

    sort_and_rank(&mut counts);

    let top = counts.first().map(|c| c.score).unwrap_or(0);
    let winners = if top > 0 {
        counts
            .iter()
            .filter(|c| c.score == top)
            .map(|c| c.option_id.clone())
            .collect()
    } else {
        Vec::new()
    };

    let summary = build_summary(poll, &counts, total_votes, data.total_voters);

    PollResults {
        poll_id: poll.id.clone(),
        vote_type: poll.vote_type,
        method,
        status: poll.status,
        total_votes,
        total_voters: data.total_voters,
        winners,
        summary,
        options: counts,
        computed_at: now,
    }
}

/// Highest score first, then most first places, then display order.
/// Equal scores share a rank.
fn sort_and_rank(counts: &mut [VoteCount]) {
    counts.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.first_place.unwrap_or(0).cmp(&a.first_place.unwrap_or(0)))
            .then(a.position.cmp(&b.position))
    });

    let mut previous: Option<i64> = None;
    let mut rank = 0;
    for (i, count) in counts.iter_mut().enumerate() {
        if previous != Some(count.score) {
            rank = i + 1;
            previous = Some(count.score);
        }
        count.rank = rank;
    }
}

/// Percentage rounded to one decimal; zero when the denominator is.
pub(crate) fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / whole as f64).round() / 10.0
}

fn build_summary(poll: &Poll, counts: &[VoteCount], total_votes: i64, total_voters: i64) -> String {
    if total_votes == 0 {
        return "No votes were cast in this poll.".to_string();
    }

    let unit = match poll.vote_type {
        VoteType::Ranking => "points",
        _ => "votes",
    };
    let mut summary = String::new();
    for count in counts {
        summary.push_str(&format!(
            "{}. {}: {} {} ({:.1}%)\n",
            count.rank, count.option_text, count.score, unit, count.percentage
        ));
    }
    summary.push_str(&format!("\n{} ballots from {} voters.", total_votes, total_voters));
    summary
}

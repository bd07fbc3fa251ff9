use std::collections::{HashMap, HashSet};

use crate::db::Selection;
use crate::models::Poll;
use crate::voting::{percentage, VoteCount};

/// Count single and multiple-choice ballots. Each selection is one vote for
/// its option; percentages are relative to the number of ballots, so on a
/// multiple-choice poll they may add up to more than 100.
pub fn tally(poll: &Poll, selections: &[Selection]) -> (i64, Vec<VoteCount>) {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    let mut ballots: HashSet<&str> = HashSet::new();

    for selection in selections {
        // Rows for options removed after voting are ignored.
        if poll.option(&selection.option_id).is_none() {
            continue;
        }
        ballots.insert(selection.vote_id.as_str());
        *counts.entry(selection.option_id.as_str()).or_insert(0) += 1;
    }

    let total = ballots.len() as i64;
    let results = poll
        .options
        .iter()
        .map(|option| {
            let votes = counts.get(option.id.as_str()).copied().unwrap_or(0);
            VoteCount {
                option_id: option.id.clone(),
                option_text: option.text.clone(),
                position: option.position,
                votes,
                first_place: None,
                score: votes,
                percentage: percentage(votes, total),
                rank: 0,
            }
        })
        .collect();

    (total, results)
}

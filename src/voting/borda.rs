//! Borda count over ranking ballots.
//!
//! A ballot's ranking lives in one of two places: `vote_rankings` rows, or
//! ranked `vote_options` rows left by older clients. [`normalize`] folds
//! both into [`RankedBallot`]s so scoring only ever sees one shape.

use std::collections::{BTreeMap, HashMap};

use crate::db::RankRow;
use crate::models::Poll;
use crate::voting::{percentage, VoteCount};

#[derive(Debug, Clone, PartialEq)]
pub struct RankedBallot {
    pub vote_id: String,
    /// (option id, rank), best rank first.
    pub entries: Vec<(String, i64)>,
}

/// Merge both representations. A ballot with any `vote_rankings` rows is
/// read from there only; its legacy rows, if any, are ignored.
pub fn normalize(rankings: &[RankRow], legacy: &[RankRow]) -> Vec<RankedBallot> {
    let mut ballots: BTreeMap<&str, Vec<(String, i64)>> = BTreeMap::new();
    for row in rankings {
        ballots
            .entry(row.vote_id.as_str())
            .or_default()
            .push((row.option_id.clone(), row.rank));
    }

    let mut legacy_ballots: BTreeMap<&str, Vec<(String, i64)>> = BTreeMap::new();
    for row in legacy {
        if ballots.contains_key(row.vote_id.as_str()) {
            continue;
        }
        legacy_ballots
            .entry(row.vote_id.as_str())
            .or_default()
            .push((row.option_id.clone(), row.rank));
    }
    ballots.extend(legacy_ballots);

    ballots
        .into_iter()
        .map(|(vote_id, mut entries)| {
            entries.sort_by_key(|(_, rank)| *rank);
            RankedBallot { vote_id: vote_id.to_string(), entries }
        })
        .collect()
}

/// Points for a rank among `option_count` options: first place earns
/// `option_count`, last earns 1. Out-of-range ranks are clamped.
pub fn points(rank: i64, option_count: usize) -> i64 {
    let n = option_count as i64;
    if n == 0 {
        return 0;
    }
    n - rank.clamp(1, n) + 1
}

pub fn tally(poll: &Poll, ballots: &[RankedBallot]) -> (i64, Vec<VoteCount>) {
    let option_count = poll.options.len();
    let mut scores: HashMap<&str, i64> = HashMap::new();
    let mut appearances: HashMap<&str, i64> = HashMap::new();
    let mut first_places: HashMap<&str, i64> = HashMap::new();
    let mut total = 0;

    for ballot in ballots {
        let mut counted: Vec<&str> = Vec::new();
        // Entries arrive best first, so a repeated option keeps its best rank.
        for (option_id, rank) in &ballot.entries {
            let Some(option) = poll.option(option_id) else {
                continue;
            };
            let id = option.id.as_str();
            if counted.contains(&id) {
                continue;
            }
            *scores.entry(id).or_insert(0) += points(*rank, option_count);
            *appearances.entry(id).or_insert(0) += 1;
            counted.push(id);
        }
        if let Some(first) = counted.first() {
            *first_places.entry(*first).or_insert(0) += 1;
            total += 1;
        }
    }

    let total_points: i64 = scores.values().sum();
    let results = poll
        .options
        .iter()
        .map(|option| {
            let id = option.id.as_str();
            let score = scores.get(id).copied().unwrap_or(0);
            VoteCount {
                option_id: option.id.clone(),
                option_text: option.text.clone(),
                position: option.position,
                votes: appearances.get(id).copied().unwrap_or(0),
                first_place: Some(first_places.get(id).copied().unwrap_or(0)),
                score,
                percentage: percentage(score, total_points),
                rank: 0,
            }
        })
        .collect();

    (total, results)
}

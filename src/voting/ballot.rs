//! Checks a submitted ballot against the poll it is cast on.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Ballot, Poll, PollStatus, ValidBallot, VoteType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    #[error("poll is {0}")]
    NotOpen(PollStatus),

    #[error("voting has not started yet")]
    NotStarted,

    #[error("voting has ended")]
    Ended,

    #[error("this poll takes {expected} ballots, got {got}")]
    WrongType { expected: VoteType, got: VoteType },

    #[error("option '{0}' does not belong to this poll")]
    UnknownOption(String),

    #[error("option '{0}' was selected more than once")]
    DuplicateOption(String),

    #[error("ballot selects no options")]
    Empty,

    #[error("ballot selects more than {max} options")]
    TooManyChoices { max: usize },
}

impl BallotError {
    /// Errors caused by the poll's state rather than by the ballot itself.
    pub fn is_poll_state(&self) -> bool {
        matches!(self, Self::NotOpen(_) | Self::NotStarted | Self::Ended)
    }
}

/// Whether the poll currently accepts ballots.
pub fn check_open(poll: &Poll, now: DateTime<Utc>) -> Result<(), BallotError> {
    if poll.status != PollStatus::Open {
        return Err(BallotError::NotOpen(poll.status));
    }
    if poll.start_date.is_some_and(|start| now < start) {
        return Err(BallotError::NotStarted);
    }
    if poll.end_date.is_some_and(|end| now >= end) {
        return Err(BallotError::Ended);
    }
    Ok(())
}

pub fn validate(poll: &Poll, ballot: Ballot, now: DateTime<Utc>) -> Result<ValidBallot, BallotError> {
    check_open(poll, now)?;

    if ballot.vote_type() != poll.vote_type {
        return Err(BallotError::WrongType {
            expected: poll.vote_type,
            got: ballot.vote_type(),
        });
    }

    match ballot {
        Ballot::Single { option_id } => {
            known_option(poll, &option_id)?;
            Ok(ValidBallot::Single(option_id))
        }
        Ballot::Multiple { option_ids } => {
            let option_ids = distinct_known(poll, option_ids)?;
            let max = poll.effective_max_choices();
            if option_ids.len() > max {
                return Err(BallotError::TooManyChoices { max });
            }
            Ok(ValidBallot::Multiple(option_ids))
        }
        Ballot::Ranking { ranking } => {
            let ranking = distinct_known(poll, ranking)?;
            let ranked = ranking
                .into_iter()
                .enumerate()
                .map(|(i, option_id)| (option_id, i as i64 + 1))
                .collect();
            Ok(ValidBallot::Ranking(ranked))
        }
    }
}

fn known_option(poll: &Poll, option_id: &str) -> Result<(), BallotError> {
    match poll.option(option_id) {
        Some(_) => Ok(()),
        None => Err(BallotError::UnknownOption(option_id.to_string())),
    }
}

fn distinct_known(poll: &Poll, option_ids: Vec<String>) -> Result<Vec<String>, BallotError> {
    if option_ids.is_empty() {
        return Err(BallotError::Empty);
    }
    let mut seen = HashSet::new();
    for option_id in &option_ids {
        known_option(poll, option_id)?;
        if !seen.insert(option_id.as_str()) {
            return Err(BallotError::DuplicateOption(option_id.clone()));
        }
    }
    Ok(option_ids)
}

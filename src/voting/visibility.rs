//! Who may see a poll and its results.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Poll, ResultsVisibility};

/// The party asking for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Admin,
    Voter { has_voted: bool },
    Anonymous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResultsHidden {
    #[error("results are shown after you vote")]
    UntilVoted,

    #[error("results are shown when the poll closes")]
    UntilClosed,

    #[error("results are only available to administrators")]
    AdminOnly,
}

/// Drafts and non-public polls exist only for administrators.
pub fn poll_visible(poll: &Poll, viewer: Viewer) -> bool {
    viewer == Viewer::Admin || poll.is_listed()
}

pub fn check_results(poll: &Poll, viewer: Viewer, now: DateTime<Utc>) -> Result<(), ResultsHidden> {
    if viewer == Viewer::Admin {
        return Ok(());
    }
    match poll.results_visibility {
        ResultsVisibility::Live => Ok(()),
        ResultsVisibility::AfterVote => match viewer {
            Viewer::Voter { has_voted: true } => Ok(()),
            _ => Err(ResultsHidden::UntilVoted),
        },
        ResultsVisibility::AfterClose if poll.has_ended(now) => Ok(()),
        ResultsVisibility::AfterClose => Err(ResultsHidden::UntilClosed),
        ResultsVisibility::AdminOnly => Err(ResultsHidden::AdminOnly),
    }
}

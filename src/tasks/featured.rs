//! Choosing the featured poll shown first on the home page.

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{AuditAction, AuditEntry, PollStatus, ValidationError};

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
pub const MAX_WINDOW_DAYS: u32 = 3650;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("poll '{poll_id}' cannot be featured: {reason}")]
    NotEligible { poll_id: String, reason: &'static str },
}

#[derive(Debug, Clone)]
pub struct FeatureRequest {
    pub window_days: u32,
    /// Feature this poll instead of picking by activity.
    pub poll_id: Option<String>,
    pub dry_run: bool,
}

impl Default for FeatureRequest {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            poll_id: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeaturedPoll {
    pub poll_id: String,
    pub title: String,
    /// Ballots in the window; absent when the poll was chosen by hand.
    pub recent_votes: Option<i64>,
    pub applied: bool,
}

fn window_start(now: DateTime<Utc>, window_days: u32) -> Result<DateTime<Utc>, ValidationError> {
    let out_of_range = || ValidationError::OutOfRange {
        field: "window_days",
        reason: format!("must be between 1 and {}", MAX_WINDOW_DAYS),
    };
    if !(1..=MAX_WINDOW_DAYS).contains(&window_days) {
        return Err(out_of_range());
    }
    now.checked_sub_signed(Duration::days(window_days as i64))
        .ok_or_else(out_of_range)
}

/// Pick (or validate) the featured poll and make it the only featured one.
/// Returns `None` when no public open poll exists.
pub async fn select_featured(
    db: &Database,
    actor: &str,
    request: &FeatureRequest,
    now: DateTime<Utc>,
) -> Result<Option<FeaturedPoll>, FeatureError> {
    let since = window_start(now, request.window_days)?;
    let (poll_id, recent_votes) = match &request.poll_id {
        Some(poll_id) => (poll_id.clone(), None),
        None => match db.most_voted_open_poll(since).await? {
            Some((poll_id, votes)) => (poll_id, Some(votes)),
            None => return Ok(None),
        },
    };

    let poll = db.get_poll(&poll_id).await?;
    if !poll.is_public {
        return Err(FeatureError::NotEligible { poll_id, reason: "poll is not public" });
    }
    if poll.status != PollStatus::Open {
        return Err(FeatureError::NotEligible { poll_id, reason: "poll is not open" });
    }

    if !request.dry_run {
        db.set_featured(&poll.id).await?;
        db.record_audit(
            &AuditEntry::for_poll(actor, AuditAction::FeaturePoll, &poll.id).with_details(json!({
                "window_days": request.window_days,
                "recent_votes": recent_votes,
                "manual": request.poll_id.is_some(),
            })),
        )
        .await?;
        info!("Featured poll {} ({})", poll.id, poll.title);
    }

    Ok(Some(FeaturedPoll {
        poll_id: poll.id,
        title: poll.title,
        recent_votes,
        applied: !request.dry_run,
    }))
}

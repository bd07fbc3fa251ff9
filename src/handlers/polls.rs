//! Public poll endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use super::extract::{ApiQuery, MaybeVoter};
use super::{ApiError, ApiResult, AppState};
use crate::db::{PollFilter, PollListing};
use crate::models::{Poll, PollStatus};
use crate::voting::visibility::{self, Viewer};
use crate::voting::{self as tally, PollResults};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<PollStatus>,
    pub featured: Option<bool>,
}

/// Load a poll the way the public sees it: hidden polls do not exist.
pub(super) async fn public_poll(state: &AppState, poll_id: &str) -> ApiResult<Poll> {
    let poll = state.db.get_poll(poll_id).await?;
    if !visibility::poll_visible(&poll, Viewer::Anonymous) {
        return Err(ApiError::not_found("poll", poll_id));
    }
    Ok(poll)
}

/// GET /api/polls
async fn list_polls(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Vec<PollListing>>> {
    let filter = PollFilter {
        include_hidden: false,
        status: params.status,
        featured: params.featured,
    };
    Ok(Json(state.db.list_polls(&filter).await?))
}

/// GET /api/polls/{id}
async fn get_poll(State(state): State<Arc<AppState>>, Path(poll_id): Path<String>) -> ApiResult<Json<Poll>> {
    Ok(Json(public_poll(&state, &poll_id).await?))
}

/// GET /api/polls/{id}/results
async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
    MaybeVoter(voter): MaybeVoter,
) -> ApiResult<Json<PollResults>> {
    let poll = public_poll(&state, &poll_id).await?;
    let viewer = match voter {
        Some(user_id) => Viewer::Voter {
            has_voted: state.db.count_user_votes(&poll.id, &user_id).await? > 0,
        },
        None => Viewer::Anonymous,
    };

    let now = Utc::now();
    visibility::check_results(&poll, viewer, now)?;

    let data = state.db.load_vote_data(&poll.id).await?;
    Ok(Json(tally::calculate_results(&poll, &data, now)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/polls", get(list_polls))
        .route("/api/polls/{id}", get(get_poll))
        .route("/api/polls/{id}/results", get(get_results))
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use log::{info, warn};

use super::extract::{ApiJson, Voter};
use super::polls::public_poll;
use super::{ApiResult, AppState};
use crate::models::{Ballot, VoteRecord};
use crate::voting::ballot;

/// POST /api/polls/{id}/vote
async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
    Voter(user_id): Voter,
    ApiJson(submitted): ApiJson<Ballot>,
) -> ApiResult<(StatusCode, Json<VoteRecord>)> {
    let poll = public_poll(&state, &poll_id).await?;
    let now = Utc::now();

    let valid = ballot::validate(&poll, submitted, now).inspect_err(|e| {
        warn!("Rejected ballot from {} on poll {}: {}", user_id, poll.id, e);
    })?;

    let record = state
        .db
        .insert_vote(&poll, &user_id, &valid, now)
        .await
        .inspect_err(|e| warn!("Vote by {} on poll {} not stored: {}", user_id, poll.id, e))?;

    info!("Recorded vote {} on poll {}", record.id, poll.id);
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/polls/{id}/my-votes
async fn my_votes(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
    Voter(user_id): Voter,
) -> ApiResult<Json<Vec<VoteRecord>>> {
    let poll = public_poll(&state, &poll_id).await?;
    Ok(Json(state.db.get_user_votes(&poll.id, &user_id).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/polls/{id}/vote", post(cast_vote))
        .route("/api/polls/{id}/my-votes", get(my_votes))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    async fn vote(app: &TestApp, poll_id: &str, user: Option<&str>, ballot: Value) -> (StatusCode, Value) {
        app.post_json(&format!("/api/polls/{}/vote", poll_id), user, ballot).await
    }

    #[tokio::test]
    async fn one_vote_per_user_without_allow_multiple() {
        let app = TestApp::new().await;
        let poll = app
            .create_poll(json!({"title": "Mascot", "vote_type": "single", "options": ["Owl", "Fox"]}))
            .await;
        let id = poll["id"].as_str().unwrap();
        let options = option_ids(&poll);

        let (status, record) = vote(&app, id, Some("ana"), json!({"option_id": options[0]})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(record["option_ids"], json!([options[0]]));

        let (status, body) = vote(&app, id, Some("ana"), json!({"option_id": options[1]})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_voted");

        let (status, mine) = app.get(&format!("/api/polls/{}/my-votes", id), Some("ana")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn voting_requires_identity() {
        let app = TestApp::new().await;
        let poll = app
            .create_poll(json!({"title": "Mascot", "vote_type": "single", "options": ["Owl", "Fox"]}))
            .await;
        let options = option_ids(&poll);

        let (status, body) = vote(&app, poll["id"].as_str().unwrap(), None, json!({"option_id": options[0]})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn wrong_ballot_shape_is_rejected() {
        let app = TestApp::new().await;
        let poll = app
            .create_poll(json!({"title": "Order", "vote_type": "ranking", "options": ["A", "B", "C"]}))
            .await;
        let options = option_ids(&poll);

        let (status, body) =
            vote(&app, poll["id"].as_str().unwrap(), Some("ana"), json!({"option_id": options[0]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_ballot");

        let (status, body) = vote(&app, poll["id"].as_str().unwrap(), Some("ana"), json!({"nonsense": 1})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn ranking_votes_feed_borda_results() {
        let app = TestApp::new().await;
        let poll = app
            .create_poll(json!({"title": "Priorities", "vote_type": "ranking", "options": ["Parks", "Roads", "Schools"]}))
            .await;
        let id = poll["id"].as_str().unwrap();
        let o = option_ids(&poll);

        for (user, ranking) in [
            ("u1", json!([o[2], o[0], o[1]])),
            ("u2", json!([o[2], o[1]])),
            ("u3", json!([o[0], o[2], o[1]])),
        ] {
            let (status, _) = vote(&app, id, Some(user), json!({"ranking": ranking})).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, results) = app.get(&format!("/api/polls/{}/results", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results["method"], "borda");
        assert_eq!(results["total_votes"], 3);
        assert_eq!(results["total_voters"], 3);
        // Schools 3+3+2, Parks 2+0+3, Roads 1+2+1.
        let top = &results["options"][0];
        assert_eq!(top["option_text"], "Schools");
        assert_eq!(top["score"], 8);
        assert_eq!(top["first_place"], 2);
        assert_eq!(results["options"][1]["score"], 5);
        assert_eq!(results["options"][2]["score"], 4);
        assert_eq!(results["winners"], json!([o[2]]));
    }

    #[tokio::test]
    async fn paused_poll_rejects_votes() {
        let app = TestApp::new().await;
        let poll = app
            .create_poll(json!({"title": "Mascot", "vote_type": "single", "options": ["Owl", "Fox"], "status": "paused"}))
            .await;
        let options = option_ids(&poll);

        let (status, body) =
            vote(&app, poll["id"].as_str().unwrap(), Some("ana"), json!({"option_id": options[0]})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "poll_not_open");
    }

    #[tokio::test]
    async fn multiple_choice_with_repeat_ballots() {
        let app = TestApp::new().await;
        let poll = app
            .create_poll(json!({
                "title": "Events", "vote_type": "multiple", "options": ["Fair", "Concert", "Market"],
                "allow_multiple": true, "max_votes_per_user": 2, "max_choices": 2
            }))
            .await;
        let id = poll["id"].as_str().unwrap();
        let o = option_ids(&poll);

        let (status, body) = vote(&app, id, Some("ana"), json!({"option_ids": [o[0], o[1], o[2]]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

        for _ in 0..2 {
            let (status, _) = vote(&app, id, Some("ana"), json!({"option_ids": [o[0], o[2]]})).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, _) = vote(&app, id, Some("ana"), json!({"option_ids": [o[1]]})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, results) = app.get(&format!("/api/polls/{}/results", id), None).await;
        assert_eq!(results["total_votes"], 2);
        assert_eq!(results["total_voters"], 1);
        assert_eq!(results["options"][0]["votes"], 2);
        assert_eq!(results["options"][0]["percentage"], 100.0);
    }
}

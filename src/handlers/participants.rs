use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use super::extract::{ApiJson, Voter};
use super::{ApiError, ApiResult, AppState};
use crate::models::{AttributesUpdate, ParticipantAttributes};

/// GET /api/participants/me
async fn get_me(State(state): State<Arc<AppState>>, Voter(user_id): Voter) -> ApiResult<Json<ParticipantAttributes>> {
    state
        .db
        .get_attributes(&user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("participant", &user_id))
}

/// PUT /api/participants/me
async fn put_me(
    State(state): State<Arc<AppState>>,
    Voter(user_id): Voter,
    ApiJson(update): ApiJson<AttributesUpdate>,
) -> ApiResult<Json<ParticipantAttributes>> {
    let attrs = update.into_attributes(&user_id, Utc::now())?;
    state.db.upsert_attributes(&attrs).await?;
    Ok(Json(attrs))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/participants/me", get(get_me).put(put_me))
}

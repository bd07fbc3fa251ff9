//! Administrator endpoints. Every mutation leaves an audit log entry.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::extract::{Admin, ApiJson, ApiQuery};
use super::polls::ListParams;
use super::{ApiError, ApiResult, AppState};
use crate::db::{AuditFilter, PollFilter, PollListing};
use crate::models::validation::required_text;
use crate::models::{
    Attribute, AuditAction, AuditEntry, NewPoll, Poll, PollOption, PollStatus, PollUpdate, ValidationError,
    MAX_OPTION_TEXT_LEN, MIN_OPTIONS,
};
use crate::tasks::featured::{self, FeatureRequest, FeaturedPoll, DEFAULT_WINDOW_DAYS};
use crate::voting::{self as tally, PollResults};

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: PollStatus,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityBody {
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct OptionBody {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DemographicsParams {
    pub attribute: Attribute,
}

#[derive(Debug, Serialize)]
pub struct DemographicGroup {
    pub value: String,
    pub voters: i64,
}

#[derive(Debug, Serialize)]
pub struct Demographics {
    pub poll_id: String,
    pub attribute: Attribute,
    pub groups: Vec<DemographicGroup>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeatureBody {
    pub window_days: Option<u32>,
    pub poll_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct FeatureResponse {
    pub featured: Option<FeaturedPoll>,
}

async fn audit(state: &AppState, entry: AuditEntry) -> ApiResult<()> {
    state.db.record_audit(&entry).await?;
    Ok(())
}

/// Reject option texts already used on the poll, ignoring case.
fn check_unique_option(poll: &Poll, text: &str, except: Option<&str>) -> Result<(), ValidationError> {
    let lowered = text.to_lowercase();
    let clash = poll
        .options
        .iter()
        .any(|o| Some(o.id.as_str()) != except && o.text.to_lowercase() == lowered);
    if clash {
        return Err(ValidationError::Duplicate { field: "option", value: text.to_string() });
    }
    Ok(())
}

/// GET /api/admin/polls
async fn list_polls(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Json<Vec<PollListing>>> {
    let filter = PollFilter {
        include_hidden: true,
        status: params.status,
        featured: params.featured,
    };
    Ok(Json(state.db.list_polls(&filter).await?))
}

/// POST /api/admin/polls
async fn create_poll(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    ApiJson(request): ApiJson<NewPoll>,
) -> ApiResult<(StatusCode, Json<Poll>)> {
    let poll = request.into_poll(&admin.id, Utc::now())?;
    state.db.create_poll(&poll).await?;

    audit(
        &state,
        AuditEntry::for_poll(&admin.id, AuditAction::CreatePoll, &poll.id).with_details(json!({
            "title": poll.title,
            "vote_type": poll.vote_type,
            "options": poll.options.len(),
        })),
    )
    .await?;
    info!("Admin {} created poll {}", admin.id, poll.id);

    Ok((StatusCode::CREATED, Json(poll)))
}

/// GET /api/admin/polls/{id}
async fn get_poll(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    Path(poll_id): Path<String>,
) -> ApiResult<Json<Poll>> {
    Ok(Json(state.db.get_poll(&poll_id).await?))
}

/// PATCH /api/admin/polls/{id}
async fn update_poll(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(poll_id): Path<String>,
    ApiJson(update): ApiJson<PollUpdate>,
) -> ApiResult<Json<Poll>> {
    let mut poll = state.db.get_poll(&poll_id).await?;
    let changed = update.apply_to(&mut poll, Utc::now())?;
    if changed.is_empty() {
        return Ok(Json(poll));
    }

    state.db.update_poll(&poll).await?;
    audit(
        &state,
        AuditEntry::for_poll(&admin.id, AuditAction::UpdatePoll, &poll.id).with_details(json!({ "fields": changed })),
    )
    .await?;
    Ok(Json(poll))
}

/// DELETE /api/admin/polls/{id}
async fn delete_poll(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(poll_id): Path<String>,
) -> ApiResult<StatusCode> {
    let poll = state.db.get_poll(&poll_id).await?;
    let votes = state.db.count_poll_votes(&poll.id).await?;
    state.db.delete_poll(&poll.id).await?;

    if let Some(url) = &poll.image_url {
        if let Err(e) = state.images.remove(url).await {
            warn!("Could not remove image of deleted poll {}: {}", poll.id, e);
        }
    }

    audit(
        &state,
        AuditEntry::for_poll(&admin.id, AuditAction::DeletePoll, &poll.id)
            .with_details(json!({ "title": poll.title, "votes": votes })),
    )
    .await?;
    info!("Admin {} deleted poll {}", admin.id, poll.id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/polls/{id}/status
async fn set_status(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(poll_id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<Json<Poll>> {
    let mut poll = state.db.get_poll(&poll_id).await?;
    let now = Utc::now();
    if body.status == PollStatus::Open && poll.end_date.is_some_and(|end| end <= now) {
        return Err(ValidationError::EndInPast.into());
    }

    let previous = poll.status;
    if previous == body.status {
        return Ok(Json(poll));
    }
    poll.status = body.status;
    poll.updated_at = now;
    state.db.update_poll(&poll).await?;

    audit(
        &state,
        AuditEntry::for_poll(&admin.id, AuditAction::SetStatus, &poll.id)
            .with_details(json!({ "from": previous, "to": poll.status })),
    )
    .await?;
    Ok(Json(poll))
}

/// POST /api/admin/polls/{id}/visibility
async fn set_visibility(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(poll_id): Path<String>,
    ApiJson(body): ApiJson<VisibilityBody>,
) -> ApiResult<Json<Poll>> {
    let mut poll = state.db.get_poll(&poll_id).await?;
    if poll.is_public == body.is_public {
        return Ok(Json(poll));
    }
    poll.is_public = body.is_public;
    poll.updated_at = Utc::now();
    state.db.update_poll(&poll).await?;

    audit(
        &state,
        AuditEntry::for_poll(&admin.id, AuditAction::SetVisibility, &poll.id)
            .with_details(json!({ "is_public": poll.is_public })),
    )
    .await?;
    Ok(Json(poll))
}

/// POST /api/admin/polls/{id}/options
async fn add_option(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(poll_id): Path<String>,
    ApiJson(body): ApiJson<OptionBody>,
) -> ApiResult<(StatusCode, Json<PollOption>)> {
    let poll = state.db.get_poll(&poll_id).await?;
    let text = required_text("option", &body.text, MAX_OPTION_TEXT_LEN)?;
    check_unique_option(&poll, &text, None)?;

    let option = state
        .db
        .add_option(&poll.id, &Uuid::new_v4().to_string(), &text)
        .await?;

    audit(
        &state,
        AuditEntry::new(&admin.id, AuditAction::AddOption, "option", &option.id)
            .with_poll(&poll.id)
            .with_details(json!({ "text": option.text })),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(option)))
}

/// PATCH /api/admin/options/{id}
async fn update_option(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(option_id): Path<String>,
    ApiJson(body): ApiJson<OptionBody>,
) -> ApiResult<Json<PollOption>> {
    let mut option = state.db.get_option(&option_id).await?;
    let poll = state.db.get_poll(&option.poll_id).await?;
    let text = required_text("option", &body.text, MAX_OPTION_TEXT_LEN)?;
    check_unique_option(&poll, &text, Some(&option.id))?;

    let previous = std::mem::replace(&mut option.text, text);
    state.db.update_option_text(&option.id, &option.text).await?;

    audit(
        &state,
        AuditEntry::new(&admin.id, AuditAction::UpdateOption, "option", &option.id)
            .with_poll(&poll.id)
            .with_details(json!({ "from": previous, "to": option.text })),
    )
    .await?;
    Ok(Json(option))
}

/// DELETE /api/admin/options/{id}
async fn delete_option(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(option_id): Path<String>,
) -> ApiResult<StatusCode> {
    let option = state.db.get_option(&option_id).await?;
    let mut poll = state.db.get_poll(&option.poll_id).await?;

    if state.db.count_poll_votes(&poll.id).await? > 0 {
        return Err(ApiError::Conflict("options cannot be removed once a poll has votes".to_string()));
    }
    if poll.options.len() <= MIN_OPTIONS {
        return Err(ApiError::Conflict(format!("a poll needs at least {} options", MIN_OPTIONS)));
    }

    state.db.delete_option(&option).await?;

    // Keep max_choices within the shrunken option list.
    let remaining = (poll.options.len() - 1) as u32;
    if poll.max_choices.is_some_and(|c| c > remaining) {
        poll.max_choices = Some(remaining);
        poll.updated_at = Utc::now();
        state.db.update_poll(&poll).await?;
    }

    audit(
        &state,
        AuditEntry::new(&admin.id, AuditAction::DeleteOption, "option", &option.id)
            .with_poll(&poll.id)
            .with_details(json!({ "text": option.text })),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/polls/{id}/image
async fn upload_image(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    Path(poll_id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<Poll>> {
    let mut poll = state.db.get_poll(&poll_id).await?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::UnsupportedMediaType("missing Content-Type header".to_string()))?;
    let body = body?;

    let url = state.images.put(content_type, &body).await?;
    let previous = poll.image_url.replace(url.clone());
    poll.updated_at = Utc::now();
    if let Err(e) = state.db.update_poll(&poll).await {
        if let Err(remove_err) = state.images.remove(&url).await {
            warn!("Could not remove orphaned image {}: {}", url, remove_err);
        }
        return Err(e.into());
    }

    if let Some(old) = &previous {
        if let Err(e) = state.images.remove(old).await {
            warn!("Could not remove replaced image {}: {}", old, e);
        }
    }

    audit(
        &state,
        AuditEntry::for_poll(&admin.id, AuditAction::UploadImage, &poll.id)
            .with_details(json!({ "url": url, "bytes": body.len(), "replaced": previous })),
    )
    .await?;
    Ok(Json(poll))
}

/// GET /api/admin/polls/{id}/results
async fn results(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    Path(poll_id): Path<String>,
) -> ApiResult<Json<PollResults>> {
    let poll = state.db.get_poll(&poll_id).await?;
    let data = state.db.load_vote_data(&poll.id).await?;
    Ok(Json(tally::calculate_results(&poll, &data, Utc::now())))
}

/// GET /api/admin/polls/{id}/demographics?attribute=
async fn demographics(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    Path(poll_id): Path<String>,
    ApiQuery(params): ApiQuery<DemographicsParams>,
) -> ApiResult<Json<Demographics>> {
    let poll = state.db.get_poll(&poll_id).await?;
    let groups = state
        .db
        .voters_by_attribute(&poll.id, params.attribute)
        .await?
        .into_iter()
        .map(|(value, voters)| DemographicGroup { value, voters })
        .collect();
    Ok(Json(Demographics {
        poll_id: poll.id,
        attribute: params.attribute,
        groups,
    }))
}

/// GET /api/admin/audit-logs
async fn audit_logs(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ApiQuery(filter): ApiQuery<AuditFilter>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(state.db.list_audit(&filter).await?))
}

/// POST /api/admin/featured
async fn feature(
    State(state): State<Arc<AppState>>,
    admin: Admin,
    ApiJson(body): ApiJson<FeatureBody>,
) -> ApiResult<Json<FeatureResponse>> {
    let request = FeatureRequest {
        window_days: body.window_days.unwrap_or(DEFAULT_WINDOW_DAYS),
        poll_id: body.poll_id,
        dry_run: body.dry_run,
    };
    let featured = featured::select_featured(&state.db, &admin.id, &request, Utc::now()).await?;
    Ok(Json(FeatureResponse { featured }))
}

pub fn router(max_image_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/polls", get(list_polls).post(create_poll))
        .route(
            "/api/admin/polls/{id}",
            get(get_poll).patch(update_poll).delete(delete_poll),
        )
        .route("/api/admin/polls/{id}/status", post(set_status))
        .route("/api/admin/polls/{id}/visibility", post(set_visibility))
        .route("/api/admin/polls/{id}/options", post(add_option))
        .route("/api/admin/options/{id}", patch(update_option).delete(delete_option))
        .route(
            "/api/admin/polls/{id}/image",
            // One byte over the limit so the store reports the size itself.
            post(upload_image).layer(DefaultBodyLimit::max(max_image_bytes + 1)),
        )
        .route("/api/admin/polls/{id}/results", get(results))
        .route("/api/admin/polls/{id}/demographics", get(demographics))
        .route("/api/admin/audit-logs", get(audit_logs))
        .route("/api/admin/featured", post(feature))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};

    fn poll_body() -> Value {
        json!({"title": "Square renovation", "vote_type": "single", "options": ["Trees", "Benches", "Fountain"]})
    }

    #[tokio::test]
    async fn admin_routes_need_a_valid_token() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/admin/polls", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let request = Request::builder()
            .uri("/api/admin/polls")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn create_validates_and_audits() {
        let app = TestApp::new().await;
        let (status, body) = app
            .admin(
                "POST",
                "/api/admin/polls",
                Some(json!({
                    "title": "Dates", "vote_type": "single", "options": ["a", "b"],
                    "start_date": "2030-02-01T00:00:00Z", "end_date": "2030-01-01T00:00:00Z"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["field"], "start_date");

        let poll = app.create_poll(poll_body()).await;
        assert_eq!(poll["created_by"], "alice");

        let (status, logs) = app.admin("GET", "/api/admin/audit-logs?action=create_poll", None).await;
        assert_eq!(status, StatusCode::OK);
        let logs = logs.as_array().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["poll_id"], poll["id"]);
        assert_eq!(logs[0]["details"]["options"], 3);
    }

    #[tokio::test]
    async fn update_status_and_visibility() {
        let app = TestApp::new().await;
        let poll = app.create_poll(poll_body()).await;
        let id = poll["id"].as_str().unwrap();

        let (status, updated) = app
            .admin(
                "PATCH",
                &format!("/api/admin/polls/{}", id),
                Some(json!({"title": "Square makeover", "allow_multiple": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Square makeover");
        assert_eq!(updated["max_votes_per_user"], 2);

        let (status, bad) = app
            .admin("PATCH", &format!("/api/admin/polls/{}", id), Some(json!({"max_votes_per_user": 1})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(bad["details"]["field"], "max_votes_per_user");

        let (status, closed) = app
            .admin("POST", &format!("/api/admin/polls/{}/status", id), Some(json!({"status": "closed"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["status"], "closed");

        let (_, hidden) = app
            .admin("POST", &format!("/api/admin/polls/{}/visibility", id), Some(json!({"is_public": false})))
            .await;
        assert_eq!(hidden["is_public"], false);
        let (status, _) = app.get(&format!("/api/polls/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, logs) = app
            .admin("GET", &format!("/api/admin/audit-logs?poll_id={}", id), None)
            .await;
        let actions: Vec<&str> = logs
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["action"].as_str().unwrap())
            .collect();
        for expected in ["create_poll", "update_poll", "set_status", "set_visibility"] {
            assert!(actions.contains(&expected), "missing {} in {:?}", expected, actions);
        }
    }

    #[tokio::test]
    async fn option_management_rules() {
        let app = TestApp::new().await;
        let poll = app.create_poll(poll_body()).await;
        let id = poll["id"].as_str().unwrap();
        let options = option_ids(&poll);

        let (status, added) = app
            .admin("POST", &format!("/api/admin/polls/{}/options", id), Some(json!({"text": "Playground"})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(added["position"], 3);

        let (status, _) = app
            .admin("POST", &format!("/api/admin/polls/{}/options", id), Some(json!({"text": "trees"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, renamed) = app
            .admin("PATCH", &format!("/api/admin/options/{}", options[1]), Some(json!({"text": "Seats"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["text"], "Seats");

        let (status, _) = app.admin("DELETE", &format!("/api/admin/options/{}", options[0]), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app
            .post_json(&format!("/api/polls/{}/vote", id), Some("rui"), json!({"option_id": options[1]}))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app.admin("DELETE", &format!("/api/admin/options/{}", options[2]), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn image_upload_replaces_previous() {
        let app = TestApp::new().await;
        let poll = app.create_poll(poll_body()).await;
        let id = poll["id"].as_str().unwrap();
        let uri = format!("/api/admin/polls/{}/image", id);

        let upload = |content_type: &'static str, bytes: Vec<u8>| {
            Request::builder()
                .method("POST")
                .uri(uri.clone())
                .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
                .header("content-type", content_type)
                .body(Body::from(bytes))
                .unwrap()
        };

        let (status, first) = app.send(upload("image/png", b"png-bytes".to_vec())).await;
        assert_eq!(status, StatusCode::OK);
        let first_url = first["image_url"].as_str().unwrap().to_string();
        assert!(first_url.starts_with("/uploads/"));

        let (status, second) = app.send(upload("image/webp", b"webp-bytes".to_vec())).await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(second["image_url"].as_str().unwrap(), first_url);

        let old_file = app.state.config.upload_dir.join(first_url.trim_start_matches("/uploads/"));
        assert!(!old_file.exists());

        let (status, body) = app.send(upload("application/pdf", b"%PDF".to_vec())).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"], "unsupported_media_type");

        let (status, body) = app.send(upload("image/png", vec![0u8; 4096])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
    }

    #[tokio::test]
    async fn failed_image_update_leaves_no_file() {
        let app = TestApp::new().await;
        let poll = app.create_poll(poll_body()).await;
        let id = poll["id"].as_str().unwrap();

        sqlx::query(
            "CREATE TRIGGER polls_read_only BEFORE UPDATE ON polls BEGIN SELECT RAISE(ABORT, 'read only'); END",
        )
        .execute(app.state.db.pool())
        .await
        .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/admin/polls/{}/image", id))
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
            .header("content-type", "image/png")
            .body(Body::from(b"png-bytes".to_vec()))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");

        let stored = std::fs::read_dir(&app.state.config.upload_dir).unwrap().count();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn demographics_and_featured() {
        let app = TestApp::new().await;
        let poll = app.create_poll(poll_body()).await;
        let id = poll["id"].as_str().unwrap();
        let options = option_ids(&poll);

        let request = Request::builder()
            .method("PUT")
            .uri("/api/participants/me")
            .header("content-type", "application/json")
            .header("x-user-id", "bia")
            .body(Body::from(json!({"gender": "female"}).to_string()))
            .unwrap();
        app.send(request).await;
        for user in ["bia", "caio"] {
            let (status, _) = app
                .post_json(&format!("/api/polls/{}/vote", id), Some(user), json!({"option_id": options[0]}))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, demo) = app
            .admin("GET", &format!("/api/admin/polls/{}/demographics?attribute=gender", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            demo["groups"],
            json!([{"value": "female", "voters": 1}, {"value": "unknown", "voters": 1}])
        );

        let (status, featured) = app.admin("POST", "/api/admin/featured", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(featured["featured"]["poll_id"], poll["id"]);
        assert_eq!(featured["featured"]["recent_votes"], 2);

        let (_, listed) = app.get("/api/polls?featured=true", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn featured_window_out_of_range_is_400() {
        let app = TestApp::new().await;
        app.create_poll(poll_body()).await;

        let (status, body) = app
            .admin("POST", "/api/admin/featured", Some(json!({"window_days": 100_000_000})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["details"]["field"], "window_days");
    }

    #[tokio::test]
    async fn delete_poll_removes_everything() {
        let app = TestApp::new().await;
        let poll = app.create_poll(poll_body()).await;
        let id = poll["id"].as_str().unwrap();

        let (status, _) = app.admin("DELETE", &format!("/api/admin/polls/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.admin("GET", &format!("/api/admin/polls/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, logs) = app.admin("GET", "/api/admin/audit-logs?action=delete_poll", None).await;
        assert_eq!(logs.as_array().unwrap().len(), 1);
    }
}

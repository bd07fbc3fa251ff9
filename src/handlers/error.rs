//! API error type. Every failure leaves the service as
//! `{"error": code, "message": text, "details": optional}`.

use axum::extract::rejection::{BytesRejection, JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::{json, Value};

use crate::db::DbError;
use crate::models::ValidationError;
use crate::storage::StorageError;
use crate::tasks::featured::FeatureError;
use crate::voting::ballot::BallotError;
use crate::voting::visibility::ResultsHidden;

#[derive(Debug)]
pub enum ApiError {
    /// Field validation failed (400)
    Validation(ValidationError),

    /// Request body or query could not be parsed (400)
    BadRequest(String),

    /// Ballot does not fit the poll (400)
    Ballot(BallotError),

    /// No or malformed credentials (401)
    Unauthorized(&'static str),

    /// Credentials not accepted (403)
    Forbidden(&'static str),

    /// Results withheld from this viewer (403)
    ResultsHidden(ResultsHidden),

    NotFound { resource: &'static str, id: String },

    /// Voter used all allowed ballots (409)
    AlreadyVoted { limit: u32 },

    /// Poll is not accepting ballots (409)
    PollNotOpen(BallotError),

    Conflict(String),

    PayloadTooLarge(String),

    UnsupportedMediaType(String),

    /// Database error (500, logged)
    Database(DbError),

    /// Anything else (500, logged)
    Internal(String),
}

impl ApiError {
    pub fn not_found(resource: &'static str, id: &str) -> Self {
        Self::NotFound { resource, id: id.to_string() }
    }

    fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                e.to_string(),
                Some(json!({ "field": e.field() })),
            ),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "validation_error", message.clone(), None),
            Self::Ballot(e) => (StatusCode::BAD_REQUEST, "invalid_ballot", e.to_string(), None),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, "unauthorized", message.to_string(), None),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, "forbidden", message.to_string(), None),
            Self::ResultsHidden(reason) => (StatusCode::FORBIDDEN, "results_hidden", reason.to_string(), None),
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} '{}' not found", resource, id),
                None,
            ),
            Self::AlreadyVoted { limit } => (
                StatusCode::CONFLICT,
                "already_voted",
                format!("you have already cast the maximum of {} vote(s)", limit),
                Some(json!({ "max_votes_per_user": limit })),
            ),
            Self::PollNotOpen(e) => (StatusCode::CONFLICT, "poll_not_open", e.to_string(), None),
            Self::Conflict(message) => (StatusCode::CONFLICT, "conflict", message.clone(), None),
            Self::PayloadTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message.clone(), None)
            }
            Self::UnsupportedMediaType(message) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_media_type",
                message.clone(),
                None,
            ),
            Self::Database(_) | Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "an internal error occurred".to_string(),
                None,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Database(e) => error!("Database error: {}", e),
            Self::Internal(message) => error!("Internal error: {}", message),
            _ => {}
        }

        let (status, code, message, details) = self.parts();
        let mut body = json!({ "error": code, "message": message });
        if let Some(details) = details {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound { resource, id } => Self::NotFound { resource, id },
            DbError::VoteLimitReached { limit } => Self::AlreadyVoted { limit },
            _ => Self::Database(e),
        }
    }
}

impl From<BallotError> for ApiError {
    fn from(e: BallotError) -> Self {
        if e.is_poll_state() {
            Self::PollNotOpen(e)
        } else {
            Self::Ballot(e)
        }
    }
}

impl From<ResultsHidden> for ApiError {
    fn from(reason: ResultsHidden) -> Self {
        Self::ResultsHidden(reason)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::UnsupportedType(_) => Self::UnsupportedMediaType(e.to_string()),
            StorageError::TooLarge { .. } => Self::PayloadTooLarge(e.to_string()),
            StorageError::Empty => Self::Validation(ValidationError::Empty { field: "image" }),
            StorageError::Io(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<FeatureError> for ApiError {
    fn from(e: FeatureError) -> Self {
        match e {
            FeatureError::Db(e) => e.into(),
            FeatureError::Invalid(e) => Self::Validation(e),
            FeatureError::NotEligible { .. } => Self::Conflict(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::UNSUPPORTED_MEDIA_TYPE => Self::UnsupportedMediaType(rejection.body_text()),
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge(rejection.body_text()),
            _ => Self::BadRequest(rejection.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge(rejection.body_text()),
            _ => Self::BadRequest(rejection.body_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_error_is_400_with_field() {
        let (status, body) = body_json(ValidationError::Empty { field: "title" }.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["details"]["field"], "title");
    }

    #[tokio::test]
    async fn vote_limit_is_409_already_voted() {
        let (status, body) = body_json(DbError::VoteLimitReached { limit: 1 }.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_voted");
        assert_eq!(body["details"]["max_votes_per_user"], 1);
    }

    #[tokio::test]
    async fn closed_poll_and_bad_ballot_differ() {
        let (status, body) = body_json(BallotError::Ended.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "poll_not_open");

        let (status, body) = body_json(BallotError::Empty.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_ballot");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_json(ApiError::Internal("disk on fire".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "an internal error occurred");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn not_found_is_404() {
        let (status, body) = body_json(ApiError::not_found("poll", "abc")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "poll 'abc' not found");
    }
}

//! Custom extractors: caller identity, and JSON/query bodies whose
//! rejections use the API error format.

use std::sync::Arc;

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use super::error::ApiError;
use super::AppState;
use crate::models::ValidationError;

pub const USER_HEADER: &str = "x-user-id";
pub const MAX_USER_ID_LEN: usize = 128;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Voter id asserted by the upstream auth layer.
fn voter_id(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    let invalid = || {
        ApiError::Validation(ValidationError::InvalidFormat {
            field: USER_HEADER,
            reason: "expected 1-128 printable characters",
        })
    };
    let id = value.to_str().map_err(|_| invalid())?.trim();
    if id.is_empty() || id.chars().count() > MAX_USER_ID_LEN || id.chars().any(char::is_control) {
        return Err(invalid());
    }
    Ok(Some(id.to_string()))
}

/// An identified voter. Rejects requests without `X-User-Id`.
pub struct Voter(pub String);

impl<S> FromRequestParts<S> for Voter
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        voter_id(&parts.headers)?
            .map(Self)
            .ok_or(ApiError::Unauthorized("missing X-User-Id header"))
    }
}

/// A voter if the request carries one, anonymous otherwise.
pub struct MaybeVoter(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeVoter
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(voter_id(&parts.headers)?))
    }
}

/// An administrator, authenticated by a configured bearer token.
#[derive(Debug, Clone)]
pub struct Admin {
    pub id: String,
}

impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(ApiError::Unauthorized("missing Authorization header"))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("malformed Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized("expected a Bearer token"))?;

        let id = state
            .config
            .admin_for_token(token)
            .ok_or(ApiError::Forbidden("token is not an admin token"))?;

        Ok(Self { id: id.to_string() })
    }
}

pub mod admin;
pub mod error;
pub mod extract;
mod participants;
mod polls;
mod vote;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::db::Database;
use crate::storage::{ImageStore, UPLOADS_ROUTE};

pub use error::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Shared application state
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub images: Arc<dyn ImageStore>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_permissive {
        log::warn!("CORS: permissive mode enabled, all origins allowed");
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_methods(Any).allow_headers(Any)
    };
    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .route("/api/health", get(health))
        .merge(polls::router())
        .merge(vote::router())
        .merge(participants::router())
        .merge(admin::router(state.config.max_image_bytes))
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} -> {} ({} ms)",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

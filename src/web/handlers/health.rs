use axum::{extract::State, routing::get, Json, Router};
use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::utils::http::HealthResponse;
use crate::AppContext;

static VERSION: Lazy<String> =
    Lazy::new(|| format!("{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")));

pub fn health_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(ctx)
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.clone(),
        active_tasks: ctx.task_manager.active_tasks(),
    })
}

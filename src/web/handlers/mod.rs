use axum::Router;
use std::sync::Arc;
use crate::AppContext;

pub mod asr;
pub mod health;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .merge(asr::transcribe_router(ctx.clone()))
        .merge(health::health_router(ctx))
}

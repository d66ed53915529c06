use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::schedule::{TaskLookup, TaskState};
use crate::utils::http::{MessageResponse, ProgressResponse};
use crate::AppContext;

pub const SESSION_COOKIE: &str = "session_id";

pub fn transcribe_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/transcribe", post(transcribe))
        .route("/progress", get(progress))
        .route("/cleanup", post(cleanup))
        .route("/cancel", post(cancel))
        .with_state(ctx)
}

/// A request field that may hold a value of the wrong JSON type.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RequestField {
    Text(String),
    Other(IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
pub struct TranscribeRequest {
    pub video_url: Option<RequestField>,
    pub model_size: Option<RequestField>,
}

impl TranscribeRequest {
    /// A non-string URL counts as missing.
    fn video_url(&self) -> Option<&str> {
        match &self.video_url {
            Some(RequestField::Text(url)) => Some(url),
            _ => None,
        }
    }

    /// A non-string size is passed on as an empty name so it fails
    /// validation like any unknown size.
    fn model_size(&self) -> Option<&str> {
        match &self.model_size {
            Some(RequestField::Text(size)) => Some(size),
            Some(RequestField::Other(_)) => Some(""),
            None => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub task_id: Option<String>,
}

fn session_of(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string())
}

fn lookup<'a>(session: Option<&'a str>, query: &'a TaskQuery) -> TaskLookup<'a> {
    TaskLookup {
        session,
        task_id: query.task_id.as_deref().filter(|id| !id.is_empty()),
    }
}

pub async fn transcribe(
    State(ctx): State<Arc<AppContext>>,
    jar: CookieJar,
    req: Option<Json<TranscribeRequest>>,
) -> impl IntoResponse {
    // 没有会话的客户端分配一个新的 session_id
    let (session, jar) = match session_of(&jar) {
        Some(session) => (session, jar),
        None => {
            let session = Uuid::new_v4().to_string();
            let cookie = Cookie::build((SESSION_COOKIE, session.clone()))
                .http_only(true)
                .path("/");
            (session, jar.add(cookie))
        }
    };

    let Json(req) = req.unwrap_or_default();
    match ctx
        .task_manager
        .start(&session, req.video_url(), req.model_size())
        .await
    {
        Ok(task_id) => {
            info!("Transcription started: {}", task_id);
            (
                StatusCode::OK,
                jar,
                Json(MessageResponse::with_task("Transcription started", task_id)),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Rejected transcription request: {}", e);
            (jar, e).into_response()
        }
    }
}

pub async fn progress(
    State(ctx): State<Arc<AppContext>>,
    jar: CookieJar,
    Query(query): Query<TaskQuery>,
) -> impl IntoResponse {
    let session = session_of(&jar);
    match ctx.task_manager.progress(lookup(session.as_deref(), &query)).await {
        Ok(snapshot) => {
            let status = if snapshot.state == TaskState::Failed {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (status, Json(ProgressResponse::from(snapshot))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn cleanup(
    State(ctx): State<Arc<AppContext>>,
    jar: CookieJar,
    Query(query): Query<TaskQuery>,
) -> impl IntoResponse {
    let session = session_of(&jar);
    ctx.task_manager.cleanup(lookup(session.as_deref(), &query)).await;
    (StatusCode::OK, Json(MessageResponse::new("Cleanup successful")))
}

pub async fn cancel(
    State(ctx): State<Arc<AppContext>>,
    jar: CookieJar,
    Query(query): Query<TaskQuery>,
) -> impl IntoResponse {
    let session = session_of(&jar);
    match ctx.task_manager.cancel(lookup(session.as_deref(), &query)).await {
        Ok(task_id) => (
            StatusCode::OK,
            Json(MessageResponse::with_task("Cancellation requested", task_id)),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

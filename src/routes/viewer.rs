//! Viewer session endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::render::{DocId, ViewerSession, ViewerSnapshot, ZoomDirection};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OpenRequest {
    pub id: DocId,
}

#[derive(Deserialize)]
pub struct ZoomRequest {
    pub direction: ZoomDirection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollRequest {
    pub scroll_top: f32,
    pub viewport_height: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollResponse {
    pub current_page: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: ViewerSnapshot,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(open_viewer))
        .route("/:session", get(get_viewer).delete(close_viewer))
        .route("/:session/pages/:page", get(get_page))
        .route("/:session/zoom", post(zoom_viewer))
        .route("/:session/scroll", post(scroll_viewer))
        .route("/:session/refresh", post(refresh_viewer))
}

fn session(state: &AppState, id: &Uuid) -> Result<std::sync::Arc<ViewerSession>> {
    state
        .viewer(id)
        .ok_or_else(|| AppError::NotFound(format!("Viewer session {} not found", id)))
}

fn session_response(state: &AppState, id: Uuid) -> Result<Json<SessionResponse>> {
    let entry = state
        .viewer_entry(&id)
        .ok_or_else(|| AppError::NotFound(format!("Viewer session {} not found", id)))?;

    Ok(Json(SessionResponse {
        session: id,
        created_at: entry.created_at,
        snapshot: entry.session.snapshot(),
    }))
}

/// Open a file in a new viewer session
async fn open_viewer(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    if state.config().api.record_views {
        let api = state.api().clone();
        let id = request.id.clone();
        tokio::spawn(async move {
            if let Err(e) = api.record_view(&id).await {
                tracing::warn!("Failed to record view for '{}': {}", id, e);
            }
        });
    }

    // Dropped on error or client disconnect, which unregisters the session
    let pending = state.reserve_viewer();
    pending.session().open(request.id).await?;
    let session_id = pending.commit();

    Ok((StatusCode::CREATED, session_response(&state, session_id)?))
}

async fn get_viewer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    session_response(&state, session_id)
}

async fn get_page(
    State(state): State<AppState>,
    Path((session_id, page)): Path<(Uuid, usize)>,
) -> Result<Response> {
    let viewer = session(&state, &session_id)?;
    let image = viewer.page(page).ok_or_else(|| {
        AppError::NotFound(format!(
            "Page {} not available ({} rendered)",
            page,
            viewer.page_count()
        ))
    })?;

    Ok((
        [(header::CONTENT_TYPE, "image/jpeg")],
        image.bytes().to_vec(),
    )
        .into_response())
}

async fn zoom_viewer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ZoomRequest>,
) -> Result<Json<SessionResponse>> {
    session(&state, &session_id)?.zoom(request.direction);
    session_response(&state, session_id)
}

async fn scroll_viewer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ScrollRequest>,
) -> Result<Json<ScrollResponse>> {
    if request.viewport_height < 0.0 || !request.scroll_top.is_finite() {
        return Err(AppError::BadRequest("Invalid scroll position".to_string()));
    }

    let current_page =
        session(&state, &session_id)?.on_scroll(request.scroll_top, request.viewport_height);
    Ok(Json(ScrollResponse { current_page }))
}

/// Re-render the open file at the current zoom
async fn refresh_viewer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    session(&state, &session_id)?.refresh().await?;
    session_response(&state, session_id)
}

async fn close_viewer(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    if state.remove_viewer(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!(
            "Viewer session {} not found",
            session_id
        )))
    }
}

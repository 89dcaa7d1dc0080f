//! Thumbnail endpoints
//!
//! - `POST /sync`: start renders for a list of ids
//! - `GET /:id`: status and data URI
//! - `GET /:id/image`: JPEG bytes
//! - `DELETE /:id`: forget a thumbnail so it renders again

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::render::{DocId, RenderStatus};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SyncRequest {
    pub ids: Vec<DocId>,
}

#[derive(Deserialize, Default)]
pub struct SyncQuery {
    /// Wait for started renders before responding
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub started: Vec<DocId>,
    pub cached: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub thumbnails: Vec<ThumbnailResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailResponse {
    pub id: DocId,
    #[serde(flatten)]
    pub status: RenderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_uri: Option<String>,
}

impl ThumbnailResponse {
    fn load(state: &AppState, id: DocId, with_data: bool) -> Self {
        let thumbnails = state.thumbnails();
        let status = thumbnails.status(&id);
        let image = thumbnails.thumbnail(&id);

        Self {
            status,
            width: image.as_ref().map(|i| i.width()),
            height: image.as_ref().map(|i| i.height()),
            data_uri: image.filter(|_| with_data).map(|i| i.data_uri()),
            id,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_thumbnails))
        .route("/:id", get(get_thumbnail).delete(invalidate_thumbnail))
        .route("/:id/image", get(get_thumbnail_image))
}

async fn sync_thumbnails(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
    Json(request): Json<SyncRequest>,
) -> Json<SyncResponse> {
    let report = state.thumbnails().sync(&request.ids);
    tracing::debug!(
        "Thumbnail sync: {} started, {} cached, {} in flight, {} failed",
        report.started.len(),
        report.cached,
        report.in_flight,
        report.failed
    );

    let started = report.started.clone();
    let (cached, in_flight, failed) = (report.cached, report.in_flight, report.failed);
    if query.wait {
        report.wait().await;
    }

    // Data URIs are left to `GET /:id` to keep sync responses small
    let thumbnails = request
        .ids
        .into_iter()
        .map(|id| ThumbnailResponse::load(&state, id, false))
        .collect();

    Json(SyncResponse {
        started,
        cached,
        in_flight,
        failed,
        thumbnails,
    })
}

async fn get_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ThumbnailResponse> {
    Json(ThumbnailResponse::load(&state, DocId::from(id), true))
}

async fn get_thumbnail_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = DocId::from(id);
    let image = state
        .thumbnails()
        .thumbnail(&id)
        .ok_or_else(|| AppError::NotFound(format!("No thumbnail for '{}'", id)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        image.bytes().to_vec(),
    )
        .into_response())
}

async fn invalidate_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    state.thumbnails().invalidate(&DocId::from(id));
    StatusCode::NO_CONTENT
}

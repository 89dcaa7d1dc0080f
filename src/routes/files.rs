//! Knowledge-base pass-through
//!
//! Lets a client that only talks to this server list and inspect files. The
//! one write is local: dropping every cached render of a file after its
//! content changed upstream.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::{Category, FileDetail, FileSummary, KbDocument};
use crate::error::{AppError, Result};
use crate::render::DocId;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    pub id: DocId,
    pub evicted: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/files/:id", get(get_file))
        .route("/api/v1/files/:id/download", get(download_file))
        .route("/api/v1/files/:id/renders", delete(invalidate_renders))
        .route("/api/v1/search", get(search))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/documents/:id", get(get_document))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileDetail>> {
    Ok(Json(state.api().file_detail(&DocId::from(id)).await?))
}

async fn download_file(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let download = state.api().download_file(&DocId::from(id)).await?;

    let content_type = download
        .content_type
        .unwrap_or_else(|| "application/pdf".to_string());
    let filename = download
        .filename
        .unwrap_or_else(|| "document.pdf".to_string())
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != '"')
        .collect::<String>();

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        download.bytes,
    )
        .into_response())
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<FileSummary>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(AppError::BadRequest("Query parameter 'q' is required".to_string()));
    }
    Ok(Json(state.api().search(q).await?))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.api().categories().await?))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<KbDocument>> {
    Ok(Json(state.api().document(&DocId::from(id)).await?))
}

/// Evict the thumbnail and every page render of a file
async fn invalidate_renders(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<InvalidateResponse> {
    let id = DocId::from(id);
    let evicted = state.cache().invalidate_id(&id);
    tracing::info!("Invalidated {} cached render(s) of '{}'", evicted, id);
    Json(InvalidateResponse { id, evicted })
}

// Genre listing per media kind

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use super::parse_param;
use crate::models::{GenreRef, MediaKind};
use crate::services::catalog::keyword_genres;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:kind", get(get_genres))
        .route("/:kind/ids", get(get_genre_ids))
}

/// Provider genre names, or the keyword fallback vocabulary when no provider lists any.
async fn get_genres(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let kind: MediaKind = parse_param("kind", Some(kind.as_str()))?.unwrap_or_default();

    let genres = match state.catalog.resolver() {
        Some(resolver) => resolver.genres(kind).await,
        None => None,
    };

    Ok(Json(genres.unwrap_or_else(keyword_genres)))
}

/// Provider genre ids for the `genre` discovery list.
async fn get_genre_ids(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<GenreRef>>, (StatusCode, String)> {
    let kind: MediaKind = parse_param("kind", Some(kind.as_str()))?.unwrap_or_default();

    let genres = match state.catalog.resolver() {
        Some(resolver) => resolver.genre_ids(kind).await,
        None => None,
    };
    genres
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No genre ids for {}", kind)))
}

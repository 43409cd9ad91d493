// Series browsing endpoints - series search, seasons and per-season episodes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::upstream_error;
use crate::models::EpisodeInfo;
use crate::services::catalog::{EpisodeStreams, SeriesSummary};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(search_series))
        .route("/:name/seasons", get(get_seasons))
        .route("/:name/seasons/:season", get(get_season_episodes))
        .route("/:name/seasons/:season/guide", get(get_episode_guide))
}

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub query: Option<String>,
}

async fn search_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeriesQuery>,
) -> Result<Json<Vec<SeriesSummary>>, (StatusCode, String)> {
    let query = params.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing query".to_string()));
    }

    let series = state
        .catalog
        .search_series(query.trim())
        .await
        .map_err(upstream_error)?;
    Ok(Json(series))
}

async fn get_seasons(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<u32>>, (StatusCode, String)> {
    let seasons = state
        .catalog
        .discover_seasons(&name)
        .await
        .map_err(upstream_error)?;
    Ok(Json(seasons))
}

async fn get_season_episodes(
    State(state): State<Arc<AppState>>,
    Path((name, season)): Path<(String, u32)>,
) -> Result<Json<Vec<EpisodeStreams>>, (StatusCode, String)> {
    let episodes = state
        .catalog
        .season_streams(&name, season)
        .await
        .map_err(upstream_error)?;
    Ok(Json(episodes))
}

async fn get_episode_guide(
    State(state): State<Arc<AppState>>,
    Path((name, season)): Path<(String, u32)>,
) -> Result<Json<Vec<EpisodeInfo>>, (StatusCode, String)> {
    state
        .catalog
        .episode_guide(&name, season)
        .await
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No episode guide for {} season {}", name, season),
            )
        })
}

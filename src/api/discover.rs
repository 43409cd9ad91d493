// Discovery endpoints - curated provider lists per media kind

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::parse_param;
use crate::models::{DiscoveredTitle, DiscoveryList, MediaKind};
use crate::AppState;

/// Highest page number the list endpoints serve.
const MAX_DISCOVERY_PAGE: u32 = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/:kind/:list", get(get_discovery_list))
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryQuery {
    pub page: Option<u32>,
    /// Genre id, required by the `genre` list
    pub genre: Option<u32>,
}

async fn get_discovery_list(
    State(state): State<Arc<AppState>>,
    Path((kind, list)): Path<(String, String)>,
    Query(params): Query<DiscoveryQuery>,
) -> Result<Json<Vec<DiscoveredTitle>>, (StatusCode, String)> {
    let kind: MediaKind = parse_param("kind", Some(kind.as_str()))?.unwrap_or_default();
    let list = DiscoveryList::from_parts(&list, params.genre)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid list: {}", e)))?;
    if !list.supports(kind) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Invalid list: {:?} is not available for {}", list, kind),
        ));
    }
    let page = params.page.unwrap_or(1).clamp(1, MAX_DISCOVERY_PAGE);

    let titles = match state.catalog.resolver() {
        Some(resolver) => resolver.discover(kind, list, page).await,
        None => None,
    };
    titles.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("No provider offers the {:?} list for {}", list, kind),
        )
    })
}

// Catalog endpoint - one filtered page per request

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{parse_param, upstream_error};
use crate::config::MAX_PAGE_SIZE;
use crate::models::{CatalogPage, CatalogRequest, MediaKind};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_catalog))
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub kind: Option<String>,
    pub query: Option<String>,
    pub letter: Option<String>,
    pub sort: Option<String>,
    pub quality: Option<String>,
    pub audio: Option<String>,
    pub subtitles: Option<String>,
    pub genre: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl CatalogQuery {
    fn into_request(self) -> Result<CatalogRequest, (StatusCode, String)> {
        let kind = parse_param("kind", self.kind.as_deref())?;
        // Non-media files never pass the catalog filter
        if kind == Some(MediaKind::Other) {
            return Err((
                StatusCode::BAD_REQUEST,
                "Invalid kind: only movie or tvEpisode can be listed".to_string(),
            ));
        }

        Ok(CatalogRequest {
            kind,
            query: self.query.unwrap_or_default(),
            letter: self.letter.filter(|l| !l.is_empty()),
            sort: parse_param("sort", self.sort.as_deref())?,
            quality: parse_param("quality", self.quality.as_deref())?,
            audio: parse_param("audio", self.audio.as_deref())?,
            subtitles: parse_param("subtitles", self.subtitles.as_deref())?,
            genre: self.genre.filter(|g| !g.is_empty()),
            start_offset: self.offset.unwrap_or(0),
            page_size: self.limit.map(|l| l.min(MAX_PAGE_SIZE)),
        })
    }
}

async fn get_catalog(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<CatalogPage>, (StatusCode, String)> {
    let request = query.into_request()?;
    let page = state.catalog.fetch(&request).await.map_err(upstream_error)?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, Quality, SortOrder};

    #[test]
    fn test_query_into_request() {
        let request = CatalogQuery {
            kind: Some("movie".to_string()),
            query: Some("matrix".to_string()),
            sort: Some("rating".to_string()),
            quality: Some("4k".to_string()),
            audio: Some("cz".to_string()),
            letter: Some(String::new()),
            offset: Some(80),
            limit: Some(500),
            ..CatalogQuery::default()
        }
        .into_request()
        .unwrap();

        assert_eq!(request.kind, Some(MediaKind::Movie));
        assert_eq!(request.query, "matrix");
        assert_eq!(request.sort, Some(SortOrder::Rating));
        assert_eq!(request.quality, Some(Quality::Uhd));
        assert_eq!(request.audio, Some(Language::Cz));
        assert_eq!(request.letter, None);
        assert_eq!(request.start_offset, 80);
        assert_eq!(request.page_size, Some(MAX_PAGE_SIZE));
    }

    #[test]
    fn test_bad_filter_is_rejected() {
        let err = CatalogQuery {
            quality: Some("8k".to_string()),
            ..CatalogQuery::default()
        }
        .into_request()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("quality"));
    }

    #[test]
    fn test_other_kind_is_rejected() {
        let err = CatalogQuery {
            kind: Some("other".to_string()),
            ..CatalogQuery::default()
        }
        .into_request()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("kind"));
    }
}

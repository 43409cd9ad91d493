use axum::{http::StatusCode, Router};
use std::str::FromStr;
use std::sync::Arc;

use crate::AppState;

mod catalog;
mod discover;
mod genres;
mod series;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/catalog", catalog::routes())
        .nest("/discover", discover::routes())
        .nest("/genres", genres::routes())
        .nest("/series", series::routes())
}

/// Parse an optional filter value; empty means unset, anything unknown is a 400.
pub(crate) fn parse_param<T>(name: &str, value: Option<&str>) -> Result<Option<T>, (StatusCode, String)>
where
    T: FromStr<Err = String>,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid {}: {}", name, e))),
    }
}

pub(crate) fn upstream_error(e: anyhow::Error) -> (StatusCode, String) {
    tracing::warn!("Upstream request failed: {:#}", e);
    (StatusCode::BAD_GATEWAY, format!("{:#}", e))
}

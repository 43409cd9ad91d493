// Services module - business logic layer

pub mod cache;
pub mod catalog;
pub mod webshare;

// Metadata providers
pub mod csfd;
pub mod metadata;
pub mod tmdb;

use anyhow::Result;
use std::sync::Arc;

use crate::config::MetadataConfig;
use csfd::CsfdClient;
use metadata::Enricher;
use tmdb::TmdbClient;

/// Instantiate providers in the configured priority order.
/// TMDB is skipped without an API key.
pub fn build_providers(config: &MetadataConfig) -> Result<Vec<Arc<dyn Enricher>>> {
    let mut providers: Vec<Arc<dyn Enricher>> = Vec::new();

    for name in config.provider_order.names() {
        match *name {
            "tmdb" => match &config.tmdb_api_key {
                Some(key) => providers.push(Arc::new(TmdbClient::new(key.clone(), config)?)),
                None => tracing::warn!("TMDB is enabled but no API key is configured, skipping"),
            },
            "csfd" => providers.push(Arc::new(CsfdClient::new(config)?)),
            other => tracing::warn!("Unknown metadata provider '{}'", other),
        }
    }

    Ok(providers)
}

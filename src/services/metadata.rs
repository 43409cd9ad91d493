use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use super::cache::{CacheKey, CachedLookup, MetadataCache};
use crate::models::{
    DiscoveredTitle, DiscoveryList, EpisodeInfo, GenreRef, MediaItem, MediaKind, Metadata,
    SeriesInfo,
};

static RE_NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// A title database that can enrich a classified item.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the provider has no confident match.
    async fn enrich(&self, item: &MediaItem) -> Result<Option<Metadata>>;

    fn as_genre_lister(&self) -> Option<&dyn GenreLister> {
        None
    }

    fn as_season_lister(&self) -> Option<&dyn SeasonEpisodeLister> {
        None
    }

    fn as_discovery_lister(&self) -> Option<&dyn DiscoveryLister> {
        None
    }
}

/// Provider capability: list known genre names for a media kind.
#[async_trait]
pub trait GenreLister: Send + Sync {
    async fn genres(&self, kind: MediaKind) -> Result<Vec<String>>;
}

/// Provider capability: series search with season structure and episode listings.
#[async_trait]
pub trait SeasonEpisodeLister: Send + Sync {
    async fn search_series(&self, name: &str) -> Result<Option<SeriesInfo>>;

    async fn season_episodes(&self, series_id: &str, season: u32) -> Result<Vec<EpisodeInfo>>;
}

/// Provider capability: curated title lists and numeric genre ids.
#[async_trait]
pub trait DiscoveryLister: Send + Sync {
    async fn discover(
        &self,
        kind: MediaKind,
        list: DiscoveryList,
        page: u32,
    ) -> Result<Vec<DiscoveredTitle>>;

    async fn genre_ids(&self, kind: MediaKind) -> Result<Vec<GenreRef>>;
}

// Czech series titles whose English name finds more provider hits
const TITLE_ALIASES: &[(&str, &str)] = &[
    ("hra o trůny", "game of thrones"),
    ("teorie velkého třesku", "the big bang theory"),
    ("přátelé", "friends"),
    ("perníkový táta", "breaking bad"),
    ("dům z karet", "house of cards"),
    ("živí mrtví", "the walking dead"),
    ("simpsonovi", "the simpsons"),
    ("jak jsem poznal vaši matku", "how i met your mother"),
    ("dr. house", "house"),
    ("kancl", "the office"),
    ("zaklínač", "the witcher"),
    ("podivné věci", "stranger things"),
];

/// Search terms for a series name: the lowercased name, then its English alias.
pub fn series_search_terms(name: &str) -> Vec<String> {
    let lower = name.trim().to_lowercase();
    let alias = TITLE_ALIASES
        .iter()
        .find(|(czech, _)| *czech == lower)
        .map(|(_, english)| english.to_string());

    let mut terms = vec![lower];
    terms.extend(alias);
    terms
}

/// Provider priority presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOrder {
    #[default]
    TmdbFirst,
    CsfdFirst,
    TmdbOnly,
    CsfdOnly,
    None,
}

impl ProviderOrder {
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            ProviderOrder::TmdbFirst => &["tmdb", "csfd"],
            ProviderOrder::CsfdFirst => &["csfd", "tmdb"],
            ProviderOrder::TmdbOnly => &["tmdb"],
            ProviderOrder::CsfdOnly => &["csfd"],
            ProviderOrder::None => &[],
        }
    }
}

impl std::str::FromStr for ProviderOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tmdb_first" => Ok(ProviderOrder::TmdbFirst),
            "csfd_first" => Ok(ProviderOrder::CsfdFirst),
            "tmdb_only" => Ok(ProviderOrder::TmdbOnly),
            "csfd_only" => Ok(ProviderOrder::CsfdOnly),
            "none" => Ok(ProviderOrder::None),
            _ => Err(format!("unknown provider order '{}'", s)),
        }
    }
}

/// Title and year of a provider search hit, for scoring.
pub trait Candidate {
    fn title(&self) -> &str;
    fn year(&self) -> Option<i32>;
}

fn normalise(value: &str) -> String {
    RE_NON_ALNUM.replace_all(&value.to_lowercase(), "").into_owned()
}

/// Score one candidate against a classified item.
///
/// +80 exact normalized title, else +50 substring either way; +30 when both
/// years are known and within one year, -20 when further apart; +10 for an
/// episode with a known season.
pub fn candidate_score(query: &MediaItem, title: &str, year: Option<i32>) -> i32 {
    let mut score = 0;

    let wanted = normalise(&query.cleaned_title);
    let offered = normalise(title);
    if wanted == offered {
        score += 80;
    } else if wanted.contains(&offered) || offered.contains(&wanted) {
        score += 50;
    }

    if let (Some(wanted_year), Some(offered_year)) = (query.guessed_year, year) {
        if (wanted_year - offered_year).abs() <= 1 {
            score += 30;
        } else {
            score -= 20;
        }
    }

    if query.kind == MediaKind::TvEpisode && query.season.is_some() {
        score += 10;
    }

    score
}

/// Highest-scoring candidate; ties keep provider order.
pub fn best_candidate<C: Candidate>(query: &MediaItem, candidates: Vec<C>) -> Option<C> {
    let mut scored: Vec<(i32, C)> = candidates
        .into_iter()
        .map(|c| (candidate_score(query, c.title(), c.year()), c))
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().next().map(|(_, c)| c)
}

/// Year prefix of a `YYYY-MM-DD` date.
pub fn year_from_date(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.split('-').next())
        .and_then(|y| y.trim().parse().ok())
}

/// Tries providers in priority order and caches every decision.
pub struct MetadataResolver {
    providers: Vec<Arc<dyn Enricher>>,
    cache: Arc<dyn MetadataCache>,
    ttl: Option<Duration>,
}

impl MetadataResolver {
    pub fn new(
        providers: Vec<Arc<dyn Enricher>>,
        cache: Arc<dyn MetadataCache>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            providers,
            cache,
            ttl,
        }
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Resolve and merge metadata onto `item`. Provider failures count as misses.
    pub async fn enrich(&self, item: &mut MediaItem) -> Option<Metadata> {
        let key = CacheKey::for_item(item);

        match self.cache.get(&key).await {
            Some(CachedLookup::Found(metadata)) => {
                item.apply_metadata(&metadata);
                return Some(metadata);
            }
            Some(CachedLookup::NoMatch) => return None,
            None => {}
        }

        let mut resolved = None;
        for provider in &self.providers {
            match provider.enrich(item).await {
                Ok(Some(metadata)) if !metadata.is_empty() => {
                    tracing::info!(
                        "Metadata for '{}' from {}",
                        item.cleaned_title,
                        provider.name()
                    );
                    resolved = Some(metadata);
                    break;
                }
                Ok(_) => {
                    tracing::debug!("{}: no match for '{}'", provider.name(), item.cleaned_title);
                }
                Err(e) => {
                    tracing::warn!(
                        "{} lookup failed for '{}': {:#}",
                        provider.name(),
                        item.cleaned_title,
                        e
                    );
                }
            }
        }

        let decision = match &resolved {
            Some(metadata) => CachedLookup::Found(metadata.clone()),
            None => CachedLookup::NoMatch,
        };
        self.cache.put(key, decision, self.ttl).await;

        if let Some(metadata) = &resolved {
            item.apply_metadata(metadata);
        }
        resolved
    }

    /// Genre list from the first provider that offers one.
    pub async fn genres(&self, kind: MediaKind) -> Option<Vec<String>> {
        for provider in &self.providers {
            let Some(lister) = provider.as_genre_lister() else {
                continue;
            };
            match lister.genres(kind).await {
                Ok(genres) if !genres.is_empty() => return Some(genres),
                Ok(_) => {}
                Err(e) => tracing::warn!("{} genre list failed: {:#}", provider.name(), e),
            }
        }
        None
    }

    /// Series structure from the first provider with the season capability.
    pub async fn series_info(&self, name: &str) -> Option<SeriesInfo> {
        for provider in &self.providers {
            let Some(lister) = provider.as_season_lister() else {
                continue;
            };
            match lister.search_series(name).await {
                Ok(Some(info)) => return Some(info),
                Ok(None) => {}
                Err(e) => tracing::warn!("{} series search failed: {:#}", provider.name(), e),
            }
        }
        None
    }

    /// Discovery list from the first provider that returns a non-empty one.
    pub async fn discover(
        &self,
        kind: MediaKind,
        list: DiscoveryList,
        page: u32,
    ) -> Option<Vec<DiscoveredTitle>> {
        for provider in &self.providers {
            let Some(lister) = provider.as_discovery_lister() else {
                continue;
            };
            match lister.discover(kind, list, page).await {
                Ok(titles) if !titles.is_empty() => return Some(titles),
                Ok(_) => {}
                Err(e) => tracing::warn!("{} {:?} list failed: {:#}", provider.name(), list, e),
            }
        }
        None
    }

    /// Genre ids usable with `DiscoveryList::Genre`.
    pub async fn genre_ids(&self, kind: MediaKind) -> Option<Vec<GenreRef>> {
        for provider in &self.providers {
            let Some(lister) = provider.as_discovery_lister() else {
                continue;
            };
            match lister.genre_ids(kind).await {
                Ok(genres) if !genres.is_empty() => return Some(genres),
                Ok(_) => {}
                Err(e) => tracing::warn!("{} genre id list failed: {:#}", provider.name(), e),
            }
        }
        None
    }

    /// Episode listing from the provider that produced `series`.
    pub async fn season_episodes(&self, series: &SeriesInfo, season: u32) -> Option<Vec<EpisodeInfo>> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.name() == series.provider)?;
        let lister = provider.as_season_lister()?;
        match lister.season_episodes(&series.id, season).await {
            Ok(episodes) => Some(episodes),
            Err(e) => {
                tracing::warn!("{} season listing failed: {:#}", provider.name(), e);
                None
            }
        }
    }
}

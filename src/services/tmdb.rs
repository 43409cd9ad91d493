// TMDB metadata provider service
// API Documentation: https://developer.themoviedb.org/reference/intro/getting-started

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::metadata::{
    best_candidate, series_search_terms, year_from_date, Candidate, DiscoveryLister, Enricher,
    GenreLister, SeasonEpisodeLister,
};
use crate::config::MetadataConfig;
use crate::models::{
    DiscoveredTitle, DiscoveryList, EpisodeInfo, GenreRef, MediaItem, MediaKind, Metadata,
    SeasonInfo, SeriesInfo,
};

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// TMDB API client
pub struct TmdbClient {
    client: Client,
    api_key: String,
    language: String,
    region: Option<String>,
    genre_cache: RwLock<HashMap<MediaKind, Vec<Genre>>>,
}

#[derive(Debug, Deserialize)]
struct SearchResults<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieSearchResult {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvSearchResult {
    pub id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub first_air_date: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub popularity: Option<f64>,
}

impl Candidate for MovieSearchResult {
    fn title(&self) -> &str {
        &self.title
    }

    fn year(&self) -> Option<i32> {
        year_from_date(self.release_date.as_deref())
    }
}

impl Candidate for TvSearchResult {
    fn title(&self) -> &str {
        &self.name
    }

    fn year(&self) -> Option<i32> {
        year_from_date(self.first_air_date.as_deref())
    }
}

/// Movie or TV detail record. Movies fill `title`/`release_date`, shows `name`/`first_air_date`.
#[derive(Debug, Deserialize)]
pub struct TitleDetails {
    pub id: i64,
    pub title: Option<String>,
    pub name: Option<String>,
    pub original_title: Option<String>,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub genres: Option<Vec<Genre>>,
    pub seasons: Option<Vec<TvSeason>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Genre {
    #[serde(default)]
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GenreList {
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
pub struct TvSeason {
    pub season_number: u32,
    pub name: Option<String>,
    pub episode_count: Option<u32>,
    pub air_date: Option<String>,
}

/// Season details
#[derive(Debug, Deserialize)]
pub struct SeasonDetails {
    pub season_number: Option<u32>,
    pub episodes: Option<Vec<TmdbEpisode>>,
}

#[derive(Debug, Deserialize)]
pub struct TmdbEpisode {
    pub episode_number: u32,
    pub season_number: Option<u32>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub still_path: Option<String>,
}

/// Image sizes for different purposes
#[derive(Debug, Clone, Copy)]
pub enum ImageSize {
    /// w500 - poster
    Poster,
    /// w780 - backdrop
    Backdrop,
    /// w300 - episode still
    Still,
}

impl ImageSize {
    fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Poster => "w500",
            ImageSize::Backdrop => "w780",
            ImageSize::Still => "w300",
        }
    }
}

pub fn image_url(path: Option<&str>, size: ImageSize) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{}/{}{}", TMDB_IMAGE_BASE, size.as_str(), p))
}

fn insert_some(metadata: &mut Metadata, key: &str, value: Option<impl Into<serde_json::Value>>) {
    if let Some(value) = value {
        metadata.insert(key.to_string(), value.into());
    }
}

/// Convert a detail record into metadata. Search-hit fields fill detail gaps.
pub fn details_to_metadata(
    kind: MediaKind,
    details: &TitleDetails,
    fallback_overview: Option<&str>,
    fallback_poster: Option<&str>,
    fallback_backdrop: Option<&str>,
) -> Metadata {
    let mut metadata = Metadata::new();

    let title = details.title.clone().or_else(|| details.name.clone());
    insert_some(&mut metadata, "title", title.clone());
    insert_some(
        &mut metadata,
        "originaltitle",
        details
            .original_title
            .clone()
            .or_else(|| details.original_name.clone()),
    );
    insert_some(
        &mut metadata,
        "plot",
        details
            .overview
            .clone()
            .filter(|o| !o.is_empty())
            .or_else(|| fallback_overview.map(str::to_string)),
    );
    insert_some(
        &mut metadata,
        "poster",
        image_url(
            details.poster_path.as_deref().or(fallback_poster),
            ImageSize::Poster,
        ),
    );
    insert_some(
        &mut metadata,
        "fanart",
        image_url(
            details.backdrop_path.as_deref().or(fallback_backdrop),
            ImageSize::Backdrop,
        ),
    );
    insert_some(
        &mut metadata,
        "year",
        year_from_date(
            details
                .release_date
                .as_deref()
                .or(details.first_air_date.as_deref()),
        ),
    );

    let genres: Vec<String> = details
        .genres
        .iter()
        .flatten()
        .map(|g| g.name.clone())
        .filter(|g| !g.is_empty())
        .collect();
    metadata.insert("genres".to_string(), genres.into());

    insert_some(&mut metadata, "rating", details.vote_average);
    insert_some(&mut metadata, "votes", details.vote_count);
    metadata.insert("provider".to_string(), "TMDb".into());
    metadata.insert("id".to_string(), details.id.into());

    if kind == MediaKind::TvEpisode {
        insert_some(&mut metadata, "tvshowtitle", title);
    }

    metadata
}

/// Series structure from a TV detail record. Specials are dropped unless they are all there is.
pub fn details_to_series(details: &TitleDetails, fallback_name: &str) -> SeriesInfo {
    let all_seasons = details.seasons.as_deref().unwrap_or_default();
    let seasons = all_seasons
        .iter()
        .filter(|s| s.season_number != 0 || all_seasons.len() == 1)
        .map(|s| SeasonInfo {
            season_number: s.season_number,
            name: s
                .name
                .clone()
                .unwrap_or_else(|| format!("Série {}", s.season_number)),
            episode_count: s.episode_count,
            air_year: year_from_date(s.air_date.as_deref()),
        })
        .collect();

    SeriesInfo {
        provider: "tmdb".to_string(),
        id: details.id.to_string(),
        name: details
            .name
            .clone()
            .unwrap_or_else(|| fallback_name.to_string()),
        overview: details.overview.clone().filter(|o| !o.is_empty()),
        poster: image_url(details.poster_path.as_deref(), ImageSize::Poster),
        first_air_year: year_from_date(details.first_air_date.as_deref()),
        seasons,
    }
}

pub fn season_to_episodes(season: SeasonDetails, season_number: u32) -> Vec<EpisodeInfo> {
    season
        .episodes
        .unwrap_or_default()
        .into_iter()
        .map(|e| EpisodeInfo {
            season_number: e.season_number.or(season.season_number).unwrap_or(season_number),
            episode_number: e.episode_number,
            name: e
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Episode {}", e.episode_number)),
            overview: e.overview.filter(|o| !o.is_empty()),
            air_date: e.air_date,
            still: image_url(e.still_path.as_deref(), ImageSize::Still),
        })
        .collect()
}

/// Endpoint and extra parameters of a discovery list, `None` when the kind has no such list.
pub fn discovery_request(
    kind: MediaKind,
    list: DiscoveryList,
    page: u32,
    region: Option<&str>,
) -> Option<(&'static str, Vec<(&'static str, String)>)> {
    if !list.supports(kind) {
        return None;
    }

    let movie = kind == MediaKind::Movie;
    let (path, regional) = match list {
        DiscoveryList::Popular if movie => ("movie/popular", false),
        DiscoveryList::Popular => ("tv/popular", false),
        DiscoveryList::TopRated if movie => ("movie/top_rated", false),
        DiscoveryList::TopRated => ("tv/top_rated", false),
        DiscoveryList::NowPlaying => ("movie/now_playing", true),
        DiscoveryList::Upcoming => ("movie/upcoming", true),
        DiscoveryList::AiringToday => ("tv/airing_today", false),
        DiscoveryList::OnTheAir => ("tv/on_the_air", false),
        DiscoveryList::Genre(_) if movie => ("discover/movie", true),
        DiscoveryList::Genre(_) => ("discover/tv", false),
    };

    let mut params = vec![("page", page.to_string())];
    if let DiscoveryList::Genre(id) = list {
        params.push(("with_genres", id.to_string()));
        params.push(("sort_by", "popularity.desc".to_string()));
    }
    if regional {
        if let Some(region) = region {
            params.push(("region", region.to_string()));
        }
    }
    Some((path, params))
}

pub fn movie_to_discovered(movie: MovieSearchResult) -> DiscoveredTitle {
    DiscoveredTitle {
        provider: "tmdb".to_string(),
        id: movie.id,
        kind: MediaKind::Movie,
        year: year_from_date(movie.release_date.as_deref()),
        title: movie.title,
        original_title: movie.original_title,
        overview: movie.overview.filter(|o| !o.is_empty()),
        poster: image_url(movie.poster_path.as_deref(), ImageSize::Poster),
        fanart: image_url(movie.backdrop_path.as_deref(), ImageSize::Backdrop),
        rating: movie.vote_average,
        votes: movie.vote_count,
        popularity: movie.popularity,
    }
}

pub fn tv_to_discovered(show: TvSearchResult) -> DiscoveredTitle {
    DiscoveredTitle {
        provider: "tmdb".to_string(),
        id: show.id,
        kind: MediaKind::TvEpisode,
        year: year_from_date(show.first_air_date.as_deref()),
        title: show.name,
        original_title: show.original_name,
        overview: show.overview.filter(|o| !o.is_empty()),
        poster: image_url(show.poster_path.as_deref(), ImageSize::Poster),
        fanart: image_url(show.backdrop_path.as_deref(), ImageSize::Backdrop),
        rating: show.vote_average,
        votes: show.vote_count,
        popularity: show.popularity,
    }
}

impl TmdbClient {
    /// Create a new TMDB client
    pub fn new(api_key: String, config: &MetadataConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build TMDB HTTP client")?;

        Ok(Self {
            client,
            api_key,
            language: config.language.clone(),
            region: Some(config.region.clone()).filter(|r| !r.is_empty()),
            genre_cache: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}/{}?api_key={}&language={}",
            TMDB_API_BASE,
            path,
            self.api_key,
            urlencoding::encode(&self.language)
        );
        for (key, value) in params {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(self.url(path, params))
            .send()
            .await
            .with_context(|| format!("Failed to request TMDB {}", path))?
            .error_for_status()
            .with_context(|| format!("TMDB {} returned an error status", path))?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse TMDB {} response", path))
    }

    fn search_params(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", query.to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(region) = &self.region {
            params.push(("region", region.clone()));
        }
        params
    }

    /// Search for movies by name
    pub async fn search_movie(&self, query: &str, year: Option<i32>) -> Result<Vec<MovieSearchResult>> {
        let mut params = self.search_params(query);
        if let Some(y) = year {
            params.push(("year", y.to_string()));
        }
        let response: SearchResults<MovieSearchResult> = self.get("search/movie", &params).await?;
        Ok(response.results)
    }

    /// Search for TV shows by name
    pub async fn search_tv(&self, query: &str, year: Option<i32>) -> Result<Vec<TvSearchResult>> {
        let mut params = self.search_params(query);
        if let Some(y) = year {
            params.push(("first_air_date_year", y.to_string()));
        }
        let response: SearchResults<TvSearchResult> = self.get("search/tv", &params).await?;
        Ok(response.results)
    }

    pub async fn get_movie_details(&self, tmdb_id: i64) -> Result<TitleDetails> {
        self.get(&format!("movie/{}", tmdb_id), &[]).await
    }

    pub async fn get_tv_details(&self, tmdb_id: i64) -> Result<TitleDetails> {
        self.get(&format!("tv/{}", tmdb_id), &[]).await
    }

    /// Get season details including episode list
    pub async fn get_season_details(&self, tv_id: i64, season_number: u32) -> Result<SeasonDetails> {
        self.get(&format!("tv/{}/season/{}", tv_id, season_number), &[])
            .await
    }

    /// Genre list for a kind, cached in memory once non-empty.
    async fn genre_list(&self, kind: MediaKind) -> Result<Vec<Genre>> {
        if let Some(cached) = self.genre_cache.read().await.get(&kind) {
            return Ok(cached.clone());
        }

        let path = match kind {
            MediaKind::TvEpisode => "genre/tv/list",
            _ => "genre/movie/list",
        };
        let list: GenreList = self.get(path, &[]).await?;

        if !list.genres.is_empty() {
            self.genre_cache
                .write()
                .await
                .insert(kind, list.genres.clone());
        }
        Ok(list.genres)
    }
}

#[async_trait]
impl Enricher for TmdbClient {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    async fn enrich(&self, item: &MediaItem) -> Result<Option<Metadata>> {
        let metadata = match item.kind {
            MediaKind::Movie => {
                let results = self
                    .search_movie(&item.cleaned_title, item.guessed_year)
                    .await?;
                let Some(hit) = best_candidate(item, results) else {
                    return Ok(None);
                };
                let details = self.get_movie_details(hit.id).await?;
                details_to_metadata(
                    item.kind,
                    &details,
                    hit.overview.as_deref(),
                    hit.poster_path.as_deref(),
                    hit.backdrop_path.as_deref(),
                )
            }
            MediaKind::TvEpisode => {
                let results = self.search_tv(&item.cleaned_title, item.guessed_year).await?;
                let Some(hit) = best_candidate(item, results) else {
                    return Ok(None);
                };
                let details = self.get_tv_details(hit.id).await?;
                details_to_metadata(
                    item.kind,
                    &details,
                    hit.overview.as_deref(),
                    hit.poster_path.as_deref(),
                    hit.backdrop_path.as_deref(),
                )
            }
            MediaKind::Other => return Ok(None),
        };
        Ok(Some(metadata))
    }

    fn as_genre_lister(&self) -> Option<&dyn GenreLister> {
        Some(self)
    }

    fn as_season_lister(&self) -> Option<&dyn SeasonEpisodeLister> {
        Some(self)
    }

    fn as_discovery_lister(&self) -> Option<&dyn DiscoveryLister> {
        Some(self)
    }
}

#[async_trait]
impl GenreLister for TmdbClient {
    async fn genres(&self, kind: MediaKind) -> Result<Vec<String>> {
        let genres = self.genre_list(kind).await?;
        Ok(genres.into_iter().map(|g| g.name).collect())
    }
}

#[async_trait]
impl DiscoveryLister for TmdbClient {
    async fn discover(
        &self,
        kind: MediaKind,
        list: DiscoveryList,
        page: u32,
    ) -> Result<Vec<DiscoveredTitle>> {
        let Some((path, params)) = discovery_request(kind, list, page, self.region.as_deref())
        else {
            anyhow::bail!("TMDB has no {:?} list for {}", list, kind);
        };

        let titles: Vec<DiscoveredTitle> = if kind == MediaKind::Movie {
            let response: SearchResults<MovieSearchResult> = self.get(path, &params).await?;
            response.results.into_iter().map(movie_to_discovered).collect()
        } else {
            let response: SearchResults<TvSearchResult> = self.get(path, &params).await?;
            response.results.into_iter().map(tv_to_discovered).collect()
        };
        tracing::debug!("TMDB {} page {}: {} titles", path, page, titles.len());
        Ok(titles)
    }

    async fn genre_ids(&self, kind: MediaKind) -> Result<Vec<GenreRef>> {
        let genres = self.genre_list(kind).await?;
        Ok(genres
            .into_iter()
            .filter(|g| g.id != 0)
            .map(|g| GenreRef {
                id: g.id,
                name: g.name,
            })
            .collect())
    }
}

#[async_trait]
impl SeasonEpisodeLister for TmdbClient {
    async fn search_series(&self, name: &str) -> Result<Option<SeriesInfo>> {
        let mut first = None;
        for term in series_search_terms(name) {
            if let Some(hit) = self.search_tv(&term, None).await?.into_iter().next() {
                first = Some(hit);
                break;
            }
            tracing::debug!("TMDB has no series matching '{}'", term);
        }
        let Some(first) = first else {
            return Ok(None);
        };

        let details = self.get_tv_details(first.id).await?;
        let info = details_to_series(&details, name);
        tracing::info!(
            "TMDB series '{}' (id {}) has {} seasons",
            info.name,
            info.id,
            info.seasons.len()
        );
        Ok(Some(info))
    }

    async fn season_episodes(&self, series_id: &str, season: u32) -> Result<Vec<EpisodeInfo>> {
        let tv_id: i64 = series_id
            .parse()
            .with_context(|| format!("Invalid TMDB series id '{}'", series_id))?;
        let details = self.get_season_details(tv_id, season).await?;
        Ok(season_to_episodes(details, season))
    }
}

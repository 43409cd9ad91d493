// Catalog assembly: pulls raw pages from the upstream search source, classifies
// and filters them, and accumulates exactly one caller page of results.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use super::metadata::MetadataResolver;
use crate::config::CatalogConfig;
use crate::models::{
    CatalogPage, CatalogRequest, EpisodeInfo, MediaItem, MediaKind, Quality, RawFile, SortOrder,
};
use crate::parser::{self, build_media_item};

/// Largest page the upstream API accepts.
pub const MAX_CHUNK: u32 = 100;

/// Page size used by the series helpers.
const SERIES_PAGE_SIZE: u32 = 50;
const SEASON_EPISODE_LIMIT: usize = 20;

const GENRE_KEYWORDS: &[(&str, &[&str])] = &[
    ("action", &["action", "fight", "battle", "war", "combat"]),
    ("comedy", &["comedy", "funny", "humor", "laugh"]),
    ("drama", &["drama", "story", "life"]),
    ("horror", &["horror", "scary", "fear", "terror", "zombie"]),
    ("thriller", &["thriller", "suspense", "mystery"]),
    ("romance", &["love", "romance", "romantic"]),
    ("science fiction", &["sci-fi", "science fiction", "space", "future"]),
    ("fantasy", &["fantasy", "magic", "wizard", "dragon"]),
    ("animation", &["animated", "cartoon", "anime"]),
    ("documentary", &["documentary", "docu", "real story"]),
];

/// One upstream search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub what: String,
    pub sort: Option<SortOrder>,
    pub limit: u32,
    pub offset: u32,
}

/// One upstream result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub total: u32,
    pub files: Vec<RawFile>,
}

/// Paginated upstream search.
#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// Pull-based walk over upstream pages.
///
/// Owns the raw offset; every page handed out counts as fully consumed.
pub struct PageWalker<'a> {
    source: &'a dyn SearchSource,
    what: String,
    sort: Option<SortOrder>,
    default_chunk: u32,
    offset: u32,
    total: Option<u32>,
    exhausted: bool,
}

impl<'a> PageWalker<'a> {
    pub fn new(
        source: &'a dyn SearchSource,
        what: &str,
        sort: Option<SortOrder>,
        default_chunk: u32,
        start_offset: u32,
    ) -> Self {
        Self {
            source,
            what: what.to_string(),
            sort,
            default_chunk,
            offset: start_offset,
            total: None,
            exhausted: false,
        }
    }

    /// Fetch the next page sized for `need` more accepted items.
    /// Returns `None` once upstream is exhausted.
    pub async fn next_page(&mut self, need: u32) -> Result<Option<Vec<RawFile>>> {
        if self.exhausted {
            return Ok(None);
        }

        let query = SearchQuery {
            what: self.what.clone(),
            sort: self.sort,
            limit: need.max(self.default_chunk).clamp(1, MAX_CHUNK),
            offset: self.offset,
        };
        let page = self
            .source
            .search(&query)
            .await
            .with_context(|| format!("Upstream search failed at offset {}", self.offset))?;

        self.total = Some(page.total);
        if page.files.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        self.offset = self.offset.saturating_add(page.files.len() as u32);
        if self.offset >= page.total {
            self.exhausted = true;
        }
        Ok(Some(page.files))
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn total(&self) -> Option<u32> {
        self.total
    }
}

/// Filter thresholds, taken from the `[catalog]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub page_size: u32,
    pub min_movie_size: u64,
    pub min_episode_size: u64,
    pub min_movie_title_len: usize,
    pub enrich_results: bool,
}

impl From<&CatalogConfig> for CatalogSettings {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            page_size: config.effective_page_size(),
            min_movie_size: config.min_movie_size_mb * 1024 * 1024,
            min_episode_size: config.min_episode_size_mb * 1024 * 1024,
            min_movie_title_len: config.min_movie_title_len,
            enrich_results: config.enrich_results,
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self::from(&CatalogConfig::default())
    }
}

/// The filter predicate for one request.
pub struct CatalogFilter<'a> {
    request: &'a CatalogRequest,
    settings: &'a CatalogSettings,
}

impl<'a> CatalogFilter<'a> {
    pub fn new(request: &'a CatalogRequest, settings: &'a CatalogSettings) -> Self {
        Self { request, settings }
    }

    /// Every predicate except genre, which may need metadata first.
    pub fn accepts_base(&self, item: &MediaItem) -> bool {
        if item.kind == MediaKind::Other {
            return false;
        }

        let min_size = match self.request.kind {
            Some(MediaKind::Movie) => Some(self.settings.min_movie_size),
            Some(MediaKind::TvEpisode) => Some(self.settings.min_episode_size),
            _ => None,
        };
        if let (Some(min), Some(size)) = (min_size, item.size_bytes) {
            if size < min {
                return false;
            }
        }

        if item.kind == MediaKind::Movie
            && item.cleaned_title.trim().chars().count() < self.settings.min_movie_title_len
        {
            return false;
        }

        if let Some(kind) = self.request.kind {
            if item.kind != kind {
                return false;
            }
        }

        if let Some(letter) = self.request.letter.as_deref().filter(|l| !l.is_empty()) {
            if !matches_letter(&item.sort_title, letter) {
                return false;
            }
        }

        if let Some(quality) = self.request.quality {
            let hd_accepts_uhd = quality == Quality::Hd && item.quality == Quality::Uhd;
            if item.quality != quality && !hd_accepts_uhd {
                return false;
            }
        }

        if let Some(audio) = self.request.audio {
            if !item.audio_languages.contains(&audio) {
                return false;
            }
        }

        if let Some(subtitles) = self.request.subtitles {
            if !item.subtitle_languages.contains(&subtitles) {
                return false;
            }
        }

        true
    }

    pub fn accepts_genre(&self, item: &MediaItem) -> bool {
        match self.request.genre.as_deref() {
            Some(genre) if !genre.is_empty() => item_genres(item).contains(&genre.to_lowercase()),
            _ => true,
        }
    }

    #[cfg(test)]
    pub fn accepts(&self, item: &MediaItem) -> bool {
        self.accepts_base(item) && self.accepts_genre(item)
    }
}

fn matches_letter(sort_title: &str, letter: &str) -> bool {
    if letter == "0-9" {
        return sort_title.chars().next().is_some_and(|c| c.is_numeric());
    }
    sort_title.starts_with(&letter.to_lowercase())
}

/// Genres from metadata when present, else a keyword guess from the names.
pub fn item_genres(item: &MediaItem) -> Vec<String> {
    let genres = item.metadata_genres();
    if !genres.is_empty() {
        return genres;
    }

    let title = item.cleaned_title.to_lowercase();
    let filename = item.original_name.to_lowercase();
    GENRE_KEYWORDS
        .iter()
        .filter(|(_, keywords)| {
            keywords
                .iter()
                .any(|kw| title.contains(kw) || filename.contains(kw))
        })
        .map(|(genre, _)| genre.to_string())
        .collect()
}

/// Genre names the keyword fallback can recognise.
pub fn keyword_genres() -> Vec<String> {
    GENRE_KEYWORDS
        .iter()
        .map(|(genre, _)| genre.to_string())
        .collect()
}

/// Order alternative files of the same title: best quality first, then largest.
pub fn rank_streams(items: &mut [MediaItem]) {
    items.sort_by(|a, b| {
        b.quality_score()
            .cmp(&a.quality_score())
            .then_with(|| b.size_bytes.unwrap_or(0).cmp(&a.size_bytes.unwrap_or(0)))
    });
}

/// A series found in the catalog.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub name: String,
    pub preview_image: Option<String>,
    pub files_seen: usize,
}

/// Files of one episode, ranked best first.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeStreams {
    pub episode: Option<u32>,
    pub streams: Vec<MediaItem>,
}

pub struct Catalog {
    source: Arc<dyn SearchSource>,
    resolver: Option<Arc<MetadataResolver>>,
    settings: CatalogSettings,
}

impl Catalog {
    pub fn new(
        source: Arc<dyn SearchSource>,
        resolver: Option<Arc<MetadataResolver>>,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            source,
            resolver,
            settings,
        }
    }

    pub fn resolver(&self) -> Option<&MetadataResolver> {
        self.resolver.as_deref()
    }

    /// Assemble one page of filtered items.
    pub async fn fetch(&self, request: &CatalogRequest) -> Result<CatalogPage> {
        let limit = request.page_size.unwrap_or(self.settings.page_size);
        let start = request.start_offset;

        if limit == 0 {
            return self.probe(request).await;
        }

        let filter = CatalogFilter::new(request, &self.settings);
        let mut walker = PageWalker::new(
            self.source.as_ref(),
            &request.query,
            request.sort,
            self.settings.page_size,
            start,
        );
        let mut gathered: Vec<MediaItem> = Vec::with_capacity(limit as usize);

        while gathered.len() < limit as usize {
            let need = limit - gathered.len() as u32;
            let Some(files) = walker.next_page(need).await? else {
                break;
            };

            for raw in &files {
                let Some(mut item) = build_media_item(raw) else {
                    continue;
                };
                if !filter.accepts_base(&item) {
                    tracing::trace!("Rejected '{}'", item.original_name);
                    continue;
                }
                if self.settings.enrich_results {
                    if let Some(resolver) = &self.resolver {
                        resolver.enrich(&mut item).await;
                    }
                }
                if !filter.accepts_genre(&item) {
                    continue;
                }
                gathered.push(item);
                if gathered.len() >= limit as usize {
                    break;
                }
            }
        }

        let total = walker.total().unwrap_or(0);
        let next_offset = walker.offset();
        tracing::debug!(
            "Catalog page: {} items, offset {} -> {}, total {}",
            gathered.len(),
            start,
            next_offset,
            total
        );

        Ok(CatalogPage {
            items: gathered,
            next_offset,
            total,
            has_more: total > next_offset,
        })
    }

    async fn probe(&self, request: &CatalogRequest) -> Result<CatalogPage> {
        let query = SearchQuery {
            what: request.query.clone(),
            sort: request.sort,
            limit: 1,
            offset: request.start_offset,
        };
        let page = self
            .source
            .search(&query)
            .await
            .context("Upstream probe search failed")?;

        Ok(CatalogPage {
            items: Vec::new(),
            next_offset: request.start_offset,
            total: page.total,
            has_more: page.total > request.start_offset,
        })
    }

    async fn fetch_episodes(&self, query: String) -> Result<Vec<MediaItem>> {
        let request = CatalogRequest {
            kind: Some(MediaKind::TvEpisode),
            query,
            page_size: Some(SERIES_PAGE_SIZE),
            ..CatalogRequest::default()
        };
        Ok(self.fetch(&request).await?.items)
    }

    /// Unique series names among episodes matching `query`.
    pub async fn search_series(&self, query: &str) -> Result<Vec<SeriesSummary>> {
        let items = self.fetch_episodes(query.to_string()).await?;

        let mut by_name: BTreeMap<String, SeriesSummary> = BTreeMap::new();
        for item in &items {
            let name = parser::series_name(item);
            let entry = by_name
                .entry(name.to_lowercase())
                .or_insert_with(|| SeriesSummary {
                    name,
                    preview_image: None,
                    files_seen: 0,
                });
            entry.files_seen += 1;
            if entry.preview_image.is_none() {
                entry.preview_image = item.preview_image.clone();
            }
        }

        Ok(by_name.into_values().collect())
    }

    /// Season numbers of a series: provider data first, then a catalog sample.
    pub async fn discover_seasons(&self, series: &str) -> Result<Vec<u32>> {
        if let Some(resolver) = &self.resolver {
            if let Some(info) = resolver.series_info(series).await {
                let seasons: Vec<u32> = info
                    .seasons
                    .iter()
                    .map(|s| s.season_number)
                    .filter(|n| *n > 0)
                    .collect();
                if !seasons.is_empty() {
                    return Ok(seasons);
                }
            }
        }

        let mut found = BTreeSet::new();
        for term in [
            series.to_string(),
            format!("{} S01", series),
            format!("{} série", series),
        ] {
            let items = match self.fetch_episodes(term.clone()).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Season discovery query '{}' failed: {:#}", term, e);
                    continue;
                }
            };
            for item in items
                .iter()
                .filter(|item| same_series(item, series))
            {
                found.insert(parser::season_number(item).unwrap_or(1));
            }
            if found.len() >= 3 {
                break;
            }
        }

        if found.is_empty() {
            found.insert(1);
        }
        Ok(found.into_iter().collect())
    }

    /// Files of one season, deduplicated by ident and ordered by episode.
    pub async fn season_episodes(&self, series: &str, season: u32) -> Result<Vec<MediaItem>> {
        let patterns = [
            format!("{} S{:02}", series, season),
            format!("{} S{}", series, season),
            format!("{} série {}", series, season),
            format!("{} season {}", series, season),
        ];

        let mut seen = HashSet::new();
        let mut episodes = Vec::new();
        for pattern in patterns {
            let items = match self.fetch_episodes(pattern.clone()).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Episode search '{}' failed: {:#}", pattern, e);
                    continue;
                }
            };
            for item in items {
                if same_series(&item, series)
                    && parser::season_number(&item) == Some(season)
                    && seen.insert(item.ident.clone())
                {
                    episodes.push(item);
                }
            }
            if episodes.len() >= SEASON_EPISODE_LIMIT {
                break;
            }
        }

        episodes.sort_by_key(|item| {
            (
                parser::episode_number(item).unwrap_or(u32::MAX),
                item.ident.clone(),
            )
        });
        episodes.truncate(SEASON_EPISODE_LIMIT);
        Ok(episodes)
    }

    /// Provider episode guide for one season, when a provider knows the series.
    pub async fn episode_guide(&self, series: &str, season: u32) -> Option<Vec<EpisodeInfo>> {
        let resolver = self.resolver.as_ref()?;
        let info = resolver.series_info(series).await?;
        resolver.season_episodes(&info, season).await
    }

    /// Season files grouped by episode number, each group ranked best first.
    pub async fn season_streams(&self, series: &str, season: u32) -> Result<Vec<EpisodeStreams>> {
        let episodes = self.season_episodes(series, season).await?;
        Ok(group_by_episode(episodes))
    }
}

fn same_series(item: &MediaItem, series: &str) -> bool {
    parser::series_name(item).to_lowercase() == series.trim().to_lowercase()
}

pub fn group_by_episode(items: Vec<MediaItem>) -> Vec<EpisodeStreams> {
    let mut groups: BTreeMap<Option<u32>, Vec<MediaItem>> = BTreeMap::new();
    for item in items {
        groups
            .entry(parser::episode_number(&item))
            .or_default()
            .push(item);
    }

    // Episodes without a number sort last
    let mut result: Vec<EpisodeStreams> = groups
        .into_iter()
        .map(|(episode, mut streams)| {
            rank_streams(&mut streams);
            EpisodeStreams { episode, streams }
        })
        .collect();
    result.sort_by_key(|group| group.episode.unwrap_or(u32::MAX));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, Metadata, SeasonInfo, SeriesInfo};
    use crate::services::cache::MemoryMetadataCache;
    use crate::services::metadata::{Enricher, SeasonEpisodeLister};
    use std::sync::Mutex;

    const MIB: u64 = 1024 * 1024;

    fn file(ident: &str, name: &str, size: u64) -> RawFile {
        RawFile {
            ident: Some(ident.to_string()),
            name: Some(name.to_string()),
            size: Some(size.to_string()),
            ..RawFile::default()
        }
    }

    /// In-memory upstream: slices a fixed record list by offset/limit.
    struct FakeSource {
        records: Vec<RawFile>,
        reported_total: Option<u32>,
        calls: Mutex<Vec<SearchQuery>>,
    }

    impl FakeSource {
        fn new(records: Vec<RawFile>) -> Self {
            Self {
                records,
                reported_total: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<SearchQuery> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchSource for FakeSource {
        async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
            self.calls.lock().unwrap().push(query.clone());
            let start = (query.offset as usize).min(self.records.len());
            let end = (start + query.limit as usize).min(self.records.len());
            Ok(SearchPage {
                total: self
                    .reported_total
                    .unwrap_or(self.records.len() as u32),
                files: self.records[start..end].to_vec(),
            })
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SearchSource for FailingSource {
        async fn search(&self, _query: &SearchQuery) -> Result<SearchPage> {
            anyhow::bail!("connection refused")
        }
    }

    fn settings(page_size: u32) -> CatalogSettings {
        CatalogSettings {
            page_size,
            min_movie_size: 100 * MIB,
            min_episode_size: 50 * MIB,
            min_movie_title_len: 3,
            enrich_results: true,
        }
    }

    fn catalog(source: Arc<FakeSource>, page_size: u32) -> Catalog {
        Catalog::new(source, None, settings(page_size))
    }

    fn mixed_records() -> Vec<RawFile> {
        vec![
            file("m1", "Awesome.Movie.2021.1080p.BluRay.x264.CZ-ENG.DTS-GROUP.mkv", 8 * 1024 * MIB),
            file("t1", "A.Movie.Trailer.mkv", 40 * MIB),
            file("m2", "Second.Film.2019.720p.CZ.mkv", 2 * 1024 * MIB),
            file("e1", "Some.Show.S01E01.720p.mkv", 400 * MIB),
            file("t2", "Sample.Clip.mkv", 5 * MIB),
            file("m3", "Third.Movie.2018.2160p.EN.mkv", 20 * 1024 * MIB),
            file("m4", "Fourth.Movie.2017.DVDRip.mkv", 700 * MIB),
            file("e2", "Some.Show.S01E02.720p.mkv", 380 * MIB),
        ]
    }

    fn idents(page: &CatalogPage) -> Vec<&str> {
        page.items.iter().map(|i| i.ident.as_str()).collect()
    }

    #[tokio::test]
    async fn test_fetch_fills_page_without_other_items() {
        let source = Arc::new(FakeSource::new(mixed_records()));
        let catalog = catalog(source.clone(), 4);

        let page = catalog
            .fetch(&CatalogRequest {
                page_size: Some(4),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(idents(&page), vec!["m1", "m2", "e1", "m3"]);
        assert!(page.items.iter().all(|i| i.kind != MediaKind::Other));
        // Two whole upstream pages of 4 were consumed
        assert_eq!(page.next_offset, 8);
        assert_eq!(page.total, 8);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_next_offset_counts_whole_pages() {
        let source = Arc::new(FakeSource::new(mixed_records()));
        let catalog = catalog(source.clone(), 4);

        let page = catalog
            .fetch(&CatalogRequest {
                page_size: Some(2),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(idents(&page), vec!["m1", "m2"]);
        assert_eq!(page.next_offset, 4);
        assert!(page.has_more);

        let next = catalog
            .fetch(&CatalogRequest {
                page_size: Some(2),
                start_offset: page.next_offset,
                ..CatalogRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(idents(&next), vec!["e1", "m3"]);
        assert_eq!(next.next_offset, 8);
        assert!(!next.has_more);
    }

    #[tokio::test]
    async fn test_chunk_size_follows_remaining_need() {
        let records: Vec<RawFile> = (0..300)
            .map(|i| file(&format!("x{i}"), &format!("Trailer.{i}.mkv"), MIB))
            .collect();
        let source = Arc::new(FakeSource::new(records));
        let catalog = catalog(source.clone(), 40);

        let page = catalog
            .fetch(&CatalogRequest {
                page_size: Some(150),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.next_offset, 300);
        let limits: Vec<u32> = source.calls().iter().map(|c| c.limit).collect();
        assert_eq!(limits, vec![100, 100, 100]);
    }

    #[tokio::test]
    async fn test_default_chunk_is_lower_bound() {
        let source = Arc::new(FakeSource::new(mixed_records()));
        let catalog = catalog(source.clone(), 40);

        catalog
            .fetch(&CatalogRequest {
                page_size: Some(1),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(source.calls()[0].limit, 40);
    }

    #[tokio::test]
    async fn test_empty_upstream_page_terminates() {
        let mut source = FakeSource::new(vec![file("m1", "Good.Movie.2020.mkv", 900 * MIB)]);
        source.reported_total = Some(500);
        let source = Arc::new(source);
        let catalog = catalog(source.clone(), 20);

        let page = catalog
            .fetch(&CatalogRequest {
                page_size: Some(10),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(idents(&page), vec!["m1"]);
        assert_eq!(page.next_offset, 1);
        assert_eq!(page.total, 500);
        assert!(page.has_more);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_page_size_probes_without_advancing() {
        let source = Arc::new(FakeSource::new(mixed_records()));
        let catalog = catalog(source.clone(), 40);

        let page = catalog
            .fetch(&CatalogRequest {
                page_size: Some(0),
                start_offset: 3,
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.next_offset, 3);
        assert_eq!(page.total, 8);
        assert!(page.has_more);
        assert_eq!(source.calls()[0].limit, 1);

        let page = catalog
            .fetch(&CatalogRequest {
                page_size: Some(0),
                start_offset: 8,
                ..CatalogRequest::default()
            })
            .await
            .unwrap();
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let catalog = Catalog::new(Arc::new(FailingSource), None, settings(40));
        let err = catalog.fetch(&CatalogRequest::default()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[tokio::test]
    async fn test_kind_filter_and_size_threshold() {
        let records = vec![
            file("big", "Big.Movie.2020.mkv", 900 * MIB),
            file("small", "Small.Movie.2020.mkv", 20 * MIB),
            file("ep", "Show.S01E01.mkv", 60 * MIB),
            file("tiny-ep", "Show.S01E02.mkv", 10 * MIB),
            RawFile {
                size: None,
                ..file("unknown", "Unknown.Size.Movie.2020.mkv", 0)
            },
        ];
        let source = Arc::new(FakeSource::new(records));
        let catalog = catalog(source, 40);

        let movies = catalog
            .fetch(&CatalogRequest {
                kind: Some(MediaKind::Movie),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(idents(&movies), vec!["big", "unknown"]);

        let episodes = catalog
            .fetch(&CatalogRequest {
                kind: Some(MediaKind::TvEpisode),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(idents(&episodes), vec!["ep"]);
    }

    fn item(name: &str) -> MediaItem {
        build_media_item(&file("id", name, 900 * MIB)).unwrap()
    }

    #[test]
    fn test_letter_filter() {
        let settings = settings(40);
        let digits = CatalogRequest {
            letter: Some("0-9".to_string()),
            ..CatalogRequest::default()
        };
        let filter = CatalogFilter::new(&digits, &settings);
        assert!(filter.accepts(&item("300.Rise.of.an.Empire.2014.mkv")));
        assert!(!filter.accepts(&item("Alien.1979.mkv")));

        let letter_m = CatalogRequest {
            letter: Some("M".to_string()),
            ..CatalogRequest::default()
        };
        let filter = CatalogFilter::new(&letter_m, &settings);
        // Leading article is ignored by the sort key
        assert!(filter.accepts(&item("The.Matrix.1999.mkv")));
        assert!(!filter.accepts(&item("Alien.1979.mkv")));
    }

    #[test]
    fn test_quality_filter_hd_accepts_uhd() {
        let settings = settings(40);
        let hd = CatalogRequest {
            quality: Some(Quality::Hd),
            ..CatalogRequest::default()
        };
        let filter = CatalogFilter::new(&hd, &settings);
        assert!(filter.accepts(&item("Film.2020.1080p.mkv")));
        assert!(filter.accepts(&item("Film.2020.2160p.mkv")));
        assert!(!filter.accepts(&item("Film.2020.DVDRip.mkv")));

        let uhd = CatalogRequest {
            quality: Some(Quality::Uhd),
            ..CatalogRequest::default()
        };
        let filter = CatalogFilter::new(&uhd, &settings);
        assert!(!filter.accepts(&item("Film.2020.1080p.mkv")));
    }

    #[test]
    fn test_language_filters() {
        let settings = settings(40);
        let request = CatalogRequest {
            audio: Some(Language::Cz),
            subtitles: Some(Language::En),
            ..CatalogRequest::default()
        };
        let filter = CatalogFilter::new(&request, &settings);
        assert!(filter.accepts(&item("Film.2020.CZ.dabing.engsub.mkv")));
        assert!(!filter.accepts(&item("Film.2020.CZ.dabing.mkv")));
        assert!(!filter.accepts(&item("Film.2020.engsub.mkv")));
    }

    #[test]
    fn test_short_movie_titles_rejected() {
        let settings = settings(40);
        let request = CatalogRequest::default();
        let filter = CatalogFilter::new(&request, &settings);
        assert!(!filter.accepts(&item("XY.2020.1080p.mkv")));
        assert!(filter.accepts(&item("XYZ.2020.1080p.mkv")));
    }

    #[test]
    fn test_genre_keyword_fallback_and_metadata_priority() {
        let settings = settings(40);
        let request = CatalogRequest {
            genre: Some("Horror".to_string()),
            ..CatalogRequest::default()
        };
        let filter = CatalogFilter::new(&request, &settings);
        assert!(filter.accepts(&item("Zombie.Land.2009.mkv")));
        assert!(!filter.accepts(&item("Quiet.Garden.2009.mkv")));

        // Metadata genres replace the keyword guess entirely
        let mut tagged = item("Zombie.Land.2009.mkv");
        let mut metadata = Metadata::new();
        metadata.insert("genres".to_string(), serde_json::json!(["Comedy"]));
        tagged.apply_metadata(&metadata);
        assert!(!filter.accepts(&tagged));
    }

    #[test]
    fn test_rank_streams() {
        let mut items = vec![
            build_media_item(&file("sd", "Film.2020.DVDRip.mkv", 700 * MIB)).unwrap(),
            build_media_item(&file("hd-small", "Film.2020.720p.mkv", 1024 * MIB)).unwrap(),
            build_media_item(&file("hd-big", "Film.2020.1080p.mkv", 4096 * MIB)).unwrap(),
            build_media_item(&file("uhd", "Film.2020.2160p.mkv", 9000 * MIB)).unwrap(),
        ];
        rank_streams(&mut items);
        let order: Vec<&str> = items.iter().map(|i| i.ident.as_str()).collect();
        assert_eq!(order, vec!["uhd", "hd-big", "hd-small", "sd"]);
    }

    struct GenreEnricher;

    #[async_trait]
    impl Enricher for GenreEnricher {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn enrich(&self, _item: &MediaItem) -> Result<Option<Metadata>> {
            let mut metadata = Metadata::new();
            metadata.insert("genres".to_string(), serde_json::json!(["Drama"]));
            Ok(Some(metadata))
        }
    }

    #[tokio::test]
    async fn test_fetch_enriches_before_genre_filter() {
        let source = Arc::new(FakeSource::new(vec![
            file("m1", "Quiet.Garden.2009.mkv", 900 * MIB),
            file("t1", "Quiet.Garden.Trailer.mkv", 900 * MIB),
        ]));
        let resolver = MetadataResolver::new(
            vec![Arc::new(GenreEnricher) as Arc<dyn Enricher>],
            Arc::new(MemoryMetadataCache::new(None)),
            None,
        );
        let catalog = Catalog::new(source, Some(Arc::new(resolver)), settings(40));

        let page = catalog
            .fetch(&CatalogRequest {
                genre: Some("drama".to_string()),
                ..CatalogRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(idents(&page), vec!["m1"]);
        assert_eq!(page.items[0].metadata["title"], "Quiet Garden");
    }

    struct SeasonProvider;

    #[async_trait]
    impl Enricher for SeasonProvider {
        fn name(&self) -> &'static str {
            "seasons"
        }

        async fn enrich(&self, _item: &MediaItem) -> Result<Option<Metadata>> {
            Ok(None)
        }

        fn as_season_lister(&self) -> Option<&dyn SeasonEpisodeLister> {
            Some(self)
        }
    }

    #[async_trait]
    impl SeasonEpisodeLister for SeasonProvider {
        async fn search_series(&self, name: &str) -> Result<Option<SeriesInfo>> {
            let season = |n: u32| SeasonInfo {
                season_number: n,
                name: format!("Série {}", n),
                episode_count: None,
                air_year: None,
            };
            Ok(Some(SeriesInfo {
                provider: "seasons".to_string(),
                id: "7".to_string(),
                name: name.to_string(),
                overview: None,
                poster: None,
                first_air_year: None,
                seasons: vec![season(0), season(1), season(2), season(3)],
            }))
        }

        async fn season_episodes(&self, _series_id: &str, season: u32) -> Result<Vec<EpisodeInfo>> {
            Ok((1..=2)
                .map(|n| EpisodeInfo {
                    season_number: season,
                    episode_number: n,
                    name: format!("Díl {}", n),
                    overview: None,
                    air_date: None,
                    still: None,
                })
                .collect())
        }
    }

    fn provider_catalog(source: Arc<FakeSource>) -> Catalog {
        let resolver = MetadataResolver::new(
            vec![Arc::new(SeasonProvider) as Arc<dyn Enricher>],
            Arc::new(MemoryMetadataCache::new(None)),
            None,
        );
        Catalog::new(source, Some(Arc::new(resolver)), settings(40))
    }

    #[tokio::test]
    async fn test_provider_seasons_skip_specials_and_catalog() {
        let source = Arc::new(FakeSource::new(series_records()));
        let catalog = provider_catalog(source.clone());

        assert_eq!(catalog.discover_seasons("Some Show").await.unwrap(), vec![1, 2, 3]);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_episode_guide() {
        let catalog = provider_catalog(Arc::new(FakeSource::new(Vec::new())));
        let guide = catalog.episode_guide("Some Show", 2).await.unwrap();
        assert_eq!(guide.len(), 2);
        assert_eq!(guide[1].season_number, 2);
        assert_eq!(guide[1].name, "Díl 2");

        let plain = catalog_without_provider();
        assert!(plain.episode_guide("Some Show", 2).await.is_none());
    }

    fn catalog_without_provider() -> Catalog {
        catalog(Arc::new(FakeSource::new(Vec::new())), 40)
    }

    fn series_records() -> Vec<RawFile> {
        vec![
            file("a2", "Some.Show.S01E02.720p.mkv", 400 * MIB),
            file("a1", "Some.Show.S01E01.720p.mkv", 400 * MIB),
            file("a1-hd", "Some.Show.S01E01.1080p.mkv", 900 * MIB),
            file("b1", "Some.Show.S02E01.720p.mkv", 400 * MIB),
            file("c1", "Other.Show.S01E01.720p.mkv", 400 * MIB),
            file("m1", "Some.Movie.2020.mkv", 900 * MIB),
        ]
    }

    #[tokio::test]
    async fn test_search_series() {
        let source = Arc::new(FakeSource::new(series_records()));
        let catalog = catalog(source, 40);

        let series = catalog.search_series("show").await.unwrap();
        let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Other Show", "Some Show"]);
        assert_eq!(series[1].files_seen, 4);
    }

    #[tokio::test]
    async fn test_discover_seasons_from_catalog() {
        let source = Arc::new(FakeSource::new(series_records()));
        let catalog = catalog(source, 40);

        assert_eq!(catalog.discover_seasons("Some Show").await.unwrap(), vec![1, 2]);
        assert_eq!(catalog.discover_seasons("Missing").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_season_episodes_dedupes_and_orders() {
        let source = Arc::new(FakeSource::new(series_records()));
        let catalog = catalog(source.clone(), 40);

        let episodes = catalog.season_episodes("some show", 1).await.unwrap();
        let order: Vec<&str> = episodes.iter().map(|i| i.ident.as_str()).collect();
        assert_eq!(order, vec!["a1", "a1-hd", "a2"]);
        // All four targeted queries ran since fewer than 20 episodes were found
        assert_eq!(source.calls().len(), 4);

        let grouped = catalog.season_streams("Some Show", 1).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].episode, Some(1));
        assert_eq!(grouped[0].streams[0].ident, "a1-hd");
    }

    #[tokio::test]
    async fn test_season_episodes_capped_after_large_page() {
        let records: Vec<RawFile> = (1..=30)
            .map(|e| file(&format!("e{:02}", e), &format!("Long.Show.S01E{:02}.mkv", e), 400 * MIB))
            .collect();
        let source = Arc::new(FakeSource::new(records));
        let catalog = catalog(source.clone(), 40);

        let episodes = catalog.season_episodes("Long Show", 1).await.unwrap();
        assert_eq!(episodes.len(), SEASON_EPISODE_LIMIT);
        assert_eq!(episodes[0].ident, "e01");
        assert_eq!(episodes[19].ident, "e20");
        // One page already exceeded the limit
        assert_eq!(source.calls().len(), 1);
    }
}

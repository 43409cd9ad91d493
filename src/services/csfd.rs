// ČSFD metadata provider
// Scrapes the public search and title pages; no API exists.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use super::metadata::{best_candidate, series_search_terms, Candidate, Enricher, SeasonEpisodeLister};
use crate::config::MetadataConfig;
use crate::models::{EpisodeInfo, MediaItem, MediaKind, Metadata, SeasonInfo, SeriesInfo};

const CSFD_BASE: &str = "https://www.csfd.cz";

static RE_SECTION_FILMS: LazyLock<Regex> = LazyLock::new(|| section_regex("films"));
static RE_SECTION_SERIES: LazyLock<Regex> = LazyLock::new(|| section_regex("series"));
static RE_ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<article class="article.*?</article>"#).unwrap());
static RE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="film-title-name">([^<]+)</a>"#).unwrap());
static RE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a href="(/(?:film|serial)/[^"]+)""#).unwrap());
static RE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<span class="info">\((\d{4})\)</span>"#).unwrap());
static RE_CARD_GENRES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<p class="film-origins-genres"><span class="info">([^<]+)</span></p>"#).unwrap()
});
static RE_IMG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img[^>]+src="([^"]+)""#).unwrap());
static RE_RATING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div class="film-rating-average">\s*(\d+)%"#).unwrap());
static RE_ORIGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<div class="origin">([^<]+)</div>"#).unwrap());
static RE_ORIGIN_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
static RE_JSONLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script type="application/ld\+json">([^<]+)</script>"#).unwrap()
});
static RE_PLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div class="plot-preview">(.*?)</div>"#).unwrap());
static RE_GENRES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div class="genres">(.*?)</div>"#).unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Series links on a search page, most specific first
static RE_SERIES_LINKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?is)<a href="(/serial/[^"]+)".*?class="film-title-name">([^<]+)</a>"#,
        r#"(?is)<a href="(/film/[^"]+)".*?class="film-title-name">([^<]+)</a>.*?seriál"#,
        r#"(?is)<a href="(/film/[^"]+)".*?<span[^>]*>([^<]+)</span>.*?(?:série|season)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});
static RE_ANY_TITLE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a href="(/(?:film|serial)/[^"]+)".*?class="film-title-name">([^<]+)</a>"#)
        .unwrap()
});
static RE_SERIES_YEARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<span class="info">\((\d{4})[-–]?(\d{4})?\)</span>"#).unwrap());
static RE_SEASON_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a[^>]*href="[^"]*serie-\d+[^"]*"[^>]*>.*?Série\s*(\d+)"#).unwrap()
});
static RE_SEASON_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Série|Season)\s*(\d+)").unwrap());
static RE_EPISODE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,2})E(\d{1,3})(?:[^>]*>([^<]+))?").unwrap());

const SERIES_INDICATORS: &[&str] = &[
    "seriál", "série", "season", "episode", "epizoda", "s01e", "s02e", "s03e",
];
/// Only the head of a title page is checked for series indicators.
const INDICATOR_WINDOW: usize = 2000;
/// Loose title links tried when no series link matched.
const LOOSE_LINK_LIMIT: usize = 3;

fn section_regex(kind: &str) -> Regex {
    Regex::new(&format!(
        r#"(?s)<section class="main-box" data-search-results="{}".*?<div id="snippet--container[^>]+>(?P<body>.*?)</section>"#,
        kind
    ))
    .unwrap()
}

fn strip_tags(html: &str) -> String {
    let text = RE_TAG.replace_all(html, "");
    RE_WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn split_genres(text: &str) -> Vec<String> {
    strip_tags(text)
        .split('/')
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

/// One search result card.
#[derive(Debug, Clone, PartialEq)]
pub struct CsfdCandidate {
    pub title: String,
    pub href: String,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub genres: Vec<String>,
}

impl Candidate for CsfdCandidate {
    fn title(&self) -> &str {
        &self.title
    }

    fn year(&self) -> Option<i32> {
        self.year
    }
}

/// Fields scraped from a title page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsfdDetail {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub plot: Option<String>,
    pub year: Option<i32>,
    /// 0-10 scale
    pub rating: Option<f64>,
    pub votes: Option<i64>,
    pub poster: Option<String>,
    pub origin: Option<String>,
    pub genres: Vec<String>,
}

fn parse_article(article: &str) -> Option<CsfdCandidate> {
    let title = RE_TITLE.captures(article)?.get(1)?.as_str().trim().to_string();
    let href = RE_HREF.captures(article)?.get(1)?.as_str().to_string();

    let year = RE_YEAR
        .captures(article)
        .and_then(|c| c[1].parse().ok());
    let poster = RE_IMG.captures(article).map(|c| {
        let src = &c[1];
        match src.strip_prefix("//") {
            Some(rest) => format!("https://{}", rest),
            None => src.to_string(),
        }
    });
    let genres = RE_CARD_GENRES
        .captures(article)
        .map(|c| split_genres(&c[1]))
        .unwrap_or_default();

    Some(CsfdCandidate {
        title,
        href,
        year,
        poster,
        genres,
    })
}

/// Result cards of the films or series section of a search page.
pub fn parse_search(html: &str, kind: MediaKind) -> Vec<CsfdCandidate> {
    let section = match kind {
        MediaKind::TvEpisode => &RE_SECTION_SERIES,
        _ => &RE_SECTION_FILMS,
    };
    let Some(body) = section.captures(html).and_then(|c| c.name("body")) else {
        return Vec::new();
    };

    RE_ARTICLE
        .find_iter(body.as_str())
        .filter_map(|m| parse_article(m.as_str()))
        .collect()
}

fn apply_json_ld(detail: &mut CsfdDetail, raw: &str) {
    let data: serde_json::Value = match serde_json::from_str(raw.trim()) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("ČSFD JSON-LD parse failed: {}", e);
            return;
        }
    };
    if !data.is_object() {
        return;
    }

    let text = |key: &str| data.get(key).and_then(|v| v.as_str()).map(str::to_string);
    detail.title = text("name");
    detail.description = text("description");
    detail.poster = text("image");
    detail.year = data
        .get("dateCreated")
        .or_else(|| data.get("datePublished"))
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_i64().map(|y| y.to_string()),
            serde_json::Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .and_then(|s| s.get(..4).and_then(|y| y.parse().ok()));

    if let Some(rating) = data.get("aggregateRating") {
        detail.rating = rating
            .get("ratingValue")
            .and_then(number_or_string)
            .map(|v| v / 10.0);
        detail.votes = rating
            .get("ratingCount")
            .and_then(number_or_string)
            .map(|v| v as i64);
    }
}

fn number_or_string(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a title page. JSON-LD wins, page markup fills the gaps.
pub fn parse_detail(html: &str, url: &str) -> CsfdDetail {
    let mut detail = CsfdDetail {
        url: url.to_string(),
        ..CsfdDetail::default()
    };

    if let Some(c) = RE_JSONLD.captures(html) {
        apply_json_ld(&mut detail, &c[1]);
    }

    if detail.rating.is_none() {
        detail.rating = RE_RATING
            .captures(html)
            .and_then(|c| c[1].parse::<f64>().ok())
            .map(|v| v / 10.0);
    }

    if let Some(c) = RE_ORIGIN.captures(html) {
        let origin = strip_tags(&c[1]);
        if detail.year.is_none() {
            detail.year = RE_ORIGIN_YEAR
                .find(&origin)
                .and_then(|m| m.as_str().parse().ok());
        }
        detail.origin = Some(origin);
    }

    detail.plot = RE_PLOT
        .captures(html)
        .map(|c| strip_tags(&c[1]))
        .filter(|p| !p.is_empty());
    detail.genres = RE_GENRES
        .captures(html)
        .map(|c| split_genres(&c[1]))
        .unwrap_or_default();

    detail
}

/// Combine a search card and its title page.
pub fn to_metadata(candidate: &CsfdCandidate, detail: &CsfdDetail) -> Metadata {
    let mut metadata = Metadata::new();
    let mut put = |key: &str, value: Option<serde_json::Value>| {
        if let Some(value) = value {
            metadata.insert(key.to_string(), value);
        }
    };

    let poster = detail.poster.clone().or_else(|| candidate.poster.clone());
    let genres = if detail.genres.is_empty() {
        &candidate.genres
    } else {
        &detail.genres
    };

    put(
        "title",
        Some(detail.title.clone().unwrap_or_else(|| candidate.title.clone()).into()),
    );
    put(
        "plot",
        detail
            .plot
            .clone()
            .or_else(|| detail.description.clone())
            .map(Into::into),
    );
    put("poster", poster.clone().map(Into::into));
    put("fanart", poster.map(Into::into));
    put("year", detail.year.or(candidate.year).map(Into::into));
    put("genres", Some(genres.clone().into()));
    put("rating", detail.rating.map(Into::into));
    put("votes", detail.votes.map(Into::into));
    put("country", detail.origin.clone().map(Into::into));
    put("provider", Some("ČSFD".into()));
    put("url", Some(detail.url.clone().into()));

    metadata
}

/// Title link found on a search page.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesLink {
    pub href: String,
    pub title: String,
}

/// First link matching one of the series patterns.
pub fn find_series_link(html: &str) -> Option<SeriesLink> {
    RE_SERIES_LINKS.iter().find_map(|re| {
        re.captures(html).map(|c| SeriesLink {
            href: c[1].to_string(),
            title: c[2].trim().to_string(),
        })
    })
}

/// The first few title links of a search page, whatever their type.
pub fn title_links(html: &str) -> Vec<SeriesLink> {
    RE_ANY_TITLE_LINK
        .captures_iter(html)
        .take(LOOSE_LINK_LIMIT)
        .map(|c| SeriesLink {
            href: c[1].to_string(),
            title: c[2].trim().to_string(),
        })
        .collect()
}

/// Whether the head of a title page mentions seasons or episodes.
pub fn looks_like_series(html: &str) -> bool {
    let head: String = html.chars().take(INDICATOR_WINDOW).collect::<String>().to_lowercase();
    SERIES_INDICATORS.iter().any(|marker| head.contains(marker))
}

fn season(number: u32, episode_count: Option<u32>) -> SeasonInfo {
    SeasonInfo {
        season_number: number,
        name: format!("Série {}", number),
        episode_count,
        air_year: None,
    }
}

/// Seasons of a series page: season links, then season mentions, then episode codes.
/// A detected series always has at least season 1.
pub fn parse_seasons(html: &str) -> Vec<SeasonInfo> {
    let numbers = |re: &Regex| -> Vec<u32> {
        let mut found: Vec<u32> = re
            .captures_iter(html)
            .filter_map(|c| c[1].parse().ok())
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    };

    let linked = numbers(&*RE_SEASON_LINK);
    if !linked.is_empty() {
        return linked.into_iter().map(|n| season(n, None)).collect();
    }

    let mentioned = numbers(&*RE_SEASON_TEXT);
    if !mentioned.is_empty() {
        return mentioned.into_iter().map(|n| season(n, None)).collect();
    }

    let mut coded: BTreeMap<u32, u32> = BTreeMap::new();
    for c in RE_EPISODE_CODE.captures_iter(html) {
        if let Ok(number) = c[1].parse() {
            *coded.entry(number).or_default() += 1;
        }
    }
    if !coded.is_empty() {
        return coded
            .into_iter()
            .map(|(number, count)| season(number, Some(count)))
            .collect();
    }

    vec![season(1, None)]
}

/// Series structure from a series page. The id is the page path.
pub fn parse_series_page(html: &str, link: &SeriesLink) -> SeriesInfo {
    let seasons = parse_seasons(html);
    tracing::debug!("ČSFD series '{}' has {} seasons", link.title, seasons.len());

    SeriesInfo {
        provider: "csfd".to_string(),
        id: link.href.clone(),
        name: link.title.clone(),
        overview: RE_PLOT
            .captures(html)
            .map(|c| strip_tags(&c[1]))
            .filter(|p| !p.is_empty()),
        poster: None,
        first_air_year: RE_SERIES_YEARS
            .captures(html)
            .and_then(|c| c[1].parse().ok()),
        seasons,
    }
}

/// Episodes of one season from their `SxxEyy` codes, in episode order.
pub fn parse_season_episodes(html: &str, season_number: u32) -> Vec<EpisodeInfo> {
    let mut episodes: BTreeMap<u32, EpisodeInfo> = BTreeMap::new();
    for c in RE_EPISODE_CODE.captures_iter(html) {
        if c[1].parse::<u32>().ok() != Some(season_number) {
            continue;
        }
        let Ok(episode_number) = c[2].parse::<u32>() else {
            continue;
        };
        let name = c
            .get(3)
            .map(|m| m.as_str().trim().trim_matches(|ch: char| ch == '(' || ch == ')').trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Episode {}", episode_number));

        episodes.entry(episode_number).or_insert(EpisodeInfo {
            season_number,
            episode_number,
            name,
            overview: None,
            air_date: None,
            still: None,
        });
    }
    episodes.into_values().collect()
}

/// Season page path of a series page path.
pub fn season_path(series_href: &str, season_number: u32) -> String {
    format!("{}/serie-{}/", series_href.trim_end_matches('/'), season_number)
}

/// ČSFD scraper client
pub struct CsfdClient {
    client: Client,
}

impl CsfdClient {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.csfd_user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build ČSFD HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetch_optional(url)
            .await?
            .with_context(|| format!("ČSFD page not found: {}", url))
    }

    /// Like `fetch`, but a 404 is `Ok(None)`.
    async fn fetch_optional(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .error_for_status()
            .with_context(|| format!("ČSFD returned an error status for {}", url))?
            .text()
            .await
            .context("Failed to read ČSFD page")?;
        Ok(Some(body))
    }

    pub async fn search(&self, query: &str, kind: MediaKind) -> Result<Vec<CsfdCandidate>> {
        let url = format!("{}/hledat/?q={}", CSFD_BASE, urlencoding::encode(query));
        let html = self.fetch(&url).await?;
        Ok(parse_search(&html, kind))
    }

    pub async fn detail(&self, href: &str) -> Result<CsfdDetail> {
        let url = format!("{}{}", CSFD_BASE, href);
        let html = self.fetch(&url).await?;
        Ok(parse_detail(&html, &url))
    }

    /// Series lookup for one search term: a series link, else a loose title match
    /// whose page looks like a series.
    async fn search_series_term(&self, term: &str) -> Result<Option<SeriesInfo>> {
        let url = format!("{}/hledat/?q={}", CSFD_BASE, urlencoding::encode(term));
        let html = self.fetch(&url).await?;

        if let Some(link) = find_series_link(&html) {
            tracing::debug!("ČSFD series link for '{}': {}", term, link.href);
            let page = self.fetch(&format!("{}{}", CSFD_BASE, link.href)).await?;
            return Ok(Some(parse_series_page(&page, &link)));
        }

        for link in title_links(&html) {
            if !link.title.to_lowercase().contains(term) {
                continue;
            }
            let page = match self.fetch(&format!("{}{}", CSFD_BASE, link.href)).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!("Skipping ČSFD candidate {}: {:#}", link.href, e);
                    continue;
                }
            };
            if looks_like_series(&page) {
                return Ok(Some(parse_series_page(&page, &link)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Enricher for CsfdClient {
    fn name(&self) -> &'static str {
        "csfd"
    }

    async fn enrich(&self, item: &MediaItem) -> Result<Option<Metadata>> {
        if item.kind == MediaKind::Other {
            return Ok(None);
        }

        let candidates = self.search(&item.cleaned_title, item.kind).await?;
        let Some(candidate) = best_candidate(item, candidates) else {
            return Ok(None);
        };
        let detail = self.detail(&candidate.href).await?;
        Ok(Some(to_metadata(&candidate, &detail)))
    }

    fn as_season_lister(&self) -> Option<&dyn SeasonEpisodeLister> {
        Some(self)
    }
}

#[async_trait]
impl SeasonEpisodeLister for CsfdClient {
    async fn search_series(&self, name: &str) -> Result<Option<SeriesInfo>> {
        for term in series_search_terms(name) {
            match self.search_series_term(&term).await {
                Ok(Some(info)) => {
                    tracing::info!(
                        "ČSFD series '{}' ({}) has {} seasons",
                        info.name,
                        info.id,
                        info.seasons.len()
                    );
                    return Ok(Some(info));
                }
                Ok(None) => tracing::debug!("ČSFD has no series matching '{}'", term),
                Err(e) => tracing::warn!("ČSFD series search failed for '{}': {:#}", term, e),
            }
        }
        Ok(None)
    }

    /// Reads the season page, or the series page when the season has none.
    async fn season_episodes(&self, series_id: &str, season: u32) -> Result<Vec<EpisodeInfo>> {
        let season_url = format!("{}{}", CSFD_BASE, season_path(series_id, season));
        let html = match self.fetch_optional(&season_url).await? {
            Some(html) => html,
            None => self.fetch(&format!("{}{}", CSFD_BASE, series_id)).await?,
        };
        Ok(parse_season_episodes(&html, season))
    }
}

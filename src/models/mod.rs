use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Open metadata map merged onto an item by the metadata resolver.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Movie,
    TvEpisode,
    #[default]
    Other,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::TvEpisode => "tvEpisode",
            MediaKind::Other => "other",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaKind::Movie),
            "tvepisode" | "tvshow" | "tv" | "episode" => Ok(MediaKind::TvEpisode),
            "other" => Ok(MediaKind::Other),
            _ => Err(format!("unknown media kind '{}'", s)),
        }
    }
}

/// Video quality tier, ordered so that `Uhd > Hd > Sd > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    None,
    Sd,
    Hd,
    Uhd,
}

impl Quality {
    pub fn score(&self) -> u8 {
        match self {
            Quality::None => 0,
            Quality::Sd => 1,
            Quality::Hd => 2,
            Quality::Uhd => 3,
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uhd" | "4k" => Ok(Quality::Uhd),
            "hd" => Ok(Quality::Hd),
            "sd" => Ok(Quality::Sd),
            "none" => Ok(Quality::None),
            _ => Err(format!("unknown quality '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cz,
    Sk,
    En,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cz" | "cs" => Ok(Language::Cz),
            "sk" => Ok(Language::Sk),
            "en" => Ok(Language::En),
            _ => Err(format!("unknown language '{}'", s)),
        }
    }
}

/// Raw file record as returned by the upstream search service.
///
/// Every field is optional; the builder decides which gaps are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFile {
    pub ident: Option<String>,
    pub name: Option<String>,
    pub file_type: Option<String>,
    pub size: Option<String>,
    pub img: Option<String>,
    pub stripe: Option<String>,
    pub stripe_count: Option<String>,
    pub positive_votes: Option<String>,
    pub negative_votes: Option<String>,
    pub password: Option<String>,
}

impl RawFile {
    /// Set a field by its upstream tag name. Unknown tags are ignored.
    pub fn set(&mut self, tag: &str, value: String) {
        let slot = match tag {
            "ident" => &mut self.ident,
            "name" => &mut self.name,
            "type" => &mut self.file_type,
            "size" => &mut self.size,
            "img" => &mut self.img,
            "stripe" => &mut self.stripe,
            "stripe_count" => &mut self.stripe_count,
            "positive_votes" => &mut self.positive_votes,
            "negative_votes" => &mut self.negative_votes,
            "password" => &mut self.password,
            _ => return,
        };
        *slot = Some(value);
    }
}

/// A classified, optionally enriched catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub ident: String,
    pub original_name: String,
    pub extension: Option<String>,
    pub size_bytes: Option<u64>,
    pub preview_image: Option<String>,
    pub preview_strip: Option<String>,
    pub preview_count: Option<u32>,
    pub votes_positive: Option<u32>,
    pub votes_negative: Option<u32>,
    pub password_protected: bool,
    pub kind: MediaKind,
    pub cleaned_title: String,
    pub sort_title: String,
    pub guessed_year: Option<i32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub quality: Quality,
    pub audio_languages: BTreeSet<Language>,
    pub subtitle_languages: BTreeSet<Language>,
    pub metadata: Metadata,
}

impl MediaItem {
    pub fn quality_score(&self) -> u8 {
        self.quality.score()
    }

    /// Merge fetched metadata without overwriting keys already present.
    pub fn apply_metadata(&mut self, data: &Metadata) {
        if data.is_empty() {
            return;
        }
        for (key, value) in data {
            self.metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.metadata
            .entry("title")
            .or_insert_with(|| self.cleaned_title.clone().into());
        if let Some(year) = self.guessed_year {
            self.metadata.entry("year").or_insert_with(|| year.into());
        }
    }

    /// Lowercased genre names from merged metadata, if any.
    pub fn metadata_genres(&self) -> Vec<String> {
        self.metadata
            .get("genres")
            .and_then(|g| g.as_array())
            .map(|genres| {
                genres
                    .iter()
                    .filter_map(|g| g.as_str())
                    .map(|g| g.to_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Caller-side filters for one catalog page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRequest {
    pub kind: Option<MediaKind>,
    pub query: String,
    pub letter: Option<String>,
    pub sort: Option<SortOrder>,
    pub quality: Option<Quality>,
    pub audio: Option<Language>,
    pub subtitles: Option<Language>,
    pub genre: Option<String>,
    pub start_offset: u32,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub items: Vec<MediaItem>,
    pub next_offset: u32,
    pub total: u32,
    pub has_more: bool,
}

/// Upstream sort orders understood by the search service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Recent,
    Rating,
    Largest,
    Smallest,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Recent => "recent",
            SortOrder::Rating => "rating",
            SortOrder::Largest => "largest",
            SortOrder::Smallest => "smallest",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recent" => Ok(SortOrder::Recent),
            "rating" => Ok(SortOrder::Rating),
            "largest" => Ok(SortOrder::Largest),
            "smallest" => Ok(SortOrder::Smallest),
            _ => Err(format!("unknown sort order '{}'", s)),
        }
    }
}

/// Series-level information from a provider with the season capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesInfo {
    pub provider: String,
    pub id: String,
    pub name: String,
    pub overview: Option<String>,
    pub poster: Option<String>,
    pub first_air_year: Option<i32>,
    pub seasons: Vec<SeasonInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonInfo {
    pub season_number: u32,
    pub name: String,
    pub episode_count: Option<u32>,
    pub air_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInfo {
    pub season_number: u32,
    pub episode_number: u32,
    pub name: String,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub still: Option<String>,
}

/// Curated provider title lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryList {
    Popular,
    TopRated,
    /// Movies in cinemas
    NowPlaying,
    Upcoming,
    AiringToday,
    OnTheAir,
    /// Most popular titles of one provider genre id
    Genre(u32),
}

impl DiscoveryList {
    /// Build a list from its route name; `genre` needs a genre id.
    pub fn from_parts(name: &str, genre_id: Option<u32>) -> Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "popular" => Ok(DiscoveryList::Popular),
            "top_rated" => Ok(DiscoveryList::TopRated),
            "now_playing" => Ok(DiscoveryList::NowPlaying),
            "upcoming" => Ok(DiscoveryList::Upcoming),
            "airing_today" => Ok(DiscoveryList::AiringToday),
            "on_the_air" => Ok(DiscoveryList::OnTheAir),
            "genre" => genre_id
                .map(DiscoveryList::Genre)
                .ok_or_else(|| "genre list needs a genre id".to_string()),
            _ => Err(format!("unknown list '{}'", name)),
        }
    }

    /// Cinema lists exist for movies only, broadcast lists for TV only.
    pub fn supports(&self, kind: MediaKind) -> bool {
        match self {
            DiscoveryList::NowPlaying | DiscoveryList::Upcoming => kind == MediaKind::Movie,
            DiscoveryList::AiringToday | DiscoveryList::OnTheAir => kind == MediaKind::TvEpisode,
            DiscoveryList::Popular | DiscoveryList::TopRated | DiscoveryList::Genre(_) => {
                kind != MediaKind::Other
            }
        }
    }
}

/// One entry of a discovery list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTitle {
    pub provider: String,
    pub id: i64,
    pub kind: MediaKind,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub fanart: Option<String>,
    pub rating: Option<f64>,
    pub votes: Option<i64>,
    pub popularity: Option<f64>,
}

/// Provider genre with its numeric id, for genre discovery lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreRef {
    pub id: u32,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> MediaItem {
        MediaItem {
            ident: "abc".to_string(),
            original_name: "Some.Movie.2020.mkv".to_string(),
            extension: Some("mkv".to_string()),
            size_bytes: None,
            preview_image: None,
            preview_strip: None,
            preview_count: None,
            votes_positive: None,
            votes_negative: None,
            password_protected: false,
            kind: MediaKind::Movie,
            cleaned_title: "Some Movie".to_string(),
            sort_title: "some movie".to_string(),
            guessed_year: Some(2020),
            season: None,
            episode: None,
            quality: Quality::None,
            audio_languages: BTreeSet::new(),
            subtitle_languages: BTreeSet::new(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_quality_ordering() {
        assert!(Quality::Uhd > Quality::Hd);
        assert!(Quality::Hd > Quality::Sd);
        assert!(Quality::Sd > Quality::None);
        assert_eq!(Quality::Uhd.score(), 3);
        assert_eq!(Quality::None.score(), 0);
    }

    #[test]
    fn test_media_kind_from_str() {
        assert_eq!("tvshow".parse::<MediaKind>().unwrap(), MediaKind::TvEpisode);
        assert_eq!("Movie".parse::<MediaKind>().unwrap(), MediaKind::Movie);
        assert!("music".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_apply_metadata_is_additive() {
        let mut item = sample_item();
        item.metadata
            .insert("plot".to_string(), "kept".into());

        let mut incoming = Metadata::new();
        incoming.insert("plot".to_string(), "replaced".into());
        incoming.insert("rating".to_string(), serde_json::json!(7.5));
        item.apply_metadata(&incoming);

        assert_eq!(item.metadata["plot"], "kept");
        assert_eq!(item.metadata["rating"], 7.5);
        assert_eq!(item.metadata["title"], "Some Movie");
        assert_eq!(item.metadata["year"], 2020);
    }

    #[test]
    fn test_apply_metadata_skips_unknown_year() {
        let mut item = sample_item();
        item.guessed_year = None;

        let mut incoming = Metadata::new();
        incoming.insert("plot".to_string(), "text".into());
        item.apply_metadata(&incoming);

        assert!(!item.metadata.contains_key("year"));
    }

    #[test]
    fn test_apply_empty_metadata_is_noop() {
        let mut item = sample_item();
        item.apply_metadata(&Metadata::new());
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn test_raw_file_set_ignores_unknown_tags() {
        let mut raw = RawFile::default();
        raw.set("ident", "x1".to_string());
        raw.set("type", "mkv".to_string());
        raw.set("unexpected", "value".to_string());
        assert_eq!(raw.ident.as_deref(), Some("x1"));
        assert_eq!(raw.file_type.as_deref(), Some("mkv"));
    }

    #[test]
    fn test_discovery_list_from_parts() {
        assert_eq!(
            DiscoveryList::from_parts("top_rated", None),
            Ok(DiscoveryList::TopRated)
        );
        assert_eq!(
            DiscoveryList::from_parts("genre", Some(28)),
            Ok(DiscoveryList::Genre(28))
        );
        assert!(DiscoveryList::from_parts("genre", None).is_err());
        assert!(DiscoveryList::from_parts("trending", None).is_err());
    }

    #[test]
    fn test_discovery_list_kinds() {
        assert!(DiscoveryList::NowPlaying.supports(MediaKind::Movie));
        assert!(!DiscoveryList::NowPlaying.supports(MediaKind::TvEpisode));
        assert!(DiscoveryList::OnTheAir.supports(MediaKind::TvEpisode));
        assert!(!DiscoveryList::AiringToday.supports(MediaKind::Movie));
        assert!(DiscoveryList::Genre(18).supports(MediaKind::TvEpisode));
        assert!(!DiscoveryList::Popular.supports(MediaKind::Other));
    }
}

// Filename parser: raw upstream records -> classified MediaItem

mod classify;
mod detect;

use regex::Regex;
use std::sync::LazyLock;

use classify::{classify, clean_title, sort_title};
use detect::{
    detect_audio_languages, detect_quality, detect_season_episode, detect_subtitle_languages,
    detect_year, joined, tokenize,
};

use crate::models::{MediaItem, Metadata, RawFile};

static RE_SERIES_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(s\d{1,2}[\s._-]*e\d{1,2}|\b\d{1,2}x\d{2}\b|s[eé]ri[eií]?[\s._-]*\d+|\bseason[\s._-]*\d+|\bs\d{1,2}\b|\bep\.?[\s_-]*\d+|díl[\s._-]*\d+)",
    )
    .unwrap()
});

static RE_SEASON_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bs(\d{1,2})\b|s[eé]ri[eií]?[\s._-]*(\d{1,2})|\bseason[\s._-]*(\d{1,2}))").unwrap()
});
static RE_EPISODE_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\be(\d{1,3})\b|\bep(?:isode)?\.?[\s._-]*(\d{1,3})|díl[\s._-]*(\d{1,3})|část[\s._-]*(\d{1,3}))").unwrap()
});

fn first_group(re: &Regex, haystack: &str) -> Option<u32> {
    re.captures(haystack)?
        .iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn lenient_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Build a classified item from an upstream record.
///
/// Records without a usable ident or name are dropped. Numeric fields that
/// fail to parse are treated as absent.
pub fn build_media_item(raw: &RawFile) -> Option<MediaItem> {
    let Some(ident) = non_blank(raw.ident.as_ref()) else {
        tracing::debug!("Dropping upstream record without ident: {:?}", raw.name);
        return None;
    };
    let Some(name) = non_blank(raw.name.as_ref()) else {
        tracing::debug!("Dropping upstream record {} without name", ident);
        return None;
    };

    let kind = classify(&name);
    let season_episode = detect_season_episode(&name);
    let tokens = tokenize(&name);
    let combined = joined(&tokens);
    let cleaned_title = clean_title(&name);
    let sort_title = sort_title(&cleaned_title);

    Some(MediaItem {
        ident,
        extension: non_blank(raw.file_type.as_ref()),
        size_bytes: lenient_number(raw.size.as_ref()),
        preview_image: non_blank(raw.img.as_ref()),
        preview_strip: non_blank(raw.stripe.as_ref()),
        preview_count: lenient_number(raw.stripe_count.as_ref()),
        votes_positive: lenient_number(raw.positive_votes.as_ref()),
        votes_negative: lenient_number(raw.negative_votes.as_ref()),
        password_protected: raw.password.as_deref().map(str::trim) == Some("1"),
        kind,
        guessed_year: detect_year(&name),
        season: season_episode.map(|(season, _)| season),
        episode: season_episode.map(|(_, episode)| episode),
        quality: detect_quality(&name),
        audio_languages: detect_audio_languages(&tokens, &combined),
        subtitle_languages: detect_subtitle_languages(&tokens, &combined),
        cleaned_title,
        sort_title,
        metadata: Metadata::new(),
        original_name: name,
    })
}

/// Series name of an episode: the cleaned part of the raw name before the
/// first season/episode marker, falling back to the cleaned title.
pub fn series_name(item: &MediaItem) -> String {
    let prefix = RE_SERIES_MARKER
        .find(&item.original_name)
        .map(|m| &item.original_name[..m.start()])
        .unwrap_or("");

    if prefix.chars().any(|c| c.is_alphanumeric()) {
        let cleaned = clean_title(prefix);
        let trimmed = cleaned.trim_matches(|c: char| !c.is_alphanumeric());
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    item.cleaned_title.clone()
}

/// Season number from the SxxExx marker or, failing that, from looser
/// markers such as `S2`, `Série 2` or `Season 2`.
pub fn season_number(item: &MediaItem) -> Option<u32> {
    item.season
        .or_else(|| first_group(&RE_SEASON_HINT, &item.original_name))
}

/// Episode number from the SxxExx marker or from `E05`, `Ep 5`, `díl 5`, `část 5`.
pub fn episode_number(item: &MediaItem) -> Option<u32> {
    item.episode
        .or_else(|| first_group(&RE_EPISODE_HINT, &item.original_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, MediaKind, Quality};

    fn raw(ident: &str, name: &str, size: Option<&str>) -> RawFile {
        RawFile {
            ident: Some(ident.to_string()),
            name: Some(name.to_string()),
            file_type: Some("mkv".to_string()),
            size: size.map(str::to_string),
            ..RawFile::default()
        }
    }

    #[test]
    fn test_build_movie_item() {
        let item = build_media_item(&raw(
            "m1",
            "Awesome.Movie.2021.1080p.BluRay.x264.CZ-ENG.DTS-GROUP.mkv",
            Some("8589934592"),
        ))
        .unwrap();

        assert_eq!(item.kind, MediaKind::Movie);
        assert_eq!(item.cleaned_title, "Awesome Movie");
        assert_eq!(item.sort_title, "awesome movie");
        assert_eq!(item.guessed_year, Some(2021));
        assert_eq!(item.quality, Quality::Hd);
        assert_eq!(item.quality_score(), 2);
        assert!(item.audio_languages.contains(&Language::Cz));
        assert!(item.audio_languages.contains(&Language::En));
        assert_eq!(item.size_bytes, Some(8_589_934_592));
        assert_eq!(item.season, None);
        assert_eq!(item.episode, None);
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn test_build_episode_item() {
        let item = build_media_item(&raw(
            "e1",
            "My.Favorite.Show.S03E04.The.Episode.Title.720p.WEB-DL.SK.AAC.mkv",
            Some("734003200"),
        ))
        .unwrap();

        assert_eq!(item.kind, MediaKind::TvEpisode);
        assert_eq!(item.season, Some(3));
        assert_eq!(item.episode, Some(4));
        assert_eq!(item.quality, Quality::Hd);
        assert!(item.audio_languages.contains(&Language::Sk));
        assert_eq!(item.cleaned_title, "My Favorite Show The Episode Title");
    }

    #[test]
    fn test_build_is_deterministic() {
        let record = raw("d1", "Film.2010.720p.CZ.titulky.mkv", Some("123"));
        assert_eq!(build_media_item(&record), build_media_item(&record));
    }

    #[test]
    fn test_missing_ident_or_name_is_dropped() {
        assert!(build_media_item(&RawFile {
            name: Some("Movie.mkv".to_string()),
            ..RawFile::default()
        })
        .is_none());
        assert!(build_media_item(&raw("  ", "Movie.mkv", None)).is_none());
        assert!(build_media_item(&raw("x", "   ", None)).is_none());
    }

    #[test]
    fn test_optional_fields_are_lenient() {
        let mut record = raw("o1", "Movie.2001.mkv", Some("not-a-number"));
        record.stripe_count = Some("".to_string());
        record.positive_votes = Some("12".to_string());
        record.password = Some("1".to_string());

        let item = build_media_item(&record).unwrap();
        assert_eq!(item.size_bytes, None);
        assert_eq!(item.preview_count, None);
        assert_eq!(item.votes_positive, Some(12));
        assert!(item.password_protected);

        let item = build_media_item(&raw("o2", "Movie.2001.mkv", None)).unwrap();
        assert!(!item.password_protected);
    }

    #[test]
    fn test_series_name() {
        let item = build_media_item(&raw(
            "s1",
            "My.Favorite.Show.S03E04.The.Episode.Title.720p.mkv",
            None,
        ))
        .unwrap();
        assert_eq!(series_name(&item), "My Favorite Show");

        let item = build_media_item(&raw("s2", "Kriminálka.2019.Série 2.díl 5.mkv", None)).unwrap();
        assert_eq!(series_name(&item), "Kriminálka");

        let item = build_media_item(&raw("s3", "S01E01.mkv", None)).unwrap();
        assert_eq!(series_name(&item), item.cleaned_title);
    }

    #[test]
    fn test_season_and_episode_hints() {
        let item = build_media_item(&raw("h1", "Show.S02E07.mkv", None)).unwrap();
        assert_eq!(season_number(&item), Some(2));
        assert_eq!(episode_number(&item), Some(7));

        let item = build_media_item(&raw("h2", "Kriminálka Série 3 díl 12.avi", None)).unwrap();
        assert_eq!(item.season, None);
        assert_eq!(season_number(&item), Some(3));
        assert_eq!(episode_number(&item), Some(12));

        let item = build_media_item(&raw("h3", "Show.Season.4.Ep.9.mkv", None)).unwrap();
        assert_eq!(season_number(&item), Some(4));
        assert_eq!(episode_number(&item), Some(9));

        let item = build_media_item(&raw("h4", "Plain.Movie.2001.mkv", None)).unwrap();
        assert_eq!(season_number(&item), None);
        assert_eq!(episode_number(&item), None);
    }
}

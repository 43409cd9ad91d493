// Media kind classification and title normalization

use regex::Regex;
use std::sync::LazyLock;

use super::detect::{
    detect_season_episode, first_match, PatternRule, RE_ALT_SEASON_EPISODE, RE_SEASON_EPISODE,
    RE_YEAR,
};
use crate::models::MediaKind;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "m2ts", "vob",
    "divx", "ogm",
];

const ARTICLES: &[&str] = &[
    "the ", "a ", "an ", "der ", "die ", "das ", "le ", "la ", "los ", "las ", "el ",
];

// Release-tag vocabulary stripped from titles. Applied after separators became spaces.
const RELEASE_TAGS: &str = r"720p|1080p|2160p|480p|576p|4k|uhd|hdr|webrip|web\s?dl|bluray|blu\s?ray|bdrip|brrip|x264|x265|h264|h265|hevc|avc|xvid|divx|dvdrip|dvdr|hdtv|aac|ac3|dts|truehd|atmos|remux|multi|cz|sk|eng|en|dd\s?5\s?1|dd\d|exclusive|proper|repack|nf|nfwebrip|ws|hmax|amzn|pal|ntsc";

static RE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\.({})$", VIDEO_EXTENSIONS.join("|"))).unwrap()
});
static RE_GROUP_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})-[a-z0-9]+$", RELEASE_TAGS)).unwrap()
});
static RE_RELEASE_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b({})\b", RELEASE_TAGS)).unwrap());
static RE_PART_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d{1,2}of\d{1,2}\b").unwrap());
static RE_SPACE_COLLAPSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static KIND_RULES: LazyLock<Vec<PatternRule<MediaKind>>> = LazyLock::new(|| {
    use MediaKind::{Other, TvEpisode};
    vec![
        // Additional TV markers
        PatternRule::new("nxn", TvEpisode, r"\b\d{1,2}x\d{1,3}\b"),
        PatternRule::new("serie", TvEpisode, r"(?i)s[eé]ri[eií]?[\s._-]*\d+"),
        PatternRule::new("season", TvEpisode, r"(?i)\bseason[\s._-]*\d+"),
        PatternRule::new("ep", TvEpisode, r"(?i)\bep\.?[\s_-]*\d+"),
        PatternRule::new("episode", TvEpisode, r"(?i)\bepisode[\s._-]*\d+"),
        PatternRule::new("standalone-season", TvEpisode, r"(?i)\bs\d{1,2}\b"),
        PatternRule::new("standalone-episode", TvEpisode, r"(?i)\be\d{1,2}\b"),
        PatternRule::new("dil", TvEpisode, r"(?i)díl[\s._-]*\d+"),
        PatternRule::new("cast", TvEpisode, r"(?i)část[\s._-]*\d+"),
        // Non-content blocklist
        PatternRule::new(
            "extras",
            Other,
            r"(?i)\b(trailer|teaser|sample|preview|promo|making[\s._-]?of|behind[\s._-]?the[\s._-]?scenes|extras?|bonus|featurette|deleted[\s._-]?scenes?|outtakes?|interview|soundtrack|music[\s._-]?video|documentary|commercial)\b",
        ),
        PatternRule::new(
            "short-clip",
            Other,
            r"(?i)\b(clip|short|segment|excerpt|fragment|demo|test)\b",
        ),
        PatternRule::new(
            "sidecar",
            Other,
            r"(?i)\b(readme|nfo|txt|sub|srt|idx|info|cover|artwork|poster)\b",
        ),
        PatternRule::new("partial", Other, r"(?i)(part\d+|cd\d+|disc\d+|\bpt\d+)")
            .unless(r"(?i)(movie|film)"),
    ]
});

/// Decide the media kind of a raw name. First matching rule wins, default is `Movie`.
pub fn classify(name: &str) -> MediaKind {
    if detect_season_episode(name).is_some() {
        return MediaKind::TvEpisode;
    }
    match first_match(&KIND_RULES, name) {
        Some(rule) => {
            tracing::trace!("'{}' classified by rule '{}'", name, rule.label);
            rule.value
        }
        None => MediaKind::Movie,
    }
}

/// Strip release noise from a raw name. Falls back to the raw name when nothing is left.
pub fn clean_title(name: &str) -> String {
    let work = RE_EXTENSION.replace(name, "");
    let work = RE_GROUP_SUFFIX.replace(&work, "$1");
    let work = work.replace(['_', '.', '-'], " ");
    let work = RE_RELEASE_TAGS.replace_all(&work, " ");
    let work = RE_SEASON_EPISODE.replace_all(&work, " ");
    let work = RE_ALT_SEASON_EPISODE.replace_all(&work, " ");
    let work = RE_YEAR.replace_all(&work, " ");
    let work = RE_PART_OF.replace_all(&work, " ");
    let work = RE_SPACE_COLLAPSE.replace_all(&work, " ");
    let work = work.trim();

    if work.is_empty() {
        name.to_string()
    } else {
        work.to_string()
    }
}

/// Lowercased title with one leading article removed.
pub fn sort_title(title: &str) -> String {
    let lower = title.to_lowercase();
    for article in ARTICLES {
        if let Some(rest) = lower.strip_prefix(article) {
            let rest = rest.trim();
            return if rest.is_empty() {
                lower.clone()
            } else {
                rest.to_string()
            };
        }
    }
    lower
}

// Feature detectors for scene-release filenames
// Each detector is total: it reports "not found" instead of failing.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::models::{Language, Quality};

static RE_TOKEN_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s._\-\[\](){}]+").unwrap());
pub(crate) static RE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
pub(crate) static RE_SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Ss](\d{1,2})[\s._-]*[Ee](\d{1,2})").unwrap());
pub(crate) static RE_ALT_SEASON_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})x(\d{2})\b").unwrap());

/// One row of an ordered rule table: the first row whose `pattern` matches
/// (and whose `unless` veto does not) decides the outcome.
pub struct PatternRule<T> {
    pub label: &'static str,
    pub value: T,
    pub pattern: Regex,
    pub unless: Option<Regex>,
}

impl<T> PatternRule<T> {
    pub fn new(label: &'static str, value: T, pattern: &str) -> Self {
        Self {
            label,
            value,
            pattern: Regex::new(pattern).unwrap(),
            unless: None,
        }
    }

    pub fn unless(mut self, veto: &str) -> Self {
        self.unless = Some(Regex::new(veto).unwrap());
        self
    }

    pub fn matches(&self, haystack: &str) -> bool {
        self.pattern.is_match(haystack)
            && !self
                .unless
                .as_ref()
                .is_some_and(|veto| veto.is_match(haystack))
    }
}

/// Evaluate an ordered rule table, returning the first matching row.
pub fn first_match<'a, T>(rules: &'a [PatternRule<T>], haystack: &str) -> Option<&'a PatternRule<T>> {
    rules.iter().find(|rule| rule.matches(haystack))
}

static QUALITY_RULES: LazyLock<Vec<PatternRule<Quality>>> = LazyLock::new(|| {
    vec![
        PatternRule::new("uhd", Quality::Uhd, r"(?i)(2160p|4k|uhd|dolby\s*vision|hdr)"),
        PatternRule::new("hd", Quality::Hd, r"(?i)(1080p|720p|hd|webrip|bluray|bdrip|brrip)"),
        PatternRule::new(
            "sd",
            Quality::Sd,
            r"(?i)(576p|480p|dvdrip|dvd|tvrip|xvid|hdtv|cam|workprint|ts)",
        ),
    ]
});

static AUDIO_RULES: LazyLock<Vec<PatternRule<Language>>> = LazyLock::new(|| {
    vec![
        PatternRule::new(
            "cz",
            Language::Cz,
            r"(?i)\b(cz|ces|cze|czech|czdab|czdub|czaudio|czsound|cz\s*dabing|cz\s*dub)\b",
        ),
        PatternRule::new(
            "sk",
            Language::Sk,
            r"(?i)\b(sk|slk|slovak|skdab|skdub|sk\s*dabing|sk\s*dub)\b",
        ),
        PatternRule::new("en", Language::En, r"(?i)\b(en|eng|english|en\s*audio)\b"),
    ]
});

static SUBTITLE_RULES: LazyLock<Vec<PatternRule<Language>>> = LazyLock::new(|| {
    vec![
        PatternRule::new(
            "cz",
            Language::Cz,
            r"(?i)(cz\s*tit|tit\s*cz|cz\s*subs|czsub|cztitl|cztitulky)",
        ),
        PatternRule::new(
            "sk",
            Language::Sk,
            r"(?i)(sk\s*tit|tit\s*sk|sk\s*subs|sktit|sktitulky)",
        ),
        PatternRule::new(
            "en",
            Language::En,
            r"(?i)(en\s*tit|tit\s*en|en\s*subs|engsub|eng\s*subs|english\s*subs)",
        ),
    ]
});

/// Split a raw name into non-empty tokens.
pub fn tokenize(name: &str) -> Vec<&str> {
    RE_TOKEN_SPLIT
        .split(name)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Tokens joined by single spaces and lowercased.
pub fn joined(tokens: &[&str]) -> String {
    tokens.join(" ").to_lowercase()
}

pub fn detect_year(name: &str) -> Option<i32> {
    RE_YEAR.find(name).and_then(|m| m.as_str().parse().ok())
}

/// First `SxxExx` marker, else first `NxNN` marker.
pub fn detect_season_episode(name: &str) -> Option<(u32, u32)> {
    let caps = RE_SEASON_EPISODE
        .captures(name)
        .or_else(|| RE_ALT_SEASON_EPISODE.captures(name))?;
    let season = caps.get(1)?.as_str().parse().ok()?;
    let episode = caps.get(2)?.as_str().parse().ok()?;
    Some((season, episode))
}

pub fn detect_quality(name: &str) -> Quality {
    first_match(&QUALITY_RULES, name)
        .map(|rule| rule.value)
        .unwrap_or_default()
}

fn detect_languages(
    tokens: &[&str],
    combined: &str,
    rules: &[PatternRule<Language>],
) -> BTreeSet<Language> {
    rules
        .iter()
        .filter(|rule| {
            rule.matches(combined)
                || tokens
                    .iter()
                    .any(|token| rule.matches(&token.to_lowercase()))
        })
        .map(|rule| rule.value)
        .collect()
}

pub fn detect_audio_languages(tokens: &[&str], combined: &str) -> BTreeSet<Language> {
    detect_languages(tokens, combined, &AUDIO_RULES)
}

pub fn detect_subtitle_languages(tokens: &[&str], combined: &str) -> BTreeSet<Language> {
    detect_languages(tokens, combined, &SUBTITLE_RULES)
}

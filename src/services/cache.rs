// Metadata lookup cache
// Remembers resolver decisions, including confirmed misses.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::models::{MediaItem, MediaKind, Metadata};

/// Identity of a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<u32>,
}

impl CacheKey {
    pub fn for_item(item: &MediaItem) -> Self {
        Self {
            kind: item.kind,
            title: item.cleaned_title.to_lowercase(),
            year: item.guessed_year,
            season: item.season,
        }
    }

    /// Flat string form used as the persistent primary key.
    pub fn storage_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.kind,
            self.title,
            self.year.map(|y| y.to_string()).unwrap_or_default(),
            self.season.map(|s| s.to_string()).unwrap_or_default()
        )
    }
}

/// A cached resolver decision.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedLookup {
    Found(Metadata),
    NoMatch,
}

#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// `None` means the key was never looked up (or has expired).
    async fn get(&self, key: &CacheKey) -> Option<CachedLookup>;

    async fn put(&self, key: CacheKey, value: CachedLookup, ttl: Option<Duration>);
}

struct MemoryEntry {
    value: CachedLookup,
    expires_at: Option<Instant>,
}

struct MemoryState {
    entries: HashMap<CacheKey, MemoryEntry>,
    insertion_order: VecDeque<CacheKey>,
}

/// Process-lifetime cache, optionally bounded by entry count (oldest evicted first).
pub struct MemoryMetadataCache {
    state: RwLock<MemoryState>,
    max_entries: Option<usize>,
}

impl MemoryMetadataCache {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            max_entries,
        }
    }
}

#[async_trait]
impl MetadataCache for MemoryMetadataCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedLookup> {
        {
            let state = self.state.read().await;
            let entry = state.entries.get(key)?;
            if !entry.expires_at.is_some_and(|at| at <= Instant::now()) {
                return Some(entry.value.clone());
            }
        }

        // Expired entries are removed on read
        let mut state = self.state.write().await;
        if state
            .entries
            .get(key)
            .is_some_and(|e| e.expires_at.is_some_and(|at| at <= Instant::now()))
        {
            state.entries.remove(key);
            state.insertion_order.retain(|k| k != key);
        }
        None
    }

    async fn put(&self, key: CacheKey, value: CachedLookup, ttl: Option<Duration>) {
        let mut state = self.state.write().await;
        let entry = MemoryEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };

        if state.entries.insert(key.clone(), entry).is_none() {
            state.insertion_order.push_back(key);
        }

        if let Some(max) = self.max_entries {
            while state.entries.len() > max {
                let Some(oldest) = state.insertion_order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(title: &str) -> CacheKey {
        CacheKey {
            kind: MediaKind::Movie,
            title: title.to_string(),
            year: Some(1999),
            season: None,
        }
    }

    fn found(title: &str) -> CachedLookup {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), title.into());
        CachedLookup::Found(metadata)
    }

    #[tokio::test]
    async fn test_miss_and_no_match_are_distinct() {
        let cache = MemoryMetadataCache::new(None);
        assert_eq!(cache.get(&key("matrix")).await, None);

        cache.put(key("matrix"), CachedLookup::NoMatch, None).await;
        assert_eq!(cache.get(&key("matrix")).await, Some(CachedLookup::NoMatch));
    }

    #[tokio::test]
    async fn test_put_replaces_value() {
        let cache = MemoryMetadataCache::new(None);
        cache.put(key("matrix"), CachedLookup::NoMatch, None).await;
        cache.put(key("matrix"), found("The Matrix"), None).await;
        assert_eq!(cache.get(&key("matrix")).await, Some(found("The Matrix")));
        assert_eq!(cache.state.read().await.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_bounded_cache_evicts_oldest() {
        let cache = MemoryMetadataCache::new(Some(2));
        cache.put(key("a"), CachedLookup::NoMatch, None).await;
        cache.put(key("b"), CachedLookup::NoMatch, None).await;
        cache.put(key("c"), CachedLookup::NoMatch, None).await;

        assert_eq!(cache.state.read().await.entries.len(), 2);
        assert_eq!(cache.get(&key("a")).await, None);
        assert!(cache.get(&key("c")).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_entries_are_ignored() {
        let cache = MemoryMetadataCache::new(None);
        cache
            .put(key("old"), CachedLookup::NoMatch, Some(Duration::ZERO))
            .await;
        assert_eq!(cache.get(&key("old")).await, None);
    }

    #[tokio::test]
    async fn test_expired_read_removes_entry() {
        let cache = MemoryMetadataCache::new(None);
        cache
            .put(key("old"), CachedLookup::NoMatch, Some(Duration::ZERO))
            .await;
        cache.put(key("fresh"), CachedLookup::NoMatch, None).await;

        assert_eq!(cache.get(&key("old")).await, None);
        let state = cache.state.read().await;
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.insertion_order.len(), 1);
        assert!(state.entries.contains_key(&key("fresh")));
    }

    #[test]
    fn test_storage_key_format() {
        let key = CacheKey {
            kind: MediaKind::TvEpisode,
            title: "some show".to_string(),
            year: None,
            season: Some(2),
        };
        assert_eq!(key.storage_key(), "tvEpisode|some show||2");
    }
}

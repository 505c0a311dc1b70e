//! Content-hash memoization for the analyzers
//!
//! Each analyzer gets its own LRU keyed by a hash of every input that
//! affects its output. Cached variants return the same value the uncached
//! analyzer would for the same input.

use super::entities::{extract_entities, EntityGraph};
use super::structural::{parse_structure, StructuralFingerprint};
use super::style::{calculate_readability, Readability, StyleAnalyzer, StyleReport};
use super::timeline::{build_timeline, Timeline};
use crate::config::CacheSettings;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Content-based hash for caching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Create hash from content
    pub fn from_content(content: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Hash several inputs as one key
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = DefaultHasher::new();
        for part in parts {
            part.hash(&mut hasher);
        }
        Self(hasher.finish())
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

/// LRU memo for one analyzer
struct Memo<T> {
    entries: Mutex<LruCache<ContentHash, T>>,
}

impl<T: Clone> Memo<T> {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: ContentHash) -> Option<T> {
        self.entries.lock().get(&key).cloned()
    }

    fn put(&self, key: ContentHash, value: T) {
        self.entries.lock().put(key, value);
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// entries across all analyzers
    pub entries: usize,
    /// per-analyzer capacity
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memoized analyzer suite
pub struct AnalysisCache {
    structure: Memo<StructuralFingerprint>,
    entities: Memo<EntityGraph>,
    style: Memo<StyleReport>,
    timeline: Memo<Timeline>,
    readability: Memo<Readability>,
    style_analyzer: StyleAnalyzer,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_analyzer(settings, StyleAnalyzer::default())
    }

    pub fn with_analyzer(settings: &CacheSettings, style_analyzer: StyleAnalyzer) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            structure: Memo::new(capacity),
            entities: Memo::new(capacity),
            style: Memo::new(capacity),
            timeline: Memo::new(capacity),
            readability: Memo::new(capacity),
            style_analyzer,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn memoize<T: Clone>(&self, memo: &Memo<T>, key: ContentHash, compute: impl FnOnce() -> T) -> T {
        if let Some(hit) = memo.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();
        memo.put(key, value.clone());
        value
    }

    pub fn parse_structure_cached(&self, text: &str) -> StructuralFingerprint {
        self.memoize(&self.structure, ContentHash::from_content(text), || parse_structure(text))
    }

    pub fn extract_entities_cached(&self, text: &str, chapter_id: &str) -> EntityGraph {
        self.memoize(
            &self.entities,
            ContentHash::from_parts(&[text, chapter_id]),
            || extract_entities(text, chapter_id),
        )
    }

    pub fn analyze_style_cached(&self, text: &str) -> StyleReport {
        self.memoize(&self.style, ContentHash::from_content(text), || {
            self.style_analyzer.analyze(text)
        })
    }

    pub fn build_timeline_cached(
        &self,
        text: &str,
        chapter_id: &str,
        previous: Option<&Timeline>,
    ) -> Timeline {
        // carried records and their resolved flags feed the output
        let previous_key = previous
            .map(|p| {
                p.promises
                    .iter()
                    .map(|r| format!("{}:{}", r.id, r.resolved))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        self.memoize(
            &self.timeline,
            ContentHash::from_parts(&[text, chapter_id, &previous_key]),
            || build_timeline(text, chapter_id, previous),
        )
    }

    pub fn calculate_readability_cached(&self, text: &str) -> Readability {
        self.memoize(&self.readability, ContentHash::from_content(text), || {
            calculate_readability(text)
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.structure.len()
                + self.entities.len()
                + self.style.len()
                + self.timeline.len()
                + self.readability.len(),
            capacity: self.capacity.get(),
        }
    }

    pub fn clear(&self) {
        self.structure.clear();
        self.entities.clear();
        self.style.clear();
        self.timeline.clear();
        self.readability.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Analysis cache cleared");
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::style::analyze_style;

    const TEXT: &str = "Mara vowed to find the key. \"Now,\" said Tobin.\n\n\n\nThe letter was written.\n";

    #[test]
    fn test_content_hash() {
        assert_eq!(ContentHash::from_content("a"), ContentHash::from_content("a"));
        assert_ne!(ContentHash::from_content("a"), ContentHash::from_content("b"));
        assert_ne!(
            ContentHash::from_parts(&["ab", "c"]),
            ContentHash::from_parts(&["a", "bc"])
        );
        assert_eq!(ContentHash::from_content("a").to_hex().len(), 16);
    }

    #[test]
    fn test_cached_matches_uncached() {
        let cache = AnalysisCache::default();
        for _ in 0..2 {
            assert_eq!(cache.parse_structure_cached(TEXT), parse_structure(TEXT));
            assert_eq!(cache.extract_entities_cached(TEXT, "ch1"), extract_entities(TEXT, "ch1"));
            assert_eq!(cache.analyze_style_cached(TEXT), analyze_style(TEXT));
            assert_eq!(
                cache.build_timeline_cached(TEXT, "ch1", None),
                build_timeline(TEXT, "ch1", None)
            );
            assert_eq!(cache.calculate_readability_cached(TEXT), calculate_readability(TEXT));
        }
        let stats = cache.stats();
        assert_eq!(stats.misses, 5);
        assert_eq!(stats.hits, 5);
        assert_eq!(stats.entries, 5);
    }

    #[test]
    fn test_chapter_id_is_part_of_key() {
        let cache = AnalysisCache::default();
        let a = cache.extract_entities_cached(TEXT, "ch1");
        let b = cache.extract_entities_cached(TEXT, "ch2");
        assert_ne!(a, b);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_lru_eviction_and_clear() {
        let cache = AnalysisCache::new(&CacheSettings { capacity: 2 });
        cache.parse_structure_cached("one");
        cache.parse_structure_cached("two");
        cache.parse_structure_cached("three");
        assert_eq!(cache.stats().entries, 2);
        assert_eq!(cache.stats().capacity, 2);

        cache.clear();
        assert_eq!(cache.stats(), CacheStats { hits: 0, misses: 0, entries: 0, capacity: 2 });
    }
}

//! Process-wide translation history.
//!
//! Entries are append-only: the same source text may be stored many times and the
//! newest entry governs lookups. Storage failures never reach the translation path;
//! they are logged and degrade to a miss (lookup) or a no-op (store).

mod sqlite;

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CacheError;

pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub source_text: String,
    pub translated_text: String,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
}

/// Storage backend behind [`TranslationCache`]. Implementations must tolerate
/// concurrent callers.
pub trait CacheStore: Send + Sync {
    fn latest(&self, source_text: &str) -> Result<Option<String>, CacheError>;
    fn append(&self, source_text: &str, translated_text: &str) -> Result<(), CacheError>;
    /// All entries for a text, most recent first.
    fn history(&self, source_text: &str) -> Result<Vec<CacheEntry>, CacheError>;
}

/// Shared handle to the translation cache. Cloning is cheap and all clones see the
/// same store.
#[derive(Clone)]
pub struct TranslationCache {
    store: Arc<dyn CacheStore>,
}

impl TranslationCache {
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::default())
    }

    pub fn lookup(&self, source_text: &str) -> Option<String> {
        match self.store.latest(source_text) {
            Ok(hit) => {
                if hit.is_some() {
                    debug!(source = source_text, "cache hit");
                }
                hit
            }
            Err(err) => {
                warn!(error = %err, "cache lookup failed; treating as miss");
                None
            }
        }
    }

    pub fn store(&self, source_text: &str, translated_text: &str) {
        if let Err(err) = self.store.append(source_text, translated_text) {
            warn!(error = %err, "cache store failed");
        }
    }

    pub fn history(&self, source_text: &str) -> Vec<CacheEntry> {
        self.store.history(source_text).unwrap_or_else(|err| {
            warn!(error = %err, "cache history read failed");
            Vec::new()
        })
    }
}

/// Volatile store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<CacheEntry>>,
}

impl CacheStore for MemoryStore {
    fn latest(&self, source_text: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .read()
            .iter()
            .rev()
            .find(|entry| entry.source_text == source_text)
            .map(|entry| entry.translated_text.clone()))
    }

    fn append(&self, source_text: &str, translated_text: &str) -> Result<(), CacheError> {
        self.entries.write().push(CacheEntry {
            source_text: source_text.to_string(),
            translated_text: translated_text.to_string(),
            created_at: now_millis(),
        });
        Ok(())
    }

    fn history(&self, source_text: &str) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self
            .entries
            .read()
            .iter()
            .rev()
            .filter(|entry| entry.source_text == source_text)
            .cloned()
            .collect())
    }
}

pub(crate) fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn latest(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }

        fn append(&self, _: &str, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }

        fn history(&self, _: &str) -> Result<Vec<CacheEntry>, CacheError> {
            Err(CacheError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[test]
    fn newest_entry_wins() {
        let cache = TranslationCache::in_memory();
        cache.store("Hello", "你好");
        cache.store("Hello", "您好");
        assert_eq!(cache.lookup("Hello").as_deref(), Some("您好"));

        let history = cache.history("Hello");
        let texts = history
            .iter()
            .map(|entry| entry.translated_text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["您好", "你好"]);
    }

    #[test]
    fn lookup_requires_exact_match() {
        let cache = TranslationCache::in_memory();
        cache.store("Hello", "你好");
        assert_eq!(cache.lookup("hello"), None);
        assert_eq!(cache.lookup("Hello "), None);
    }

    #[test]
    fn broken_store_degrades_to_miss() {
        let cache = TranslationCache::new(BrokenStore);
        cache.store("Hello", "你好");
        assert_eq!(cache.lookup("Hello"), None);
        assert!(cache.history("Hello").is_empty());
    }

    #[test]
    fn clones_share_the_store() {
        let cache = TranslationCache::in_memory();
        let other = cache.clone();
        other.store("Save", "保存");
        assert_eq!(cache.lookup("Save").as_deref(), Some("保存"));
    }
}

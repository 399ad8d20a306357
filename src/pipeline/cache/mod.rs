
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::synthesis::Answer;

/// One cached pipeline result
#[derive(Debug, Clone)]
struct CachedAnswer {
    answer: Answer,
    stored_at: Instant,
}

/// Cache statistics for the status surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// TTL cache over pipeline answers, keyed by normalized query text.
///
/// Purely an optimization: the pipeline produces identical results with the
/// cache absent, just slower. Lookups and inserts are atomic per key;
/// expired entries are dropped on read so they are never returned as fresh.
pub struct AnswerCache {
    entries: Mutex<HashMap<String, CachedAnswer>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnswerCache {
    #[inline]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key for a query: whitespace-collapsed lowercase text, hashed.
    /// "Wifi  Issue" and "wifi issue" share an entry.
    #[inline]
    pub fn query_key(query_text: &str) -> String {
        let normalized = query_text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        format!("{:x}", digest)
    }

    /// Look up a non-expired answer for the query
    #[inline]
    pub fn get(&self, query_text: &str) -> Option<Answer> {
        let key = Self::query_key(query_text);

        let Ok(mut entries) = self.entries.lock() else {
            // A poisoned cache is a cache miss, never a failure
            warn!("Cache lock poisoned, treating as miss");
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let cached = entries.get(&key).cloned();
        match cached {
            Some(cached) if cached.stored_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for key {}", &key[..8]);
                Some(cached.answer)
            }
            Some(_) => {
                debug!("Cache entry expired for key {}", &key[..8]);
                entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace the answer for a query
    #[inline]
    pub fn insert(&self, query_text: &str, answer: Answer) {
        let key = Self::query_key(query_text);

        let Ok(mut entries) = self.entries.lock() else {
            warn!("Cache lock poisoned, dropping insert");
            return;
        };

        entries.insert(
            key,
            CachedAnswer {
                answer,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop all entries
    #[inline]
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            let count = entries.len();
            entries.clear();
            debug!("Cleared {} cache entries", count);
        }
    }

    /// Drop expired entries eagerly. Optional; `get` also drops them lazily.
    #[inline]
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|_, cached| cached.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

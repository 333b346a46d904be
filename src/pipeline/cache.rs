//! Time-bounded cache for model-assisted scan verdicts.
//!
//! The model tier of the scan detector is the only expensive step of
//! detection, and identical page text (repeated cover sheets, blank forms)
//! shows up constantly. Verdicts are keyed by a digest of the page text and
//! expire after a TTL.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Entries beyond this count trigger a sweep of expired ones.
const PRUNE_THRESHOLD: usize = 1024;

/// Cache key for a page's text: lowercase SHA-256 hex of its UTF-8 bytes.
pub fn cache_key(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Key → verdict store with per-entry expiry.
///
/// Implementations are shared across concurrent jobs; a failing backend
/// should behave like a miss rather than surface an error.
pub trait VerdictCache: Send + Sync {
    /// `Some(is_scanned)` for a live entry, `None` for a miss or expired entry.
    fn get(&self, key: &str) -> Option<bool>;

    fn set(&self, key: &str, is_scanned: bool, ttl: Duration);
}

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    verdict: bool,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`VerdictCache`].
pub struct MemoryVerdictCache<C: Clock = SystemClock> {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: C,
}

impl MemoryVerdictCache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryVerdictCache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryVerdictCache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: Clock> VerdictCache for MemoryVerdictCache<C> {
    fn get(&self, key: &str) -> Option<bool> {
        let now = self.clock.now();
        self.entries.read().ok().and_then(|guard| {
            guard
                .get(key)
                .filter(|entry| !entry.is_expired(now))
                .map(|entry| entry.verdict)
        })
    }

    fn set(&self, key: &str, is_scanned: bool, ttl: Duration) {
        let now = self.clock.now();
        if let Ok(mut guard) = self.entries.write() {
            guard.insert(
                key.to_string(),
                CacheEntry {
                    verdict: is_scanned,
                    expires_at: now + ttl,
                },
            );
            if guard.len() > PRUNE_THRESHOLD {
                guard.retain(|_, entry| !entry.is_expired(now));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Clock that only moves when told to.
    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn key_is_sha256_hex() {
        assert_eq!(
            cache_key(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(cache_key("same"), cache_key("same"));
        assert_ne!(cache_key("a"), cache_key("b"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let clock = ManualClock::new();
        let cache = MemoryVerdictCache::with_clock(clock.clone());
        cache.set("k", true, Duration::from_secs(3600));

        assert_eq!(cache.get("k"), Some(true));
        clock.advance(Duration::from_secs(3599));
        assert_eq!(cache.get("k"), Some(true));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn set_overwrites_previous_verdict() {
        let cache = MemoryVerdictCache::new();
        cache.set("k", true, Duration::from_secs(60));
        cache.set("k", false, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(false));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unknown_key_is_a_miss() {
        let cache = MemoryVerdictCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get("nope"), None);
    }
}

//! Username → chat-id resolution cache.
//!
//! Resolving a public handle costs a transport round-trip, so results are
//! memoized with a TTL. One entry per normalized handle; a refresh overwrites,
//! an expired entry is treated as absent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default entry lifetime.
pub const DEFAULT_RESOLVE_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheEntry {
    chat_id:     i64,
    resolved_at: Instant,
}

/// TTL-bounded map from normalized handle to chat id.
pub struct UsernameCache {
    entries: HashMap<String, CacheEntry>,
    ttl:     Duration,
}

impl UsernameCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    /// Canonical form of a handle: leading `@` stripped, ASCII-lowercased.
    ///
    /// Returns `None` for handles that are empty after normalization — those
    /// are a caller error and must never reach the transport.
    pub fn normalize(handle: &str) -> Option<String> {
        let h = handle.trim().trim_start_matches('@');
        if h.is_empty() {
            None
        } else {
            Some(h.to_ascii_lowercase())
        }
    }

    /// Look up a normalized handle. Expired entries are misses.
    pub fn get(&self, handle: &str) -> Option<i64> {
        self.entries
            .get(handle)
            .filter(|e| e.resolved_at.elapsed() < self.ttl)
            .map(|e| e.chat_id)
    }

    /// Store (or refresh) the resolution for a normalized handle.
    pub fn insert(&mut self, handle: String, chat_id: i64) {
        self.entries.insert(handle, CacheEntry { chat_id, resolved_at: Instant::now() });
    }
}

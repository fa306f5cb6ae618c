//! Message-identity dedup cache
//!
//! One cache per relay actor. Prevents re-delivery when the upstream returns
//! overlapping batches across poll rounds. Entries are swept on a fixed
//! period; there is no size cap beyond time-based eviction.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Time-windowed set of recently delivered message identifiers
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: DashMap<String, Instant>,
}

impl DedupCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert-before-broadcast check.
    ///
    /// Returns `true` if the id was absent (now recorded; caller should
    /// broadcast). Returns `false` for a duplicate; the original timestamp is
    /// not refreshed, so an id seen continuously still expires one window
    /// after its first delivery.
    pub fn check_and_insert(&self, message_id: &str) -> bool {
        if self.entries.contains_key(message_id) {
            return false;
        }
        self.entries
            .insert(message_id.to_string(), Instant::now());
        true
    }

    /// Remove every entry older than `window`
    pub fn sweep(&self, window: Duration) {
        let now = Instant::now();
        self.entries
            .retain(|_, first_seen| now.duration_since(*first_seen) < window);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Sender-side cache of recently emitted fragments, kept around to
//! serve retransmission requests.

use crate::fragment::Fragment;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FragmentCacheConfig {
    pub max_age: Duration,
    pub max_sessions: usize,
    pub max_memory_bytes: usize,
}

impl Default for FragmentCacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            max_sessions: 256,
            max_memory_bytes: 10 * 1024 * 1024,
        }
    }
}

struct Session {
    fragments: Vec<Option<Fragment>>,
    inserted_at: Instant,
    byte_size: usize,
}

/// Caches outgoing fragments by `message_id` so a peer's retransmit
/// request can be served without re-fragmenting the original payload.
pub struct FragmentCache {
    sessions: LruCache<[u8; 16], Session>,
    config: FragmentCacheConfig,
    total_bytes: usize,
}

impl FragmentCache {
    #[must_use]
    pub fn new(config: FragmentCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_sessions.max(1)).unwrap();
        Self { sessions: LruCache::new(capacity), config, total_bytes: 0 }
    }

    pub fn insert_all(&mut self, fragments: &[Fragment]) {
        self.sweep();
        if fragments.is_empty() {
            return;
        }
        let message_id = fragments[0].header.message_id;
        let total = fragments[0].header.total_fragments as usize;
        let byte_size: usize = fragments.iter().map(Fragment::frame_len).sum();

        let mut slots: Vec<Option<Fragment>> = vec![None; total];
        for fragment in fragments {
            let idx = fragment.header.sequence_number as usize;
            if idx < slots.len() {
                slots[idx] = Some(fragment.clone());
            }
        }

        if let Some(evicted) = self.sessions.put(message_id, Session { fragments: slots, inserted_at: Instant::now(), byte_size }) {
            self.total_bytes = self.total_bytes.saturating_sub(evicted.byte_size);
        }
        self.total_bytes += byte_size;
        self.evict_for_memory();
    }

    #[must_use]
    pub fn get(&mut self, message_id: &[u8; 16], sequence_number: u16) -> Option<Fragment> {
        self.sessions.get(message_id).and_then(|session| session.fragments.get(sequence_number as usize).cloned().flatten())
    }

    /// Drops sessions older than `max_age`.
    pub fn sweep(&mut self) {
        let max_age = self.config.max_age;
        let stale: Vec<[u8; 16]> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.inserted_at.elapsed() > max_age)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(session) = self.sessions.pop(&id) {
                self.total_bytes = self.total_bytes.saturating_sub(session.byte_size);
            }
        }
    }

    fn evict_for_memory(&mut self) {
        while self.total_bytes > self.config.max_memory_bytes {
            let Some((_, session)) = self.sessions.pop_lru() else { break };
            self.total_bytes = self.total_bytes.saturating_sub(session.byte_size);
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

//! In-memory TTL cache from video id to resolved CDN URL.
//!
//! Keyed by video id rather than share URL so the `/resolve` and `/stream`
//! endpoints share hits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

struct Entry {
    cdn_url: String,
    expires_at: Instant,
}

/// Thread-safe TTL cache guarding repeat external resolves.
pub(crate) struct CdnCache {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl CdnCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached CDN URL for `video_id`, if present and unexpired.
    pub(crate) fn get(&self, video_id: Uuid) -> Option<String> {
        let mut guard = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        match guard.get(&video_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.cdn_url.clone()),
            Some(_) => {
                guard.remove(&video_id);
                None
            }
            None => None,
        }
    }

    /// Cache `cdn_url` for `video_id` until the configured TTL elapses.
    pub(crate) fn insert(&self, video_id: Uuid, cdn_url: String) {
        let mut guard = self.entries.lock().unwrap_or_else(|err| err.into_inner());
        guard.insert(
            video_id,
            Entry {
                cdn_url,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::CdnCache;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn round_trips_a_cached_value() {
        let cache = CdnCache::new(Duration::from_secs(60));
        let id = Uuid::new_v4();
        assert!(cache.get(id).is_none());
        cache.insert(id, "https://cdn.example/a.mp4".to_string());
        assert_eq!(cache.get(id).as_deref(), Some("https://cdn.example/a.mp4"));
    }

    #[test]
    fn expires_entries_past_their_ttl() {
        let cache = CdnCache::new(Duration::from_millis(0));
        let id = Uuid::new_v4();
        cache.insert(id, "https://cdn.example/a.mp4".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(id).is_none());
    }
}

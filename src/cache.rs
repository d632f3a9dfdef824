//! In-process TTL cache used for webhook deduplication, cancel intents, and
//! short-lived auth tokens.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// String key/value cache with per-entry expiry. Expired entries are dropped
/// lazily on access.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl TtlCache {
    pub fn new() -> Self {
        TtlCache::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.into(), (Instant::now() + ttl, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((expires, value)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert `key` only if absent (or expired). Returns false when the key
    /// was already live, which is the duplicate-delivery signal.
    pub fn set_if_absent(&self, key: impl Into<String>, ttl: Duration) -> bool {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match entries.get(&key) {
            Some((expires, _)) if *expires > now => false,
            _ => {
                entries.insert(key, (now + ttl, String::new()));
                true
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_disappear() {
        let cache = TtlCache::new();
        cache.set("k", "v", Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn set_if_absent_rejects_live_duplicates() {
        let cache = TtlCache::new();
        assert!(cache.set_if_absent("evt_1", Duration::from_secs(60)));
        assert!(!cache.set_if_absent("evt_1", Duration::from_secs(60)));
        assert!(cache.set_if_absent("evt_2", Duration::from_secs(60)));
    }

    #[test]
    fn remove_returns_value() {
        let cache = TtlCache::new();
        cache.set("token", "PE-0001", Duration::from_secs(60));
        assert_eq!(cache.remove("token").as_deref(), Some("PE-0001"));
        assert_eq!(cache.get("token"), None);
    }
}

//! Per-session grant bookkeeping.
//!
//! Tracks which page names currently hold a live, unconsumed grant. The
//! store itself is plain data inside [`crate::session::SessionState`]; all
//! timing comes in through the caller so the lifecycle can run against a
//! simulated clock.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// One live grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantEntry {
    /// Instant the grant stops validating.
    pub expires_at: DateTime<Utc>,
}

/// Live grants keyed by page name.
#[derive(Debug, Default)]
pub struct TokenStore {
    entries: HashMap<String, GrantEntry>,
}

impl TokenStore {
    /// Insert or overwrite the grant for `name`, expiring at `now + timeout`.
    pub fn put(&mut self, name: &str, now: DateTime<Utc>, timeout: Duration) {
        self.entries.insert(
            name.to_owned(),
            GrantEntry {
                expires_at: now + timeout,
            },
        );
    }

    /// Extend the grant for `name` to `now + timeout`.
    ///
    /// Returns `false` when no grant exists; expiry is never pushed further
    /// than one timeout from the supplied instant.
    pub fn touch(&mut self, name: &str, now: DateTime<Utc>, timeout: Duration) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.expires_at = now + timeout;
                true
            }
            None => false,
        }
    }

    /// Whether `name` holds an unexpired grant.
    #[must_use]
    pub fn is_live(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| now < entry.expires_at)
    }

    /// Expiry instant of the grant for `name`, when one exists.
    #[must_use]
    pub fn expires_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.get(name).map(|entry| entry.expires_at)
    }

    /// Remove the grant for `name` unconditionally. Idempotent.
    pub fn consume(&mut self, name: &str) {
        self.entries.remove(name);
    }

    /// Drop every grant whose expiry has passed, returning the page names
    /// dropped so the caller can clear dependent form definitions.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            self.entries.remove(name);
        }
        expired
    }

    /// Number of live entries (expired-but-unswept included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn grant_is_live_until_timeout() {
        let mut store = TokenStore::default();
        let start = now();
        store.put("page", start, Duration::seconds(5));

        assert!(store.is_live("page", start + Duration::seconds(4)));
        assert!(!store.is_live("page", start + Duration::seconds(6)));
        // Expiry boundary itself is dead: the entry expires *at* the instant.
        assert!(!store.is_live("page", start + Duration::seconds(5)));
    }

    #[test]
    fn touch_extends_and_reports_missing() {
        let mut store = TokenStore::default();
        let start = now();
        assert!(!store.touch("page", start, Duration::seconds(5)));

        store.put("page", start, Duration::seconds(5));
        let later = start + Duration::seconds(3);
        assert!(store.touch("page", later, Duration::seconds(5)));
        assert_eq!(
            store.expires_at("page"),
            Some(later + Duration::seconds(5))
        );
    }

    #[test]
    fn consume_is_idempotent() {
        let mut store = TokenStore::default();
        store.put("page", now(), Duration::seconds(5));
        store.consume("page");
        store.consume("page");
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_returns_expired_names_only() {
        let mut store = TokenStore::default();
        let start = now();
        store.put("stale", start, Duration::seconds(1));
        store.put("fresh", start, Duration::seconds(60));

        let swept = store.sweep_expired(start + Duration::seconds(2));
        assert_eq!(swept, vec!["stale".to_string()]);
        assert!(store.is_live("fresh", start + Duration::seconds(2)));
        assert_eq!(store.len(), 1);
    }
}

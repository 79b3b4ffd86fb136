#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use lumen_abr::QualityLevel;
use lumen_core::SourceRef;
use web_time::Instant;

use crate::resolver::SignedUrl;

type Key = (SourceRef, QualityLevel);

/// Signed rendition URLs shared across sessions.
///
/// Entries live until their signature expires (minus `expiry_margin`).
/// Expired entries are evicted when looked up; there is no sweeper.
#[derive(Clone, Debug)]
pub struct UrlCache {
    entries: Arc<DashMap<Key, SignedUrl>>,
    expiry_margin: Duration,
}

impl UrlCache {
    pub fn new(expiry_margin: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            expiry_margin,
        }
    }

    /// Valid cached URL for `(source, level)`, evicting it if expired.
    pub fn get(&self, source: &SourceRef, level: QualityLevel, now: Instant) -> Option<SignedUrl> {
        let key = (source.clone(), level);
        {
            // The read guard must be released before `remove_if` locks the shard.
            let entry = self.entries.get(&key)?;
            if entry.is_valid_at(now, self.expiry_margin) {
                return Some(entry.clone());
            }
        }
        self.entries
            .remove_if(&key, |_, url| !url.is_valid_at(now, self.expiry_margin));
        tracing::trace!(%source, %level, "evicted expired rendition URL");
        None
    }

    /// Store `url` unless a valid entry already exists; returns the entry that
    /// ends up cached.
    pub fn insert_if_absent(
        &self,
        source: &SourceRef,
        level: QualityLevel,
        url: SignedUrl,
        now: Instant,
    ) -> SignedUrl {
        match self.entries.entry((source.clone(), level)) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_valid_at(now, self.expiry_margin) {
                    occupied.get().clone()
                } else {
                    occupied.insert(url.clone());
                    url
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(url.clone());
                url
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UrlCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn url(path: &str, expires_at: Instant) -> SignedUrl {
        SignedUrl {
            url: Url::parse(&format!("https://cdn.example.com/{path}")).unwrap(),
            expires_at,
        }
    }

    #[test]
    fn expired_entries_are_evicted_on_lookup() {
        let cache = UrlCache::new(Duration::ZERO);
        let source = SourceRef::new("v1");
        let now = Instant::now();
        cache.insert_if_absent(&source, QualityLevel::P720, url("a", now + Duration::from_secs(1)), now);
        assert_eq!(cache.len(), 1);

        let later = now + Duration::from_secs(2);
        assert!(cache.get(&source, QualityLevel::P720, later).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_keeps_the_first_valid_entry() {
        let cache = UrlCache::new(Duration::ZERO);
        let source = SourceRef::new("v1");
        let now = Instant::now();
        let ttl = now + Duration::from_secs(60);

        let first = cache.insert_if_absent(&source, QualityLevel::P480, url("first", ttl), now);
        let second = cache.insert_if_absent(&source, QualityLevel::P480, url("second", ttl), now);
        assert_eq!(first, second);
        assert_eq!(second.url.path(), "/first");
    }

    #[test]
    fn margin_treats_nearly_expired_urls_as_expired() {
        let cache = UrlCache::new(Duration::from_secs(10));
        let source = SourceRef::new("v1");
        let now = Instant::now();
        cache.insert_if_absent(&source, QualityLevel::P360, url("a", now + Duration::from_secs(5)), now);
        assert!(cache.get(&source, QualityLevel::P360, now).is_none());
    }

    #[test]
    fn levels_and_sources_are_separate_keys() {
        let cache = UrlCache::default();
        let now = Instant::now();
        let ttl = now + Duration::from_secs(600);
        cache.insert_if_absent(&SourceRef::new("a"), QualityLevel::P720, url("a720", ttl), now);
        cache.insert_if_absent(&SourceRef::new("b"), QualityLevel::P720, url("b720", ttl), now);
        cache.insert_if_absent(&SourceRef::new("a"), QualityLevel::P1080, url("a1080", ttl), now);
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache
                .get(&SourceRef::new("b"), QualityLevel::P720, now)
                .unwrap()
                .url
                .path(),
            "/b720"
        );
    }
}

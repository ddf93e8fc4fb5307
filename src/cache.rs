//! Caller-side result cache
//!
//! Analytics passes are pure, so results for an unchanged (snapshot version,
//! filter) pair can be reused. [`ResultCache`] is an explicit object owned by
//! the caller layer with a fixed time-to-live; the engine never consults it.
//!
//! Time is always passed in, never read from the clock, which keeps expiry
//! deterministic under test.

use crate::error::AnalyticsError;
use crate::filter::AnalyticsFilter;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

/// Default time-to-live in seconds
pub const DEFAULT_TTL_SECONDS: i64 = 300;

/// Identifies one analytics result
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub snapshot_version: u64,
    pub filter_fingerprint: String,
}

impl CacheKey {
    pub fn new(snapshot_version: u64, filter: &AnalyticsFilter) -> Result<Self, AnalyticsError> {
        Ok(Self {
            snapshot_version,
            filter_fingerprint: filter.fingerprint()?,
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Time-boxed cache of analytics results
#[derive(Debug, Clone)]
pub struct ResultCache<V> {
    ttl: Duration,
    entries: BTreeMap<CacheKey, CacheEntry<V>>,
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
            entries: BTreeMap::new(),
        }
    }
}

impl<V> ResultCache<V> {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Result<Self, AnalyticsError> {
        if ttl <= Duration::zero() {
            return Err(AnalyticsError::InvalidConfig(format!(
                "cache ttl must be positive, got {}s",
                ttl.num_seconds()
            )));
        }
        Ok(Self {
            ttl,
            entries: BTreeMap::new(),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`; expired entries are treated as absent
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| &entry.value)
    }

    /// Store a value, returning the one it replaced (expired or not)
    pub fn insert(&mut self, key: CacheKey, value: V, now: DateTime<Utc>) -> Option<V> {
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        self.entries.insert(key, entry).map(|old| old.value)
    }

    /// Return the live value or compute, store and return a new one
    pub fn get_or_insert_with<F, E>(
        &mut self,
        key: CacheKey,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<&V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let expires_at = now + self.ttl;
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if now >= occupied.get().expires_at {
                    debug!(
                        snapshot_version = occupied.key().snapshot_version,
                        "cache entry expired"
                    );
                    let value = compute()?;
                    occupied.insert(CacheEntry { value, expires_at });
                }
                Ok(&occupied.into_mut().value)
            }
            Entry::Vacant(vacant) => {
                debug!(snapshot_version = vacant.key().snapshot_version, "cache miss");
                let value = compute()?;
                Ok(&vacant.insert(CacheEntry { value, expires_at }).value)
            }
        }
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry computed from `snapshot_version`
    pub fn invalidate_snapshot(&mut self, snapshot_version: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key.snapshot_version != snapshot_version);
        let removed = before - self.entries.len();
        debug!(snapshot_version, removed, "snapshot invalidated");
        removed
    }

    /// Drop every entry computed from a snapshot older than `snapshot_version`
    pub fn invalidate_before(&mut self, snapshot_version: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key.snapshot_version >= snapshot_version);
        before - self.entries.len()
    }

    /// Drop expired entries
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

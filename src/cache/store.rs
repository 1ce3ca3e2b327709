//! Typed key/value store with lazy expiry and cascading invalidation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::counter;
use studycache_api_types::{CacheEntryView, CacheType, KeyResult};
use time::OffsetDateTime;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::config::{CacheConfig, CascadeMode};
use super::entry::{CacheEntry, EntryId, EntryOptions, KeyPattern};
use super::error::CacheError;
use super::lock::{rw_read, rw_write};
use super::namespace::CacheNamespace;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_STORE_HIT: &str = "studycache_store_hit_total";
pub(crate) const METRIC_STORE_MISS: &str = "studycache_store_miss_total";
pub(crate) const METRIC_STORE_INVALIDATED: &str = "studycache_store_invalidated_total";

/// Result of invalidating one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvalidationOutcome {
    /// Entries stored under the key itself (any type or scope).
    pub removed: usize,
    /// Entries removed because they listed the key in `related_keys`.
    pub cascaded: usize,
}

impl InvalidationOutcome {
    pub fn total(&self) -> usize {
        self.removed + self.cascaded
    }
}

/// Result of an administrative write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// An entry already holds the id and overwrite was not requested.
    Exists,
}

/// Server-side cache shared by every request handler.
///
/// Expiry is evaluated on read only; expired entries stay in the map until
/// they are invalidated, cleared, overwritten or purged.
pub struct CacheStore {
    entries: RwLock<HashMap<EntryId, CacheEntry>>,
    clock: Arc<dyn Clock>,
    cascade: CascadeMode,
}

impl CacheStore {
    /// Create a store backed by the system clock.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            cascade: config.cascade,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    // ========================================================================
    // Read / write
    // ========================================================================

    /// Store `data` under `(key, cache_type, options.scope)` for `ttl`,
    /// replacing any previous entry wholesale.
    pub fn set(
        &self,
        key: &str,
        cache_type: CacheType,
        data: serde_json::Value,
        ttl: Duration,
        options: EntryOptions,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::validation("ttl must be greater than zero"));
        }
        let span = time::Duration::try_from(ttl)
            .map_err(|_| CacheError::validation("ttl is too large"))?;
        let created_at = self.now();
        let expires_at = created_at
            .checked_add(span)
            .ok_or_else(|| CacheError::validation("ttl is too large"))?;

        let entry = CacheEntry {
            key: key.to_string(),
            cache_type,
            data,
            created_at,
            expires_at,
            related_keys: options.related_keys,
            scope: options.scope,
        };
        entry.check_lifetime()?;

        debug!(
            op = "set",
            key,
            cache_type = %cache_type,
            ttl_secs = ttl.as_secs(),
            "cache entry stored"
        );
        rw_write(&self.entries, SOURCE, "set").insert(entry.id(), entry);
        Ok(())
    }

    /// Return the payload for a live entry.
    pub fn get(
        &self,
        key: &str,
        cache_type: CacheType,
        scope: Option<&str>,
    ) -> Option<serde_json::Value> {
        self.live_entry(key, cache_type, scope)
            .map(|entry| entry.data)
    }

    /// Return a clone of the live entry, recording hit/miss metrics.
    pub fn live_entry(
        &self,
        key: &str,
        cache_type: CacheType,
        scope: Option<&str>,
    ) -> Option<CacheEntry> {
        let now = self.now();
        let id = EntryId::new(key, cache_type, scope);
        let found = rw_read(&self.entries, SOURCE, "get")
            .get(&id)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned();

        if found.is_some() {
            counter!(METRIC_STORE_HIT, "cache_type" => cache_type.as_str()).increment(1);
        } else {
            counter!(METRIC_STORE_MISS, "cache_type" => cache_type.as_str()).increment(1);
        }
        found
    }

    /// Typed `set` for a namespace whose payload shape is known statically.
    pub fn put<N: CacheNamespace>(
        &self,
        key: &str,
        payload: &N::Payload,
        ttl: Duration,
        options: EntryOptions,
    ) -> Result<(), CacheError> {
        let data = serde_json::to_value(payload).map_err(|source| CacheError::Payload {
            cache_type: N::CACHE_TYPE,
            source,
        })?;
        self.set(key, N::CACHE_TYPE, data, ttl, options)
    }

    /// Typed `get`; a stored payload of the wrong shape is an error, not a miss.
    pub fn fetch<N: CacheNamespace>(
        &self,
        key: &str,
        scope: Option<&str>,
    ) -> Result<Option<N::Payload>, CacheError> {
        self.get(key, N::CACHE_TYPE, scope)
            .map(|data| {
                serde_json::from_value(data).map_err(|source| CacheError::Payload {
                    cache_type: N::CACHE_TYPE,
                    source,
                })
            })
            .transpose()
    }

    /// Write a fully formed entry, keeping its original timestamps.
    ///
    /// Any stored entry under the same identity counts as existing, expired or
    /// not. Existence check and insert happen under one write lock, so a
    /// concurrent writer cannot slip in between when `overwrite` is false.
    pub fn put_entry(&self, entry: CacheEntry, overwrite: bool) -> Result<PutOutcome, CacheError> {
        entry.check_lifetime()?;
        let id = entry.id();

        let mut entries = rw_write(&self.entries, SOURCE, "put_entry");
        if !overwrite && entries.contains_key(&id) {
            return Ok(PutOutcome::Exists);
        }
        entries.insert(id, entry);
        Ok(PutOutcome::Written)
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Remove every entry stored under `key`, then every entry whose
    /// `related_keys` contains it (following further hops when the store is
    /// configured for transitive cascades).
    pub fn invalidate(&self, key: &str) -> Result<InvalidationOutcome, CacheError> {
        if key.trim().is_empty() {
            return Err(CacheError::validation("cache key must not be empty"));
        }

        let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
        let plan = plan_invalidation(&entries, &[key], self.cascade);
        for id in plan.direct.iter().chain(plan.cascaded.iter()) {
            entries.remove(id);
        }
        drop(entries);

        let outcome = InvalidationOutcome {
            removed: plan.direct.len(),
            cascaded: plan.cascaded.len(),
        };
        counter!(METRIC_STORE_INVALIDATED).increment(outcome.total() as u64);
        info!(
            op = "invalidate",
            key,
            removed = outcome.removed,
            cascaded = outcome.cascaded,
            "cache key invalidated"
        );
        Ok(outcome)
    }

    /// Invalidate each key independently; one failing key never aborts the
    /// rest of the batch.
    pub fn invalidate_multiple(&self, keys: &[String]) -> Vec<KeyResult> {
        keys.iter()
            .map(|key| match self.invalidate(key) {
                Ok(outcome) => KeyResult {
                    key: key.clone(),
                    success: true,
                    removed: outcome.total(),
                    error: None,
                },
                Err(err) => KeyResult {
                    key: key.clone(),
                    success: false,
                    removed: 0,
                    error: Some(err.to_string()),
                },
            })
            .collect()
    }

    /// Number of entries `invalidate_multiple(keys)` would remove right now.
    pub fn count_invalidation(&self, keys: &[String]) -> usize {
        let keys: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|key| !key.trim().is_empty())
            .collect();
        let entries = rw_read(&self.entries, SOURCE, "count_invalidation");
        let plan = plan_invalidation(&entries, &keys, self.cascade);
        plan.direct.len() + plan.cascaded.len()
    }

    /// Remove all entries of a type, optionally restricted to one scope.
    pub fn clear_by_type(&self, cache_type: CacheType, scope: Option<&str>) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear_by_type");
        let before = entries.len();
        entries.retain(|id, _| {
            !(id.cache_type == cache_type && scope.is_none_or(|s| id.scope.as_deref() == Some(s)))
        });
        let removed = before - entries.len();
        drop(entries);

        counter!(METRIC_STORE_INVALIDATED).increment(removed as u64);
        info!(op = "clear_by_type", cache_type = %cache_type, scope, removed, "cache type cleared");
        removed
    }

    /// Number of entries whose key matches `pattern`.
    pub fn count_by_pattern(&self, pattern: &KeyPattern) -> usize {
        rw_read(&self.entries, SOURCE, "count_by_pattern")
            .keys()
            .filter(|id| pattern.matches(&id.key))
            .count()
    }

    /// Remove every entry whose key matches `pattern`.
    ///
    /// Callers outside the admin layer bypass the confirmation gate; prefer
    /// [`CacheAdmin`](super::CacheAdmin) for operator-triggered clears.
    pub fn clear_by_pattern(&self, pattern: &KeyPattern) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear_by_pattern");
        let before = entries.len();
        entries.retain(|id, _| !pattern.matches(&id.key));
        let removed = before - entries.len();
        drop(entries);

        counter!(METRIC_STORE_INVALIDATED).increment(removed as u64);
        info!(
            op = "clear_by_pattern",
            pattern = pattern.as_str(),
            removed,
            "cache pattern cleared"
        );
        removed
    }

    /// Drop entries that are already expired. Never runs on its own.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let mut entries = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        drop(entries);

        info!(op = "purge_expired", removed, "expired cache entries purged");
        removed
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Metadata of a stored entry, without its payload. Expired entries that
    /// have not been removed yet are reported with `expired: true`.
    pub fn metadata(
        &self,
        key: &str,
        cache_type: CacheType,
        scope: Option<&str>,
    ) -> Option<CacheEntryView> {
        let now = self.now();
        let id = EntryId::new(key, cache_type, scope);
        rw_read(&self.entries, SOURCE, "metadata")
            .get(&id)
            .map(|entry| entry.to_view(now, false))
    }

    /// Clone of every physically stored entry, expired ones included.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        rw_read(&self.entries, SOURCE, "snapshot")
            .values()
            .cloned()
            .collect()
    }

    /// Physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct InvalidationPlan {
    direct: HashSet<EntryId>,
    cascaded: HashSet<EntryId>,
}

fn plan_invalidation(
    entries: &HashMap<EntryId, CacheEntry>,
    keys: &[&str],
    mode: CascadeMode,
) -> InvalidationPlan {
    let direct: HashSet<EntryId> = entries
        .keys()
        .filter(|id| keys.contains(&id.key.as_str()))
        .cloned()
        .collect();

    let mut cascaded = HashSet::new();
    let mut visited: HashSet<String> = keys.iter().map(|key| key.to_string()).collect();
    let mut frontier = visited.clone();

    while !frontier.is_empty() {
        let hop: Vec<&CacheEntry> = entries
            .iter()
            .filter(|(id, _)| !direct.contains(*id) && !cascaded.contains(*id))
            .filter(|(_, entry)| frontier.iter().any(|key| entry.depends_on(key)))
            .map(|(_, entry)| entry)
            .collect();

        frontier = HashSet::new();
        for entry in hop {
            cascaded.insert(entry.id());
            if mode == CascadeMode::Transitive && visited.insert(entry.key.clone()) {
                frontier.insert(entry.key.clone());
            }
        }
    }

    InvalidationPlan { direct, cascaded }
}

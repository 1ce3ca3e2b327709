//! Read-only introspection over the cache store.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use studycache_api_types::{CacheEntryView, CacheType, StatsResponse, TypeStats};
use time::OffsetDateTime;
use tracing::info;

use super::config::CacheConfig;
use super::entry::KeyPattern;
use super::error::CacheError;
use super::store::CacheStore;

/// Selection for [`CacheMonitor::get_all_cache_entries`].
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub cache_type: Option<CacheType>,
    pub pattern: Option<String>,
    pub include_expired: bool,
    pub include_data: bool,
    /// Falls back to the configured default when unset.
    pub limit: Option<usize>,
}

/// Enumeration and metadata lookups for audit and export.
///
/// Initialization is lazy: every read brings the monitor up on first use.
pub struct CacheMonitor {
    store: Arc<CacheStore>,
    initialized_at: OnceLock<OffsetDateTime>,
    default_limit: usize,
}

impl CacheMonitor {
    pub fn new(store: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            initialized_at: OnceLock::new(),
            default_limit: config.monitor_default_limit.max(1),
        }
    }

    /// Bring the monitor up; later calls return the original timestamp.
    pub fn initialize(&self) -> OffsetDateTime {
        *self.initialized_at.get_or_init(|| {
            let now = self.store.now();
            info!(entries = self.store.len(), "cache monitor initialized");
            now
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized_at.get().is_some()
    }

    pub fn initialized_at(&self) -> Option<OffsetDateTime> {
        self.initialized_at.get().copied()
    }

    /// Entries sorted by key, then type, then scope.
    pub fn get_all_cache_entries(
        &self,
        filter: &EntryFilter,
    ) -> Result<Vec<CacheEntryView>, CacheError> {
        self.initialize();
        let pattern = filter.pattern.as_deref().map(KeyPattern::new).transpose()?;
        let limit = filter.limit.unwrap_or(self.default_limit);
        let now = self.store.now();

        let mut entries = self.store.snapshot();
        entries.sort_by(|a, b| a.id().cmp(&b.id()));

        Ok(entries
            .iter()
            .filter(|entry| filter.include_expired || !entry.is_expired_at(now))
            .filter(|entry| filter.cache_type.is_none_or(|kind| entry.cache_type == kind))
            .filter(|entry| pattern.as_ref().is_none_or(|p| p.matches(&entry.key)))
            .take(limit)
            .map(|entry| entry.to_view(now, filter.include_data))
            .collect())
    }

    /// Metadata without the payload; `expired` flags entries past their expiry.
    pub fn get_cache_entry_metadata(
        &self,
        key: &str,
        cache_type: CacheType,
        scope: Option<&str>,
    ) -> Option<CacheEntryView> {
        self.initialize();
        self.store.metadata(key, cache_type, scope)
    }

    /// Live and expired counts per type.
    pub fn stats(&self) -> StatsResponse {
        let initialized_at = self.initialize();
        let now = self.store.now();

        let mut by_type: BTreeMap<CacheType, TypeStats> = BTreeMap::new();
        for entry in self.store.snapshot() {
            let stats = by_type.entry(entry.cache_type).or_insert(TypeStats {
                cache_type: entry.cache_type,
                live: 0,
                expired: 0,
            });
            if entry.is_expired_at(now) {
                stats.expired += 1;
            } else {
                stats.live += 1;
            }
        }

        let by_type: Vec<TypeStats> = by_type.into_values().collect();
        StatsResponse {
            total: by_type.iter().map(|s| s.live + s.expired).sum(),
            expired: by_type.iter().map(|s| s.expired).sum(),
            by_type,
            monitor_initialized_at: Some(initialized_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use time::macros::datetime;

    use super::super::clock::ManualClock;
    use super::super::entry::EntryOptions;
    use super::*;

    fn fixture() -> (Arc<CacheStore>, CacheMonitor, ManualClock) {
        let clock = ManualClock::new(datetime!(2026-07-01 08:00 UTC));
        let config = CacheConfig {
            monitor_default_limit: 2,
            ..Default::default()
        };
        let store = Arc::new(CacheStore::with_clock(&config, Arc::new(clock.clone())));
        let monitor = CacheMonitor::new(Arc::clone(&store), &config);
        (store, monitor, clock)
    }

    #[test]
    fn reads_initialize_lazily() {
        let (_, monitor, _) = fixture();
        assert!(!monitor.is_initialized());
        let entries = monitor
            .get_all_cache_entries(&EntryFilter::default())
            .expect("enumerate");
        assert!(entries.is_empty());
        assert!(monitor.is_initialized());

        let first = monitor.initialized_at();
        monitor.initialize();
        assert_eq!(monitor.initialized_at(), first);
    }

    #[test]
    fn enumeration_filters_and_limits() {
        let (store, monitor, clock) = fixture();
        store
            .set(
                "sim:1",
                CacheType::Simulado,
                json!(1),
                Duration::from_secs(60),
                EntryOptions::default(),
            )
            .expect("set");
        store
            .set(
                "sim:2",
                CacheType::Simulado,
                json!(2),
                Duration::from_secs(3600),
                EntryOptions::default(),
            )
            .expect("set");
        store
            .set(
                "sim:3",
                CacheType::Simulado,
                json!(3),
                Duration::from_secs(3600),
                EntryOptions::default(),
            )
            .expect("set");
        store
            .set(
                "q:1",
                CacheType::Query,
                json!(4),
                Duration::from_secs(3600),
                EntryOptions::default(),
            )
            .expect("set");
        clock.advance(time::Duration::minutes(2));

        let live = monitor
            .get_all_cache_entries(&EntryFilter {
                pattern: Some("sim:*".into()),
                limit: Some(10),
                ..Default::default()
            })
            .expect("enumerate");
        let keys: Vec<&str> = live.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["sim:2", "sim:3"]);
        assert!(live.iter().all(|e| e.data.is_none()));

        let with_expired = monitor
            .get_all_cache_entries(&EntryFilter {
                cache_type: Some(CacheType::Simulado),
                include_expired: true,
                include_data: true,
                limit: Some(10),
                ..Default::default()
            })
            .expect("enumerate");
        assert_eq!(with_expired.len(), 3);
        assert!(with_expired[0].expired);
        assert_eq!(with_expired[0].data, Some(json!(1)));

        let limited = monitor
            .get_all_cache_entries(&EntryFilter::default())
            .expect("enumerate");
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let (_, monitor, _) = fixture();
        let err = monitor
            .get_all_cache_entries(&EntryFilter {
                pattern: Some("[".into()),
                ..Default::default()
            })
            .expect_err("bad glob");
        assert!(matches!(err, CacheError::Pattern(_)));
    }

    #[test]
    fn metadata_flags_expired_entries() {
        let (store, monitor, clock) = fixture();
        store
            .set("k", CacheType::Query, json!(1), Duration::from_secs(60), EntryOptions::default())
            .expect("set");
        let live = monitor
            .get_cache_entry_metadata("k", CacheType::Query, None)
            .expect("live metadata");
        assert!(!live.expired);
        assert!(live.data.is_none());

        clock.advance(time::Duration::minutes(2));
        let stale = monitor
            .get_cache_entry_metadata("k", CacheType::Query, None)
            .expect("expired entry is still reported");
        assert!(stale.expired);
        assert!(monitor.get_cache_entry_metadata("other", CacheType::Query, None).is_none());
    }

    #[test]
    fn stats_count_live_and_expired() {
        let (store, monitor, clock) = fixture();
        store
            .set("a", CacheType::Query, json!(1), Duration::from_secs(60), EntryOptions::default())
            .expect("set");
        store
            .set("b", CacheType::Query, json!(1), Duration::from_secs(600), EntryOptions::default())
            .expect("set");
        store
            .set(
                "c",
                CacheType::Session,
                json!(1),
                Duration::from_secs(600),
                EntryOptions::default(),
            )
            .expect("set");
        clock.advance(time::Duration::minutes(2));

        let stats = monitor.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.expired, 1);
        assert_eq!(
            stats.by_type,
            vec![
                TypeStats { cache_type: CacheType::Query, live: 1, expired: 1 },
                TypeStats { cache_type: CacheType::Session, live: 1, expired: 0 },
            ]
        );
    }
}

//! Local cache for list and detail resources.
//!
//! Every slot remembers when its value was fetched. A write carrying an older
//! `fetched_at` than the slot's is an out-of-order response and is dropped.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::debug;

use super::freshness::now_ms;
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "client::resource_cache";

/// Validators returned by the origin alongside a representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ResponseValidators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A cached representation. `data` is shared so a 304 keeps the same allocation.
#[derive(Debug)]
pub struct CachedValue<T> {
    pub data: Arc<T>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Epoch milliseconds at which the request producing this value was issued.
    pub fetched_at: i64,
}

impl<T> Clone for CachedValue<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> CachedValue<T> {
    pub fn new(data: T, validators: ResponseValidators, fetched_at: i64) -> Self {
        Self {
            data: Arc::new(data),
            etag: validators.etag,
            last_modified: validators.last_modified,
            fetched_at,
        }
    }

    pub fn validators(&self) -> ResponseValidators {
        ResponseValidators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }
}

/// One page of a scoped list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheIndex<T> {
    pub items: Vec<T>,
}

/// Detail cache with two independently refreshed slots.
#[derive(Debug)]
pub struct ResourceCache<M, Q> {
    pub meta: Option<CachedValue<M>>,
    pub questoes: Option<CachedValue<Q>>,
}

impl<M, Q> Default for ResourceCache<M, Q> {
    fn default() -> Self {
        Self {
            meta: None,
            questoes: None,
        }
    }
}

impl<M, Q> Clone for ResourceCache<M, Q> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            questoes: self.questoes.clone(),
        }
    }
}

/// Result of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    /// The slot already holds a value fetched later; the write was dropped.
    Stale,
    /// A touch found nothing to refresh.
    Missing,
}

type DetailKey = (String, String);

/// Client-side cache of simulado lists and details.
///
/// `S` is the list item, `M` the detail metadata, `Q` the question collection.
pub struct LocalResourceCache<S, M, Q> {
    indexes: RwLock<HashMap<String, CachedValue<CacheIndex<S>>>>,
    details: RwLock<HashMap<DetailKey, ResourceCache<M, Q>>>,
}

impl<S, M, Q> Default for LocalResourceCache<S, M, Q> {
    fn default() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
            details: RwLock::new(HashMap::new()),
        }
    }
}

impl<S, M, Q> LocalResourceCache<S, M, Q> {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Index
    // ========================================================================

    pub fn get_simulados_index(&self, scope: &str) -> Option<CachedValue<CacheIndex<S>>> {
        rw_read(&self.indexes, SOURCE, "get_index").get(scope).cloned()
    }

    pub fn set_simulados_index(
        &self,
        scope: &str,
        items: Vec<S>,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> WriteOutcome {
        self.set_simulados_index_at(
            scope,
            items,
            ResponseValidators {
                etag,
                last_modified,
            },
            now_ms(),
        )
    }

    pub fn set_simulados_index_at(
        &self,
        scope: &str,
        items: Vec<S>,
        validators: ResponseValidators,
        fetched_at: i64,
    ) -> WriteOutcome {
        let incoming = CachedValue::new(CacheIndex { items }, validators, fetched_at);
        let mut indexes = rw_write(&self.indexes, SOURCE, "set_index");
        let mut slot = indexes.remove(scope);
        let outcome = store_slot(&mut slot, incoming);
        if let Some(value) = slot {
            indexes.insert(scope.to_string(), value);
        }
        log_write("index", scope, None, outcome);
        outcome
    }

    /// Refresh `fetched_at` after a 304, keeping the cached items.
    pub fn touch_simulados_index(
        &self,
        scope: &str,
        validators: ResponseValidators,
        fetched_at: i64,
    ) -> WriteOutcome {
        let mut indexes = rw_write(&self.indexes, SOURCE, "touch_index");
        let outcome = touch_slot(indexes.get_mut(scope), validators, fetched_at);
        log_write("index", scope, None, outcome);
        outcome
    }

    // ========================================================================
    // Detail
    // ========================================================================

    pub fn get_simulado_cache(&self, scope: &str, slug: &str) -> Option<ResourceCache<M, Q>> {
        rw_read(&self.details, SOURCE, "get_detail")
            .get(&detail_key(scope, slug))
            .cloned()
    }

    pub fn upsert_simulado_meta(
        &self,
        scope: &str,
        slug: &str,
        meta: M,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> WriteOutcome {
        self.upsert_simulado_meta_at(
            scope,
            slug,
            meta,
            ResponseValidators {
                etag,
                last_modified,
            },
            now_ms(),
        )
    }

    pub fn upsert_simulado_meta_at(
        &self,
        scope: &str,
        slug: &str,
        meta: M,
        validators: ResponseValidators,
        fetched_at: i64,
    ) -> WriteOutcome {
        let incoming = CachedValue::new(meta, validators, fetched_at);
        let mut details = rw_write(&self.details, SOURCE, "upsert_meta");
        let entry = details.entry(detail_key(scope, slug)).or_default();
        let outcome = store_slot(&mut entry.meta, incoming);
        log_write("meta", scope, Some(slug), outcome);
        outcome
    }

    pub fn upsert_simulado_questoes(
        &self,
        scope: &str,
        slug: &str,
        questoes: Q,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> WriteOutcome {
        self.upsert_simulado_questoes_at(
            scope,
            slug,
            questoes,
            ResponseValidators {
                etag,
                last_modified,
            },
            now_ms(),
        )
    }

    pub fn upsert_simulado_questoes_at(
        &self,
        scope: &str,
        slug: &str,
        questoes: Q,
        validators: ResponseValidators,
        fetched_at: i64,
    ) -> WriteOutcome {
        let incoming = CachedValue::new(questoes, validators, fetched_at);
        let mut details = rw_write(&self.details, SOURCE, "upsert_questoes");
        let entry = details.entry(detail_key(scope, slug)).or_default();
        let outcome = store_slot(&mut entry.questoes, incoming);
        log_write("questoes", scope, Some(slug), outcome);
        outcome
    }

    pub fn touch_simulado_meta(
        &self,
        scope: &str,
        slug: &str,
        validators: ResponseValidators,
        fetched_at: i64,
    ) -> WriteOutcome {
        let mut details = rw_write(&self.details, SOURCE, "touch_meta");
        let slot = details
            .get_mut(&detail_key(scope, slug))
            .and_then(|entry| entry.meta.as_mut());
        let outcome = touch_slot(slot, validators, fetched_at);
        log_write("meta", scope, Some(slug), outcome);
        outcome
    }

    pub fn touch_simulado_questoes(
        &self,
        scope: &str,
        slug: &str,
        validators: ResponseValidators,
        fetched_at: i64,
    ) -> WriteOutcome {
        let mut details = rw_write(&self.details, SOURCE, "touch_questoes");
        let slot = details
            .get_mut(&detail_key(scope, slug))
            .and_then(|entry| entry.questoes.as_mut());
        let outcome = touch_slot(slot, validators, fetched_at);
        log_write("questoes", scope, Some(slug), outcome);
        outcome
    }

    /// Forget both slots of one detail.
    pub fn remove_simulado(&self, scope: &str, slug: &str) -> bool {
        rw_write(&self.details, SOURCE, "remove_detail")
            .remove(&detail_key(scope, slug))
            .is_some()
    }

    pub fn clear(&self) {
        rw_write(&self.indexes, SOURCE, "clear").clear();
        rw_write(&self.details, SOURCE, "clear").clear();
    }
}

fn detail_key(scope: &str, slug: &str) -> DetailKey {
    (scope.to_string(), slug.to_string())
}

fn store_slot<T>(slot: &mut Option<CachedValue<T>>, incoming: CachedValue<T>) -> WriteOutcome {
    if slot
        .as_ref()
        .is_some_and(|current| current.fetched_at > incoming.fetched_at)
    {
        return WriteOutcome::Stale;
    }
    *slot = Some(incoming);
    WriteOutcome::Stored
}

fn touch_slot<T>(
    slot: Option<&mut CachedValue<T>>,
    validators: ResponseValidators,
    fetched_at: i64,
) -> WriteOutcome {
    let Some(current) = slot else {
        return WriteOutcome::Missing;
    };
    if current.fetched_at > fetched_at {
        return WriteOutcome::Stale;
    }
    current.fetched_at = fetched_at;
    if validators.etag.is_some() {
        current.etag = validators.etag;
    }
    if validators.last_modified.is_some() {
        current.last_modified = validators.last_modified;
    }
    WriteOutcome::Stored
}

fn log_write(slot: &'static str, scope: &str, slug: Option<&str>, outcome: WriteOutcome) {
    if outcome != WriteOutcome::Stored {
        debug!(slot, scope, slug, outcome = ?outcome, "resource cache write skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cache = LocalResourceCache<String, String, Vec<u32>>;

    fn etag(value: &str) -> ResponseValidators {
        ResponseValidators {
            etag: Some(value.to_string()),
            last_modified: None,
        }
    }

    #[test]
    fn meta_roundtrip() {
        let cache = Cache::new();
        cache.upsert_simulado_meta("c1", "sim-a", "meta".to_string(), Some("\"m1\"".into()), None);

        let detail = cache.get_simulado_cache("c1", "sim-a").expect("detail");
        let meta = detail.meta.expect("meta slot");
        assert_eq!(meta.data.as_str(), "meta");
        assert_eq!(meta.etag.as_deref(), Some("\"m1\""));
        assert!(detail.questoes.is_none());
        assert!(cache.get_simulado_cache("c2", "sim-a").is_none());
    }

    #[test]
    fn index_keeps_items_per_scope() {
        let cache = Cache::new();
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        cache.set_simulados_index("c1", items, Some("\"i1\"".into()), None);

        let index = cache.get_simulados_index("c1").expect("index");
        assert_eq!(index.data.items.len(), 3);
        assert!(cache.get_simulados_index("c2").is_none());
    }

    #[test]
    fn meta_and_questoes_slots_are_independent() {
        let cache = Cache::new();
        cache.upsert_simulado_meta_at("c1", "s", "meta".into(), etag("\"m\""), 100);
        cache.upsert_simulado_questoes_at("c1", "s", vec![1, 2], etag("\"q\""), 200);
        cache.upsert_simulado_meta_at("c1", "s", "meta v2".into(), etag("\"m2\""), 300);

        let detail = cache.get_simulado_cache("c1", "s").expect("detail");
        let meta = detail.meta.expect("meta");
        let questoes = detail.questoes.expect("questoes");
        assert_eq!(meta.data.as_str(), "meta v2");
        assert_eq!(meta.fetched_at, 300);
        assert_eq!(*questoes.data, vec![1, 2]);
        assert_eq!(questoes.fetched_at, 200);
    }

    #[test]
    fn concurrent_meta_and_questoes_upserts_keep_both_slots() {
        let cache = Cache::new();
        std::thread::scope(|threads| {
            for round in 0..100_i64 {
                let cache = &cache;
                threads.spawn(move || {
                    cache.upsert_simulado_meta_at(
                        "c1",
                        "s",
                        format!("meta {round}"),
                        etag("\"m\""),
                        round * 2,
                    );
                });
                threads.spawn(move || {
                    cache.upsert_simulado_questoes_at(
                        "c1",
                        "s",
                        vec![u32::try_from(round).unwrap_or_default()],
                        etag("\"q\""),
                        round * 2 + 1,
                    );
                });
            }
        });

        let detail = cache.get_simulado_cache("c1", "s").expect("detail");
        let meta = detail.meta.expect("meta slot survives");
        let questoes = detail.questoes.expect("questoes slot survives");
        assert_eq!(meta.fetched_at, 198);
        assert_eq!(meta.data.as_str(), "meta 99");
        assert_eq!(questoes.fetched_at, 199);
        assert_eq!(*questoes.data, vec![99]);
    }

    #[test]
    fn out_of_order_write_is_discarded() {
        let cache = Cache::new();
        assert_eq!(
            cache.upsert_simulado_meta_at("c1", "s", "newer".into(), etag("\"b\""), 200),
            WriteOutcome::Stored
        );
        assert_eq!(
            cache.upsert_simulado_meta_at("c1", "s", "older".into(), etag("\"a\""), 100),
            WriteOutcome::Stale
        );

        let meta = cache.get_simulado_cache("c1", "s").and_then(|d| d.meta).expect("meta");
        assert_eq!(meta.data.as_str(), "newer");
        assert_eq!(meta.etag.as_deref(), Some("\"b\""));

        cache.set_simulados_index_at("c1", vec!["x".into()], etag("\"2\""), 50);
        assert_eq!(
            cache.set_simulados_index_at("c1", vec![], etag("\"1\""), 10),
            WriteOutcome::Stale
        );
        assert_eq!(cache.get_simulados_index("c1").expect("index").data.items.len(), 1);
    }

    #[test]
    fn touch_keeps_data_allocation() {
        let cache = Cache::new();
        cache.upsert_simulado_questoes_at("c1", "s", vec![7], etag("\"q\""), 100);
        let before = cache
            .get_simulado_cache("c1", "s")
            .and_then(|d| d.questoes)
            .expect("questoes");

        assert_eq!(
            cache.touch_simulado_questoes("c1", "s", ResponseValidators::default(), 500),
            WriteOutcome::Stored
        );
        let after = cache
            .get_simulado_cache("c1", "s")
            .and_then(|d| d.questoes)
            .expect("questoes");

        assert!(Arc::ptr_eq(&before.data, &after.data));
        assert_eq!(after.fetched_at, 500);
        assert_eq!(after.etag.as_deref(), Some("\"q\""));
    }

    #[test]
    fn touch_without_value_or_with_older_stamp_is_noop() {
        let cache = Cache::new();
        assert_eq!(
            cache.touch_simulado_meta("c1", "s", ResponseValidators::default(), 10),
            WriteOutcome::Missing
        );
        cache.set_simulados_index_at("c1", vec![], etag("\"i\""), 100);
        assert_eq!(
            cache.touch_simulados_index("c1", ResponseValidators::default(), 90),
            WriteOutcome::Stale
        );
        assert_eq!(cache.get_simulados_index("c1").expect("index").fetched_at, 100);
    }

    #[test]
    fn remove_and_clear() {
        let cache = Cache::new();
        cache.upsert_simulado_meta("c1", "s", "m".into(), None, None);
        cache.set_simulados_index("c1", vec![], None, None);
        assert!(cache.remove_simulado("c1", "s"));
        assert!(!cache.remove_simulado("c1", "s"));

        cache.clear();
        assert!(cache.get_simulados_index("c1").is_none());
    }
}

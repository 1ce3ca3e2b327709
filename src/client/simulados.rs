//! Simulado list and detail loads through the local resource cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::debug;

use super::error::ClientError;
use super::fetch::{ConditionalFetcher, FetchOutcome};
use super::freshness::{DEFAULT_FRESHNESS, is_expired, now_ms};
use super::resource_cache::{
    CacheIndex, CachedValue, LocalResourceCache, ResponseValidators, WriteOutcome,
};
use crate::cache::lock::mutex_lock;
use crate::config::ClientSettings;

const SOURCE: &str = "client::simulados";

/// Identity of one outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RequestKey {
    Index(String),
    Meta(String, String),
    Questoes(String, String),
}

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V, ClientError>>>;

/// Collapses concurrent loads of the same key into one request.
struct InFlight<V> {
    pending: Mutex<HashMap<RequestKey, SharedLoad<V>>>,
}

impl<V> Default for InFlight<V> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> InFlight<V> {
    async fn run<F>(&self, key: RequestKey, start: impl FnOnce() -> F) -> Result<V, ClientError>
    where
        F: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let load = {
            let mut pending = mutex_lock(&self.pending, SOURCE, "join");
            match pending.get(&key) {
                Some(existing) => {
                    debug!(key = ?key, "joining in-flight request");
                    existing.clone()
                }
                None => {
                    let load = start().boxed().shared();
                    pending.insert(key.clone(), load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut pending = mutex_lock(&self.pending, SOURCE, "complete");
        if pending
            .get(&key)
            .is_some_and(|current| current.ptr_eq(&load))
        {
            pending.remove(&key);
        }
        result
    }

    fn len(&self) -> usize {
        mutex_lock(&self.pending, SOURCE, "len").len()
    }
}

/// Loads simulado lists (`S`), detail metadata (`M`) and question
/// collections (`Q`), serving fresh values from the local cache.
///
/// Routes, relative to the configured base URL:
/// - `concursos/{scope}/simulados`
/// - `concursos/{scope}/simulados/{slug}`
/// - `concursos/{scope}/simulados/{slug}/questoes`
pub struct SimuladoClient<S, M, Q> {
    cache: Arc<LocalResourceCache<S, M, Q>>,
    fetcher: ConditionalFetcher,
    freshness: Duration,
    index_loads: Arc<InFlight<CachedValue<CacheIndex<S>>>>,
    meta_loads: Arc<InFlight<CachedValue<M>>>,
    questoes_loads: Arc<InFlight<CachedValue<Q>>>,
}

impl<S, M, Q> Clone for SimuladoClient<S, M, Q> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            fetcher: self.fetcher.clone(),
            freshness: self.freshness,
            index_loads: Arc::clone(&self.index_loads),
            meta_loads: Arc::clone(&self.meta_loads),
            questoes_loads: Arc::clone(&self.questoes_loads),
        }
    }
}

impl<S, M, Q> SimuladoClient<S, M, Q>
where
    S: DeserializeOwned + Send + Sync + 'static,
    M: DeserializeOwned + Send + Sync + 'static,
    Q: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(fetcher: ConditionalFetcher) -> Self {
        Self::with_cache(fetcher, Arc::new(LocalResourceCache::new()), DEFAULT_FRESHNESS)
    }

    /// Client for the configured origin, using its timeout and freshness window.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let fetcher = ConditionalFetcher::new(settings)?;
        Ok(Self::with_cache(
            fetcher,
            Arc::new(LocalResourceCache::new()),
            settings.freshness,
        ))
    }

    pub fn with_cache(
        fetcher: ConditionalFetcher,
        cache: Arc<LocalResourceCache<S, M, Q>>,
        freshness: Duration,
    ) -> Self {
        Self {
            cache,
            fetcher,
            freshness,
            index_loads: Arc::default(),
            meta_loads: Arc::default(),
            questoes_loads: Arc::default(),
        }
    }

    pub fn cache(&self) -> &Arc<LocalResourceCache<S, M, Q>> {
        &self.cache
    }

    /// Number of requests currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.index_loads.len() + self.meta_loads.len() + self.questoes_loads.len()
    }

    // ========================================================================
    // Index
    // ========================================================================

    pub async fn load_index(&self, scope: &str) -> Result<CachedValue<CacheIndex<S>>, ClientError> {
        if let Some(cached) = self
            .cache
            .get_simulados_index(scope)
            .filter(|cached| !is_expired(cached.fetched_at, self.freshness))
        {
            return Ok(cached);
        }
        self.revalidate_index(scope).await
    }

    /// Ask the origin regardless of local freshness.
    pub async fn revalidate_index(
        &self,
        scope: &str,
    ) -> Result<CachedValue<CacheIndex<S>>, ClientError> {
        let this = self.clone();
        let scope_owned = scope.to_string();
        self.index_loads
            .run(RequestKey::Index(scope.to_string()), move || async move {
                this.fetch_index(&scope_owned).await
            })
            .await
    }

    async fn fetch_index(&self, scope: &str) -> Result<CachedValue<CacheIndex<S>>, ClientError> {
        let issued_at = now_ms();
        let url = self
            .fetcher
            .resource_url(&["concursos", scope, "simulados"])?;
        let cached = self.cache.get_simulados_index(scope).map(|c| c.validators());

        match self
            .fetcher
            .get_json::<CacheIndex<S>>(url, cached.as_ref())
            .await?
        {
            FetchOutcome::Fetched { data, validators } => {
                let outcome =
                    self.cache
                        .set_simulados_index_at(scope, data.items, validators, issued_at);
                log_outcome("index", scope, None, outcome, false);
            }
            FetchOutcome::NotModified(validators) => {
                let outcome = self.cache.touch_simulados_index(scope, validators, issued_at);
                log_outcome("index", scope, None, outcome, true);
            }
        }
        self.cache
            .get_simulados_index(scope)
            .ok_or_else(unmatched_not_modified)
    }

    // ========================================================================
    // Detail
    // ========================================================================

    pub async fn load_meta(&self, scope: &str, slug: &str) -> Result<CachedValue<M>, ClientError> {
        if let Some(cached) = self
            .cached_meta(scope, slug)
            .filter(|cached| !is_expired(cached.fetched_at, self.freshness))
        {
            return Ok(cached);
        }
        self.revalidate_meta(scope, slug).await
    }

    pub async fn revalidate_meta(
        &self,
        scope: &str,
        slug: &str,
    ) -> Result<CachedValue<M>, ClientError> {
        let this = self.clone();
        let (scope_owned, slug_owned) = (scope.to_string(), slug.to_string());
        self.meta_loads
            .run(
                RequestKey::Meta(scope.to_string(), slug.to_string()),
                move || async move { this.fetch_meta(&scope_owned, &slug_owned).await },
            )
            .await
    }

    async fn fetch_meta(&self, scope: &str, slug: &str) -> Result<CachedValue<M>, ClientError> {
        let issued_at = now_ms();
        let url = self
            .fetcher
            .resource_url(&["concursos", scope, "simulados", slug])?;
        let cached = self.cached_meta(scope, slug).map(|c| c.validators());

        match self.fetcher.get_json::<M>(url, cached.as_ref()).await? {
            FetchOutcome::Fetched { data, validators } => {
                let outcome =
                    self.cache
                        .upsert_simulado_meta_at(scope, slug, data, validators, issued_at);
                log_outcome("meta", scope, Some(slug), outcome, false);
            }
            FetchOutcome::NotModified(validators) => {
                let outcome = self
                    .cache
                    .touch_simulado_meta(scope, slug, validators, issued_at);
                log_outcome("meta", scope, Some(slug), outcome, true);
            }
        }
        self.cached_meta(scope, slug)
            .ok_or_else(unmatched_not_modified)
    }

    pub async fn load_questoes(
        &self,
        scope: &str,
        slug: &str,
    ) -> Result<CachedValue<Q>, ClientError> {
        if let Some(cached) = self
            .cached_questoes(scope, slug)
            .filter(|cached| !is_expired(cached.fetched_at, self.freshness))
        {
            return Ok(cached);
        }
        self.revalidate_questoes(scope, slug).await
    }

    pub async fn revalidate_questoes(
        &self,
        scope: &str,
        slug: &str,
    ) -> Result<CachedValue<Q>, ClientError> {
        let this = self.clone();
        let (scope_owned, slug_owned) = (scope.to_string(), slug.to_string());
        self.questoes_loads
            .run(
                RequestKey::Questoes(scope.to_string(), slug.to_string()),
                move || async move { this.fetch_questoes(&scope_owned, &slug_owned).await },
            )
            .await
    }

    async fn fetch_questoes(&self, scope: &str, slug: &str) -> Result<CachedValue<Q>, ClientError> {
        let issued_at = now_ms();
        let url = self
            .fetcher
            .resource_url(&["concursos", scope, "simulados", slug, "questoes"])?;
        let cached = self.cached_questoes(scope, slug).map(|c| c.validators());

        match self.fetcher.get_json::<Q>(url, cached.as_ref()).await? {
            FetchOutcome::Fetched { data, validators } => {
                let outcome =
                    self.cache
                        .upsert_simulado_questoes_at(scope, slug, data, validators, issued_at);
                log_outcome("questoes", scope, Some(slug), outcome, false);
            }
            FetchOutcome::NotModified(validators) => {
                let outcome = self
                    .cache
                    .touch_simulado_questoes(scope, slug, validators, issued_at);
                log_outcome("questoes", scope, Some(slug), outcome, true);
            }
        }
        self.cached_questoes(scope, slug)
            .ok_or_else(unmatched_not_modified)
    }

    /// Warm both detail slots in the background. Failures are logged and
    /// leave the cache as it was.
    pub fn prefetch_detail(&self, scope: &str, slug: &str) -> JoinHandle<()> {
        let this = self.clone();
        let (scope, slug) = (scope.to_string(), slug.to_string());
        tokio::spawn(async move {
            let (meta, questoes) =
                futures::join!(this.load_meta(&scope, &slug), this.load_questoes(&scope, &slug));
            for (slot, result) in [("meta", meta.err()), ("questoes", questoes.err())] {
                if let Some(err) = result {
                    debug!(slot, scope = %scope, slug = %slug, error = %err, "prefetch failed");
                }
            }
        })
    }

    fn cached_meta(&self, scope: &str, slug: &str) -> Option<CachedValue<M>> {
        self.cache
            .get_simulado_cache(scope, slug)
            .and_then(|detail| detail.meta)
    }

    fn cached_questoes(&self, scope: &str, slug: &str) -> Option<CachedValue<Q>> {
        self.cache
            .get_simulado_cache(scope, slug)
            .and_then(|detail| detail.questoes)
    }
}

fn unmatched_not_modified() -> ClientError {
    ClientError::Status {
        status: 304,
        body: "origin answered 304 but nothing is cached locally".to_string(),
    }
}

fn log_outcome(
    slot: &'static str,
    scope: &str,
    slug: Option<&str>,
    outcome: WriteOutcome,
    not_modified: bool,
) {
    debug!(
        slot,
        scope,
        slug,
        not_modified,
        outcome = ?outcome,
        "resource revalidated"
    );
}

//! Typed views over cache namespaces.
//!
//! The store keeps payloads as JSON so entries can be enumerated, exported and
//! imported without knowing their shape. Callers that do know the namespace go
//! through [`CacheNamespace`], which fixes the payload type per [`CacheType`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use studycache_api_types::CacheType;

/// Binds a [`CacheType`] to the payload type stored under it.
pub trait CacheNamespace {
    const CACHE_TYPE: CacheType;
    type Payload: Serialize + DeserializeOwned;
}

/// Rows returned by a database query.
pub type QueryRows = Vec<serde_json::Map<String, serde_json::Value>>;

/// Per-user session attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub usuario_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Rendered static content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticPayload {
    pub content_type: String,
    pub body: String,
}

pub struct QueryNs;
pub struct SessionNs;
pub struct StaticNs;
pub struct SimuladoNs;
pub struct FlashcardNs;
pub struct StudyPlanNs;

impl CacheNamespace for QueryNs {
    const CACHE_TYPE: CacheType = CacheType::Query;
    type Payload = QueryRows;
}

impl CacheNamespace for SessionNs {
    const CACHE_TYPE: CacheType = CacheType::Session;
    type Payload = SessionPayload;
}

impl CacheNamespace for StaticNs {
    const CACHE_TYPE: CacheType = CacheType::Static;
    type Payload = StaticPayload;
}

// Domain documents are owned by the CRUD handlers; the cache treats them as
// JSON documents.
impl CacheNamespace for SimuladoNs {
    const CACHE_TYPE: CacheType = CacheType::Simulado;
    type Payload = serde_json::Value;
}

impl CacheNamespace for FlashcardNs {
    const CACHE_TYPE: CacheType = CacheType::Flashcard;
    type Payload = serde_json::Value;
}

impl CacheNamespace for StudyPlanNs {
    const CACHE_TYPE: CacheType = CacheType::StudyPlan;
    type Payload = serde_json::Value;
}

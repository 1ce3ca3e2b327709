mod admin;
pub mod error;
pub mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use error::ApiError;
pub use public::{PublicState, build_public_router};

use serde::Deserialize;
use studycache_api_types::CacheType;

/// `?usuarioId=` selector shared by the entry lookups.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScopeQuery {
    pub usuario_id: Option<String>,
}

pub(crate) fn parse_cache_type(raw: &str) -> Result<CacheType, ApiError> {
    raw.parse::<CacheType>().map_err(|err| {
        ApiError::bad_request(
            err.to_string(),
            Some("expected one of QUERY, SESSION, STATIC, SIMULADO, FLASHCARD, STUDY_PLAN".into()),
        )
    })
}

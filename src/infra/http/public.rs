use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::{debug, instrument};

use super::{
    ScopeQuery,
    error::ApiError,
    middleware::{log_responses, set_request_context},
    parse_cache_type,
};
use crate::{
    cache::CacheStore,
    conditional::{self, Precondition, Validators, format_http_date},
};

const SOURCE: &str = "infra::http::public";

#[derive(Clone)]
pub struct PublicState {
    pub store: Arc<CacheStore>,
}

impl PublicState {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }
}

pub fn build_public_router(state: PublicState) -> Router {
    Router::new()
        .route("/api/v1/cache/{cache_type}/{*key}", get(serve_cached_entry))
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Serve a live entry's payload, answering 304 when the caller's validators match.
#[instrument(skip_all)]
async fn serve_cached_entry(
    State(state): State<PublicState>,
    Path((cache_type, key)): Path<(String, String)>,
    query: Result<Query<ScopeQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Query(scope) = query?;
    let cache_type = parse_cache_type(&cache_type)?;

    let entry = state
        .store
        .live_entry(&key, cache_type, scope.usuario_id.as_deref())
        .ok_or_else(|| {
            ApiError::not_found(format!("no live entry `{key}` of type {cache_type}"))
                .with_source(SOURCE)
        })?;

    let validators = Validators::for_entry(&entry);
    let last_modified = format_http_date(validators.last_modified).map_err(|err| {
        ApiError::internal(format!("failed to format last-modified: {err}")).with_source(SOURCE)
    })?;

    let header_text = |name: HeaderName| headers.get(name).and_then(|value| value.to_str().ok());
    let precondition = conditional::evaluate(
        header_text(IF_NONE_MATCH),
        header_text(IF_MODIFIED_SINCE),
        &validators,
    );

    let mut response = match precondition {
        Precondition::NotModified => {
            debug!(key, cache_type = %cache_type, "entry not modified");
            StatusCode::NOT_MODIFIED.into_response()
        }
        Precondition::Modified => Json(entry.data).into_response(),
    };

    let response_headers = response.headers_mut();
    response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    for (name, value) in [(ETAG, validators.etag), (LAST_MODIFIED, last_modified)] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response_headers.insert(name, value);
        }
    }
    Ok(response)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

mod cache;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/cache/manage", post(cache::manage_cache))
        .route("/admin/cache/entries", get(cache::list_entries))
        .route(
            "/admin/cache/entries/{cache_type}/{*key}",
            get(cache::entry_metadata),
        )
        .route("/admin/cache/export", get(cache::export_entries))
        .route("/admin/cache/import", post(cache::import_entries))
        .route("/admin/cache/stats", get(cache::cache_stats))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

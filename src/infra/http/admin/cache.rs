use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use studycache_api_types::{
    CacheEntryView, ConfirmationRequiredBody, EntriesQuery, EntriesResponse, ExportResponse,
    ImportRequest, ImportResponse, ManageRequest, ManageResponse, StatsResponse,
};
use tracing::{info, instrument};

use super::AdminState;
use crate::{
    application::error::ErrorReport,
    cache::{AdminOutcome, EntryFilter},
    infra::http::{
        ScopeQuery,
        error::{ApiError, codes},
        parse_cache_type,
    },
};

const SOURCE: &str = "infra::http::admin::cache";

#[instrument(skip_all)]
pub(super) async fn manage_cache(
    State(state): State<AdminState>,
    payload: Result<Json<ManageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    match state.admin.manage(&request)? {
        AdminOutcome::Applied(result) => {
            info!(
                target: "studycache::http::admin",
                action = %result.action,
                removed = result.removed,
                "cache action applied"
            );
            Ok(Json(ManageResponse { result }).into_response())
        }
        AdminOutcome::ConfirmationRequired(ticket) => {
            let status = StatusCode::PRECONDITION_REQUIRED;
            let detail = format!(
                "{}: `{}` would affect {} entries",
                codes::CONFIRMATION_REQUIRED,
                request.action,
                ticket.affected
            );
            let body = ConfirmationRequiredBody {
                error: format!(
                    "action `{}` requires confirmation; resend it with the confirmation token",
                    request.action
                ),
                requires_confirmation: true,
                confirmation_token: ticket.token,
                affected: ticket.affected,
                expires_at: ticket.expires_at,
            };
            let mut response = (status, Json(body)).into_response();
            ErrorReport::from_message(SOURCE, status, detail).attach(&mut response);
            Ok(response)
        }
    }
}

#[instrument(skip_all)]
pub(super) async fn list_entries(
    State(state): State<AdminState>,
    query: Result<Query<EntriesQuery>, QueryRejection>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let Query(query) = query?;
    let filter = EntryFilter {
        cache_type: query
            .cache_type
            .as_deref()
            .map(parse_cache_type)
            .transpose()?,
        pattern: query.pattern,
        include_expired: query.include_expired.unwrap_or(false),
        include_data: query.include_data.unwrap_or(false),
        limit: query.limit,
    };

    let entries = state.monitor().get_all_cache_entries(&filter)?;
    Ok(Json(EntriesResponse { entries }))
}

#[instrument(skip_all)]
pub(super) async fn entry_metadata(
    State(state): State<AdminState>,
    Path((cache_type, key)): Path<(String, String)>,
    query: Result<Query<ScopeQuery>, QueryRejection>,
) -> Result<Json<CacheEntryView>, ApiError> {
    let Query(scope) = query?;
    let cache_type = parse_cache_type(&cache_type)?;

    state
        .monitor()
        .get_cache_entry_metadata(&key, cache_type, scope.usuario_id.as_deref())
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!("no cached entry `{key}` of type {cache_type}"))
                .with_source(SOURCE)
        })
}

#[instrument(skip_all)]
pub(super) async fn export_entries(
    State(state): State<AdminState>,
) -> Result<Json<ExportResponse>, ApiError> {
    Ok(Json(state.admin.export()?))
}

#[instrument(skip_all)]
pub(super) async fn import_entries(
    State(state): State<AdminState>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Json<ImportResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state
        .admin
        .import(&request.import_data.entries, &request.options)?;
    Ok(Json(response))
}

#[instrument(skip_all)]
pub(super) async fn cache_stats(State(state): State<AdminState>) -> Json<StatsResponse> {
    Json(state.monitor().stats())
}

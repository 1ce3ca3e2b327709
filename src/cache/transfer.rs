//! Import and export of cache entries.

use std::collections::BTreeSet;
use std::time::Instant;

use metrics::histogram;
use serde_json::Value;
use studycache_api_types::{
    CacheType, ExportResponse, ImportEntryResult, ImportFailure, ImportOptions, ImportResponse,
    ImportSummary,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use super::entry::CacheEntry;
use super::error::CacheError;
use super::monitor::{CacheMonitor, EntryFilter};
use super::store::{CacheStore, PutOutcome};

pub(crate) const METRIC_IMPORT_MS: &str = "studycache_import_ms";

/// Every stored entry, expired ones excluded, with payloads.
pub fn export(store: &CacheStore, monitor: &CacheMonitor) -> Result<ExportResponse, CacheError> {
    let entries = monitor.get_all_cache_entries(&EntryFilter {
        include_data: true,
        limit: Some(usize::MAX),
        ..Default::default()
    })?;
    info!(entries = entries.len(), "cache exported");
    Ok(ExportResponse {
        entries,
        exported_at: store.now(),
    })
}

/// Validate and write `raw` entries.
///
/// Malformed candidates are dropped before any write; if none survive the
/// import fails as a whole. Each survivor is then processed independently and
/// reported in the result list.
pub fn import(
    store: &CacheStore,
    monitor: &CacheMonitor,
    raw: &[Value],
    options: &ImportOptions,
) -> Result<ImportResponse, CacheError> {
    let started_at = Instant::now();

    let candidates: Vec<CacheEntry> = raw
        .iter()
        .enumerate()
        .filter_map(|(index, value)| match parse_candidate(value, options) {
            Ok(entry) => Some(entry),
            Err(reason) => {
                warn!(index, reason = %reason, "dropping invalid import entry");
                None
            }
        })
        .collect();

    if candidates.is_empty() {
        return Err(CacheError::validation(format!(
            "no valid entries to import ({} submitted)",
            raw.len()
        )));
    }

    let now = store.now();
    let result: Vec<ImportEntryResult> = candidates
        .into_iter()
        .map(|entry| import_one(store, monitor, entry, options.overwrite, now))
        .collect();

    let successful = result.iter().filter(|r| r.success).count();
    let summary = ImportSummary {
        total: result.len(),
        successful,
        failed: result.len() - successful,
    };

    histogram!(METRIC_IMPORT_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
    info!(
        submitted = raw.len(),
        total = summary.total,
        successful = summary.successful,
        failed = summary.failed,
        overwrite = options.overwrite,
        "cache import finished"
    );
    Ok(ImportResponse { result, summary })
}

fn import_one(
    store: &CacheStore,
    monitor: &CacheMonitor,
    entry: CacheEntry,
    overwrite: bool,
    now: OffsetDateTime,
) -> ImportEntryResult {
    let failed = |entry: &CacheEntry, reason: ImportFailure, message: String| ImportEntryResult {
        key: entry.key.clone(),
        cache_type: entry.cache_type,
        success: false,
        reason: Some(reason),
        message: Some(message),
    };

    if entry.expires_at < now {
        return failed(&entry, ImportFailure::Expired, "entry already expired".into());
    }

    if !overwrite
        && monitor
            .get_cache_entry_metadata(&entry.key, entry.cache_type, entry.scope.as_deref())
            .is_some()
    {
        return failed(&entry, ImportFailure::Exists, "entry already exists".into());
    }

    let key = entry.key.clone();
    let cache_type = entry.cache_type;
    match store.put_entry(entry.clone(), overwrite) {
        Ok(PutOutcome::Written) => ImportEntryResult {
            key,
            cache_type,
            success: true,
            reason: None,
            message: None,
        },
        Ok(PutOutcome::Exists) => {
            failed(&entry, ImportFailure::Exists, "entry already exists".into())
        }
        Err(err) => failed(&entry, ImportFailure::Rejected, err.to_string()),
    }
}

fn parse_candidate(value: &Value, options: &ImportOptions) -> Result<CacheEntry, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "entry is not an object".to_string())?;

    let key = match object.get("key") {
        Some(Value::String(key)) if !key.trim().is_empty() => key.clone(),
        Some(Value::String(_)) => return Err("key is empty".into()),
        Some(_) => return Err("key is not a string".into()),
        None => return Err("key is missing".into()),
    };

    let cache_type = object
        .get("type")
        .or_else(|| object.get("cacheType"))
        .and_then(Value::as_str)
        .ok_or_else(|| format!("entry `{key}` has no type"))?
        .parse::<CacheType>()
        .map_err(|err| format!("entry `{key}`: {err}"))?;

    let data = match object.get("data") {
        None | Some(Value::Null) => return Err(format!("entry `{key}` has no data")),
        Some(data) => data.clone(),
    };

    let created_at = parse_timestamp(object.get("createdAt"), &key, "createdAt")?;
    let expires_at = parse_timestamp(object.get("expiresAt"), &key, "expiresAt")?;
    if expires_at <= created_at {
        return Err(format!("entry `{key}` expires at or before its creation"));
    }

    let related_keys = match object.get("relatedKeys") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("entry `{key}` has a non-string related key"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(format!("entry `{key}` relatedKeys is not an array")),
    };

    let scope = object
        .get("scope")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| options.usuario_id.clone());

    Ok(CacheEntry {
        key,
        cache_type,
        data,
        created_at,
        expires_at,
        related_keys,
        scope,
    })
}

fn parse_timestamp(
    value: Option<&Value>,
    key: &str,
    field: &str,
) -> Result<OffsetDateTime, String> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| format!("entry `{key}` has no {field}"))?;
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| format!("entry `{key}` {field}: {err}"))
}

//! Shared request/response types for the studycache admin API and the
//! conditional-fetch header contract.
//!
//! Both the origin (`studycache` server) and clients depend on this crate so the
//! wire format has a single definition. All JSON bodies use camelCase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Header names exchanged between client and origin.
pub mod headers {
    pub const IF_NONE_MATCH: &str = "if-none-match";
    pub const IF_MODIFIED_SINCE: &str = "if-modified-since";
    pub const ETAG: &str = "etag";
    pub const LAST_MODIFIED: &str = "last-modified";
    /// Caller-generated correlation id, echoed by the origin.
    pub const CORRELATION_ID: &str = "x-correlation-id";
    /// Alternate correlation header accepted and echoed by the origin.
    pub const REQUEST_ID: &str = "x-request-id";
}

/// Namespace partitioning cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheType {
    Query,
    Session,
    Static,
    Simulado,
    Flashcard,
    StudyPlan,
}

impl CacheType {
    pub const ALL: [CacheType; 6] = [
        CacheType::Query,
        CacheType::Session,
        CacheType::Static,
        CacheType::Simulado,
        CacheType::Flashcard,
        CacheType::StudyPlan,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheType::Query => "QUERY",
            CacheType::Session => "SESSION",
            CacheType::Static => "STATIC",
            CacheType::Simulado => "SIMULADO",
            CacheType::Flashcard => "FLASHCARD",
            CacheType::StudyPlan => "STUDY_PLAN",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a [`CacheType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCacheType(pub String);

impl fmt::Display for UnknownCacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown cache type `{}`", self.0)
    }
}

impl std::error::Error for UnknownCacheType {}

impl FromStr for CacheType {
    type Err = UnknownCacheType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        CacheType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownCacheType(value.to_string()))
    }
}

// ============================================================================
// Management endpoint
// ============================================================================

/// Body of `POST /admin/cache/manage`.
///
/// `action` and `cacheType` stay strings so unknown values are reported by the
/// handler instead of being rejected by the JSON extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResult {
    pub key: String,
    pub success: bool,
    pub removed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageResult {
    pub action: String,
    pub removed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<KeyResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManageResponse {
    pub result: ManageResult,
}

/// 428 body for a destructive action awaiting confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequiredBody {
    pub error: String,
    pub requires_confirmation: bool,
    pub confirmation_token: String,
    pub affected: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Error body shared by every admin endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

// ============================================================================
// Enumeration / export
// ============================================================================

/// Query string of `GET /admin/cache/entries`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesQuery {
    pub cache_type: Option<String>,
    pub pattern: Option<String>,
    pub include_expired: Option<bool>,
    pub include_data: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryView {
    pub key: String,
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default)]
    pub related_keys: Vec<String>,
    pub expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesResponse {
    pub entries: Vec<CacheEntryView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub entries: Vec<CacheEntryView>,
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    pub live: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: usize,
    pub expired: usize,
    pub by_type: Vec<TypeStats>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub monitor_initialized_at: Option<OffsetDateTime>,
}

// ============================================================================
// Import
// ============================================================================

/// Body of `POST /admin/cache/import`.
///
/// Entries are kept as raw JSON; each one is validated individually so a
/// malformed entry does not reject the whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub import_data: ImportData,
    #[serde(default)]
    pub options: ImportOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportData {
    #[serde(default)]
    pub entries: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_id: Option<String>,
}

/// Why a validated import entry was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFailure {
    Expired,
    Exists,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEntryResult {
    pub key: String,
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ImportFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub result: Vec<ImportEntryResult>,
    pub summary: ImportSummary,
}

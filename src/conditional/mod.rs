//! Validators and precondition checks for conditional GETs.
//!
//! The origin derives an entity tag and a last-modified time for every served
//! entry. A request whose `If-None-Match` matches the tag, or (when no tag was
//! sent) whose `If-Modified-Since` is not older than the last-modified time,
//! is answered with `304 Not Modified`.

mod http_date;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub use http_date::{format_http_date, parse_http_date};

use crate::cache::CacheEntry;

/// Hex digits of the SHA-256 digest kept in an entity tag.
const ETAG_HEX_LEN: usize = 32;

/// Validators attached to a served representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validators {
    /// Quoted strong entity tag.
    pub etag: String,
    pub last_modified: OffsetDateTime,
}

impl Validators {
    pub fn for_entry(entry: &CacheEntry) -> Self {
        Self {
            etag: etag_for(&entry.data),
            last_modified: entry.created_at,
        }
    }
}

/// Quoted tag over the compact JSON serialization of `data`.
pub fn etag_for(data: &serde_json::Value) -> String {
    let digest = hex::encode(Sha256::digest(data.to_string().as_bytes()));
    format!("\"{}\"", &digest[..ETAG_HEX_LEN])
}

/// Outcome of evaluating request preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    NotModified,
    Modified,
}

/// Evaluate `If-None-Match` / `If-Modified-Since` against `validators`.
///
/// `If-Modified-Since` is only consulted when `If-None-Match` is absent, and
/// unparseable dates are ignored.
pub fn evaluate(
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    validators: &Validators,
) -> Precondition {
    if let Some(header) = if_none_match {
        return if etag_list_matches(header, &validators.etag) {
            Precondition::NotModified
        } else {
            Precondition::Modified
        };
    }

    let since = if_modified_since.and_then(parse_http_date);
    match since {
        Some(since) if since >= truncate_to_second(validators.last_modified) => {
            Precondition::NotModified
        }
        _ => Precondition::Modified,
    }
}

/// Weak comparison of every tag in a comma-separated `If-None-Match` value.
pub fn etag_list_matches(header: &str, current: &str) -> bool {
    header
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| candidate == "*" || opaque_tag(candidate) == opaque_tag(current))
}

fn opaque_tag(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn truncate_to_second(value: OffsetDateTime) -> OffsetDateTime {
    value.replace_nanosecond(0).unwrap_or(value)
}

//! Cache entry model.

use std::collections::BTreeSet;

use globset::{Glob, GlobMatcher};
use studycache_api_types::{CacheEntryView, CacheType};
use time::OffsetDateTime;

use super::error::CacheError;

/// Physical identity of an entry: a key is unique within `(type, scope)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    pub key: String,
    pub cache_type: CacheType,
    pub scope: Option<String>,
}

impl EntryId {
    pub fn new(key: impl Into<String>, cache_type: CacheType, scope: Option<&str>) -> Self {
        Self {
            key: key.into(),
            cache_type,
            scope: scope.map(str::to_string),
        }
    }
}

/// A stored value with expiry and cascade metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub cache_type: CacheType,
    pub data: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    /// Keys whose invalidation cascades to this entry.
    pub related_keys: BTreeSet<String>,
    /// Owning user ("usuarioId"), if the entry is per-user.
    pub scope: Option<String>,
}

impl CacheEntry {
    pub fn id(&self) -> EntryId {
        EntryId::new(self.key.clone(), self.cache_type, self.scope.as_deref())
    }

    /// An entry is logically absent once `now` passes `expires_at`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    pub fn depends_on(&self, key: &str) -> bool {
        self.related_keys.contains(key)
    }

    pub fn to_view(&self, now: OffsetDateTime, include_data: bool) -> CacheEntryView {
        CacheEntryView {
            key: self.key.clone(),
            cache_type: self.cache_type,
            scope: self.scope.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            related_keys: self.related_keys.iter().cloned().collect(),
            expired: self.is_expired_at(now),
            data: include_data.then(|| self.data.clone()),
        }
    }

    pub(crate) fn check_lifetime(&self) -> Result<(), CacheError> {
        if self.key.trim().is_empty() {
            return Err(CacheError::validation("cache key must not be empty"));
        }
        if self.expires_at <= self.created_at {
            return Err(CacheError::validation(format!(
                "entry `{}` expires at or before its creation time",
                self.key
            )));
        }
        Ok(())
    }
}

/// Optional attributes for [`CacheStore::set`](super::CacheStore::set).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    pub related_keys: BTreeSet<String>,
    pub scope: Option<String>,
}

impl EntryOptions {
    pub fn related<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Compiled glob (`*`, `?`, `[...]`) matched against whole keys.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    matcher: GlobMatcher,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        if pattern.trim().is_empty() {
            return Err(CacheError::validation("pattern must not be empty"));
        }
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, key: &str) -> bool {
        self.matcher.is_match(key)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn entry(key: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            cache_type: CacheType::Query,
            data: serde_json::json!({"n": 1}),
            created_at: datetime!(2026-03-01 10:00 UTC),
            expires_at: datetime!(2026-03-01 10:30 UTC),
            related_keys: BTreeSet::new(),
            scope: None,
        }
    }

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let entry = entry("a");
        assert!(!entry.is_expired_at(datetime!(2026-03-01 10:30 UTC)));
        assert!(entry.is_expired_at(datetime!(2026-03-01 10:30:01 UTC)));
    }

    #[test]
    fn lifetime_check_rejects_inverted_timestamps() {
        let mut bad = entry("a");
        bad.expires_at = bad.created_at;
        assert!(matches!(
            bad.check_lifetime(),
            Err(CacheError::Validation { .. })
        ));
        assert!(entry("a").check_lifetime().is_ok());
    }

    #[test]
    fn view_omits_data_unless_requested() {
        let entry = entry("a");
        let now = datetime!(2026-03-01 10:05 UTC);
        assert!(entry.to_view(now, false).data.is_none());
        assert_eq!(
            entry.to_view(now, true).data,
            Some(serde_json::json!({"n": 1}))
        );
    }

    #[test]
    fn key_pattern_matches_prefix_globs() {
        let pattern = KeyPattern::new("sim:*").expect("valid glob");
        assert!(pattern.matches("sim:concurso-1:index"));
        assert!(!pattern.matches("flash:sim:1"));

        let single = KeyPattern::new("user:?").expect("valid glob");
        assert!(single.matches("user:7"));
        assert!(!single.matches("user:42"));
    }

    #[test]
    fn key_pattern_rejects_empty_and_malformed() {
        assert!(matches!(
            KeyPattern::new("  "),
            Err(CacheError::Validation { .. })
        ));
        assert!(matches!(KeyPattern::new("sim:[a"), Err(CacheError::Pattern(_))));
    }
}

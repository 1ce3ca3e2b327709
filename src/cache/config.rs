//! Cache configuration.
//!
//! Controls cascade behavior, the confirmation gate and monitor limits via the
//! `[cache]` section of `studycache.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_BULK_CONFIRMATION_THRESHOLD: usize = 10;
const DEFAULT_CONFIRMATION_TTL_SECS: u64 = 300;
const DEFAULT_MAX_PENDING_CONFIRMATIONS: usize = 64;
const DEFAULT_MONITOR_LIMIT: usize = 1000;

/// How far `invalidate` follows `related_keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// Remove entries that list an invalidated key, and stop there.
    #[default]
    SingleHop,
    /// Keep following: entries removed by the cascade invalidate their own
    /// dependents until nothing else matches.
    Transitive,
}

/// Cache configuration from `studycache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cascade depth for `related_keys` invalidation.
    pub cascade: CascadeMode,
    /// `invalidate` batches larger than this need a confirmation token.
    pub bulk_confirmation_threshold: usize,
    /// Lifetime of an issued confirmation token.
    pub confirmation_ttl_secs: u64,
    /// Upper bound on outstanding confirmation tokens.
    pub max_pending_confirmations: usize,
    /// Default `limit` for entry enumeration.
    pub monitor_default_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cascade: CascadeMode::default(),
            bulk_confirmation_threshold: DEFAULT_BULK_CONFIRMATION_THRESHOLD,
            confirmation_ttl_secs: DEFAULT_CONFIRMATION_TTL_SECS,
            max_pending_confirmations: DEFAULT_MAX_PENDING_CONFIRMATIONS,
            monitor_default_limit: DEFAULT_MONITOR_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            cascade: settings.cascade,
            bulk_confirmation_threshold: settings.bulk_confirmation_threshold,
            confirmation_ttl_secs: settings.confirmation_ttl.as_secs(),
            max_pending_confirmations: settings.max_pending_confirmations.get(),
            monitor_default_limit: settings.monitor_default_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Token lifetime, clamped to at least one second.
    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs.max(1))
    }

    /// Pending token capacity, clamped to at least one.
    pub fn max_pending_confirmations(&self) -> usize {
        self.max_pending_confirmations.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.cascade, CascadeMode::SingleHop);
        assert_eq!(config.bulk_confirmation_threshold, 10);
        assert_eq!(config.confirmation_ttl_secs, 300);
        assert_eq!(config.max_pending_confirmations, 64);
        assert_eq!(config.monitor_default_limit, 1000);
    }

    #[test]
    fn ttl_and_capacity_clamp_to_min() {
        let config = CacheConfig {
            confirmation_ttl_secs: 0,
            max_pending_confirmations: 0,
            ..Default::default()
        };
        assert_eq!(config.confirmation_ttl(), Duration::from_secs(1));
        assert_eq!(config.max_pending_confirmations(), 1);
    }

    #[test]
    fn cascade_mode_deserializes_snake_case() {
        let mode: CascadeMode = serde_json::from_str("\"transitive\"").expect("parse");
        assert_eq!(mode, CascadeMode::Transitive);
    }
}

//! Operator-facing cache management.
//!
//! Destructive bulk operations pass through the [`ConfirmationGate`]: the first
//! call reports how many entries would go and hands back a token, the second
//! call presents the token and performs the operation.

use std::sync::Arc;

use serde_json::Value;
use studycache_api_types::{
    CacheType, ExportResponse, ImportOptions, ImportResponse, ManageRequest, ManageResult,
};
use tracing::info;

use super::clock::Clock;
use super::config::CacheConfig;
use super::confirm::{ConfirmationGate, ConfirmationTicket, DestructiveOp};
use super::entry::KeyPattern;
use super::error::CacheError;
use super::monitor::CacheMonitor;
use super::store::CacheStore;
use super::transfer;

pub const ACTION_INVALIDATE: &str = "invalidate";
pub const ACTION_CLEAR_BY_TYPE: &str = "clearByType";
pub const ACTION_CLEAR_BY_PATTERN: &str = "clearByPattern";
pub const ACTION_PURGE_EXPIRED: &str = "purgeExpired";

/// A validated management action.
#[derive(Debug, Clone)]
pub enum AdminCommand {
    Invalidate {
        keys: Vec<String>,
        scope: Option<String>,
    },
    ClearByType {
        cache_type: CacheType,
        scope: Option<String>,
    },
    ClearByPattern {
        pattern: KeyPattern,
    },
    PurgeExpired,
}

impl AdminCommand {
    pub fn action(&self) -> &'static str {
        match self {
            AdminCommand::Invalidate { .. } => ACTION_INVALIDATE,
            AdminCommand::ClearByType { .. } => ACTION_CLEAR_BY_TYPE,
            AdminCommand::ClearByPattern { .. } => ACTION_CLEAR_BY_PATTERN,
            AdminCommand::PurgeExpired => ACTION_PURGE_EXPIRED,
        }
    }
}

impl TryFrom<&ManageRequest> for AdminCommand {
    type Error = CacheError;

    fn try_from(request: &ManageRequest) -> Result<Self, Self::Error> {
        let scope = request
            .usuario_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        match request.action.as_str() {
            ACTION_INVALIDATE => {
                let keys = request
                    .keys
                    .clone()
                    .filter(|keys| !keys.is_empty())
                    .ok_or_else(|| CacheError::validation("`keys` is required for invalidate"))?;
                Ok(AdminCommand::Invalidate { keys, scope })
            }
            ACTION_CLEAR_BY_TYPE => {
                let raw = request.cache_type.as_deref().ok_or_else(|| {
                    CacheError::validation("`cacheType` is required for clearByType")
                })?;
                let cache_type = raw
                    .parse::<CacheType>()
                    .map_err(|err| CacheError::validation(err.to_string()))?;
                Ok(AdminCommand::ClearByType { cache_type, scope })
            }
            ACTION_CLEAR_BY_PATTERN => {
                let raw = request.pattern.as_deref().ok_or_else(|| {
                    CacheError::validation("`pattern` is required for clearByPattern")
                })?;
                Ok(AdminCommand::ClearByPattern {
                    pattern: KeyPattern::new(raw)?,
                })
            }
            ACTION_PURGE_EXPIRED => Ok(AdminCommand::PurgeExpired),
            other => Err(CacheError::unsupported(other)),
        }
    }
}

/// What a management call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    Applied(ManageResult),
    /// Nothing was removed; repeat the call with the ticket's token.
    ConfirmationRequired(ConfirmationTicket),
}

/// Cache administration service shared by the admin HTTP handlers.
pub struct CacheAdmin {
    store: Arc<CacheStore>,
    monitor: Arc<CacheMonitor>,
    gate: ConfirmationGate,
    bulk_threshold: usize,
}

impl CacheAdmin {
    pub fn new(
        store: Arc<CacheStore>,
        monitor: Arc<CacheMonitor>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            monitor,
            gate: ConfirmationGate::new(config, clock),
            bulk_threshold: config.bulk_confirmation_threshold,
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<CacheMonitor> {
        &self.monitor
    }

    /// Parse and run a management request.
    pub fn manage(&self, request: &ManageRequest) -> Result<AdminOutcome, CacheError> {
        let command = AdminCommand::try_from(request)?;
        self.execute(command, request.confirmation_token.as_deref())
    }

    pub fn execute(
        &self,
        command: AdminCommand,
        token: Option<&str>,
    ) -> Result<AdminOutcome, CacheError> {
        let action = command.action();

        if let Some(op) = self.gated_op(&command) {
            match token {
                None => {
                    let affected = self.dry_run(&command);
                    let ticket = self.gate.issue(&op, affected);
                    info!(action, affected, "confirmation required");
                    return Ok(AdminOutcome::ConfirmationRequired(ticket));
                }
                Some(token) => self.gate.redeem(&op, token)?,
            }
        }

        let result = match command {
            AdminCommand::Invalidate { keys, scope } => {
                let results = self.store.invalidate_multiple(&keys);
                let removed = results.iter().map(|r| r.removed).sum();
                info!(
                    action,
                    requested = keys.len(),
                    removed,
                    scope = scope.as_deref(),
                    "keys invalidated"
                );
                ManageResult {
                    action: action.to_string(),
                    removed,
                    keys: results,
                }
            }
            AdminCommand::ClearByType { cache_type, scope } => ManageResult {
                action: action.to_string(),
                removed: self.store.clear_by_type(cache_type, scope.as_deref()),
                keys: Vec::new(),
            },
            AdminCommand::ClearByPattern { pattern } => ManageResult {
                action: action.to_string(),
                removed: self.store.clear_by_pattern(&pattern),
                keys: Vec::new(),
            },
            AdminCommand::PurgeExpired => ManageResult {
                action: action.to_string(),
                removed: self.store.purge_expired(),
                keys: Vec::new(),
            },
        };
        Ok(AdminOutcome::Applied(result))
    }

    pub fn export(&self) -> Result<ExportResponse, CacheError> {
        transfer::export(&self.store, &self.monitor)
    }

    pub fn import(
        &self,
        entries: &[Value],
        options: &ImportOptions,
    ) -> Result<ImportResponse, CacheError> {
        transfer::import(&self.store, &self.monitor, entries, options)
    }

    fn gated_op(&self, command: &AdminCommand) -> Option<DestructiveOp> {
        match command {
            AdminCommand::ClearByPattern { pattern } => {
                Some(DestructiveOp::clear_by_pattern(pattern.as_str()))
            }
            AdminCommand::Invalidate { keys, scope } if keys.len() > self.bulk_threshold => {
                Some(DestructiveOp::invalidate_many(keys, scope.as_deref()))
            }
            _ => None,
        }
    }

    fn dry_run(&self, command: &AdminCommand) -> usize {
        match command {
            AdminCommand::Invalidate { keys, .. } => self.store.count_invalidation(keys),
            AdminCommand::ClearByPattern { pattern } => self.store.count_by_pattern(pattern),
            AdminCommand::ClearByType { .. } | AdminCommand::PurgeExpired => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use time::macros::datetime;

    use super::super::clock::ManualClock;
    use super::super::entry::EntryOptions;
    use super::*;

    fn admin() -> (CacheAdmin, ManualClock) {
        let clock = ManualClock::new(datetime!(2026-09-01 10:00 UTC));
        let config = CacheConfig {
            bulk_confirmation_threshold: 2,
            ..Default::default()
        };
        let clock_handle: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(CacheStore::with_clock(&config, Arc::clone(&clock_handle)));
        let monitor = Arc::new(CacheMonitor::new(Arc::clone(&store), &config));
        (CacheAdmin::new(store, monitor, &config, clock_handle), clock)
    }

    fn seed(admin: &CacheAdmin, key: &str) {
        admin
            .store()
            .set(
                key,
                CacheType::Simulado,
                json!(key),
                Duration::from_secs(600),
                EntryOptions::default(),
            )
            .expect("seed");
    }

    fn request(action: &str) -> ManageRequest {
        ManageRequest {
            action: action.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn clear_by_pattern_requires_confirmation() {
        let (admin, _) = admin();
        for key in ["sim:1", "sim:2", "sim:3", "flash:1"] {
            seed(&admin, key);
        }

        let mut req = request(ACTION_CLEAR_BY_PATTERN);
        req.pattern = Some("sim:*".into());

        let ticket = match admin.manage(&req).expect("first call") {
            AdminOutcome::ConfirmationRequired(ticket) => ticket,
            other => panic!("expected confirmation, got {other:?}"),
        };
        assert_eq!(ticket.affected, 3);
        assert_eq!(admin.store().len(), 4);

        req.confirmation_token = Some(ticket.token.clone());
        let AdminOutcome::Applied(result) = admin.manage(&req).expect("confirmed") else {
            panic!("expected applied outcome");
        };
        assert_eq!(result.removed, 3);
        assert_eq!(admin.store().len(), 1);

        // Tokens are single use.
        let err = admin.manage(&req).expect_err("reused token");
        assert!(matches!(err, CacheError::InvalidConfirmation { .. }));
    }

    #[test]
    fn token_for_another_pattern_is_rejected() {
        let (admin, _) = admin();
        seed(&admin, "sim:1");
        let mut req = request(ACTION_CLEAR_BY_PATTERN);
        req.pattern = Some("sim:*".into());
        let AdminOutcome::ConfirmationRequired(ticket) = admin.manage(&req).expect("issue") else {
            panic!("expected confirmation");
        };

        req.pattern = Some("*".into());
        req.confirmation_token = Some(ticket.token);
        assert!(admin.manage(&req).is_err());
        assert_eq!(admin.store().len(), 1);
    }

    #[test]
    fn bulk_invalidate_is_gated_above_threshold() {
        let (admin, _) = admin();
        for key in ["a", "b", "c"] {
            seed(&admin, key);
        }

        let mut small = request(ACTION_INVALIDATE);
        small.keys = Some(vec!["a".into(), "b".into()]);
        assert!(matches!(admin.manage(&small).expect("small"), AdminOutcome::Applied(_)));

        seed(&admin, "a");
        seed(&admin, "b");
        let mut bulk = request(ACTION_INVALIDATE);
        bulk.keys = Some(vec!["a".into(), "b".into(), "c".into()]);
        let AdminOutcome::ConfirmationRequired(ticket) = admin.manage(&bulk).expect("bulk") else {
            panic!("expected confirmation");
        };
        assert_eq!(ticket.affected, 3);

        bulk.keys = Some(vec!["c".into(), "b".into(), "a".into()]);
        bulk.confirmation_token = Some(ticket.token);
        let AdminOutcome::Applied(result) = admin.manage(&bulk).expect("confirmed") else {
            panic!("expected applied outcome");
        };
        assert_eq!(result.removed, 3);
        assert_eq!(result.keys.len(), 3);
        assert!(admin.store().is_empty());
    }

    #[test]
    fn expired_token_is_rejected() {
        let (admin, clock) = admin();
        seed(&admin, "sim:1");
        let mut req = request(ACTION_CLEAR_BY_PATTERN);
        req.pattern = Some("sim:*".into());
        let AdminOutcome::ConfirmationRequired(ticket) = admin.manage(&req).expect("issue") else {
            panic!("expected confirmation");
        };

        clock.advance(time::Duration::minutes(6));
        req.confirmation_token = Some(ticket.token);
        assert!(admin.manage(&req).is_err());
    }

    #[test]
    fn missing_parameters_are_validation_errors() {
        let (admin, _) = admin();
        for action in [ACTION_INVALIDATE, ACTION_CLEAR_BY_TYPE, ACTION_CLEAR_BY_PATTERN] {
            let err = admin.manage(&request(action)).expect_err(action);
            assert!(matches!(err, CacheError::Validation { .. }), "{action}: {err}");
        }

        let mut bad_type = request(ACTION_CLEAR_BY_TYPE);
        bad_type.cache_type = Some("NOPE".into());
        assert!(matches!(
            admin.manage(&bad_type),
            Err(CacheError::Validation { .. })
        ));
    }

    #[test]
    fn unknown_action_is_unsupported() {
        let (admin, _) = admin();
        let err = admin.manage(&request("dropEverything")).expect_err("unknown");
        assert!(
            matches!(err, CacheError::Unsupported { ref action } if action == "dropEverything")
        );
    }

    #[test]
    fn clear_by_type_and_purge_run_immediately() {
        let (admin, clock) = admin();
        seed(&admin, "sim:1");
        admin
            .store()
            .set("q", CacheType::Query, json!(1), Duration::from_secs(30), EntryOptions::default())
            .expect("seed");

        let mut req = request(ACTION_CLEAR_BY_TYPE);
        req.cache_type = Some("simulado".into());
        let AdminOutcome::Applied(result) = admin.manage(&req).expect("clear") else {
            panic!("expected applied outcome");
        };
        assert_eq!(result.removed, 1);

        clock.advance(time::Duration::minutes(1));
        let outcome = admin.manage(&request(ACTION_PURGE_EXPIRED)).expect("purge");
        let AdminOutcome::Applied(result) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(result.removed, 1);
        assert!(admin.store().is_empty());
    }
}

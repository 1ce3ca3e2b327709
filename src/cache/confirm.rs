//! Two-phase confirmation for destructive bulk operations.
//!
//! Phase one issues a token bound to a fingerprint of the exact operation.
//! Phase two redeems it: the token must be known, unexpired and issued for the
//! same fingerprint. Tokens are single use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use metrics::counter;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::config::CacheConfig;
use super::error::CacheError;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::confirm";

pub(crate) const METRIC_CONFIRMATION_ISSUED: &str = "studycache_confirmation_issued_total";

/// Canonical description of a gated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestructiveOp {
    ClearByPattern {
        pattern: String,
    },
    InvalidateMany {
        /// Sorted and deduplicated so key order does not change the binding.
        keys: Vec<String>,
        scope: Option<String>,
    },
}

impl DestructiveOp {
    pub fn invalidate_many(keys: &[String], scope: Option<&str>) -> Self {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();
        Self::InvalidateMany {
            keys,
            scope: scope.map(str::to_string),
        }
    }

    pub fn clear_by_pattern(pattern: &str) -> Self {
        Self::ClearByPattern {
            pattern: pattern.to_string(),
        }
    }

    /// Hex SHA-256 over a length-prefixed encoding of the operation.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        };
        match self {
            DestructiveOp::ClearByPattern { pattern } => {
                field("clearByPattern");
                field(pattern);
            }
            DestructiveOp::InvalidateMany { keys, scope } => {
                field("invalidate");
                field(scope.as_deref().unwrap_or(""));
                for key in keys {
                    field(key);
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Token handed back to the caller in phase one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationTicket {
    pub token: String,
    pub affected: usize,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug)]
struct Pending {
    fingerprint: String,
    issued_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

pub struct ConfirmationGate {
    pending: Mutex<HashMap<String, Pending>>,
    clock: Arc<dyn Clock>,
    ttl: time::Duration,
    capacity: usize,
}

impl ConfirmationGate {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = time::Duration::try_from(config.confirmation_ttl())
            .unwrap_or(time::Duration::minutes(5));
        Self {
            pending: Mutex::new(HashMap::new()),
            clock,
            ttl,
            capacity: config.max_pending_confirmations(),
        }
    }

    /// Phase one: record a pending confirmation for `op`.
    pub fn issue(&self, op: &DestructiveOp, affected: usize) -> ConfirmationTicket {
        let now = self.clock.now();
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = now + self.ttl;

        let mut pending = mutex_lock(&self.pending, SOURCE, "issue");
        prune_expired(&mut pending, now);
        while pending.len() >= self.capacity {
            let oldest = pending
                .iter()
                .min_by_key(|(_, entry)| entry.issued_at)
                .map(|(token, _)| token.clone());
            match oldest {
                Some(token) => {
                    pending.remove(&token);
                }
                None => break,
            }
        }
        pending.insert(
            token.clone(),
            Pending {
                fingerprint: op.fingerprint(),
                issued_at: now,
                expires_at,
            },
        );
        drop(pending);

        counter!(METRIC_CONFIRMATION_ISSUED).increment(1);
        debug!(op = ?op, affected, "confirmation token issued");
        ConfirmationTicket {
            token,
            affected,
            expires_at,
        }
    }

    /// Phase two: consume `token` if it was issued for `op`.
    ///
    /// A token presented for a different operation is rejected and left in
    /// place for the operation it was issued for.
    pub fn redeem(&self, op: &DestructiveOp, token: &str) -> Result<(), CacheError> {
        let now = self.clock.now();
        let mut pending = mutex_lock(&self.pending, SOURCE, "redeem");
        prune_expired(&mut pending, now);

        let Some(entry) = pending.get(token) else {
            warn!(op = ?op, "unknown or expired confirmation token");
            return Err(CacheError::InvalidConfirmation {
                reason: "unknown or expired confirmation token",
            });
        };
        if entry.fingerprint != op.fingerprint() {
            warn!(op = ?op, "confirmation token bound to a different operation");
            return Err(CacheError::InvalidConfirmation {
                reason: "confirmation token was issued for a different operation",
            });
        }
        pending.remove(token);
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        let now = self.clock.now();
        let mut pending = mutex_lock(&self.pending, SOURCE, "pending_len");
        prune_expired(&mut pending, now);
        pending.len()
    }
}

fn prune_expired(pending: &mut HashMap<String, Pending>, now: OffsetDateTime) {
    pending.retain(|_, entry| entry.expires_at > now);
}

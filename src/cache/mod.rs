//! Server-side cache consistency layer.
//!
//! - [`CacheStore`]: typed entries with lazy expiry and `related_keys` cascades
//! - [`CacheMonitor`]: enumeration, metadata and stats for audit and export
//! - [`CacheAdmin`]: operator actions, confirmation-gated when destructive
//!
//! ## Configuration
//!
//! Behavior is controlled via the `[cache]` section of `studycache.toml`:
//!
//! ```toml
//! [cache]
//! cascade = "single_hop"
//! bulk_confirmation_threshold = 10
//! confirmation_ttl_seconds = 300
//! ```

mod admin;
mod clock;
mod config;
mod confirm;
mod entry;
mod error;
pub(crate) mod lock;
mod monitor;
pub mod namespace;
mod store;
mod transfer;

pub use admin::{
    ACTION_CLEAR_BY_PATTERN, ACTION_CLEAR_BY_TYPE, ACTION_INVALIDATE, ACTION_PURGE_EXPIRED,
    AdminCommand, AdminOutcome, CacheAdmin,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CascadeMode};
pub use confirm::{ConfirmationGate, ConfirmationTicket, DestructiveOp};
pub use entry::{CacheEntry, EntryId, EntryOptions, KeyPattern};
pub use error::CacheError;
pub use monitor::{CacheMonitor, EntryFilter};
pub use store::{CacheStore, InvalidationOutcome, PutOutcome};

pub(crate) use confirm::METRIC_CONFIRMATION_ISSUED;
pub(crate) use store::{METRIC_STORE_HIT, METRIC_STORE_INVALIDATED, METRIC_STORE_MISS};
pub(crate) use transfer::METRIC_IMPORT_MS;

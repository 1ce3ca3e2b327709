//! Client-side resource cache with conditional revalidation.
//!
//! [`LocalResourceCache`] holds list and detail representations with their
//! validators. [`SimuladoClient`] serves fresh values from it and otherwise
//! revalidates with the origin, keeping the cached allocation on 304.

mod error;
mod fetch;
mod freshness;
mod resource_cache;
mod simulados;

pub use error::ClientError;
pub use fetch::{ConditionalFetcher, FetchOutcome};
pub use freshness::{DEFAULT_FRESHNESS, is_expired, is_expired_at, now_ms};
pub use resource_cache::{
    CacheIndex, CachedValue, LocalResourceCache, ResourceCache, ResponseValidators, WriteOutcome,
};
pub use simulados::SimuladoClient;

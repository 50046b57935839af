//! Distributed locking over a shared key-value store.
//!
//! This module implements:
//! - Mutual exclusion on named resources across all worker processes
//! - TTL-bounded grants so a crashed holder cannot deadlock the cluster
//! - Fencing tokens so a stale holder cannot release a newer grant
//! - Cluster-wide counters for rate limiting
//!
//! The store is only ever a coordination point. The relational database
//! stays the single source of truth for balances and exclusion state.

pub mod counter;
pub mod errors;
pub mod manager;

pub use counter::SharedCounter;
pub use errors::{LockError, LockResult};
pub use manager::{AcquireOptions, DistributedLock, LockManager};

use redis::aio::ConnectionManager;

/// Open a connection to the shared lock store.
///
/// The returned connection is multiplexed and cheap to clone; one is
/// typically shared between the [`LockManager`] and [`SharedCounter`].
pub async fn connect_store(redis_url: &str) -> LockResult<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    Ok(ConnectionManager::new(client).await?)
}

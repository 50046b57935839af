//! Per-key counters in the shared store.
//!
//! Rate-limit counters must be visible across all workers, so they live in
//! the same store as the locks, keyed per (endpoint, user) with TTL-based
//! expiry instead of an in-process cleanup loop.

use super::errors::LockResult;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Increments the key and starts its expiry window on first hit.
const HIT_SCRIPT: &str = r#"
local hits = redis.call('INCR', KEYS[1])
if hits == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return hits
"#;

/// Cluster-wide fixed-window counter
#[derive(Clone)]
pub struct SharedCounter {
    conn: ConnectionManager,
}

impl SharedCounter {
    /// Create a counter over an existing store connection
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Record a hit on `key` and return the total number of hits in the
    /// current window. The first hit of a window arms its expiry.
    pub async fn hit(&self, key: &str, window: Duration) -> LockResult<u64> {
        let mut conn = self.conn.clone();
        let hits: u64 = Script::new(HIT_SCRIPT)
            .key(key)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(hits)
    }
}

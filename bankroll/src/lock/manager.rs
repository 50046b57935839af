//! Distributed lock manager backed by the shared key-value store.
//!
//! Mutual exclusion across worker processes is obtained with an atomic
//! `SET key token NX PX ttl`. The ttl bounds how long a crashed holder can
//! block others; the fencing token guarantees a slow holder that outlived
//! its ttl cannot release a lock that has since been granted to someone
//! else.

use super::errors::{LockError, LockResult};
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use uuid::Uuid;

/// Deletes the key only if it still carries our fencing token.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Retry behaviour for [`LockManager::acquire`].
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Number of retries after the initial attempt
    pub retry_count: u32,
    /// Base delay between attempts; a random jitter of up to half the base
    /// is added to de-synchronize contending workers
    pub retry_delay: Duration,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            retry_count: 10,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// A held lock on a named resource.
///
/// Not persisted anywhere: the store auto-invalidates the key when the ttl
/// elapses, so a crashed holder cannot deadlock the cluster.
#[derive(Debug)]
pub struct DistributedLock {
    resource: String,
    token: String,
}

impl DistributedLock {
    /// Resource name this lock covers
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Fencing token bound to this grant
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Distributed lock manager
#[derive(Clone)]
pub struct LockManager {
    conn: ConnectionManager,
}

impl LockManager {
    /// Create a lock manager from an existing store connection
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to the shared lock store
    pub async fn connect(redis_url: &str) -> LockResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Attempt to acquire a lock on `resource`, retrying on contention.
    ///
    /// # Errors
    ///
    /// * `LockError::Timeout` - the resource stayed held through every attempt
    /// * `LockError::Store` - the lock store was unreachable
    pub async fn acquire(
        &self,
        resource: &str,
        ttl: Duration,
        opts: &AcquireOptions,
    ) -> LockResult<DistributedLock> {
        let token = Uuid::new_v4().to_string();
        let attempts = opts.retry_count.saturating_add(1);

        for attempt in 0..attempts {
            let mut conn = self.conn.clone();
            let acquired: Option<String> = redis::cmd("SET")
                .arg(resource)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await?;

            if acquired.is_some() {
                log::trace!("acquired lock on {resource} (attempt {})", attempt + 1);
                return Ok(DistributedLock {
                    resource: resource.to_string(),
                    token,
                });
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(jittered(opts.retry_delay)).await;
            }
        }

        Err(LockError::Timeout {
            resource: resource.to_string(),
            attempts,
        })
    }

    /// Release a held lock.
    ///
    /// Returns `true` if the key was deleted, `false` if the lock had
    /// already expired (and possibly been re-acquired by another worker);
    /// a harmless no-op in that case.
    pub async fn release(&self, lock: &DistributedLock) -> LockResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(&lock.resource)
            .arg(&lock.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    /// Run `f` while holding a lock on `resource`, releasing on every exit
    /// path.
    ///
    /// A failed release is logged and swallowed: the ttl reclaims the key,
    /// and the fencing token keeps a late release from clobbering a newer
    /// holder.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        resource: &str,
        ttl: Duration,
        opts: &AcquireOptions,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let lock = self.acquire(resource, ttl, opts).await.map_err(E::from)?;
        let result = f().await;
        if let Err(err) = self.release(&lock).await {
            log::warn!("failed to release lock on {resource}: {err}");
        }
        result
    }
}

/// Base delay plus up to 50% random jitter.
fn jittered(base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let jitter = rand::rng().random_range(0..=base_ms / 2);
    Duration::from_millis(base_ms + jitter)
}

//! Redis-backed CounterStore implementation
//!
//! Each increment runs `SET key 0 NX EX ttl`, `INCR key` and `PTTL key` in a
//! single `MULTI` block, so the first increment creates the window and later
//! increments never extend it.
//!
//! The connection is opened on first use. While Redis is unreachable every
//! operation fails with `StorageError::Unavailable` and the next call tries
//! again.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::storage_traits::{CounterSnapshot, CounterStore, StorageResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared counter store on Redis.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisCounterStore {
    /// Prepare a store for `redis_url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Only the url is validated here; no connection is made.
    pub fn new(redis_url: &str) -> StorageResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::Unavailable(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> StorageResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_connection_timeout(CONNECT_TIMEOUT)
                    .set_response_timeout(RESPONSE_TIMEOUT)
                    .set_number_of_retries(1);
                let conn = self
                    .client
                    .get_connection_manager_with_config(config)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "redis not reachable");
                        StorageError::Unavailable(e.to_string())
                    })?;
                info!("RedisCounterStore connected");
                Ok::<_, StorageError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

/// Convert a Redis `PTTL` reply into a remaining lifetime.
///
/// `-1` means the key has no expiry; `-2` (missing) cannot follow an `INCR`.
fn ttl_from_pttl(pttl_ms: i64) -> Option<Duration> {
    if pttl_ms < 0 {
        None
    } else {
        Some(Duration::from_millis(pttl_ms as u64))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<CounterSnapshot> {
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);

        let (value, pttl_ms): (u64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .ignore()
            .cmd("INCR")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Ok(CounterSnapshot {
            value,
            ttl: ttl_from_pttl(pttl_ms),
        })
    }

    async fn peek(&self, key: &str) -> StorageResult<Option<CounterSnapshot>> {
        let mut conn = self.connection().await?;

        let (value, pttl_ms): (Option<u64>, i64) = redis::pipe()
            .atomic()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Ok(value.map(|value| CounterSnapshot {
            value,
            ttl: ttl_from_pttl(pttl_ms),
        }))
    }

    async fn clear(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.connection().await?;
        let _removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

//! Shared `CacheProvider` backed by Redis. Grounded on the
//! `ConnectionManager` usage in `database::cache::CacheManager`'s L3 tier;
//! the optimistic-transaction retry loop is grounded on
//! `enterprise::ratelimit::distributed::OptimisticLock`, adapted here to a
//! real `redis::aio::ConnectionManager` instead of that module's simulated
//! connection.
//!
//! `write_sentinel` and `release_sentinel` need "read current value, decide,
//! write" atomicity across processes, which Redis gives via
//! `WATCH key` / `MULTI` / `EXEC`: if another client touches a watched key
//! before `EXEC`, the transaction aborts and we retry. See spec §5 for the
//! bounded retry count and the small-transaction-size rule.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::AuthzError;
use crate::error::AuthzResult;
use crate::sentinel::{LockOutcome, SentinelKind, SentinelManager};

use super::provider::CacheProvider;

/// Number of keys fetched per `SCAN` cursor step for prefix-scoped `flush`.
const SCAN_COUNT: usize = 256;

/// Upper bound on optimistic-transaction retries before giving up with
/// `AuthzError::CacheContention`. Spec §5 calls for "on the order of 15".
const MAX_RETRIES: u32 = 15;

pub struct RemoteCacheProvider {
    conn: Mutex<ConnectionManager>,
}

impl RemoteCacheProvider {
    pub async fn connect(redis_url: &str) -> AuthzResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AuthzError::Backend(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis connection failed: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl CacheProvider for RemoteCacheProvider {
    async fn get_value(&self, key: &str) -> AuthzResult<Option<String>> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis GET failed: {e}")))?;
        Ok(value)
    }

    async fn get_values(&self, keys: &[String]) -> AuthzResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.lock().await;
        let values: Vec<Option<String>> = conn
            .mget(keys)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis MGET failed: {e}")))?;
        Ok(values)
    }

    async fn write_sentinel(
        &self,
        key: &str,
        sentinel: &str,
        candidate: SentinelKind,
        sentinel_mgr: &SentinelManager,
        ttl: Duration,
    ) -> AuthzResult<LockOutcome> {
        let mut conn = self.conn.lock().await;
        let ttl_secs = ttl.as_secs().max(1);

        for _ in 0..MAX_RETRIES {
            let () = redis::cmd("WATCH")
                .arg(key)
                .query_async(&mut *conn)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis WATCH failed: {e}")))?;

            let previous: Option<String> = conn
                .get(key)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis GET failed: {e}")))?;

            let outcome = sentinel_mgr.can_set_sentinel(previous.as_deref(), candidate);
            if matches!(outcome, LockOutcome::Denied) {
                let () = redis::cmd("UNWATCH")
                    .query_async(&mut *conn)
                    .await
                    .map_err(|e| AuthzError::Backend(format!("redis UNWATCH failed: {e}")))?;
                return Ok(outcome);
            }

            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("SETEX")
                .arg(key)
                .arg(ttl_secs)
                .arg(sentinel)
                .ignore();

            let result: Option<()> = pipe
                .query_async(&mut *conn)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis MULTI/EXEC failed: {e}")))?;

            if result.is_some() {
                return Ok(outcome);
            }
            // EXEC aborted (key changed under us): retry with a fresh read and decision.
        }

        tracing::warn!(key = %key, retries = MAX_RETRIES, "write_sentinel gave up after exhausting retries");
        Err(AuthzError::CacheContention(format!(
            "write_sentinel on {key} did not commit after {MAX_RETRIES} retries"
        )))
    }

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> AuthzResult<()> {
        let mut conn = self.conn.lock().await;
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_secs)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis SETEX failed: {e}")))?;
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> AuthzResult<()> {
        let mut conn = self.conn.lock().await;
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis DEL failed: {e}")))?;
        Ok(())
    }

    async fn release_sentinel(&self, key: &str, expected_sentinel: &str) -> AuthzResult<()> {
        let mut conn = self.conn.lock().await;

        for _ in 0..MAX_RETRIES {
            let () = redis::cmd("WATCH")
                .arg(key)
                .query_async(&mut *conn)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis WATCH failed: {e}")))?;

            let current: Option<String> = conn
                .get(key)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis GET failed: {e}")))?;

            if current.as_deref() != Some(expected_sentinel) {
                let () = redis::cmd("UNWATCH")
                    .query_async(&mut *conn)
                    .await
                    .map_err(|e| AuthzError::Backend(format!("redis UNWATCH failed: {e}")))?;
                return Ok(());
            }

            let mut pipe = redis::pipe();
            pipe.atomic().cmd("DEL").arg(key).ignore();

            let result: Option<()> = pipe
                .query_async(&mut *conn)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis MULTI/EXEC failed: {e}")))?;

            if result.is_some() {
                return Ok(());
            }
        }

        tracing::warn!(key = %key, retries = MAX_RETRIES, "release_sentinel gave up after exhausting retries");
        Err(AuthzError::CacheContention(format!(
            "release_sentinel on {key} did not commit after {MAX_RETRIES} retries"
        )))
    }

    async fn add_dependency(&self, on_key: &str, dependent_key: &str) -> AuthzResult<bool> {
        let mut conn = self.conn.lock().await;
        let current: Option<String> = conn
            .get(on_key)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis GET failed: {e}")))?;
        if current
            .as_deref()
            .map(SentinelManager::is_tombstone)
            .unwrap_or(false)
        {
            return Ok(false);
        }

        let dep_set_key = dependency_set_key(on_key);
        let _: i64 = conn
            .sadd(&dep_set_key, dependent_key)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis SADD failed: {e}")))?;
        Ok(true)
    }

    async fn clear_dependencies(&self, on_key: &str) -> AuthzResult<()> {
        let mut conn = self.conn.lock().await;
        let dep_set_key = dependency_set_key(on_key);
        let dependents: Vec<String> = conn
            .smembers(&dep_set_key)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis SMEMBERS failed: {e}")))?;

        if !dependents.is_empty() {
            let _: i64 = conn
                .del(&dependents)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis DEL failed: {e}")))?;
        }
        let _: i64 = conn
            .del(&dep_set_key)
            .await
            .map_err(|e| AuthzError::Backend(format!("redis DEL failed: {e}")))?;
        Ok(())
    }

    async fn flush(&self, prefix: &str, flush_tombstones: bool) -> AuthzResult<()> {
        let mut conn = self.conn.lock().await;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut *conn)
                .await
                .map_err(|e| AuthzError::Backend(format!("redis SCAN failed: {e}")))?;

            if !keys.is_empty() {
                let doomed = if flush_tombstones {
                    keys
                } else {
                    let values: Vec<Option<String>> = conn
                        .mget(&keys)
                        .await
                        .map_err(|e| AuthzError::Backend(format!("redis MGET failed: {e}")))?;
                    keys.into_iter()
                        .zip(values)
                        .filter(|(_, value)| {
                            !value.as_deref().map(SentinelManager::is_tombstone).unwrap_or(false)
                        })
                        .map(|(key, _)| key)
                        .collect()
                };

                if !doomed.is_empty() {
                    let _: i64 = conn
                        .del(&doomed)
                        .await
                        .map_err(|e| AuthzError::Backend(format!("redis DEL failed: {e}")))?;
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(())
    }
}

fn dependency_set_key(on_key: &str) -> String {
    format!("{on_key}:\u{0}deps")
}

//! Redis-backed credential store
//!
//! Keys are `credential:{namespace}:{account}`. Whitelist slots are written
//! with `SET ... EX` so Redis owns expiry; counters are plain `INCR` keys
//! without a TTL. Every command is bounded by [`redis_utils::with_timeout_of`].

use super::{
    ensure_counter_namespace, ensure_token_namespace, CredentialStore, Namespace, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use chrono::Duration;
use redis::RedisError;
use redis_utils::SharedConnectionManager;

const KEY_PREFIX: &str = "credential";

pub struct RedisCredentialStore {
    redis: SharedConnectionManager,
    command_timeout: std::time::Duration,
    prefix: String,
}

impl RedisCredentialStore {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self {
            redis,
            command_timeout: redis_utils::DEFAULT_COMMAND_TIMEOUT,
            prefix: KEY_PREFIX.to_string(),
        }
    }

    pub fn with_command_timeout(mut self, limit: std::time::Duration) -> Self {
        self.command_timeout = limit;
        self
    }

    /// Namespace all keys under a different prefix (used to isolate test runs).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, namespace: Namespace, account: &str) -> String {
        format!("{}:{}:{}", self.prefix, namespace, account)
    }

    async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        redis_utils::with_timeout_of(self.command_timeout, fut)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        ensure_token_namespace(namespace)?;
        let key = self.key(namespace, key);

        // EX rejects zero; a non-positive TTL means the entry is already gone
        let ttl_secs = ttl.num_seconds();
        let mut conn = self.redis.lock().await.clone();
        if ttl_secs <= 0 {
            return self
                .run(async {
                    redis::cmd("DEL")
                        .arg(&key)
                        .query_async::<_, ()>(&mut conn)
                        .await
                })
                .await;
        }

        self.run(async {
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        tracing::debug!(namespace = %namespace, ttl_secs, "Credential slot written");
        Ok(())
    }

    async fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>> {
        ensure_token_namespace(namespace)?;
        let key = self.key(namespace, key);
        let mut conn = self.redis.lock().await.clone();
        self.run(async {
            redis::cmd("GET")
                .arg(&key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> StoreResult<bool> {
        ensure_token_namespace(namespace)?;
        let key = self.key(namespace, key);
        let mut conn = self.redis.lock().await.clone();
        let removed: i64 = self
            .run(async {
                redis::cmd("DEL")
                    .arg(&key)
                    .query_async::<_, i64>(&mut conn)
                    .await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn increment_counter(&self, namespace: Namespace, key: &str) -> StoreResult<u64> {
        ensure_counter_namespace(namespace)?;
        let key = self.key(namespace, key);
        let mut conn = self.redis.lock().await.clone();
        self.run(async {
            redis::cmd("INCR")
                .arg(&key)
                .query_async::<_, u64>(&mut conn)
                .await
        })
        .await
    }

    async fn counter(&self, namespace: Namespace, key: &str) -> StoreResult<u64> {
        ensure_counter_namespace(namespace)?;
        let key = self.key(namespace, key);
        let mut conn = self.redis.lock().await.clone();
        let count: Option<u64> = self
            .run(async {
                redis::cmd("GET")
                    .arg(&key)
                    .query_async::<_, Option<u64>>(&mut conn)
                    .await
            })
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn reset_counter(&self, namespace: Namespace, key: &str) -> StoreResult<()> {
        ensure_counter_namespace(namespace)?;
        let key = self.key(namespace, key);
        let mut conn = self.redis.lock().await.clone();
        self.run(async {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }
}

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};

use dealgrid_core::BoxedError;
use dealgrid_escalation::LockManager;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// SET NX EX: the lock is granted only when the key is absent, and
    /// expires on its own so a crashed worker cannot wedge the pass.
    pub async fn acquire_pass_lock(&self, key: &str, ttl_seconds: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    pub async fn release_pass_lock(&self, key: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del(key).await
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

#[async_trait]
impl LockManager for RedisClient {
    async fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<bool, BoxedError> {
        Ok(self.acquire_pass_lock(key, ttl_seconds).await?)
    }

    async fn release(&self, key: &str) -> Result<(), BoxedError> {
        Ok(self.release_pass_lock(key).await?)
    }
}

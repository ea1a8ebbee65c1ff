//! Redis-backed session blacklist (optional).
//!
//! Revoked tokens live in one Redis set. Entries carry no TTL; expired tokens
//! are rejected by signature validation anyway, so pruning the set is an
//! operational task.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use trellis_auth::{Blacklist, BlacklistError};

pub const DEFAULT_BLACKLIST_KEY: &str = "trellis:session:blacklist";

fn redis_error(err: redis::RedisError) -> BlacklistError {
    BlacklistError(err.to_string())
}

/// Blacklist stored in a Redis set.
pub struct RedisBlacklist {
    connection: RwLock<Option<MultiplexedConnection>>,
    key: String,
}

impl RedisBlacklist {
    /// Open a multiplexed connection to `redis_url`.
    #[instrument(skip(redis_url), err)]
    pub async fn connect(redis_url: &str) -> Result<Self, BlacklistError> {
        let client = redis::Client::open(redis_url).map_err(redis_error)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;

        info!("redis blacklist connected");
        Ok(Self {
            connection: RwLock::new(Some(connection)),
            key: DEFAULT_BLACKLIST_KEY.to_string(),
        })
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BlacklistError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| BlacklistError("redis connection is closed".to_string()))
    }
}

#[async_trait]
impl Blacklist for RedisBlacklist {
    async fn contains(&self, token: &str) -> Result<bool, BlacklistError> {
        let mut conn = self.connection().await?;
        conn.sismember(&self.key, token).await.map_err(redis_error)
    }

    async fn insert(&self, token: &str) -> Result<(), BlacklistError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.sadd(&self.key, token).await.map_err(redis_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BlacklistError> {
        // Multiplexed connections close when the last handle drops.
        if self.connection.write().await.take().is_some() {
            info!("redis blacklist closed");
        }
        Ok(())
    }
}

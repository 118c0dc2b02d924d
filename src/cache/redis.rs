//! Redis cache implementation using bb8 connection pool.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};

use crate::cache::{AppCache, CacheError, KeyPattern};
use crate::config::RedisCacheConfig;

type RedisPool = Pool<Client>;

const SCAN_COUNT: usize = 500;

fn redis_err(e: RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        CacheError::Connection(e.to_string())
    } else {
        CacheError::Operation(e.to_string())
    }
}

/// Redis-based cache with bb8 connection pool.
///
/// Every key is stored under `{key_prefix}:`, so several deployments can share
/// one Redis without seeing each other's entries.
pub struct RedisCache {
    pool: RedisPool,
    key_prefix: String,
}

impl RedisCache {
    /// Pool against the primary URL.
    pub async fn primary(config: &RedisCacheConfig) -> Result<Self, CacheError> {
        Self::connect(
            &config.url,
            config.pool_size,
            config.connection_timeout,
            &config.key_prefix,
        )
        .await
    }

    /// Single-connection client against the fallback node.
    pub async fn fallback(config: &RedisCacheConfig) -> Result<Self, CacheError> {
        Self::connect(
            config.fallback_url(),
            1,
            config.connection_timeout,
            &config.key_prefix,
        )
        .await
    }

    pub async fn connect(
        url: &str,
        pool_size: u32,
        connection_timeout_secs: u64,
        key_prefix: &str,
    ) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(connection_timeout_secs.max(1)))
            .build(client)
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, Client>, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }

    /// Full `SCAN MATCH` walk. Returns raw, still prefixed keys.
    async fn scan(&self, glob: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(glob)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(conn_ref)
                .await
                .map_err(redis_err)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

fn prefixed(prefix: &str, key: &str) -> String {
    format!("{}:{}", prefix, key)
}

fn strip_prefix<'a>(prefix: &str, raw: &'a str) -> Option<&'a str> {
    raw.strip_prefix(prefix)?.strip_prefix(':')
}

#[async_trait]
impl AppCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref.get(&prefixed).await.map_err(redis_err)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.get_conn().await?;
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed_key(k)).collect();

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        redis::cmd("MGET")
            .arg(&prefixed)
            .query_async(conn_ref)
            .await
            .map_err(redis_err)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        if ttl_seconds == 0 {
            conn_ref
                .set::<_, _, ()>(&prefixed, value)
                .await
                .map_err(redis_err)
        } else {
            conn_ref
                .set_ex::<_, _, ()>(&prefixed, value, ttl_seconds)
                .await
                .map_err(redis_err)
        }
    }

    async fn set_many(&self, entries: &[(String, Vec<u8>)], ttl_seconds: u64) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            let prefixed = self.prefixed_key(key);
            if ttl_seconds == 0 {
                pipe.set(prefixed, value.as_slice()).ignore();
            } else {
                pipe.set_ex(prefixed, value.as_slice(), ttl_seconds).ignore();
            }
        }

        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        pipe.query_async::<()>(conn_ref).await.map_err(redis_err)
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref.del::<_, ()>(&prefixed).await.map_err(redis_err)
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let millis: i64 = conn_ref.pttl(&prefixed).await.map_err(redis_err)?;
        // -2: missing, -1: no expiry
        Ok((millis > 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn keys_matching(&self, pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        let glob = prefixed(&self.key_prefix, &pattern.to_redis_glob());
        let raw = self.scan(&glob).await?;
        Ok(raw
            .iter()
            .filter_map(|k| strip_prefix(&self.key_prefix, k))
            .filter(|k| pattern.matches(k))
            .map(str::to_string)
            .collect())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let keys = self.scan(&format!("{}:*", self.key_prefix)).await?;
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn().await?;
        for chunk in keys.chunks(SCAN_COUNT) {
            let conn_ref: &mut MultiplexedConnection = &mut conn;
            conn_ref.del::<_, ()>(chunk).await.map_err(redis_err)?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.get_conn().await?;
        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let _: String = redis::cmd("PING")
            .query_async(conn_ref)
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        let raw = prefixed("tiercache", "user:42");
        assert_eq!(raw, "tiercache:user:42");
        assert_eq!(strip_prefix("tiercache", &raw), Some("user:42"));
        assert_eq!(strip_prefix("tiercache", "other:user:42"), None);
        assert_eq!(strip_prefix("tiercache", "tiercacheuser"), None);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisCache::connect("http://localhost:6379", 1, 1, "tiercache").await;
        assert!(matches!(result, Err(CacheError::Connection(_))));
    }
}

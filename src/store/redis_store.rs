use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use redis::{
    aio::MultiplexedConnection, AsyncCommands, AsyncConnectionConfig, Client, ConnectionAddr,
    ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisError,
};
use once_cell::sync::Lazy;
use redis::Script;
use tokio_util::sync::CancellationToken;

use super::{cancellable, connector::StoreDialer, Store};
use crate::{
    config::RouterConfig,
    core::error::{StoreError, StoreResult},
};

// Appends ARGV values absent from the list at KEYS[1], nil when the list is missing.
static PUSH_MISSING_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return false
end
local present = {}
for _, v in ipairs(redis.call('LRANGE', KEYS[1], 0, -1)) do
    present[v] = true
end
local added = 0
for _, v in ipairs(ARGV) do
    if not present[v] then
        redis.call('RPUSH', KEYS[1], v)
        present[v] = true
        added = added + 1
    end
end
return added
"#,
    )
});

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            ErrorKind::AuthenticationFailed => StoreError::Authentication(err.to_string()),
            ErrorKind::IoError => StoreError::Unreachable(err.to_string()),
            _ if err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal() => {
                StoreError::Unreachable(err.to_string())
            }
            // AUTH against a server without a password comes back as a plain reply error
            _ if err.to_string().contains("AUTH") => StoreError::Authentication(err.to_string()),
            _ => StoreError::Command(err.to_string()),
        }
    }
}

/// Store client over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn list_range(&self, ctx: &CancellationToken, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let values: Vec<String> = conn.lrange(key, 0, -1).await?;
            Ok(values)
        })
        .await
    }

    async fn list_len(&self, ctx: &CancellationToken, key: &str) -> StoreResult<usize> {
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let len: usize = conn.llen(key).await?;
            Ok(len)
        })
        .await
    }

    async fn list_push(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[String],
    ) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let _: () = conn.rpush(key, values).await?;
            Ok(())
        })
        .await
    }

    async fn list_push_missing(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[String],
    ) -> StoreResult<Option<usize>> {
        let mut invocation = PUSH_MISSING_SCRIPT.key(key);
        invocation.arg(values);
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let added: Option<usize> = invocation.invoke_async(&mut conn).await?;
            Ok(added)
        })
        .await
    }

    async fn list_remove(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &str,
    ) -> StoreResult<usize> {
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let removed: usize = conn.lrem(key, 0, value).await?;
            Ok(removed)
        })
        .await
    }

    async fn replace_lists(
        &self,
        ctx: &CancellationToken,
        lists: &[(String, Vec<String>)],
    ) -> StoreResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, values) in lists {
            pipe.del(key).ignore();
            if !values.is_empty() {
                pipe.rpush(key, values).ignore();
            }
        }
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, ctx: &CancellationToken, keys: &[String]) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let deleted: usize = conn.del(keys).await?;
            Ok(deleted)
        })
        .await
    }

    async fn exists(&self, ctx: &CancellationToken, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let exists: bool = conn.exists(key).await?;
            Ok(exists)
        })
        .await
    }

    async fn hash_set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[(&str, String)],
    ) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let _: () = conn.hset_multiple(key, fields).await?;
            Ok(())
        })
        .await
    }

    async fn hash_get(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> StoreResult<Vec<Option<String>>> {
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(key).arg(fields);
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let values: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
            Ok(values)
        })
        .await
    }

    async fn ping(&self, ctx: &CancellationToken) -> StoreResult<()> {
        let mut conn = self.conn();
        cancellable(ctx, async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

/// Dials Redis servers described by a router configuration scope.
pub struct RedisDialer;

impl RedisDialer {
    fn connection_info(config: &RouterConfig) -> StoreResult<ConnectionInfo> {
        let (host, port) = config.redis_host_port().ok_or_else(|| {
            StoreError::Unreachable(format!("invalid redis server {}", config.redis_server))
        })?;
        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: config.redis_db.unwrap_or(0),
                password: config.redis_password.clone(),
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl StoreDialer for RedisDialer {
    async fn dial(
        &self,
        ctx: &CancellationToken,
        config: &RouterConfig,
    ) -> StoreResult<Arc<dyn Store>> {
        let client = Client::open(Self::connection_info(config)?)?;
        let conn_config = AsyncConnectionConfig::new()
            .set_connection_timeout(config.dial_timeout())
            .set_response_timeout(config.read_timeout());

        debug!("Opening redis connection to {}", config.redis_server);
        // AUTH and SELECT are sent during the handshake, a bad password fails here
        let conn = cancellable(ctx, async {
            Ok(client
                .get_multiplexed_async_connection_with_config(&conn_config)
                .await?)
        })
        .await?;
        Ok(Arc::new(RedisStore::new(conn)))
    }
}

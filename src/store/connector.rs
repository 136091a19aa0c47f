//! Per-scope cache of store clients.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{RedisDialer, Store};
use crate::{config::RouterConfig, core::error::StoreResult};

/// Establishes a new store client for a router configuration scope.
#[async_trait]
pub trait StoreDialer: Send + Sync {
    async fn dial(&self, ctx: &CancellationToken, config: &RouterConfig)
        -> StoreResult<Arc<dyn Store>>;
}

/// Cache of store clients keyed by configuration scope name.
///
/// Owned by the composition root and handed to every router. The same scope
/// always yields the same client; two scopes never share one, even when they
/// point at the same server.
pub struct ConnectorCache {
    dialer: Arc<dyn StoreDialer>,
    clients: Mutex<HashMap<String, Arc<dyn Store>>>,
}

impl ConnectorCache {
    pub fn new(dialer: Arc<dyn StoreDialer>) -> Self {
        Self {
            dialer,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Cache dialling real Redis servers.
    pub fn redis() -> Self {
        Self::new(Arc::new(RedisDialer))
    }

    /// Returns the cached client for `scope`, dialling on a miss.
    ///
    /// The lock is released while dialling; when two callers race on a miss
    /// the first insert wins and both get that client.
    pub async fn connect(
        &self,
        ctx: &CancellationToken,
        scope: &str,
        config: &RouterConfig,
    ) -> StoreResult<Arc<dyn Store>> {
        if let Some(client) = self.clients.lock().await.get(scope) {
            return Ok(client.clone());
        }

        debug!("Dialling store for scope {scope} at {}", config.redis_server);
        let dialled = self.dialer.dial(ctx, config).await?;

        let mut clients = self.clients.lock().await;
        let client = clients
            .entry(scope.to_string())
            .or_insert_with(|| {
                info!(
                    "Connected router scope {scope} to store at {}",
                    config.redis_server
                );
                dialled
            })
            .clone();
        Ok(client)
    }

    /// Drops the cached client of `scope`, forcing the next call to redial.
    pub async fn evict(&self, scope: &str) -> bool {
        self.clients.lock().await.remove(scope).is_some()
    }

    /// Drops every cached client.
    pub async fn clear(&self) {
        let mut clients = self.clients.lock().await;
        info!("Closing {} store connections", clients.len());
        clients.clear();
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

//! Core traits for router implementations
//!
//! [`Router`] is the capability set every router type exposes to
//! orchestration callers. Implementations are built by the
//! [`RouterRegistry`](super::registry::RouterRegistry) from a [`RouterScope`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::RouterResult;
use crate::{config::RouterConfig, store::ConnectorCache};

/// Health-check descriptor read by the data plane for a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthcheckData {
    pub path: String,
    pub status: u16,
    pub body: String,
}

/// Everything a router factory needs to build an instance.
#[derive(Clone)]
pub struct RouterScope {
    /// Configuration scope name, also the connector cache key
    pub name: String,
    pub config: Arc<RouterConfig>,
    pub connectors: Arc<ConnectorCache>,
}

/// Factory building a router bound to a configuration scope.
pub type RouterCreateFn = fn(RouterScope) -> Arc<dyn Router>;

#[async_trait]
pub trait Router: Send + Sync {
    /// Implementation type tag, e.g. `hipache`
    fn router_type(&self) -> &str;

    /// Configuration scope this instance is bound to
    fn scope(&self) -> &str;

    /// Human readable description logged when the router is loaded.
    fn startup_message(&self) -> RouterResult<String>;

    /// Creates the backend's primary route record if it does not exist yet.
    async fn add_backend(&self, ctx: &CancellationToken, app: &str) -> RouterResult<()>;

    /// Deletes the backend with its healthcheck, CNAME records and alias list.
    async fn remove_backend(&self, ctx: &CancellationToken, app: &str) -> RouterResult<()>;

    /// Appends the missing addresses to the backend and every alias of it.
    ///
    /// Each record is appended to atomically, so concurrent callers never
    /// duplicate an address. Fails with `BackendNotFound` without writing
    /// anything when the backend's primary record is gone.
    async fn add_routes(
        &self,
        ctx: &CancellationToken,
        app: &str,
        addresses: &[Url],
    ) -> RouterResult<()>;

    async fn remove_routes(
        &self,
        ctx: &CancellationToken,
        app: &str,
        addresses: &[Url],
    ) -> RouterResult<()>;

    /// Addresses of the backend in stored order.
    async fn routes(&self, ctx: &CancellationToken, app: &str) -> RouterResult<Vec<Url>>;

    /// Primary hostname of the backend.
    async fn addr(&self, ctx: &CancellationToken, app: &str) -> RouterResult<String>;

    async fn set_cname(&self, ctx: &CancellationToken, cname: &str, app: &str)
        -> RouterResult<()>;

    async fn unset_cname(
        &self,
        ctx: &CancellationToken,
        cname: &str,
        app: &str,
    ) -> RouterResult<()>;

    /// Aliases of the backend, empty when it has none.
    async fn cnames(&self, ctx: &CancellationToken, app: &str) -> RouterResult<Vec<String>>;

    /// Exchanges the address sets of two backends.
    async fn swap(
        &self,
        ctx: &CancellationToken,
        app1: &str,
        app2: &str,
        cname_only: bool,
    ) -> RouterResult<()>;

    async fn set_healthcheck(
        &self,
        ctx: &CancellationToken,
        app: &str,
        data: &HealthcheckData,
    ) -> RouterResult<()>;

    /// Pings the backing store.
    async fn health_check(&self, ctx: &CancellationToken) -> RouterResult<()>;

    /// Stores TLS material for `hostname`, replacing any previous one.
    async fn add_certificate(
        &self,
        ctx: &CancellationToken,
        hostname: &str,
        certificate: &str,
        key: &str,
    ) -> RouterResult<()>;

    async fn remove_certificate(&self, ctx: &CancellationToken, hostname: &str)
        -> RouterResult<()>;

    async fn get_certificate(&self, ctx: &CancellationToken, hostname: &str)
        -> RouterResult<String>;
}

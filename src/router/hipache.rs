use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::RouterConfig,
    core::{
        error::{ErrorContext, Op, RouterError, RouterResult},
        traits::{HealthcheckData, Router, RouterScope},
    },
    store::{ConnectorCache, Store},
};

pub const ROUTER_TYPE: &str = "hipache";

pub fn create_hipache_router(scope: RouterScope) -> Arc<dyn Router> {
    Arc::new(HipacheRouter::new(ROUTER_TYPE, scope, false))
}

/// Router keeping hipache-style route records in Redis.
///
/// Also backs the `planb` type, which additionally stores TLS certificates.
pub struct HipacheRouter {
    router_type: &'static str,
    scope: String,
    config: Arc<RouterConfig>,
    connectors: Arc<ConnectorCache>,
    tls: bool,
}

impl HipacheRouter {
    pub fn new(router_type: &'static str, scope: RouterScope, tls: bool) -> Self {
        Self {
            router_type,
            scope: scope.name,
            config: scope.config,
            connectors: scope.connectors,
            tls,
        }
    }

    pub(super) async fn connect(
        &self,
        ctx: &CancellationToken,
        op: Op,
    ) -> RouterResult<Arc<dyn Store>> {
        self.connectors
            .connect(ctx, &self.scope, &self.config)
            .await
            .with_op(op)
    }

    pub(super) fn domain(&self, op: Op) -> RouterResult<&str> {
        self.config
            .domain
            .as_deref()
            .ok_or(RouterError::Configuration { op, key: "domain" })
    }

    /// Primary hostname of `app`: `<app>.<domain>`.
    pub(super) fn hostname(&self, op: Op, app: &str) -> RouterResult<String> {
        Ok(format!("{app}.{}", self.domain(op)?))
    }

    /// Certificate operations are only available on TLS-capable types.
    fn ensure_tls(&self) -> RouterResult<()> {
        if self.tls {
            Ok(())
        } else {
            Err(RouterError::TlsNotSupported(self.router_type.to_string()))
        }
    }
}

#[async_trait]
impl Router for HipacheRouter {
    fn router_type(&self) -> &str {
        self.router_type
    }

    fn scope(&self) -> &str {
        &self.scope
    }

    fn startup_message(&self) -> RouterResult<String> {
        Ok(format!(
            "{} router \"{}\" with redis at \"{}\".",
            self.router_type,
            self.domain(Op::Get)?,
            self.config.redis_server
        ))
    }

    async fn add_backend(&self, ctx: &CancellationToken, app: &str) -> RouterResult<()> {
        self.create_backend(ctx, app).await
    }

    async fn remove_backend(&self, ctx: &CancellationToken, app: &str) -> RouterResult<()> {
        self.delete_backend(ctx, app).await
    }

    async fn add_routes(
        &self,
        ctx: &CancellationToken,
        app: &str,
        addresses: &[Url],
    ) -> RouterResult<()> {
        self.append_routes(ctx, app, addresses).await
    }

    async fn remove_routes(
        &self,
        ctx: &CancellationToken,
        app: &str,
        addresses: &[Url],
    ) -> RouterResult<()> {
        self.drop_routes(ctx, app, addresses).await
    }

    async fn routes(&self, ctx: &CancellationToken, app: &str) -> RouterResult<Vec<Url>> {
        self.read_routes(ctx, app).await
    }

    async fn addr(&self, ctx: &CancellationToken, app: &str) -> RouterResult<String> {
        self.backend_addr(ctx, app).await
    }

    async fn set_cname(
        &self,
        ctx: &CancellationToken,
        cname: &str,
        app: &str,
    ) -> RouterResult<()> {
        self.attach_cname(ctx, cname, app).await
    }

    async fn unset_cname(
        &self,
        ctx: &CancellationToken,
        cname: &str,
        app: &str,
    ) -> RouterResult<()> {
        self.detach_cname(ctx, cname, app).await
    }

    async fn cnames(&self, ctx: &CancellationToken, app: &str) -> RouterResult<Vec<String>> {
        let store = self.connect(ctx, Op::Get).await?;
        super::cname::read_cnames(&*store, ctx, app)
            .await
            .with_op(Op::Get)
    }

    async fn swap(
        &self,
        ctx: &CancellationToken,
        app1: &str,
        app2: &str,
        cname_only: bool,
    ) -> RouterResult<()> {
        self.swap_backends(ctx, app1, app2, cname_only).await
    }

    async fn set_healthcheck(
        &self,
        ctx: &CancellationToken,
        app: &str,
        data: &HealthcheckData,
    ) -> RouterResult<()> {
        self.write_healthcheck(ctx, app, data).await
    }

    async fn health_check(&self, ctx: &CancellationToken) -> RouterResult<()> {
        let store = self.connect(ctx, Op::Ping).await?;
        store.ping(ctx).await.with_op(Op::Ping)
    }

    async fn add_certificate(
        &self,
        ctx: &CancellationToken,
        hostname: &str,
        certificate: &str,
        key: &str,
    ) -> RouterResult<()> {
        self.ensure_tls()?;
        self.store_certificate(ctx, hostname, certificate, key).await
    }

    async fn remove_certificate(&self, ctx: &CancellationToken, hostname: &str) -> RouterResult<()> {
        self.ensure_tls()?;
        self.delete_certificate(ctx, hostname).await
    }

    async fn get_certificate(&self, ctx: &CancellationToken, hostname: &str) -> RouterResult<String> {
        self.ensure_tls()?;
        self.load_certificate(ctx, hostname).await
    }
}

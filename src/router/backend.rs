use log::debug;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    address_string, cname::read_cnames, cname_key, frontend_key, healthcheck_key, parse_address,
    record_addresses, HipacheRouter,
};
use crate::core::{
    error::{ErrorContext, Op, RouterError, RouterResult},
    traits::HealthcheckData,
};

impl HipacheRouter {
    pub(super) async fn create_backend(&self, ctx: &CancellationToken, app: &str) -> RouterResult<()> {
        let frontend = frontend_key(&self.hostname(Op::Add, app)?);
        let store = self.connect(ctx, Op::Add).await?;

        if store.list_len(ctx, &frontend).await.with_op(Op::Add)? > 0 {
            debug!("Backend {app} already exists");
            return Ok(());
        }
        store
            .list_push(ctx, &frontend, &[app.to_string()])
            .await
            .with_op(Op::Add)?;
        debug!("Created backend {app} at {frontend}");
        Ok(())
    }

    pub(super) async fn delete_backend(&self, ctx: &CancellationToken, app: &str) -> RouterResult<()> {
        let hostname = self.hostname(Op::Remove, app)?;
        let store = self.connect(ctx, Op::Remove).await?;

        let cnames = read_cnames(&*store, ctx, app).await.with_op(Op::Remove)?;
        let mut keys = vec![frontend_key(&hostname), healthcheck_key(&hostname)];
        keys.extend(cnames.iter().map(|cname| frontend_key(cname)));
        keys.push(cname_key(app));

        let deleted = store.delete(ctx, &keys).await.with_op(Op::Remove)?;
        debug!("Removed backend {app}, {deleted} of {} keys existed", keys.len());
        Ok(())
    }

    pub(super) async fn append_routes(
        &self,
        ctx: &CancellationToken,
        app: &str,
        addresses: &[Url],
    ) -> RouterResult<()> {
        let frontend = frontend_key(&self.hostname(Op::Add, app)?);
        let store = self.connect(ctx, Op::Routes).await?;

        let addresses: Vec<String> = addresses.iter().map(address_string).collect();
        let added = store
            .list_push_missing(ctx, &frontend, &addresses)
            .await
            .with_op(Op::Routes)?
            .ok_or(RouterError::BackendNotFound)?;
        debug!("Added {added} routes to {frontend}");

        for cname in read_cnames(&*store, ctx, app).await.with_op(Op::Routes)? {
            let alias = frontend_key(&cname);
            let pushed = store
                .list_push_missing(ctx, &alias, &addresses)
                .await
                .with_op(Op::Routes)?;
            if pushed.is_none() {
                // alias record lost, rebuild it from the primary
                let mirror = store.list_range(ctx, &frontend).await.with_op(Op::Routes)?;
                store
                    .replace_lists(ctx, &[(alias, mirror)])
                    .await
                    .with_op(Op::Routes)?;
            }
        }
        Ok(())
    }

    pub(super) async fn drop_routes(
        &self,
        ctx: &CancellationToken,
        app: &str,
        addresses: &[Url],
    ) -> RouterResult<()> {
        let frontend = frontend_key(&self.hostname(Op::Remove, app)?);
        let store = self.connect(ctx, Op::Remove).await?;

        let addresses: Vec<String> = addresses.iter().map(address_string).collect();
        let cnames = read_cnames(&*store, ctx, app).await.with_op(Op::Remove)?;
        let mut keys = vec![frontend];
        keys.extend(cnames.iter().map(|cname| frontend_key(cname)));

        for key in &keys {
            for address in &addresses {
                store
                    .list_remove(ctx, key, address)
                    .await
                    .with_op(Op::Remove)?;
            }
        }
        debug!("Removed {} routes from {} records of {app}", addresses.len(), keys.len());
        Ok(())
    }

    pub(super) async fn read_routes(&self, ctx: &CancellationToken, app: &str) -> RouterResult<Vec<Url>> {
        let frontend = frontend_key(&self.hostname(Op::Routes, app)?);
        let store = self.connect(ctx, Op::Routes).await?;

        let record = store.list_range(ctx, &frontend).await.with_op(Op::Routes)?;
        record_addresses(&record)
            .iter()
            .map(|address| parse_address(address))
            .collect()
    }

    pub(super) async fn backend_addr(&self, ctx: &CancellationToken, app: &str) -> RouterResult<String> {
        let hostname = self.hostname(Op::Get, app)?;
        let store = self.connect(ctx, Op::Get).await?;

        if !store
            .exists(ctx, &frontend_key(&hostname))
            .await
            .with_op(Op::Get)?
        {
            return Err(RouterError::BackendNotFound);
        }
        Ok(hostname)
    }

    pub(super) async fn write_healthcheck(
        &self,
        ctx: &CancellationToken,
        app: &str,
        data: &HealthcheckData,
    ) -> RouterResult<()> {
        let key = healthcheck_key(&self.hostname(Op::Healthcheck, app)?);
        let store = self.connect(ctx, Op::Healthcheck).await?;

        store
            .hash_set(
                ctx,
                &key,
                &[
                    ("path", data.path.clone()),
                    ("status", data.status.to_string()),
                    ("body", data.body.clone()),
                ],
            )
            .await
            .with_op(Op::Healthcheck)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        core::{error::StoreError, traits::Router},
        router::{hipache::create_hipache_router, testutil::*},
        store::{MemoryDialer, MemoryStore, Store},
    };

    fn new_router(domain: Option<&str>) -> (Arc<dyn Router>, Arc<MemoryDialer>, MemoryStore) {
        let dialer = Arc::new(MemoryDialer::new());
        let router = create_hipache_router(scope("hipache", config(domain), &dialer));
        let raw = raw(&dialer);
        (router, dialer, raw)
    }

    #[tokio::test]
    async fn test_add_backend() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        assert_eq!(
            strings(&["tip"]),
            raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap()
        );

        // idempotent
        router.add_backend(&ctx, "tip").await.unwrap();
        assert_eq!(1, raw.list_len(&ctx, "frontend:tip.golang.org").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_backend() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        let hc = HealthcheckData {
            path: "/".to_string(),
            status: 200,
            body: "WORKING".to_string(),
        };
        router.set_healthcheck(&ctx, "tip", &hc).await.unwrap();
        assert_eq!(
            vec![Some("/".to_string()), Some("200".to_string()), Some("WORKING".to_string())],
            raw.hash_get(&ctx, "healthcheck:tip.golang.org", &["path", "status", "body"])
                .await
                .unwrap()
        );

        router.remove_backend(&ctx, "tip").await.unwrap();
        assert!(!raw.exists(&ctx, "frontend:tip.golang.org").await.unwrap());
        assert!(!raw.exists(&ctx, "healthcheck:tip.golang.org").await.unwrap());

        // missing pieces are not an error
        router.remove_backend(&ctx, "tip").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_backend_also_removes_cnames() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        router.set_cname(&ctx, "mycname.com", "tip").await.unwrap();
        assert_eq!(1, raw.list_len(&ctx, "cname:tip").await.unwrap());

        router.remove_backend(&ctx, "tip").await.unwrap();
        assert_eq!(0, raw.list_len(&ctx, "cname:tip").await.unwrap());
        assert!(!raw.exists(&ctx, "frontend:mycname.com").await.unwrap());
        assert!(router.cnames(&ctx, "tip").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_routes() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        let addr = url("http://10.10.10.10:8080");
        router.add_routes(&ctx, "tip", &[addr.clone()]).await.unwrap();
        assert_eq!(
            strings(&["tip", "http://10.10.10.10:8080"]),
            raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap()
        );

        // adding the same address twice is a no-op
        router
            .add_routes(&ctx, "tip", &[addr.clone(), addr.clone()])
            .await
            .unwrap();
        assert_eq!(
            strings(&["tip", "http://10.10.10.10:8080"]),
            raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap()
        );
        assert_eq!(vec![addr], router.routes(&ctx, "tip").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_routes_keeps_insertion_order() {
        let (router, _, _) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        let addrs = vec![
            url("http://10.10.10.12:8080"),
            url("http://10.10.10.10:8080"),
            url("http://10.10.10.11:8080"),
        ];
        router.add_routes(&ctx, "tip", &addrs[..2]).await.unwrap();
        router.add_routes(&ctx, "tip", &addrs).await.unwrap();
        assert_eq!(addrs, router.routes(&ctx, "tip").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_route_no_domain_configured() {
        let (router, _, _) = new_router(None);
        let ctx = CancellationToken::new();

        let err = router
            .add_routes(&ctx, "tip", &[url("http://10.10.10.10:8080")])
            .await
            .unwrap_err();
        assert_eq!(Some(Op::Add), err.op());
        assert!(matches!(err, RouterError::Configuration { key: "domain", .. }));
    }

    #[tokio::test]
    async fn test_add_route_connect_failure() {
        let (router, dialer, _) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();
        dialer.set_unreachable(SERVER, true);

        let err = router
            .add_routes(&ctx, "tip", &[url("http://www.tsuru.io")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Connectivity {
                op: Op::Routes,
                source: StoreError::Unreachable(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_add_route_after_corrupted_store() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "b1").await.unwrap();
        raw.delete(&ctx, &["frontend:b1.golang.org".to_string()])
            .await
            .unwrap();

        let err = router
            .add_routes(&ctx, "b1", &[url("http://127.0.0.1")])
            .await
            .unwrap_err();
        assert_eq!(RouterError::BackendNotFound, err);
        assert!(!raw.exists(&ctx, "frontend:b1.golang.org").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_route_also_updates_cname_records() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        router
            .add_routes(&ctx, "tip", &[url("http://10.10.10.10:8080")])
            .await
            .unwrap();
        router.set_cname(&ctx, "mycname.com", "tip").await.unwrap();
        assert_eq!(2, raw.list_len(&ctx, "frontend:mycname.com").await.unwrap());

        router
            .add_routes(&ctx, "tip", &[url("http://10.10.10.11:8080")])
            .await
            .unwrap();
        assert_eq!(
            raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap(),
            raw.list_range(&ctx, "frontend:mycname.com").await.unwrap()
        );
        assert_eq!(3, raw.list_len(&ctx, "frontend:mycname.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_route_rebuilds_lost_cname_record() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        router.set_cname(&ctx, "mycname.com", "tip").await.unwrap();
        raw.delete(&ctx, &["frontend:mycname.com".to_string()])
            .await
            .unwrap();

        router
            .add_routes(&ctx, "tip", &[url("http://10.10.10.10")])
            .await
            .unwrap();
        assert_eq!(
            strings(&["tip", "http://10.10.10.10"]),
            raw.list_range(&ctx, "frontend:mycname.com").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_remove_route() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        let addr = url("http://10.10.10.10");
        router.add_routes(&ctx, "tip", &[addr.clone()]).await.unwrap();
        router.remove_routes(&ctx, "tip", &[addr.clone()]).await.unwrap();
        assert_eq!(
            strings(&["tip"]),
            raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap()
        );

        // absent addresses are tolerated
        router.remove_routes(&ctx, "tip", &[addr]).await.unwrap();

        router.remove_backend(&ctx, "tip").await.unwrap();
        assert_eq!(0, raw.list_len(&ctx, "frontend:tip.golang.org").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_route_no_domain_configured() {
        let (router, _, _) = new_router(None);
        let err = router
            .remove_routes(&CancellationToken::new(), "tip", &[url("http://tip.golang.org")])
            .await
            .unwrap_err();
        assert_eq!(Some(Op::Remove), err.op());
    }

    #[tokio::test]
    async fn test_remove_route_connect_failure() {
        let (router, dialer, _) = new_router(Some("golang.org"));
        dialer.set_unreachable(SERVER, true);
        let err = router
            .remove_routes(&CancellationToken::new(), "tip", &[url("http://tip.golang.org")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Connectivity {
                op: Op::Remove,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_remove_route_also_removes_from_cname_records() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        let addrs = [url("http://10.10.10.10"), url("http://10.10.10.11")];
        router.add_routes(&ctx, "tip", &addrs).await.unwrap();
        router.set_cname(&ctx, "test.com", "tip").await.unwrap();

        router.remove_routes(&ctx, "tip", &addrs[..1]).await.unwrap();
        let primary = raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap();
        assert_eq!(strings(&["tip", "http://10.10.10.11"]), primary);
        assert_eq!(
            primary,
            raw.list_range(&ctx, "frontend:test.com").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_routes_of_unknown_backend() {
        let (router, _, _) = new_router(Some("golang.org"));
        assert!(router
            .routes(&CancellationToken::new(), "ghost")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_routes_with_corrupted_address() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();
        raw.list_push(&ctx, "frontend:tip.golang.org", &strings(&["tip", "not a url"]))
            .await
            .unwrap();

        let err = router.routes(&ctx, "tip").await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_addr() {
        let (router, _, _) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();

        router.add_backend(&ctx, "tip").await.unwrap();
        assert_eq!("tip.golang.org", router.addr(&ctx, "tip").await.unwrap());
        assert_eq!(
            Err(RouterError::BackendNotFound),
            router.addr(&ctx, "ghost").await
        );
    }

    #[tokio::test]
    async fn test_addr_no_domain_configured() {
        let (router, _, _) = new_router(None);
        let err = router
            .addr(&CancellationToken::new(), "tip")
            .await
            .unwrap_err();
        assert_eq!(Some(Op::Get), err.op());
    }

    #[tokio::test]
    async fn test_addr_connect_failure() {
        let (router, dialer, _) = new_router(Some("golang.org"));
        dialer.set_unreachable(SERVER, true);
        let err = router
            .addr(&CancellationToken::new(), "tip")
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Connectivity { op: Op::Get, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_add_routes() {
        let (router, _, raw) = new_router(Some("golang.org"));
        let ctx = CancellationToken::new();
        router.add_backend(&ctx, "tip").await.unwrap();
        router.set_cname(&ctx, "mycname.com", "tip").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let router = router.clone();
            handles.push(tokio::spawn(async move {
                let addr = url(&format!("http://10.0.0.{i}:8080"));
                router
                    .add_routes(&CancellationToken::new(), "tip", &[addr])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let primary = raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap();
        assert_eq!(11, primary.len());
        let mut alias = raw.list_range(&ctx, "frontend:mycname.com").await.unwrap();
        let mut sorted = primary.clone();
        sorted.sort();
        alias.sort();
        assert_eq!(sorted, alias);
    }

    #[tokio::test]
    async fn test_concurrent_add_routes_of_same_address() {
        let dialer = Arc::new(MemoryDialer::new());
        let router = create_hipache_router(yielding_scope(
            "hipache",
            config(Some("golang.org")),
            &dialer,
        ));
        let raw = raw(&dialer);
        let ctx = CancellationToken::new();
        router.add_backend(&ctx, "tip").await.unwrap();
        router.set_cname(&ctx, "mycname.com", "tip").await.unwrap();

        let addr = [url("http://10.10.10.10:8080")];
        let (first, second) = tokio::join!(
            router.add_routes(&ctx, "tip", &addr),
            router.add_routes(&ctx, "tip", &addr)
        );
        first.unwrap();
        second.unwrap();

        let expected = strings(&["tip", "http://10.10.10.10:8080"]);
        assert_eq!(
            expected,
            raw.list_range(&ctx, "frontend:tip.golang.org").await.unwrap()
        );
        assert_eq!(
            expected,
            raw.list_range(&ctx, "frontend:mycname.com").await.unwrap()
        );
    }
}
